//! Provider API surface.
//!
//! The workflow talks to both platforms through the `ComputeApi` / `EdgeApi`
//! traits so that tests can substitute in-memory fakes for the HTTP clients.

pub mod compute;
pub mod edge;
pub mod fakes;
pub(crate) mod http;

pub use compute::ComputeClient;
pub use edge::EdgeClient;

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// The two external platforms the workflow reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Compute,
    Edge,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Compute => "compute",
            Provider::Edge => "edge",
        }
    }

    pub fn parse(value: &str) -> Option<Provider> {
        match value.trim().to_lowercase().as_str() {
            "compute" => Some(Provider::Compute),
            "edge" => Some(Provider::Edge),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Compute platform wire types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub name: String,
    pub organization: String,
    /// Platform ingress hostname for the app (DNS reconciliation target).
    pub hostname: String,
    /// Image coordinate of the currently released version, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRequest {
    pub app: String,
    pub image: String,
    pub config: serde_json::Value,
    pub strategy: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseResponse {
    /// Free-text summary; the pipeline extracts the release id from it.
    pub summary: String,
}

/// Browser-mediated CLI auth session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliSession {
    pub id: String,
    pub url: String,
}

pub trait ComputeApi: Send + Sync {
    fn verify_token(&self, token: &str) -> Result<Identity>;
    fn get_app(&self, token: &str, name: &str) -> Result<Option<App>>;
    fn create_app(&self, token: &str, name: &str, organization: &str) -> Result<()>;
    fn list_organizations(&self, token: &str) -> Result<Vec<Organization>>;
    fn list_regions(&self, token: &str) -> Result<Vec<Region>>;
    fn create_release(&self, token: &str, request: &ReleaseRequest) -> Result<ReleaseResponse>;
    fn create_cli_session(&self) -> Result<CliSession>;
    /// One poll of a pending session. `Ok(None)` means "not resolved yet".
    fn poll_cli_session(&self, session_id: &str) -> Result<Option<String>>;
}

// ============================================================================
// Edge platform wire types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsRecord {
    pub id: String,
    pub name: String,
    pub record_type: String,
    pub content: String,
    pub proxied: bool,
    pub ttl: u32,
}

/// Desired state for a DNS record create/update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsRecordSpec {
    pub name: String,
    pub record_type: String,
    pub content: String,
    pub proxied: bool,
    pub ttl: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGroup {
    pub id: String,
    pub name: String,
}

/// Request to mint a narrowly-scoped token from an elevated credential.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopedTokenRequest {
    pub name: String,
    pub group_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,
}

pub trait EdgeApi: Send + Sync {
    fn verify_token(&self, token: &str) -> Result<Identity>;
    fn list_zones(&self, token: &str) -> Result<Vec<Zone>>;
    fn find_zone(&self, token: &str, name: &str) -> Result<Option<Zone>>;
    fn list_dns_records(&self, token: &str, zone_id: &str, name: &str) -> Result<Vec<DnsRecord>>;
    fn create_dns_record(&self, token: &str, zone_id: &str, spec: &DnsRecordSpec)
        -> Result<DnsRecord>;
    fn update_dns_record(
        &self,
        token: &str,
        zone_id: &str,
        record_id: &str,
        spec: &DnsRecordSpec,
    ) -> Result<DnsRecord>;
    fn list_accounts(&self, token: &str) -> Result<Vec<Account>>;
    fn list_buckets(&self, token: &str, account_id: &str) -> Result<Vec<Bucket>>;
    /// Enumerate the provider's permission-group catalog using an elevated
    /// credential (privileged bootstrap only).
    fn list_permission_groups(&self, elevated: &str) -> Result<Vec<PermissionGroup>>;
    fn create_scoped_token(&self, elevated: &str, request: &ScopedTokenRequest) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_round_trips_names() {
        assert_eq!(Provider::parse("compute"), Some(Provider::Compute));
        assert_eq!(Provider::parse(" EDGE "), Some(Provider::Edge));
        assert_eq!(Provider::parse("orbit"), None);
        assert_eq!(Provider::Edge.to_string(), "edge");
    }
}
