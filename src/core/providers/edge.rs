//! HTTP client for the edge/DNS platform.

use super::http::{bearer, Http};
use super::{
    Account, Bucket, DnsRecord, DnsRecordSpec, EdgeApi, Identity, PermissionGroup, Provider,
    ScopedTokenRequest, Zone,
};
use crate::error::Result;
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://api.canopy.dev/v4";

/// Dashboard page where a scoped API token can be created by hand.
pub const TOKEN_DASHBOARD_URL: &str = "https://dash.canopy.dev/profile/api-tokens";

pub struct EdgeClient {
    http: Http,
}

#[derive(Deserialize)]
struct TokenCreated {
    value: String,
}

impl EdgeClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: Http::new(Provider::Edge, base_url),
        }
    }

    /// Client against `AIRLIFT_EDGE_API` or the public endpoint.
    pub fn from_env() -> Self {
        let base = std::env::var("AIRLIFT_EDGE_API").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(&base)
    }
}

impl EdgeApi for EdgeClient {
    fn verify_token(&self, token: &str) -> Result<Identity> {
        self.http.get("/user/verify", &bearer(token))
    }

    fn list_zones(&self, token: &str) -> Result<Vec<Zone>> {
        self.http.get("/zones", &bearer(token))
    }

    fn find_zone(&self, token: &str, name: &str) -> Result<Option<Zone>> {
        let zones: Vec<Zone> = self
            .http
            .get(&format!("/zones?name={}", name), &bearer(token))?;
        Ok(zones.into_iter().find(|z| z.name == name))
    }

    fn list_dns_records(&self, token: &str, zone_id: &str, name: &str) -> Result<Vec<DnsRecord>> {
        self.http.get(
            &format!("/zones/{}/dns_records?name={}", zone_id, name),
            &bearer(token),
        )
    }

    fn create_dns_record(
        &self,
        token: &str,
        zone_id: &str,
        spec: &DnsRecordSpec,
    ) -> Result<DnsRecord> {
        self.http
            .post(&format!("/zones/{}/dns_records", zone_id), spec, &bearer(token))
    }

    fn update_dns_record(
        &self,
        token: &str,
        zone_id: &str,
        record_id: &str,
        spec: &DnsRecordSpec,
    ) -> Result<DnsRecord> {
        self.http.put(
            &format!("/zones/{}/dns_records/{}", zone_id, record_id),
            spec,
            &bearer(token),
        )
    }

    fn list_accounts(&self, token: &str) -> Result<Vec<Account>> {
        self.http.get("/accounts", &bearer(token))
    }

    fn list_buckets(&self, token: &str, account_id: &str) -> Result<Vec<Bucket>> {
        self.http
            .get(&format!("/accounts/{}/buckets", account_id), &bearer(token))
    }

    fn list_permission_groups(&self, elevated: &str) -> Result<Vec<PermissionGroup>> {
        self.http
            .get("/user/tokens/permission_groups", &bearer(elevated))
    }

    fn create_scoped_token(&self, elevated: &str, request: &ScopedTokenRequest) -> Result<String> {
        let created: TokenCreated = self.http.post("/user/tokens", request, &bearer(elevated))?;
        Ok(created.value)
    }
}
