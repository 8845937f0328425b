//! HTTP client for the compute/release platform.

use super::http::{bearer, Http};
use super::{
    App, CliSession, ComputeApi, Identity, Organization, Provider, Region, ReleaseRequest,
    ReleaseResponse,
};
use crate::error::Result;
use serde::Deserialize;
use serde_json::json;

pub const DEFAULT_BASE_URL: &str = "https://api.strato.dev/v1";

/// Dashboard page where a personal access token can be created by hand.
pub const TOKEN_DASHBOARD_URL: &str = "https://dash.strato.dev/account/tokens";

pub struct ComputeClient {
    http: Http,
}

#[derive(Deserialize)]
struct SessionPoll {
    token: Option<String>,
}

impl ComputeClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: Http::new(Provider::Compute, base_url),
        }
    }

    /// Client against `AIRLIFT_COMPUTE_API` or the public endpoint.
    pub fn from_env() -> Self {
        let base = std::env::var("AIRLIFT_COMPUTE_API").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(&base)
    }
}

impl ComputeApi for ComputeClient {
    fn verify_token(&self, token: &str) -> Result<Identity> {
        self.http.get("/identity", &bearer(token))
    }

    fn get_app(&self, token: &str, name: &str) -> Result<Option<App>> {
        self.http
            .get_optional(&format!("/apps/{}", name), &bearer(token))
    }

    fn create_app(&self, token: &str, name: &str, organization: &str) -> Result<()> {
        let _: serde_json::Value = self.http.post(
            "/apps",
            &json!({ "name": name, "organization": organization }),
            &bearer(token),
        )?;
        Ok(())
    }

    fn list_organizations(&self, token: &str) -> Result<Vec<Organization>> {
        self.http.get("/organizations", &bearer(token))
    }

    fn list_regions(&self, token: &str) -> Result<Vec<Region>> {
        self.http.get("/regions", &bearer(token))
    }

    fn create_release(&self, token: &str, request: &ReleaseRequest) -> Result<ReleaseResponse> {
        self.http.post("/releases", request, &bearer(token))
    }

    fn create_cli_session(&self) -> Result<CliSession> {
        self.http.post("/auth/cli-sessions", &json!({}), &[])
    }

    fn poll_cli_session(&self, session_id: &str) -> Result<Option<String>> {
        let poll: SessionPoll = self
            .http
            .get(&format!("/auth/cli-sessions/{}", session_id), &[])?;
        Ok(poll.token)
    }
}
