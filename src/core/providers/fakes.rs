//! In-memory fakes for the provider and builder traits (testing only).
//!
//! The fakes count writes and record requests so tests can assert
//! idempotence and call ordering without any network.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use crate::build::{BuildRequest, ImageBuilder};
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::prompt::{PromptMessage, Prompter};

use super::{
    Account, App, Bucket, CliSession, ComputeApi, DnsRecord, DnsRecordSpec, EdgeApi, Identity,
    Organization, PermissionGroup, Region, ReleaseRequest, ReleaseResponse, ScopedTokenRequest,
    Zone,
};

fn unauthorized(provider: &str) -> Error {
    Error::provider_api_error(provider, 401, "unauthorized")
}

fn forbidden(provider: &str, what: &str) -> Error {
    Error::provider_api_error(provider, 403, format!("forbidden: {}", what))
}

// ---------------------------------------------------------------------------
// FakeCompute
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ComputeState {
    valid_tokens: HashSet<String>,
    organizations: Vec<Organization>,
    regions: Vec<Region>,
    apps: HashMap<String, App>,
    /// Lookups that must happen before a created app becomes visible
    /// (models the provider's eventual consistency window).
    visibility_delay: HashMap<String, u32>,
    create_visibility_delay: u32,
    releases: Vec<ReleaseRequest>,
    release_counter: u32,
    session: Option<SessionState>,
    fail_organizations: bool,
    fail_regions: bool,
}

struct SessionState {
    id: String,
    url: String,
    token: String,
    polls_until_ready: u32,
}

/// In-memory compute platform.
#[derive(Default)]
pub struct FakeCompute {
    state: Mutex<ComputeState>,
}

impl FakeCompute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(self, token: &str) -> Self {
        self.state.lock().unwrap().valid_tokens.insert(token.to_string());
        self
    }

    pub fn with_organization(self, slug: &str) -> Self {
        self.state.lock().unwrap().organizations.push(Organization {
            slug: slug.to_string(),
            name: slug.to_string(),
        });
        self
    }

    pub fn with_region(self, code: &str) -> Self {
        self.state.lock().unwrap().regions.push(Region {
            code: code.to_string(),
            name: code.to_string(),
        });
        self
    }

    pub fn with_app(self, app: App) -> Self {
        self.state.lock().unwrap().apps.insert(app.name.clone(), app);
        self
    }

    /// Created apps stay invisible for this many lookups.
    pub fn with_create_visibility_delay(self, lookups: u32) -> Self {
        self.state.lock().unwrap().create_visibility_delay = lookups;
        self
    }

    pub fn with_browser_session(self, id: &str, url: &str, token: &str, polls_until_ready: u32) -> Self {
        self.state.lock().unwrap().session = Some(SessionState {
            id: id.to_string(),
            url: url.to_string(),
            token: token.to_string(),
            polls_until_ready,
        });
        self
    }

    pub fn failing_organizations(self) -> Self {
        self.state.lock().unwrap().fail_organizations = true;
        self
    }

    pub fn failing_regions(self) -> Self {
        self.state.lock().unwrap().fail_regions = true;
        self
    }

    pub fn release_count(&self) -> usize {
        self.state.lock().unwrap().releases.len()
    }

    pub fn releases(&self) -> Vec<ReleaseRequest> {
        self.state.lock().unwrap().releases.clone()
    }

    pub fn app_image(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .apps
            .get(name)
            .and_then(|a| a.image.clone())
    }

    fn check_token(state: &ComputeState, token: &str) -> Result<()> {
        if state.valid_tokens.contains(token) {
            Ok(())
        } else {
            Err(unauthorized("compute"))
        }
    }
}

impl ComputeApi for FakeCompute {
    fn verify_token(&self, token: &str) -> Result<Identity> {
        let state = self.state.lock().unwrap();
        Self::check_token(&state, token)?;
        Ok(Identity {
            handle: "tester".to_string(),
            email: None,
        })
    }

    fn get_app(&self, token: &str, name: &str) -> Result<Option<App>> {
        let mut state = self.state.lock().unwrap();
        Self::check_token(&state, token)?;
        if let Some(remaining) = state.visibility_delay.get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(None);
            }
        }
        Ok(state.apps.get(name).cloned())
    }

    fn create_app(&self, token: &str, name: &str, organization: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_token(&state, token)?;
        let delay = state.create_visibility_delay;
        state.apps.insert(
            name.to_string(),
            App {
                name: name.to_string(),
                organization: organization.to_string(),
                hostname: format!("{}.strato.app", name),
                image: None,
            },
        );
        if delay > 0 {
            state.visibility_delay.insert(name.to_string(), delay);
        }
        Ok(())
    }

    fn list_organizations(&self, token: &str) -> Result<Vec<Organization>> {
        let state = self.state.lock().unwrap();
        Self::check_token(&state, token)?;
        if state.fail_organizations {
            return Err(forbidden("compute", "organizations"));
        }
        Ok(state.organizations.clone())
    }

    fn list_regions(&self, token: &str) -> Result<Vec<Region>> {
        let state = self.state.lock().unwrap();
        Self::check_token(&state, token)?;
        if state.fail_regions {
            return Err(forbidden("compute", "regions"));
        }
        Ok(state.regions.clone())
    }

    fn create_release(&self, token: &str, request: &ReleaseRequest) -> Result<ReleaseResponse> {
        let mut state = self.state.lock().unwrap();
        Self::check_token(&state, token)?;
        state.release_counter += 1;
        let id = format!("rel_{:04}", state.release_counter);
        if let Some(app) = state.apps.get_mut(&request.app) {
            app.image = Some(request.image.clone());
        }
        state.releases.push(request.clone());
        Ok(ReleaseResponse {
            summary: format!(
                "Deployment queued: release {} via {} strategy",
                id, request.strategy
            ),
        })
    }

    fn create_cli_session(&self) -> Result<CliSession> {
        let state = self.state.lock().unwrap();
        match &state.session {
            Some(session) => Ok(CliSession {
                id: session.id.clone(),
                url: session.url.clone(),
            }),
            None => Err(Error::provider_api_error(
                "compute",
                400,
                "cli sessions unavailable",
            )),
        }
    }

    fn poll_cli_session(&self, session_id: &str) -> Result<Option<String>> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        match &mut state.session {
            Some(session) if session.id == session_id => {
                if session.polls_until_ready > 0 {
                    session.polls_until_ready -= 1;
                    Ok(None)
                } else {
                    let token = session.token.clone();
                    state.valid_tokens.insert(token.clone());
                    Ok(Some(token))
                }
            }
            _ => Err(Error::provider_api_error("compute", 404, "unknown session")),
        }
    }
}

// ---------------------------------------------------------------------------
// FakeEdge
// ---------------------------------------------------------------------------

#[derive(Default)]
struct EdgeState {
    valid_tokens: HashSet<String>,
    elevated_keys: HashSet<String>,
    zones: Vec<Zone>,
    records: HashMap<String, Vec<DnsRecord>>,
    accounts: Vec<Account>,
    buckets: Vec<Bucket>,
    permission_groups: Vec<PermissionGroup>,
    scoped_token_requests: Vec<ScopedTokenRequest>,
    token_counter: u32,
    record_counter: u32,
    dns_writes: u32,
    fail_zones: bool,
    fail_accounts: bool,
}

/// In-memory edge platform.
#[derive(Default)]
pub struct FakeEdge {
    state: Mutex<EdgeState>,
}

impl FakeEdge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(self, token: &str) -> Self {
        self.state.lock().unwrap().valid_tokens.insert(token.to_string());
        self
    }

    pub fn with_elevated_key(self, key: &str) -> Self {
        self.state.lock().unwrap().elevated_keys.insert(key.to_string());
        self
    }

    pub fn with_zone(self, id: &str, name: &str) -> Self {
        self.state.lock().unwrap().zones.push(Zone {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn with_account(self, id: &str, name: &str) -> Self {
        self.state.lock().unwrap().accounts.push(Account {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn with_bucket(self, name: &str) -> Self {
        self.state.lock().unwrap().buckets.push(Bucket {
            name: name.to_string(),
        });
        self
    }

    pub fn with_permission_group(self, id: &str, name: &str) -> Self {
        self.state.lock().unwrap().permission_groups.push(PermissionGroup {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn failing_zones(self) -> Self {
        self.state.lock().unwrap().fail_zones = true;
        self
    }

    pub fn failing_accounts(self) -> Self {
        self.state.lock().unwrap().fail_accounts = true;
        self
    }

    /// Total create + update calls against DNS records.
    pub fn dns_writes(&self) -> u32 {
        self.state.lock().unwrap().dns_writes
    }

    pub fn records_in_zone(&self, zone_id: &str) -> Vec<DnsRecord> {
        self.state
            .lock()
            .unwrap()
            .records
            .get(zone_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn scoped_token_requests(&self) -> Vec<ScopedTokenRequest> {
        self.state.lock().unwrap().scoped_token_requests.clone()
    }

    fn check_token(state: &EdgeState, token: &str) -> Result<()> {
        // Elevated keys are accepted on read endpoints, matching providers
        // that honour both credential shapes during bootstrap.
        if state.valid_tokens.contains(token) || state.elevated_keys.contains(token) {
            Ok(())
        } else {
            Err(unauthorized("edge"))
        }
    }
}

impl EdgeApi for FakeEdge {
    fn verify_token(&self, token: &str) -> Result<Identity> {
        let state = self.state.lock().unwrap();
        Self::check_token(&state, token)?;
        Ok(Identity {
            handle: "tester".to_string(),
            email: None,
        })
    }

    fn list_zones(&self, token: &str) -> Result<Vec<Zone>> {
        let state = self.state.lock().unwrap();
        Self::check_token(&state, token)?;
        if state.fail_zones {
            return Err(forbidden("edge", "zones"));
        }
        Ok(state.zones.clone())
    }

    fn find_zone(&self, token: &str, name: &str) -> Result<Option<Zone>> {
        Ok(self.list_zones(token)?.into_iter().find(|z| z.name == name))
    }

    fn list_dns_records(&self, token: &str, zone_id: &str, name: &str) -> Result<Vec<DnsRecord>> {
        let state = self.state.lock().unwrap();
        Self::check_token(&state, token)?;
        Ok(state
            .records
            .get(zone_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.name == name)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn create_dns_record(
        &self,
        token: &str,
        zone_id: &str,
        spec: &DnsRecordSpec,
    ) -> Result<DnsRecord> {
        let mut state = self.state.lock().unwrap();
        Self::check_token(&state, token)?;
        state.dns_writes += 1;
        state.record_counter += 1;
        let record = DnsRecord {
            id: format!("rec_{:04}", state.record_counter),
            name: spec.name.clone(),
            record_type: spec.record_type.clone(),
            content: spec.content.clone(),
            proxied: spec.proxied,
            ttl: spec.ttl,
        };
        state
            .records
            .entry(zone_id.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    fn update_dns_record(
        &self,
        token: &str,
        zone_id: &str,
        record_id: &str,
        spec: &DnsRecordSpec,
    ) -> Result<DnsRecord> {
        let mut state = self.state.lock().unwrap();
        Self::check_token(&state, token)?;
        state.dns_writes += 1;
        let records = state
            .records
            .get_mut(zone_id)
            .ok_or_else(|| Error::provider_api_error("edge", 404, "unknown zone"))?;
        let record = records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| Error::provider_api_error("edge", 404, "unknown record"))?;
        record.content = spec.content.clone();
        record.proxied = spec.proxied;
        record.ttl = spec.ttl;
        Ok(record.clone())
    }

    fn list_accounts(&self, token: &str) -> Result<Vec<Account>> {
        let state = self.state.lock().unwrap();
        Self::check_token(&state, token)?;
        if state.fail_accounts {
            return Err(forbidden("edge", "accounts"));
        }
        Ok(state.accounts.clone())
    }

    fn list_buckets(&self, token: &str, _account_id: &str) -> Result<Vec<Bucket>> {
        let state = self.state.lock().unwrap();
        Self::check_token(&state, token)?;
        if state.fail_accounts {
            return Err(forbidden("edge", "buckets"));
        }
        Ok(state.buckets.clone())
    }

    fn list_permission_groups(&self, elevated: &str) -> Result<Vec<PermissionGroup>> {
        let state = self.state.lock().unwrap();
        if !state.elevated_keys.contains(elevated) {
            return Err(forbidden("edge", "permission groups"));
        }
        Ok(state.permission_groups.clone())
    }

    fn create_scoped_token(&self, elevated: &str, request: &ScopedTokenRequest) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if !state.elevated_keys.contains(elevated) {
            return Err(forbidden("edge", "token create"));
        }
        state.token_counter += 1;
        let token = format!("edge_scoped_{:04}", state.token_counter);
        state.valid_tokens.insert(token.clone());
        state.scoped_token_requests.push(request.clone());
        Ok(token)
    }
}

// ---------------------------------------------------------------------------
// FakeBuilder
// ---------------------------------------------------------------------------

#[derive(Default)]
struct BuilderState {
    requests: Vec<(String, Vec<String>)>,
    fail: bool,
}

/// Records build requests and fabricates published image references.
#[derive(Default)]
pub struct FakeBuilder {
    state: Mutex<BuilderState>,
}

impl FakeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(self) -> Self {
        self.state.lock().unwrap().fail = true;
        self
    }

    pub fn build_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }
}

impl ImageBuilder for FakeBuilder {
    fn build(&self, request: &BuildRequest) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        if state.fail {
            return Err(Error::deploy_build_failed("builder exited with status 1"));
        }
        state
            .requests
            .push((request.repository.clone(), request.tags.clone()));
        Ok(request
            .tags
            .iter()
            .map(|tag| format!("{}:{}", request.repository, tag))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// ScriptedPrompter
// ---------------------------------------------------------------------------

/// Prompter that replays queued secret responses and records notifications.
#[derive(Default)]
pub struct ScriptedPrompter {
    responses: Mutex<VecDeque<Result<String>>>,
    notified: Mutex<Vec<PromptMessage>>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(self, value: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(value.to_string()));
        self
    }

    pub fn with_error(self, err: Error) -> Self {
        self.responses.lock().unwrap().push_back(Err(err));
        self
    }

    /// A prompter double that always fails its secret requests.
    pub fn always_failing() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<PromptMessage> {
        self.notified.lock().unwrap().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn notify(&self, msg: &PromptMessage) {
        self.notified.lock().unwrap().push(msg.clone());
    }

    fn prompt_secret(&self, _msg: &PromptMessage, _deadline: Deadline) -> Result<String> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::auth_prompt_failed("no scripted response available")))
    }
}
