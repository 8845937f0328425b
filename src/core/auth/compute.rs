//! Compute provider auth strategy.
//!
//! Acquisition is browser-mediated when the provider can hand out a CLI
//! session: the login URL is surfaced through the prompt bridge and the
//! session is polled at a fixed interval until it resolves into a token.
//! When sessions are unavailable the strategy falls back to a pasted token.

use super::{AcquiredToken, AuthContext, AuthStrategy};
use crate::error::{Error, Result};
use crate::prompt::PromptMessage;
use crate::providers::{compute::TOKEN_DASHBOARD_URL, ComputeApi, Identity, Organization, Provider};
use crate::settings::{self, ComputeSettings};
use std::time::{Duration, Instant};

pub struct ComputeAuth<'a> {
    api: &'a dyn ComputeApi,
    poll_interval: Duration,
    /// Independent of the workflow deadline.
    browser_timeout: Duration,
}

impl<'a> ComputeAuth<'a> {
    pub fn new(api: &'a dyn ComputeApi) -> Self {
        Self {
            api,
            poll_interval: Duration::from_secs(1),
            browser_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timing(api: &'a dyn ComputeApi, poll_interval: Duration, browser_timeout: Duration) -> Self {
        Self {
            api,
            poll_interval,
            browser_timeout,
        }
    }

    fn acquire_via_browser(&self, ctx: &AuthContext, session_id: &str, url: &str) -> Result<AcquiredToken> {
        ctx.prompter.notify(&PromptMessage::link(
            Provider::Compute,
            "Open this URL in your browser to sign in",
            url,
        ));

        let started = Instant::now();
        loop {
            if started.elapsed() >= self.browser_timeout {
                return Err(Error::auth_browser_timeout(
                    "compute",
                    self.browser_timeout.as_secs(),
                ));
            }
            // A pending session is "not yet", never an error.
            if let Some(token) = self.api.poll_cli_session(session_id)? {
                return Ok(AcquiredToken {
                    secret: token,
                    provenance: "browser",
                });
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    fn acquire_via_paste(&self, ctx: &AuthContext) -> Result<AcquiredToken> {
        ctx.prompter.notify(&PromptMessage::link(
            Provider::Compute,
            "Create a personal access token and paste it below",
            TOKEN_DASHBOARD_URL,
        ));
        let secret = ctx.prompter.prompt_secret(
            &PromptMessage::token(Provider::Compute, "Compute access token"),
            ctx.deadline,
        )?;
        Ok(AcquiredToken {
            secret,
            provenance: "manual",
        })
    }
}

impl AuthStrategy for ComputeAuth<'_> {
    fn provider(&self) -> Provider {
        Provider::Compute
    }

    fn verify(&self, token: &str) -> Result<Identity> {
        self.api.verify_token(token)
    }

    fn acquire(&self, ctx: &AuthContext) -> Result<AcquiredToken> {
        match self.api.create_cli_session() {
            Ok(session) => self.acquire_via_browser(ctx, &session.id, &session.url),
            Err(_) => self.acquire_via_paste(ctx),
        }
    }

    fn probe_permissions(&self, token: &str) -> Result<Vec<String>> {
        // Organization access backs app resolution and release creation;
        // without it the workflow cannot proceed.
        self.api
            .list_organizations(token)
            .map_err(|e| Error::auth_permission_missing("compute", format!("organizations ({})", e)))?;

        let mut warnings = Vec::new();
        if let Err(e) = self.api.list_regions(token) {
            warnings.push(format!("region listing unavailable: {}", e));
        }
        Ok(warnings)
    }

    fn configure_preferences(&self, token: &str, ctx: &AuthContext) -> Result<()> {
        let organizations = self.api.list_organizations(token)?;
        let cached = settings::load_compute(ctx.store, ctx.user)?;

        let organization = resolve_organization(
            &organizations,
            ctx.overrides.organization.as_deref(),
            cached.as_ref().map(|c| c.organization.as_str()),
        )?;

        let regions = self.api.list_regions(token).unwrap_or_default();
        let region = resolve_region(
            &regions,
            ctx.overrides.region.as_deref(),
            cached.as_ref().map(|c| c.region.as_str()),
        )?;

        let next = ComputeSettings::new(&organization, &region);
        let unchanged = cached
            .as_ref()
            .is_some_and(|current| current.same_preferences(&next));
        if !unchanged {
            settings::save_compute(ctx.store, ctx.user, &next)?;
        }
        Ok(())
    }
}

/// explicit override > cached-if-still-valid > sole available option.
/// Several options with no way to choose is a configuration error.
pub fn resolve_organization(
    organizations: &[Organization],
    explicit: Option<&str>,
    cached: Option<&str>,
) -> Result<String> {
    if let Some(slug) = explicit {
        let slug = slug.trim();
        if organizations.iter().any(|o| o.slug == slug) {
            return Ok(slug.to_string());
        }
        return Err(Error::config_invalid_value(
            "organization",
            Some(slug.to_string()),
            "not a member of this organization",
        ));
    }

    if let Some(slug) = cached {
        if organizations.iter().any(|o| o.slug == slug) {
            return Ok(slug.to_string());
        }
    }

    match organizations {
        [] => Err(Error::config_missing_key("organization")),
        [only] => Ok(only.slug.clone()),
        many => Err(Error::config_invalid_value(
            "organization",
            None,
            format!(
                "several organizations available, pass one explicitly: {}",
                many.iter()
                    .map(|o| o.slug.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        )),
    }
}

fn resolve_region(
    regions: &[crate::providers::Region],
    explicit: Option<&str>,
    cached: Option<&str>,
) -> Result<String> {
    if let Some(code) = explicit {
        return Ok(code.trim().to_string());
    }
    if let Some(code) = cached {
        if regions.is_empty() || regions.iter().any(|r| r.code == code) {
            return Ok(code.to_string());
        }
    }
    regions
        .first()
        .map(|r| r.code.clone())
        .ok_or_else(|| Error::config_missing_key("region"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ensure_token, AuthOverrides};
    use crate::deadline::Deadline;
    use crate::providers::fakes::{FakeCompute, ScriptedPrompter};
    use crate::secrets::{self, MemorySecretStore, SecretStore};

    fn ctx<'a>(
        store: &'a MemorySecretStore,
        prompter: &'a ScriptedPrompter,
        overrides: AuthOverrides,
    ) -> AuthContext<'a> {
        AuthContext {
            store,
            user: "u",
            prompter,
            deadline: Deadline::none(),
            overrides,
            auto_accept_warnings: true,
        }
    }

    fn fast(api: &dyn ComputeApi) -> ComputeAuth<'_> {
        ComputeAuth::with_timing(
            api,
            Duration::from_millis(1),
            Duration::from_millis(250),
        )
    }

    #[test]
    fn valid_cached_token_short_circuits_without_interaction() {
        let api = FakeCompute::new()
            .with_token("ct_cached")
            .with_organization("acme")
            .with_region("syd");
        let store = MemorySecretStore::new();
        secrets::save_token(&store, "u", Provider::Compute, "ct_cached", None).unwrap();
        let prompter = ScriptedPrompter::new();

        let token = ensure_token(&fast(&api), &ctx(&store, &prompter, AuthOverrides::default())).unwrap();
        assert_eq!(token, "ct_cached");
        assert!(prompter.notifications().is_empty());

        let settings = crate::settings::load_compute(&store, "u").unwrap().unwrap();
        assert_eq!(settings.organization, "acme");
        assert_eq!(settings.region, "syd");
    }

    #[test]
    fn browser_session_resolves_after_pending_polls() {
        let api = FakeCompute::new()
            .with_organization("acme")
            .with_region("syd")
            .with_browser_session("sess_1", "https://auth.example/sess_1", "ct_fresh", 3);
        let store = MemorySecretStore::new();
        let prompter = ScriptedPrompter::new();

        let token = ensure_token(&fast(&api), &ctx(&store, &prompter, AuthOverrides::default())).unwrap();
        assert_eq!(token, "ct_fresh");
        // The login URL reached the human.
        assert!(prompter
            .notifications()
            .iter()
            .any(|m| m.url.as_deref() == Some("https://auth.example/sess_1")));
        // And the token was persisted with browser provenance.
        assert_eq!(
            store.get("u", "compute.token.browser").unwrap().as_deref(),
            Some("ct_fresh")
        );
    }

    #[test]
    fn browser_timeout_is_fatal() {
        let api = FakeCompute::new().with_browser_session(
            "sess_1",
            "https://auth.example/sess_1",
            "ct_fresh",
            10_000,
        );
        let store = MemorySecretStore::new();
        let prompter = ScriptedPrompter::new();

        let err = ensure_token(&fast(&api), &ctx(&store, &prompter, AuthOverrides::default()))
            .unwrap_err();
        assert_eq!(err.code.as_str(), "auth.browser_timeout");
    }

    #[test]
    fn invalid_cached_token_falls_through_and_prompt_error_propagates() {
        let api = FakeCompute::new().with_organization("acme");
        let store = MemorySecretStore::new();
        secrets::save_token(&store, "u", Provider::Compute, "ct_stale", None).unwrap();
        let prompter = ScriptedPrompter::always_failing();

        let err = ensure_token(&fast(&api), &ctx(&store, &prompter, AuthOverrides::default()))
            .unwrap_err();
        assert!(err.is_credential_error());
        // The stale token is still in place; nothing new was persisted.
        assert_eq!(
            secrets::load_token(&store, "u", Provider::Compute)
                .unwrap()
                .as_deref(),
            Some("ct_stale")
        );
    }

    #[test]
    fn blank_pasted_token_fails_verification_not_cancellation() {
        let api = FakeCompute::new().with_organization("acme");
        let store = MemorySecretStore::new();
        let prompter = ScriptedPrompter::new().with_secret("");

        let err = ensure_token(&fast(&api), &ctx(&store, &prompter, AuthOverrides::default()))
            .unwrap_err();
        assert_eq!(err.code.as_str(), "auth.token_invalid");
    }

    #[test]
    fn mandatory_capability_failure_persists_nothing() {
        let api = FakeCompute::new()
            .with_organization("acme")
            .failing_organizations();
        let store = MemorySecretStore::new();
        let prompter = ScriptedPrompter::new().with_secret("ct_pasted");
        // Pasted token must verify before probing.
        let api = api.with_token("ct_pasted");

        let err = ensure_token(&fast(&api), &ctx(&store, &prompter, AuthOverrides::default()))
            .unwrap_err();
        assert_eq!(err.code.as_str(), "auth.permission_missing");
        assert_eq!(secrets::load_token(&store, "u", Provider::Compute).unwrap(), None);
    }

    #[test]
    fn optional_capability_failure_is_a_warning() {
        let api = FakeCompute::new()
            .with_token("ct_ok")
            .with_organization("acme")
            .failing_regions();
        let store = MemorySecretStore::new();
        let prompter = ScriptedPrompter::new().with_secret("ct_ok");

        let mut overrides = AuthOverrides::default();
        overrides.region = Some("syd".to_string());
        let token = ensure_token(&fast(&api), &ctx(&store, &prompter, overrides)).unwrap();
        assert_eq!(token, "ct_ok");
        assert!(prompter
            .notifications()
            .iter()
            .any(|m| m.message.contains("warning")));
    }

    #[test]
    fn ambiguous_organization_without_override_is_config_error() {
        let orgs = vec![
            Organization {
                slug: "acme".to_string(),
                name: "Acme".to_string(),
            },
            Organization {
                slug: "globex".to_string(),
                name: "Globex".to_string(),
            },
        ];
        let err = resolve_organization(&orgs, None, None).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");

        assert_eq!(resolve_organization(&orgs, Some("globex"), None).unwrap(), "globex");
        assert_eq!(resolve_organization(&orgs, None, Some("acme")).unwrap(), "acme");
    }
}
