//! Edge provider auth strategy.
//!
//! Default acquisition is a pasted scoped token. The privileged bootstrap
//! accepts a one-time elevated credential, selects the minimal permission
//! groups out of the provider's catalog, mints a narrowly-scoped token
//! against the resolved account/zone, and persists only the new token. The
//! elevated credential never touches storage.

use super::{
    select_permission_groups, AcquiredToken, AuthContext, AuthStrategy, PermissionSelection,
};
use crate::error::{Error, Result};
use crate::prompt::PromptMessage;
use crate::providers::{edge::TOKEN_DASHBOARD_URL, EdgeApi, Identity, Provider, ScopedTokenRequest};
use crate::settings::{self, EdgeSettings};

/// Group names required on a bootstrap token. Matching is case-insensitive
/// exact first, substring second.
const MANDATORY_GROUPS: &[&str] = &["Zone Read", "DNS Write"];
const OPTIONAL_GROUPS: &[&str] = &["Object Storage Read", "Cache Purge"];

pub struct EdgeAuth<'a> {
    api: &'a dyn EdgeApi,
}

impl<'a> EdgeAuth<'a> {
    pub fn new(api: &'a dyn EdgeApi) -> Self {
        Self { api }
    }

    fn acquire_via_paste(&self, ctx: &AuthContext) -> Result<AcquiredToken> {
        ctx.prompter.notify(
            &PromptMessage::link(
                Provider::Edge,
                "Create an API token with zone read and DNS write access, then paste it below",
                TOKEN_DASHBOARD_URL,
            )
            .with_scopes(MANDATORY_GROUPS.iter().map(|s| s.to_string()).collect()),
        );
        let secret = ctx.prompter.prompt_secret(
            &PromptMessage::token(Provider::Edge, "Edge API token"),
            ctx.deadline,
        )?;
        Ok(AcquiredToken {
            secret,
            provenance: "manual",
        })
    }

    fn acquire_via_bootstrap(&self, ctx: &AuthContext) -> Result<AcquiredToken> {
        ctx.prompter.notify(&PromptMessage::info(
            Provider::Edge,
            "Bootstrap: a scoped token will be created from an elevated credential. \
             The elevated credential is used once and never stored.",
        ));
        let elevated = ctx.prompter.prompt_secret(
            &PromptMessage::token(Provider::Edge, "Elevated credential (one-time use)"),
            ctx.deadline,
        )?;
        if elevated.trim().is_empty() {
            return Err(Error::auth_token_invalid("edge", "empty elevated credential"));
        }

        let catalog = self.api.list_permission_groups(&elevated)?;
        let selection: PermissionSelection =
            select_permission_groups(&catalog, MANDATORY_GROUPS, OPTIONAL_GROUPS)?;

        let account_id = self
            .api
            .list_accounts(&elevated)?
            .into_iter()
            .next()
            .map(|a| a.id);

        let cached = settings::load_edge(ctx.store, ctx.user)?;
        let zone_name = ctx
            .overrides
            .zone
            .clone()
            .or_else(|| cached.and_then(|c| c.zone));
        let zone_id = match &zone_name {
            Some(name) => Some(
                self.api
                    .find_zone(&elevated, name)?
                    .ok_or_else(|| Error::dns_zone_not_found(name.clone()))?
                    .id,
            ),
            None => None,
        };

        let token = self.api.create_scoped_token(
            &elevated,
            &ScopedTokenRequest {
                name: "airlift-cli".to_string(),
                group_ids: selection.group_ids(),
                account_id,
                zone_id,
            },
        )?;

        self.api
            .verify_token(&token)
            .map_err(|e| Error::auth_token_invalid("edge", e.message))?;

        Ok(AcquiredToken {
            secret: token,
            provenance: "bootstrap",
        })
    }
}

impl AuthStrategy for EdgeAuth<'_> {
    fn provider(&self) -> Provider {
        Provider::Edge
    }

    fn verify(&self, token: &str) -> Result<Identity> {
        self.api.verify_token(token)
    }

    fn acquire(&self, ctx: &AuthContext) -> Result<AcquiredToken> {
        if ctx.overrides.edge_bootstrap {
            self.acquire_via_bootstrap(ctx)
        } else {
            self.acquire_via_paste(ctx)
        }
    }

    fn probe_permissions(&self, token: &str) -> Result<Vec<String>> {
        // Zone access carries DNS reconciliation; nothing works without it.
        self.api
            .list_zones(token)
            .map_err(|e| Error::auth_permission_missing("edge", format!("zones ({})", e)))?;

        let mut warnings = Vec::new();
        match self.api.list_accounts(token) {
            Ok(accounts) => {
                if let Some(account) = accounts.first() {
                    if let Err(e) = self.api.list_buckets(token, &account.id) {
                        warnings.push(format!("bucket listing unavailable: {}", e));
                    }
                }
            }
            Err(e) => warnings.push(format!("account lookup unavailable: {}", e)),
        }
        Ok(warnings)
    }

    fn configure_preferences(&self, token: &str, ctx: &AuthContext) -> Result<()> {
        let zones = self.api.list_zones(token)?;
        let cached = settings::load_edge(ctx.store, ctx.user)?;

        let zone_name = ctx
            .overrides
            .zone
            .as_deref()
            .map(|z| z.trim().to_string())
            .or_else(|| {
                cached
                    .as_ref()
                    .and_then(|c| c.zone.clone())
                    .filter(|name| zones.iter().any(|z| &z.name == name))
            })
            .or_else(|| zones.first().map(|z| z.name.clone()));

        // An override zone the credential cannot see keeps a bare name here;
        // DNS reconciliation resolves (and reports) it.
        let zone_id = zone_name
            .as_deref()
            .and_then(|name| zones.iter().find(|z| z.name == name))
            .map(|z| z.id.clone());

        let accounts = self.api.list_accounts(token).unwrap_or_default();
        let account_id = cached
            .as_ref()
            .and_then(|c| c.account_id.clone())
            .filter(|id| accounts.iter().any(|a| &a.id == id))
            .or_else(|| accounts.first().map(|a| a.id.clone()));

        let bucket = account_id
            .as_deref()
            .and_then(|id| self.api.list_buckets(token, id).ok())
            .and_then(|buckets| buckets.into_iter().next().map(|b| b.name));

        let next = EdgeSettings {
            zone: zone_name,
            zone_id,
            account_id,
            bucket: bucket.or_else(|| cached.as_ref().and_then(|c| c.bucket.clone())),
            hostname: cached.as_ref().and_then(|c| c.hostname.clone()),
            updated_at: chrono::Utc::now(),
        }
        .normalized();

        let unchanged = cached
            .as_ref()
            .is_some_and(|current| current.same_preferences(&next));
        if !unchanged {
            settings::save_edge(ctx.store, ctx.user, &next)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ensure_token, AuthOverrides};
    use crate::deadline::Deadline;
    use crate::providers::fakes::{FakeEdge, ScriptedPrompter};
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

    fn provisioned_edge() -> FakeEdge {
        FakeEdge::new()
            .with_elevated_key("elevated_key")
            .with_zone("z1", "example.com")
            .with_account("acc1", "Acme")
            .with_bucket("assets")
            .with_permission_group("g1", "Zone Read")
            .with_permission_group("g2", "Zone DNS Write")
            .with_permission_group("g3", "Object Storage Read")
    }

    #[test]
    fn manual_paste_persists_token_and_zone_settings() {
        let api = FakeEdge::new()
            .with_token("et_pasted")
            .with_zone("z1", "example.com")
            .with_account("acc1", "Acme");
        let store = MemorySecretStore::new();
        let prompter = ScriptedPrompter::new().with_secret("et_pasted");

        let token =
            ensure_token(&EdgeAuth::new(&api), &ctx(&store, &prompter, AuthOverrides::default()))
                .unwrap();
        assert_eq!(token, "et_pasted");

        let settings = crate::settings::load_edge(&store, "u").unwrap().unwrap();
        assert_eq!(settings.zone.as_deref(), Some("example.com"));
        assert_eq!(settings.zone_id.as_deref(), Some("z1"));
        assert_eq!(settings.account_id.as_deref(), Some("acc1"));
    }

    #[test]
    fn bootstrap_persists_only_the_scoped_token() {
        let api = provisioned_edge();
        let store = MemorySecretStore::new();
        let prompter = ScriptedPrompter::new().with_secret("elevated_key");

        let overrides = AuthOverrides {
            edge_bootstrap: true,
            ..Default::default()
        };
        let token = ensure_token(&EdgeAuth::new(&api), &ctx(&store, &prompter, overrides)).unwrap();
        assert!(token.starts_with("edge_scoped_"));

        // The scoped token was created against the resolved account with the
        // matched groups.
        let requests = api.scoped_token_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].account_id.as_deref(), Some("acc1"));
        assert_eq!(requests[0].group_ids, vec!["g1", "g2", "g3"]);

        // Only the scoped token is stored; the elevated key is nowhere.
        assert_eq!(
            secrets::load_token(&store, "u", Provider::Edge).unwrap().as_deref(),
            Some(token.as_str())
        );
        assert_eq!(
            store.get("u", "edge.token.bootstrap").unwrap().as_deref(),
            Some(token.as_str())
        );
        for key in ["edge.token", "edge.token.bootstrap", "edge.token.manual", "edge.settings"] {
            if let Some(value) = store.get("u", key).unwrap() {
                assert!(!value.contains("elevated_key"), "{} leaked the elevated credential", key);
            }
        }
    }

    #[test]
    fn bootstrap_with_missing_mandatory_group_fails() {
        let api = FakeEdge::new()
            .with_elevated_key("elevated_key")
            .with_account("acc1", "Acme")
            .with_permission_group("g1", "Zone Read");
        let store = MemorySecretStore::new();
        let prompter = ScriptedPrompter::new().with_secret("elevated_key");

        let overrides = AuthOverrides {
            edge_bootstrap: true,
            ..Default::default()
        };
        let err =
            ensure_token(&EdgeAuth::new(&api), &ctx(&store, &prompter, overrides)).unwrap_err();
        assert_eq!(err.code.as_str(), "auth.permission_missing");
        assert_eq!(secrets::load_token(&store, "u", Provider::Edge).unwrap(), None);
    }

    #[test]
    fn mandatory_zone_capability_failure_is_fatal() {
        let api = FakeEdge::new().with_token("et_ok").failing_zones();
        let store = MemorySecretStore::new();
        let prompter = ScriptedPrompter::new().with_secret("et_ok");

        let err = ensure_token(
            &EdgeAuth::new(&api),
            &ctx(&store, &prompter, AuthOverrides::default()),
        )
        .unwrap_err();
        assert_eq!(err.code.as_str(), "auth.permission_missing");
        assert_eq!(secrets::load_token(&store, "u", Provider::Edge).unwrap(), None);
    }

    #[test]
    fn optional_account_failure_warns_but_succeeds() {
        let api = FakeEdge::new()
            .with_token("et_ok")
            .with_zone("z1", "example.com")
            .failing_accounts();
        let store = MemorySecretStore::new();
        let prompter = ScriptedPrompter::new().with_secret("et_ok");

        let token = ensure_token(
            &EdgeAuth::new(&api),
            &ctx(&store, &prompter, AuthOverrides::default()),
        )
        .unwrap();
        assert_eq!(token, "et_ok");
        assert!(prompter
            .notifications()
            .iter()
            .any(|m| m.message.contains("warning")));
    }

    #[test]
    fn declined_warning_is_a_credential_error() {
        let api = FakeEdge::new()
            .with_token("et_ok")
            .with_zone("z1", "example.com")
            .failing_accounts();
        let store = MemorySecretStore::new();
        // First response: the pasted token; second: "n" to the confirm prompt.
        let prompter = ScriptedPrompter::new().with_secret("et_ok").with_secret("n");

        let mut context = ctx(&store, &prompter, AuthOverrides::default());
        context.auto_accept_warnings = false;
        let err = ensure_token(&EdgeAuth::new(&api), &context).unwrap_err();
        assert_eq!(err.code.as_str(), "auth.permission_declined");
        assert_eq!(secrets::load_token(&store, "u", Provider::Edge).unwrap(), None);
    }
}
