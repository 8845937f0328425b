//! Provider authentication.
//!
//! One generic per-run state machine shared by both providers:
//!
//! `CheckCache → {valid: ConfigurePreferences → Done;
//!  invalid/missing: Acquire → Verify → ProbePermissions →
//!  ConfigurePreferences → Persist → Done}`
//!
//! The providers differ only in acquisition mechanics and preference shape,
//! expressed as `AuthStrategy` implementations.

pub mod compute;
pub mod edge;

pub use compute::ComputeAuth;
pub use edge::EdgeAuth;

use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::prompt::{PromptMessage, Prompter};
use crate::providers::{Identity, PermissionGroup, Provider};
use crate::secrets::{load_token, save_token, SecretStore};

/// Everything an auth flow needs from its caller.
pub struct AuthContext<'a> {
    pub store: &'a dyn SecretStore,
    pub user: &'a str,
    pub prompter: &'a dyn Prompter,
    pub deadline: Deadline,
    pub overrides: AuthOverrides,
    /// Accept optional-capability warnings without asking.
    pub auto_accept_warnings: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AuthOverrides {
    pub organization: Option<String>,
    pub region: Option<String>,
    pub zone: Option<String>,
    /// Credential supplied out of band (e.g. `--token`); treated as a manual
    /// acquisition.
    pub token: Option<String>,
    /// Run the Edge privileged bootstrap instead of manual token entry.
    pub edge_bootstrap: bool,
}

/// A freshly acquired credential plus how it was obtained.
pub struct AcquiredToken {
    pub secret: String,
    pub provenance: &'static str,
}

/// Provider-specific half of the auth machine.
pub trait AuthStrategy {
    fn provider(&self) -> Provider;

    /// Lightweight identity/verify endpoint; failure means invalid/expired.
    fn verify(&self, token: &str) -> Result<Identity>;

    /// Interactive or privileged acquisition of a new credential.
    fn acquire(&self, ctx: &AuthContext) -> Result<AcquiredToken>;

    /// Exercise every capability the workflow needs. Returns warnings for
    /// failed optional capabilities; errors when the mandatory capability is
    /// unavailable.
    fn probe_permissions(&self, token: &str) -> Result<Vec<String>>;

    /// Resolve and persist org/region or zone/account preferences.
    fn configure_preferences(&self, token: &str, ctx: &AuthContext) -> Result<()>;
}

/// Idempotent entry point: a valid cached credential short-circuits with no
/// interaction; anything else walks the full acquisition path.
pub fn ensure_token(strategy: &dyn AuthStrategy, ctx: &AuthContext) -> Result<String> {
    let provider = strategy.provider();

    if let Some(cached) = load_token(ctx.store, ctx.user, provider)? {
        if strategy.verify(&cached).is_ok() {
            strategy.configure_preferences(&cached, ctx)?;
            return Ok(cached);
        }
        crate::log_status!("auth", "Cached {} token failed verification, reauthenticating", provider);
    }

    let acquired = match &ctx.overrides.token {
        Some(token) => AcquiredToken {
            secret: token.clone(),
            provenance: "manual",
        },
        None => strategy.acquire(ctx)?,
    };

    strategy
        .verify(&acquired.secret)
        .map_err(|e| Error::auth_token_invalid(provider.as_str(), e.message))?;

    let warnings = strategy.probe_permissions(&acquired.secret)?;
    if !warnings.is_empty() {
        confirm_warnings(provider, &warnings, ctx)?;
    }

    strategy.configure_preferences(&acquired.secret, ctx)?;
    save_token(
        ctx.store,
        ctx.user,
        provider,
        &acquired.secret,
        Some(acquired.provenance),
    )?;

    Ok(acquired.secret)
}

fn confirm_warnings(provider: Provider, warnings: &[String], ctx: &AuthContext) -> Result<()> {
    for warning in warnings {
        ctx.prompter
            .notify(&PromptMessage::info(provider, format!("warning: {}", warning)));
    }
    if ctx.auto_accept_warnings {
        return Ok(());
    }

    let mut msg = PromptMessage::info(
        provider,
        "Some optional capabilities are unavailable. Continue anyway? [Y/n]",
    );
    msg.requires_response = true;
    if ctx.prompter.confirm(&msg, ctx.deadline)? {
        Ok(())
    } else {
        Err(Error::auth_permission_declined(warnings.to_vec()))
    }
}

// ============================================================================
// Permission-group selection (Edge privileged bootstrap)
// ============================================================================

/// Groups picked out of a provider's permission catalog. All mandatory groups
/// must resolve; optional groups are included best-effort.
#[derive(Debug, Clone)]
pub struct PermissionSelection {
    pub mandatory: Vec<PermissionGroup>,
    pub optional: Vec<PermissionGroup>,
}

impl PermissionSelection {
    pub fn group_ids(&self) -> Vec<String> {
        self.mandatory
            .iter()
            .chain(self.optional.iter())
            .map(|g| g.id.clone())
            .collect()
    }
}

/// Case-insensitive exact match first, then substring. The substring
/// fallback is a known limitation: it is brittle against upstream renames.
fn find_group(catalog: &[PermissionGroup], name: &str) -> Option<PermissionGroup> {
    let needle = name.to_lowercase();
    catalog
        .iter()
        .find(|g| g.name.eq_ignore_ascii_case(name))
        .or_else(|| catalog.iter().find(|g| g.name.to_lowercase().contains(&needle)))
        .cloned()
}

pub fn select_permission_groups(
    catalog: &[PermissionGroup],
    mandatory_names: &[&str],
    optional_names: &[&str],
) -> Result<PermissionSelection> {
    let mut mandatory = Vec::new();
    for name in mandatory_names {
        match find_group(catalog, name) {
            Some(group) => mandatory.push(group),
            None => return Err(Error::auth_permission_missing("edge", *name)),
        }
    }

    let optional = optional_names
        .iter()
        .filter_map(|name| find_group(catalog, name))
        .collect();

    Ok(PermissionSelection { mandatory, optional })
}
