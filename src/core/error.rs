use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingKey,
    ConfigInvalidJson,
    ConfigInvalidValue,

    ValidationMissingArgument,
    ValidationInvalidArgument,
    ValidationInvalidJson,

    ProfileNotFound,
    ProfileNoActive,

    AuthTokenMissing,
    AuthTokenInvalid,
    AuthBrowserTimeout,
    AuthPromptFailed,
    AuthPromptCancelled,
    AuthPermissionMissing,
    AuthPermissionDeclined,

    ProviderRequestFailed,
    ProviderApiError,

    DeployBuildFailed,
    DeployReleaseFailed,
    DeployAppCreateTimeout,
    DeployTimeout,

    DnsZoneNotFound,
    DnsRecordFailed,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",
            ErrorCode::ValidationInvalidJson => "validation.invalid_json",

            ErrorCode::ProfileNotFound => "profile.not_found",
            ErrorCode::ProfileNoActive => "profile.no_active",

            ErrorCode::AuthTokenMissing => "auth.token_missing",
            ErrorCode::AuthTokenInvalid => "auth.token_invalid",
            ErrorCode::AuthBrowserTimeout => "auth.browser_timeout",
            ErrorCode::AuthPromptFailed => "auth.prompt_failed",
            ErrorCode::AuthPromptCancelled => "auth.prompt_cancelled",
            ErrorCode::AuthPermissionMissing => "auth.permission_missing",
            ErrorCode::AuthPermissionDeclined => "auth.permission_declined",

            ErrorCode::ProviderRequestFailed => "provider.request_failed",
            ErrorCode::ProviderApiError => "provider.api_error",

            ErrorCode::DeployBuildFailed => "deploy.build_failed",
            ErrorCode::DeployReleaseFailed => "deploy.release_failed",
            ErrorCode::DeployAppCreateTimeout => "deploy.app_create_timeout",
            ErrorCode::DeployTimeout => "deploy.timeout",

            ErrorCode::DnsZoneNotFound => "dns.zone_not_found",
            ErrorCode::DnsRecordFailed => "dns.record_failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingArgumentDetails {
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundDetails {
    pub id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorDetails {
    pub provider: String,
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        let details = serde_json::to_value(MissingArgumentDetails { args })
            .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::new(
            ErrorCode::ValidationMissingArgument,
            "Missing required argument",
            details,
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let details = serde_json::to_value(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.into(),
            id,
            tried,
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            details,
        )
    }

    pub fn validation_invalid_json(err: serde_json::Error, context: Option<String>) -> Self {
        let details = serde_json::json!({
            "error": err.to_string(),
            "context": context,
        });

        Self::new(ErrorCode::ValidationInvalidJson, "Invalid JSON", details)
    }

    pub fn profile_not_found(id: impl Into<String>) -> Self {
        let details = serde_json::to_value(NotFoundDetails { id: id.into() })
            .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::new(ErrorCode::ProfileNotFound, "Profile not found", details)
            .with_hint("Run 'airlift profile list' to see available profiles")
    }

    pub fn profile_no_active() -> Self {
        Self::new(
            ErrorCode::ProfileNoActive,
            "No active profile set",
            Value::Object(serde_json::Map::new()),
        )
        .with_hint("Run 'airlift profile use <id>' to select a profile")
    }

    pub fn config_missing_key(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::new(
            ErrorCode::ConfigMissingKey,
            "Missing required configuration key",
            serde_json::json!({ "key": key }),
        )
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidJson,
            "Invalid JSON in configuration",
            serde_json::json!({ "path": path.into(), "error": err.to_string() }),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            serde_json::json!({ "key": key.into(), "value": value, "problem": problem.into() }),
        )
    }

    pub fn auth_token_missing(provider: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::AuthTokenMissing,
            "No credential available",
            serde_json::json!({ "provider": provider.into() }),
        )
    }

    pub fn auth_token_invalid(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::AuthTokenInvalid,
            "Credential failed verification",
            serde_json::json!({ "provider": provider.into(), "reason": reason.into() }),
        )
    }

    pub fn auth_browser_timeout(provider: impl Into<String>, waited_secs: u64) -> Self {
        Self::new(
            ErrorCode::AuthBrowserTimeout,
            "Browser authentication timed out",
            serde_json::json!({ "provider": provider.into(), "waitedSecs": waited_secs }),
        )
        .with_hint("Re-run the command and complete the login in your browser")
    }

    pub fn auth_prompt_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::AuthPromptFailed,
            "Interactive prompt failed",
            serde_json::json!({ "reason": reason.into() }),
        )
    }

    pub fn auth_prompt_cancelled(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::AuthPromptCancelled,
            "Interactive prompt cancelled",
            serde_json::json!({ "reason": reason.into() }),
        )
    }

    pub fn auth_permission_missing(provider: impl Into<String>, capability: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::AuthPermissionMissing,
            "Credential is missing a required capability",
            serde_json::json!({ "provider": provider.into(), "capability": capability.into() }),
        )
    }

    pub fn auth_permission_declined(warnings: Vec<String>) -> Self {
        Self::new(
            ErrorCode::AuthPermissionDeclined,
            "Continuing without optional capabilities was declined",
            serde_json::json!({ "warnings": warnings }),
        )
    }

    pub fn provider_request_failed(provider: impl Into<String>, err: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ProviderRequestFailed,
            "Provider request failed",
            serde_json::json!({ "provider": provider.into(), "error": err.into() }),
        )
    }

    pub fn provider_api_error(provider: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        let details = serde_json::to_value(ApiErrorDetails {
            provider: provider.into(),
            status,
            body: body.into(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::new(
            ErrorCode::ProviderApiError,
            format!("Provider API error: HTTP {}", status),
            details,
        )
    }

    pub fn deploy_build_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::DeployBuildFailed,
            "Container build failed",
            serde_json::json!({ "reason": reason.into() }),
        )
    }

    pub fn deploy_release_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::DeployReleaseFailed,
            "Release creation failed",
            serde_json::json!({ "reason": reason.into() }),
        )
    }

    pub fn deploy_app_create_timeout(app: impl Into<String>, attempts: u32) -> Self {
        Self::new(
            ErrorCode::DeployAppCreateTimeout,
            "Created app did not become visible in time",
            serde_json::json!({ "app": app.into(), "attempts": attempts }),
        )
    }

    pub fn deploy_timeout(what: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::DeployTimeout,
            "Deployment deadline exceeded",
            serde_json::json!({ "while": what.into() }),
        )
    }

    pub fn dns_zone_not_found(zone: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::DnsZoneNotFound,
            "DNS zone not found",
            serde_json::json!({ "zone": zone.into() }),
        )
    }

    pub fn dns_record_failed(hostname: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::DnsRecordFailed,
            "DNS record reconciliation failed",
            serde_json::json!({ "hostname": hostname.into(), "reason": reason.into() }),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalIoError,
            "IO error",
            serde_json::json!({ "error": error.into(), "context": context }),
        )
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            serde_json::json!({ "error": error.into(), "context": context }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    /// Merge a key into the details object (used by the orchestrator to
    /// attach phase context to propagated errors).
    pub fn with_detail(mut self, key: &str, value: impl Into<String>) -> Self {
        if let Value::Object(map) = &mut self.details {
            map.insert(key.to_string(), Value::String(value.into()));
        } else {
            let mut map = serde_json::Map::new();
            map.insert("inner".to_string(), self.details.clone());
            map.insert(key.to_string(), Value::String(value.into()));
            self.details = Value::Object(map);
        }
        self
    }

    /// True for errors in the credential taxonomy (auth phase failures).
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::AuthTokenMissing
                | ErrorCode::AuthTokenInvalid
                | ErrorCode::AuthBrowserTimeout
                | ErrorCode::AuthPromptFailed
                | ErrorCode::AuthPromptCancelled
                | ErrorCode::AuthPermissionMissing
                | ErrorCode::AuthPermissionDeclined
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_dot_namespaced() {
        assert_eq!(ErrorCode::AuthTokenInvalid.as_str(), "auth.token_invalid");
        assert_eq!(ErrorCode::DnsRecordFailed.as_str(), "dns.record_failed");
    }

    #[test]
    fn with_detail_merges_into_object_details() {
        let err = Error::auth_token_missing("compute").with_detail("phase", "compute-auth");
        assert_eq!(err.details["phase"], "compute-auth");
        assert_eq!(err.details["provider"], "compute");
    }

    #[test]
    fn credential_errors_are_classified() {
        assert!(Error::auth_prompt_failed("boom").is_credential_error());
        assert!(!Error::deploy_build_failed("boom").is_credential_error());
    }
}
