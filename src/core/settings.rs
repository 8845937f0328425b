//! Provider preference settings.
//!
//! Created or refreshed whenever auth succeeds, read by every downstream
//! operation needing provider context. Persisted as JSON through the secret
//! store under `<provider>.settings`.

use crate::error::Result;
use crate::providers::Provider;
use crate::secrets::{settings_key, SecretStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeSettings {
    pub organization: String,
    pub region: String,
    pub updated_at: DateTime<Utc>,
}

impl ComputeSettings {
    pub fn new(organization: &str, region: &str) -> Self {
        Self {
            organization: organization.trim().to_string(),
            region: region.trim().to_string(),
            updated_at: Utc::now(),
        }
    }

    /// Same preferences, ignoring the refresh timestamp.
    pub fn same_preferences(&self, other: &ComputeSettings) -> bool {
        self.organization == other.organization && self.region == other.region
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl EdgeSettings {
    pub fn normalized(mut self) -> Self {
        let trim = |v: Option<String>| {
            v.map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        self.zone = trim(self.zone);
        self.zone_id = trim(self.zone_id);
        self.account_id = trim(self.account_id);
        self.bucket = trim(self.bucket);
        self.hostname = trim(self.hostname);
        self
    }

    pub fn same_preferences(&self, other: &EdgeSettings) -> bool {
        self.zone == other.zone
            && self.zone_id == other.zone_id
            && self.account_id == other.account_id
            && self.bucket == other.bucket
            && self.hostname == other.hostname
    }
}

fn load<T: serde::de::DeserializeOwned>(
    store: &dyn SecretStore,
    user: &str,
    provider: Provider,
) -> Result<Option<T>> {
    let Some(raw) = store.get(user, &settings_key(provider))? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(settings) => Ok(Some(settings)),
        Err(_) => {
            // Stale or hand-edited document: treat as absent and let the next
            // successful auth rewrite it.
            crate::log_status!("settings", "Discarding unreadable {} settings", provider);
            Ok(None)
        }
    }
}

fn save<T: Serialize>(
    store: &dyn SecretStore,
    user: &str,
    provider: Provider,
    settings: &T,
) -> Result<()> {
    let raw = serde_json::to_string_pretty(settings).map_err(|e| {
        crate::error::Error::internal_json(e.to_string(), Some("serialize settings".to_string()))
    })?;
    store.put(user, &settings_key(provider), &raw)
}

pub fn load_compute(store: &dyn SecretStore, user: &str) -> Result<Option<ComputeSettings>> {
    load(store, user, Provider::Compute)
}

pub fn save_compute(store: &dyn SecretStore, user: &str, settings: &ComputeSettings) -> Result<()> {
    save(store, user, Provider::Compute, settings)
}

pub fn load_edge(store: &dyn SecretStore, user: &str) -> Result<Option<EdgeSettings>> {
    load(store, user, Provider::Edge)
}

pub fn save_edge(store: &dyn SecretStore, user: &str, settings: &EdgeSettings) -> Result<()> {
    save(store, user, Provider::Edge, settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::MemorySecretStore;

    #[test]
    fn compute_settings_round_trip_trimmed() {
        let store = MemorySecretStore::new();
        let settings = ComputeSettings::new("  acme ", " syd ");
        assert_eq!(settings.organization, "acme");
        assert_eq!(settings.region, "syd");

        save_compute(&store, "u", &settings).unwrap();
        let loaded = load_compute(&store, "u").unwrap().unwrap();
        assert!(loaded.same_preferences(&settings));
    }

    #[test]
    fn unreadable_settings_are_treated_as_absent() {
        let store = MemorySecretStore::new();
        store.put("u", "edge.settings", "{broken").unwrap();
        assert!(load_edge(&store, "u").unwrap().is_none());
    }

    #[test]
    fn edge_settings_normalize_blank_fields_away() {
        let settings = EdgeSettings {
            zone: Some(" example.com ".to_string()),
            bucket: Some("   ".to_string()),
            ..Default::default()
        }
        .normalized();
        assert_eq!(settings.zone.as_deref(), Some("example.com"));
        assert!(settings.bucket.is_none());
    }
}
