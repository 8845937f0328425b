//! Deployment profiles.
//!
//! A profile is a named JSON document describing what to deploy and where:
//! app identity plus optional org/region/registry/repository/tag and
//! zone/hostname overrides. `airlift.json` records the active profile id.

use crate::error::{Error, Result};
use crate::paths;
use crate::utils::io;
use crate::utils::json::{read_json_file, write_json_file};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Profile {
    /// App name on the compute platform.
    pub app: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    /// Full repository coordinate; wins over registry-derived naming.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// DNS zone on the edge platform; DNS reconciliation is skipped without one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    /// Explicit hostname; defaults to `<app>.<zone>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Explicit CNAME target; defaults to the app's platform hostname.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress_target: Option<String>,
    /// Release strategy; defaults to "canary".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    /// Path to the release configuration definition (JSON).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<String>,
    /// Local source directory handed to the container builder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    active_profile: Option<String>,
}

/// Resolves a profile for a run: explicit id override > active profile.
pub trait ProfileSource: Send + Sync {
    fn resolve(&self, id: Option<&str>) -> Result<Profile>;
}

/// Profiles stored under the airlift data directory.
pub struct FsProfiles;

impl ProfileSource for FsProfiles {
    fn resolve(&self, id: Option<&str>) -> Result<Profile> {
        match id {
            Some(id) => load(id),
            None => {
                let id = active_id()?.ok_or_else(Error::profile_no_active)?;
                load(&id)
            }
        }
    }
}

/// A fixed in-memory profile (library callers, tests).
pub struct FixedProfile(pub Profile);

impl ProfileSource for FixedProfile {
    fn resolve(&self, _id: Option<&str>) -> Result<Profile> {
        Ok(self.0.clone())
    }
}

pub fn load(id: &str) -> Result<Profile> {
    let path = paths::profile(id)?;
    if !path.exists() {
        return Err(Error::profile_not_found(id));
    }
    read_json_file(&path)
}

pub fn save(id: &str, profile: &Profile) -> Result<()> {
    let dir = paths::profiles()?;
    io::ensure_dir(&dir, "create profiles dir")?;
    write_json_file(&paths::profile(id)?, profile)
}

pub fn list_ids() -> Result<Vec<String>> {
    let dir = paths::profiles()?;
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut ids: Vec<String> = std::fs::read_dir(&dir)
        .map_err(|e| Error::internal_io(e.to_string(), Some("list profiles".to_string())))?
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                path.file_stem().map(|s| s.to_string_lossy().to_string())
            } else {
                None
            }
        })
        .collect();
    ids.sort();
    Ok(ids)
}

pub fn active_id() -> Result<Option<String>> {
    let path = paths::airlift_json()?;
    if !path.exists() {
        return Ok(None);
    }
    let config: AppConfig = read_json_file(&path)?;
    Ok(config.active_profile)
}

pub fn set_active(id: &str) -> Result<()> {
    // Refuse to activate a profile that does not exist.
    let _ = load(id)?;
    let dir = paths::airlift()?;
    io::ensure_dir(&dir, "create config dir")?;
    write_json_file(
        &paths::airlift_json()?,
        &AppConfig {
            active_profile: Some(id.to_string()),
        },
    )
}

/// Merge a JSON patch into an existing (or new) profile document.
pub fn merge(id: &str, patch: &serde_json::Value) -> Result<Profile> {
    let path = paths::profile(id)?;
    let mut doc: serde_json::Value = if path.exists() {
        read_json_file(&path)?
    } else {
        serde_json::json!({ "app": id })
    };

    if let (Some(doc_obj), Some(patch_obj)) = (doc.as_object_mut(), patch.as_object()) {
        for (key, value) in patch_obj {
            if value.is_null() {
                doc_obj.remove(key);
            } else {
                doc_obj.insert(key.clone(), value.clone());
            }
        }
    }

    let profile: Profile = serde_json::from_value(doc)
        .map_err(|e| Error::validation_invalid_json(e, Some(format!("profile {}", id))))?;
    save(id, &profile)?;
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_profile_ignores_override() {
        let profile = Profile {
            app: "demo-app".to_string(),
            ..Default::default()
        };
        let source = FixedProfile(profile.clone());
        assert_eq!(source.resolve(Some("other")).unwrap(), profile);
        assert_eq!(source.resolve(None).unwrap(), profile);
    }

    #[test]
    fn profile_serialization_is_camel_case() {
        let profile = Profile {
            app: "demo".to_string(),
            ingress_target: Some("demo.strato.app".to_string()),
            config_file: Some("release.json".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["ingressTarget"], "demo.strato.app");
        assert_eq!(value["configFile"], "release.json");
        assert!(value.get("organization").is_none());
    }

    #[test]
    fn unknown_profile_keys_are_rejected() {
        let result: std::result::Result<Profile, _> =
            serde_json::from_value(serde_json::json!({ "app": "x", "unknown": 1 }));
        assert!(result.is_err());
    }
}
