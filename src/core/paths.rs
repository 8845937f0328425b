use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;

/// Base airlift config directory (universal ~/.config/airlift/ on all platforms)
pub fn airlift() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected("APPDATA environment variable not set on Windows".to_string())
        })?;
        Ok(PathBuf::from(appdata).join("airlift"))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected(
                "HOME environment variable not set on Unix-like system".to_string(),
            )
        })?;
        Ok(PathBuf::from(home).join(".config").join("airlift"))
    }
}

/// Global airlift.json config file path
pub fn airlift_json() -> Result<PathBuf> {
    Ok(airlift()?.join("airlift.json"))
}

/// Profiles directory
pub fn profiles() -> Result<PathBuf> {
    Ok(airlift()?.join("profiles"))
}

/// Profile file path
pub fn profile(id: &str) -> Result<PathBuf> {
    Ok(profiles()?.join(format!("{}.json", id)))
}

/// Secrets directory (filesystem secret-store root)
pub fn secrets() -> Result<PathBuf> {
    Ok(airlift()?.join("secrets"))
}

/// Registry credential directory handed to the container builder
pub fn registry_auth() -> Result<PathBuf> {
    Ok(airlift()?.join("registry"))
}
