//! Container builder delegation.
//!
//! The workflow hands the builder a repository coordinate, a tag list, an
//! import path, and a registry-credential directory, and gets back published
//! image references. The default implementation shells out to `docker`; the
//! credential directory carries a docker-style `config.json` scoped from the
//! already-verified compute token, so no separate login step runs.

use crate::error::{Error, Result};
use crate::utils::io;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub repository: String,
    pub tags: Vec<String>,
    pub import_path: PathBuf,
    pub credentials_dir: PathBuf,
}

pub trait ImageBuilder: Send + Sync {
    /// Build and publish; returns the pushed image references.
    fn build(&self, request: &BuildRequest) -> Result<Vec<String>>;
}

/// Write a docker-style credential file for the registry host.
pub fn write_registry_credentials(dir: &Path, registry: &str, token: &str) -> Result<()> {
    io::ensure_dir(dir, "create registry credential dir")?;
    let auth = BASE64.encode(format!("x:{}", token));
    let config = json!({ "auths": { registry: { "auth": auth } } });
    let content = serde_json::to_string_pretty(&config)
        .map_err(|e| Error::internal_json(e.to_string(), Some("registry credentials".to_string())))?;
    io::write_file_atomic(&dir.join("config.json"), &content, "write registry credentials")
}

/// Registry host portion of a repository coordinate
/// (`registry.example/acme/app` → `registry.example`).
pub fn registry_host(repository: &str) -> &str {
    repository.split('/').next().unwrap_or(repository)
}

/// Builder that shells out to the docker CLI.
pub struct DockerBuilder;

impl DockerBuilder {
    fn run(args: &[String], credentials_dir: &Path, context: &str) -> Result<()> {
        let output = Command::new("docker")
            .arg("--config")
            .arg(credentials_dir)
            .args(args)
            .output()
            .map_err(|e| Error::deploy_build_failed(format!("failed to run docker: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::deploy_build_failed(format!(
                "docker {} failed (exit {}): {}",
                context,
                output.status.code().unwrap_or(1),
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl ImageBuilder for DockerBuilder {
    fn build(&self, request: &BuildRequest) -> Result<Vec<String>> {
        let references: Vec<String> = request
            .tags
            .iter()
            .map(|tag| format!("{}:{}", request.repository, tag))
            .collect();

        let mut build_args = vec!["build".to_string()];
        for reference in &references {
            build_args.push("-t".to_string());
            build_args.push(reference.clone());
        }
        build_args.push(request.import_path.display().to_string());

        crate::log_status!("build", "Building {}", references.join(", "));
        Self::run(&build_args, &request.credentials_dir, "build")?;

        for reference in &references {
            crate::log_status!("build", "Pushing {}", reference);
            Self::run(
                &["push".to_string(), reference.clone()],
                &request.credentials_dir,
                "push",
            )?;
        }

        Ok(references)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_credentials_encode_the_token() {
        let dir = tempfile::tempdir().unwrap();
        write_registry_credentials(dir.path(), "registry.example", "ct_123").unwrap();

        let raw = std::fs::read_to_string(dir.path().join("config.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let auth = parsed["auths"]["registry.example"]["auth"].as_str().unwrap();
        let decoded = BASE64.decode(auth).unwrap();
        assert_eq!(decoded, b"x:ct_123");
    }

    #[test]
    fn registry_host_is_the_first_segment() {
        assert_eq!(registry_host("registry.example/acme/app"), "registry.example");
        assert_eq!(registry_host("bare"), "bare");
    }
}
