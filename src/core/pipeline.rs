//! Release pipeline: resolve app, build, skip-if-unchanged, release,
//! summarize.
//!
//! The skip decision is what makes repeated runs a true no-op: when the
//! freshly built image reference matches the app's recorded image, no new
//! release is submitted.

use crate::auth::compute::resolve_organization;
use crate::build::{registry_host, write_registry_credentials, BuildRequest, ImageBuilder};
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::providers::{App, ComputeApi, ReleaseRequest};
use regex::Regex;
use serde_json::json;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const DEFAULT_REGISTRY: &str = "registry.strato.dev";
pub const DEFAULT_STRATEGY: &str = "canary";
pub const DEFAULT_TAG: &str = "latest";

/// Lookups allowed before giving up on a freshly created app becoming
/// visible (creation is eventually consistent).
const APP_WAIT_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub app: String,
    /// Explicit organization override for app creation.
    pub organization: Option<String>,
    pub registry: Option<String>,
    pub repository: Option<String>,
    pub tags: Vec<String>,
    pub import_path: PathBuf,
    /// Parsed release configuration definition.
    pub config: serde_json::Value,
    pub strategy: String,
    pub credentials_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub image: String,
    pub release_id: Option<String>,
    pub summary: Option<String>,
    pub skipped: bool,
    pub elapsed: Duration,
    /// Platform ingress hostname of the app (DNS reconciliation target).
    pub app_hostname: String,
    pub organization: String,
}

pub struct ReleasePipeline<'a> {
    compute: &'a dyn ComputeApi,
    builder: &'a dyn ImageBuilder,
    consistency_wait: Duration,
}

impl<'a> ReleasePipeline<'a> {
    pub fn new(compute: &'a dyn ComputeApi, builder: &'a dyn ImageBuilder) -> Self {
        Self {
            compute,
            builder,
            consistency_wait: Duration::from_millis(500),
        }
    }

    pub fn with_consistency_wait(mut self, wait: Duration) -> Self {
        self.consistency_wait = wait;
        self
    }

    pub fn run(
        &self,
        token: &str,
        request: &PipelineRequest,
        deadline: Deadline,
    ) -> Result<PipelineOutcome> {
        let started = Instant::now();

        let app = self.resolve_app(token, request, deadline)?;

        let repository = resolve_repository(request, &app.organization);
        let tags = if request.tags.is_empty() {
            vec![DEFAULT_TAG.to_string()]
        } else {
            request.tags.clone()
        };

        write_registry_credentials(&request.credentials_dir, registry_host(&repository), token)?;
        let references = self.builder.build(&BuildRequest {
            repository,
            tags,
            import_path: request.import_path.clone(),
            credentials_dir: request.credentials_dir.clone(),
        })?;
        let image = references
            .first()
            .cloned()
            .ok_or_else(|| Error::deploy_build_failed("builder returned no image references"))?;

        if app.image.as_deref() == Some(image.as_str()) {
            let outcome = PipelineOutcome {
                image,
                release_id: None,
                summary: None,
                skipped: true,
                elapsed: started.elapsed(),
                app_hostname: app.hostname,
                organization: app.organization,
            };
            log_outcome(&outcome);
            return Ok(outcome);
        }

        deadline.check("creating release")?;
        let response = self.compute.create_release(
            token,
            &ReleaseRequest {
                app: request.app.clone(),
                image: image.clone(),
                config: request.config.clone(),
                strategy: request.strategy.clone(),
                idempotency_key: Uuid::new_v4().to_string(),
            },
        )?;

        let outcome = PipelineOutcome {
            release_id: extract_release_id(&response.summary),
            summary: Some(response.summary),
            image,
            skipped: false,
            elapsed: started.elapsed(),
            app_hostname: app.hostname,
            organization: app.organization,
        };
        log_outcome(&outcome);
        Ok(outcome)
    }

    /// Look the app up; create it (then wait out the consistency window)
    /// when absent.
    fn resolve_app(
        &self,
        token: &str,
        request: &PipelineRequest,
        deadline: Deadline,
    ) -> Result<App> {
        if let Some(app) = self.compute.get_app(token, &request.app)? {
            return Ok(app);
        }

        let organizations = self.compute.list_organizations(token)?;
        let organization =
            resolve_organization(&organizations, request.organization.as_deref(), None)?;

        crate::log_status!("pipeline", "Creating app {} in {}", request.app, organization);
        self.compute.create_app(token, &request.app, &organization)?;

        for _ in 0..APP_WAIT_ATTEMPTS {
            deadline.check("waiting for app to become visible")?;
            if let Some(app) = self.compute.get_app(token, &request.app)? {
                return Ok(app);
            }
            std::thread::sleep(self.consistency_wait);
        }
        Err(Error::deploy_app_create_timeout(
            request.app.clone(),
            APP_WAIT_ATTEMPTS,
        ))
    }
}

fn resolve_repository(request: &PipelineRequest, organization: &str) -> String {
    if let Some(repository) = &request.repository {
        return repository.clone();
    }
    let registry = request.registry.as_deref().unwrap_or(DEFAULT_REGISTRY);
    format!("{}/{}/{}", registry, organization, request.app)
}

/// The provider reports the release in a free-text summary; the id follows
/// the word "release".
pub fn extract_release_id(summary: &str) -> Option<String> {
    let pattern = Regex::new(r"release\s+([A-Za-z0-9._-]+)").ok()?;
    pattern
        .captures(summary)
        .map(|captures| captures[1].to_string())
}

fn log_outcome(outcome: &PipelineOutcome) {
    let line = json!({
        "image": outcome.image,
        "skipped": outcome.skipped,
        "elapsedMs": outcome.elapsed.as_millis() as u64,
        "releaseId": outcome.release_id,
    });
    crate::log_status!("release", "{}", line);
}
