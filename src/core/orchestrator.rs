//! Deployment orchestrator.
//!
//! Sequences provider auth, the release pipeline, and DNS reconciliation
//! into the fixed phase machine, emitting one progress event per transition.
//! `deploy` runs synchronously; `launch` runs the same workflow on its own
//! thread behind a stream adapter for remote consumption.

use crate::auth::{ensure_token, AuthContext, AuthOverrides, ComputeAuth, EdgeAuth};
use crate::build::ImageBuilder;
use crate::deadline::Deadline;
use crate::dns;
use crate::error::{Error, Result};
use crate::pipeline::{PipelineRequest, ReleasePipeline, DEFAULT_STRATEGY};
use crate::profile::ProfileSource;
use crate::progress::{Emitter, FanoutEmitter, Phase, ProgressEvent};
use crate::prompt::{ChainPrompter, Prompter};
use crate::providers::{ComputeApi, EdgeApi};
use crate::secrets::SecretStore;
use crate::settings;
use crate::stream::{StreamAdapter, StreamChannels};
use crate::utils::json::read_json_file;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Profile id; the source's default applies when absent.
    pub profile: Option<String>,
    pub app: Option<String>,
    pub organization: Option<String>,
    pub region: Option<String>,
    pub registry: Option<String>,
    pub repository: Option<String>,
    pub tags: Vec<String>,
    /// Overall workflow timeout. Browser auth keeps its own independent one.
    pub timeout: Option<Duration>,
    pub auto_accept_warnings: bool,
    pub edge_bootstrap: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOutcome {
    pub app: String,
    pub organization: String,
    pub region: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub skipped: bool,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

/// Running `launch` hands these back to the caller: the adapter (for
/// `respond`), the progress/prompt channels, and the two outcome channels of
/// which exactly one will ever carry a value.
pub struct Launched {
    pub adapter: StreamAdapter,
    pub channels: StreamChannels,
    pub result: Receiver<DeployOutcome>,
    pub errors: Receiver<Error>,
    pub handle: std::thread::JoinHandle<()>,
}

/// The wired-up workflow: provider clients, builder, stores.
#[derive(Clone)]
pub struct Workflow {
    pub compute: Arc<dyn ComputeApi>,
    pub edge: Arc<dyn EdgeApi>,
    pub builder: Arc<dyn ImageBuilder>,
    pub store: Arc<dyn SecretStore>,
    pub profiles: Arc<dyn ProfileSource>,
    pub user: String,
    /// Directory handed to the container builder for registry credentials.
    pub credentials_dir: PathBuf,
}

impl Workflow {
    /// Production wiring: HTTP provider clients, the docker builder, and the
    /// filesystem secret/profile stores.
    pub fn from_environment() -> Result<Self> {
        Ok(Self {
            compute: Arc::new(crate::providers::ComputeClient::from_env()),
            edge: Arc::new(crate::providers::EdgeClient::from_env()),
            builder: Arc::new(crate::build::DockerBuilder),
            store: Arc::new(crate::secrets::FsSecretStore::default_location()?),
            profiles: Arc::new(crate::profile::FsProfiles),
            user: crate::secrets::current_user(),
            credentials_dir: crate::paths::registry_auth()?,
        })
    }

    /// Synchronous deployment. Emits one event per phase transition and, on
    /// the first error, exactly one `Failed` event before returning it.
    pub fn deploy(
        &self,
        options: &DeployOptions,
        emitter: &dyn Emitter,
        prompter: &dyn Prompter,
    ) -> Result<DeployOutcome> {
        let deadline = Deadline::from_timeout(options.timeout);
        let mut detail = BTreeMap::new();

        emit(emitter, Phase::Started, "starting deployment", &detail);
        match self.run_phases(options, emitter, prompter, deadline, &mut detail) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                let mut failed_detail = detail.clone();
                failed_detail.insert("error".to_string(), err.message.clone());
                if let Some(phase) = err.details.get("phase").and_then(|v| v.as_str()) {
                    failed_detail.insert("phase".to_string(), phase.to_string());
                }
                emit(emitter, Phase::Failed, err.message.clone(), &failed_detail);
                Err(err)
            }
        }
    }

    fn run_phases(
        &self,
        options: &DeployOptions,
        emitter: &dyn Emitter,
        prompter: &dyn Prompter,
        deadline: Deadline,
        detail: &mut BTreeMap<String, String>,
    ) -> Result<DeployOutcome> {
        let started = Instant::now();

        let profile = self
            .profiles
            .resolve(options.profile.as_deref())
            .map_err(|e| e.with_detail("phase", Phase::Started.as_str()))?;
        let app = options
            .app
            .clone()
            .unwrap_or_else(|| profile.app.clone())
            .trim()
            .to_string();
        if app.is_empty() {
            return Err(Error::config_missing_key("app")
                .with_detail("phase", Phase::Started.as_str()));
        }
        detail.insert("app".to_string(), app.clone());

        // --- Compute auth -------------------------------------------------
        emit(
            emitter,
            Phase::ComputeAuth,
            "authenticating with compute provider",
            detail,
        );
        let compute_token = ensure_token(
            &ComputeAuth::new(&*self.compute),
            &AuthContext {
                store: &*self.store,
                user: &self.user,
                prompter,
                deadline,
                overrides: AuthOverrides {
                    organization: options
                        .organization
                        .clone()
                        .or_else(|| profile.organization.clone()),
                    region: options.region.clone().or_else(|| profile.region.clone()),
                    ..Default::default()
                },
                auto_accept_warnings: options.auto_accept_warnings,
            },
        )
        .map_err(|e| e.with_detail("phase", Phase::ComputeAuth.as_str()))?;

        let compute_settings = settings::load_compute(&*self.store, &self.user)?
            .ok_or_else(|| Error::config_missing_key("organization"))
            .map_err(|e| e.with_detail("phase", Phase::ComputeAuth.as_str()))?;
        detail.insert(
            "organization".to_string(),
            compute_settings.organization.clone(),
        );
        detail.insert("region".to_string(), compute_settings.region.clone());
        emit(
            emitter,
            Phase::ComputeAuthCompleted,
            "compute provider ready",
            detail,
        );

        // --- Edge auth ----------------------------------------------------
        emit(
            emitter,
            Phase::EdgeAuth,
            "authenticating with edge provider",
            detail,
        );
        let edge_token = ensure_token(
            &EdgeAuth::new(&*self.edge),
            &AuthContext {
                store: &*self.store,
                user: &self.user,
                prompter,
                deadline,
                overrides: AuthOverrides {
                    zone: profile.zone.clone(),
                    edge_bootstrap: options.edge_bootstrap,
                    ..Default::default()
                },
                auto_accept_warnings: options.auto_accept_warnings,
            },
        )
        .map_err(|e| e.with_detail("phase", Phase::EdgeAuth.as_str()))?;

        let edge_settings = settings::load_edge(&*self.store, &self.user)?.unwrap_or_default();
        if let Some(zone) = &edge_settings.zone {
            detail.insert("zone".to_string(), zone.clone());
        }
        emit(
            emitter,
            Phase::EdgeAuthCompleted,
            "edge provider ready",
            detail,
        );

        // --- Release pipeline ---------------------------------------------
        emit(
            emitter,
            Phase::Deploying,
            format!("building and releasing {}", app),
            detail,
        );
        let request = PipelineRequest {
            app: app.clone(),
            organization: Some(compute_settings.organization.clone()),
            registry: options.registry.clone().or_else(|| profile.registry.clone()),
            repository: options
                .repository
                .clone()
                .or_else(|| profile.repository.clone()),
            tags: if options.tags.is_empty() {
                profile.tags.clone()
            } else {
                options.tags.clone()
            },
            import_path: profile
                .import_path
                .as_deref()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            config: load_release_config(profile.config_file.as_deref())?,
            strategy: profile
                .strategy
                .clone()
                .unwrap_or_else(|| DEFAULT_STRATEGY.to_string()),
            credentials_dir: self.credentials_dir.clone(),
        };
        let pipeline = ReleasePipeline::new(&*self.compute, &*self.builder);
        let outcome = pipeline
            .run(&compute_token, &request, deadline)
            .map_err(|e| e.with_detail("phase", Phase::Deploying.as_str()))?;

        detail.insert("image".to_string(), outcome.image.clone());
        detail.insert("skipped".to_string(), outcome.skipped.to_string());
        if let Some(release_id) = &outcome.release_id {
            detail.insert("releaseId".to_string(), release_id.clone());
        }

        // --- DNS reconciliation -------------------------------------------
        // A failure here is fatal but reported alongside the image/release
        // detail already accumulated: the release itself succeeded.
        emit(
            emitter,
            Phase::DnsReconcile,
            "reconciling dns records",
            detail,
        );
        let ingress_target = profile
            .ingress_target
            .clone()
            .unwrap_or_else(|| outcome.app_hostname.clone());
        let hostname = dns::ensure_hostname(
            &*self.edge,
            &edge_token,
            &edge_settings,
            &profile,
            &app,
            &ingress_target,
        )
        .map_err(|e| e.with_detail("phase", Phase::DnsReconcile.as_str()))?;
        if let Some(hostname) = &hostname {
            detail.insert("hostname".to_string(), hostname.clone());
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        detail.insert("elapsedMs".to_string(), elapsed_ms.to_string());
        emit(emitter, Phase::Succeeded, "deployment complete", detail);

        Ok(DeployOutcome {
            app,
            organization: outcome.organization,
            region: compute_settings.region,
            image: outcome.image,
            release_id: outcome.release_id,
            summary: outcome.summary,
            skipped: outcome.skipped,
            elapsed_ms,
            hostname,
        })
    }

    /// Asynchronous deployment behind a stream adapter.
    ///
    /// The adapter's emitter/prompter are combined with any caller-supplied
    /// ones so every event and prompt reaches both sides. The outcome lands
    /// on exactly one of `result`/`errors`, after which the adapter is
    /// closed exactly once, including on panic.
    pub fn launch(
        &self,
        options: DeployOptions,
        caller_emitter: Option<Box<dyn Emitter>>,
        caller_prompter: Option<Box<dyn Prompter>>,
    ) -> Launched {
        let (adapter, channels) = StreamAdapter::new();

        let mut emitters: Vec<Box<dyn Emitter>> = vec![Box::new(adapter.clone())];
        if let Some(extra) = caller_emitter {
            emitters.push(extra);
        }
        let emitter = FanoutEmitter::new(emitters);

        let prompter: Box<dyn Prompter> = match caller_prompter {
            Some(extra) => Box::new(ChainPrompter::new(Box::new(adapter.clone()), extra)),
            None => Box::new(adapter.clone()),
        };

        let (result_tx, result_rx) = sync_channel(1);
        let (error_tx, error_rx) = sync_channel(1);

        let workflow = self.clone();
        let worker_adapter = adapter.clone();
        let handle = std::thread::spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                workflow.deploy(&options, &emitter, &*prompter)
            }))
            .unwrap_or_else(|_| Err(Error::internal_unexpected("deployment thread panicked")));

            match outcome {
                Ok(result) => {
                    let _ = result_tx.send(result);
                }
                Err(err) => {
                    let _ = error_tx.send(err);
                }
            }
            worker_adapter.close();
        });

        Launched {
            adapter,
            channels,
            result: result_rx,
            errors: error_rx,
            handle,
        }
    }
}

fn load_release_config(path: Option<&str>) -> Result<serde_json::Value> {
    match path {
        Some(path) => read_json_file(Path::new(path)),
        None => Ok(serde_json::json!({})),
    }
}

fn emit(
    emitter: &dyn Emitter,
    phase: Phase,
    message: impl Into<String>,
    detail: &BTreeMap<String, String>,
) {
    emitter.emit(&ProgressEvent::new(phase, message, detail.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{FixedProfile, Profile};
    use crate::progress::{ChannelEmitter, CollectingEmitter};
    use crate::prompt::PromptResponse;
    use crate::providers::fakes::{FakeBuilder, FakeCompute, FakeEdge, ScriptedPrompter};
    use crate::providers::Provider;
    use crate::secrets::{self, MemorySecretStore};

    const SUCCESS_PHASES: [Phase; 8] = [
        Phase::Started,
        Phase::ComputeAuth,
        Phase::ComputeAuthCompleted,
        Phase::EdgeAuth,
        Phase::EdgeAuthCompleted,
        Phase::Deploying,
        Phase::DnsReconcile,
        Phase::Succeeded,
    ];

    fn profile() -> Profile {
        Profile {
            app: "demo-app".to_string(),
            repository: Some("registry.example/acme/demo-app".to_string()),
            ..Default::default()
        }
    }

    fn workflow(compute: FakeCompute, edge: FakeEdge, profile: Profile) -> Workflow {
        let store = MemorySecretStore::new();
        secrets::save_token(&store, "u", Provider::Compute, "ct", None).unwrap();
        secrets::save_token(&store, "u", Provider::Edge, "et", None).unwrap();
        Workflow {
            compute: Arc::new(compute.with_token("ct")),
            edge: Arc::new(edge.with_token("et")),
            builder: Arc::new(FakeBuilder::new()),
            store: Arc::new(store),
            profiles: Arc::new(FixedProfile(profile)),
            user: "u".to_string(),
            credentials_dir: tempfile::tempdir().unwrap().keep(),
        }
    }

    fn provisioned_compute() -> FakeCompute {
        FakeCompute::new().with_organization("acme").with_region("syd")
    }

    #[test]
    fn successful_run_emits_the_exact_phase_sequence() {
        let wf = workflow(
            provisioned_compute(),
            FakeEdge::new().with_zone("z1", "example.com"),
            profile(),
        );
        let emitter = CollectingEmitter::new();
        let prompter = ScriptedPrompter::new();

        let outcome = wf
            .deploy(&DeployOptions::default(), &emitter, &prompter)
            .unwrap();
        assert_eq!(emitter.phases(), SUCCESS_PHASES);
        assert!(!outcome.skipped);
        assert_eq!(outcome.hostname.as_deref(), Some("demo-app.example.com"));
    }

    #[test]
    fn rerun_with_no_changes_is_a_true_noop() {
        let wf = workflow(provisioned_compute(), FakeEdge::new(), profile());
        let emitter = CollectingEmitter::new();
        let prompter = ScriptedPrompter::new();

        let first = wf
            .deploy(&DeployOptions::default(), &emitter, &prompter)
            .unwrap();
        assert!(!first.skipped);
        let first_release = first.release_id.clone().unwrap();
        assert!(!first_release.is_empty());

        let second = wf
            .deploy(&DeployOptions::default(), &emitter, &prompter)
            .unwrap();
        assert!(second.skipped);
        assert_eq!(second.release_id, None);
        assert_eq!(second.image, first.image);
    }

    #[test]
    fn scenario_a_first_release_then_skip() {
        let wf = workflow(provisioned_compute(), FakeEdge::new(), profile());
        let emitter = CollectingEmitter::new();
        let prompter = ScriptedPrompter::new();
        let options = DeployOptions {
            organization: Some("acme".to_string()),
            region: Some("syd".to_string()),
            ..Default::default()
        };

        let first = wf.deploy(&options, &emitter, &prompter).unwrap();
        assert_eq!(first.image, "registry.example/acme/demo-app:latest");
        assert_eq!(first.organization, "acme");
        assert_eq!(first.region, "syd");
        assert!(first.release_id.is_some());

        let second = wf.deploy(&options, &emitter, &prompter).unwrap();
        assert!(second.skipped);
        assert_eq!(second.image, first.image);
        assert_eq!(second.release_id, None);
    }

    #[test]
    fn scenario_b_compute_auth_failure_never_reaches_the_pipeline() {
        let store = MemorySecretStore::new();
        // Stale cached token: verification will fail.
        secrets::save_token(&store, "u", Provider::Compute, "ct_stale", None).unwrap();
        let builder = Arc::new(FakeBuilder::new());
        let wf = Workflow {
            compute: Arc::new(provisioned_compute()),
            edge: Arc::new(FakeEdge::new()),
            builder: builder.clone(),
            store: Arc::new(store),
            profiles: Arc::new(FixedProfile(profile())),
            user: "u".to_string(),
            credentials_dir: tempfile::tempdir().unwrap().keep(),
        };
        let emitter = CollectingEmitter::new();
        let prompter = ScriptedPrompter::always_failing();

        let err = wf
            .deploy(&DeployOptions::default(), &emitter, &prompter)
            .unwrap_err();
        assert!(err.is_credential_error());
        assert_eq!(err.details["phase"], "compute-auth");
        assert_eq!(builder.build_count(), 0);
        assert_eq!(
            emitter.phases(),
            vec![Phase::Started, Phase::ComputeAuth, Phase::Failed]
        );
    }

    #[test]
    fn failing_run_emits_a_prefix_plus_exactly_one_failed() {
        // Edge auth fails: no cached edge token and the prompt double errors.
        let store = MemorySecretStore::new();
        secrets::save_token(&store, "u", Provider::Compute, "ct", None).unwrap();
        let wf = Workflow {
            compute: Arc::new(provisioned_compute().with_token("ct")),
            edge: Arc::new(FakeEdge::new()),
            builder: Arc::new(FakeBuilder::new()),
            store: Arc::new(store),
            profiles: Arc::new(FixedProfile(profile())),
            user: "u".to_string(),
            credentials_dir: tempfile::tempdir().unwrap().keep(),
        };
        let emitter = CollectingEmitter::new();
        let prompter = ScriptedPrompter::always_failing();

        wf.deploy(&DeployOptions::default(), &emitter, &prompter)
            .unwrap_err();
        let phases = emitter.phases();
        assert_eq!(
            phases,
            vec![
                Phase::Started,
                Phase::ComputeAuth,
                Phase::ComputeAuthCompleted,
                Phase::EdgeAuth,
                Phase::Failed
            ]
        );
        assert!(SUCCESS_PHASES.starts_with(&phases[..phases.len() - 1]));
        assert_eq!(phases.iter().filter(|p| **p == Phase::Failed).count(), 1);
    }

    #[test]
    fn dns_failure_reports_alongside_release_detail() {
        let mut prof = profile();
        prof.zone = Some("missing.example".to_string());
        let wf = workflow(provisioned_compute(), FakeEdge::new(), prof);
        let emitter = CollectingEmitter::new();
        let prompter = ScriptedPrompter::new();

        let err = wf
            .deploy(&DeployOptions::default(), &emitter, &prompter)
            .unwrap_err();
        assert_eq!(err.code.as_str(), "dns.zone_not_found");

        let events = emitter.events();
        let failed = events.last().unwrap();
        assert_eq!(failed.phase, Phase::Failed);
        // The release already happened; its coordinates ride along.
        assert_eq!(
            failed.detail.get("image").map(String::as_str),
            Some("registry.example/acme/demo-app:latest")
        );
        assert!(failed.detail.contains_key("releaseId"));
    }

    #[test]
    fn deploy_completes_with_a_full_progress_queue() {
        let wf = workflow(provisioned_compute(), FakeEdge::new(), profile());
        // Rendezvous channel with no reader: every send would block, so the
        // emitter must drop instead.
        let (tx, _rx) = std::sync::mpsc::sync_channel(0);
        let emitter = ChannelEmitter::new(tx);
        let prompter = ScriptedPrompter::new();

        let outcome = wf.deploy(&DeployOptions::default(), &emitter, &prompter);
        assert!(outcome.is_ok());
    }

    #[test]
    fn launch_streams_events_and_publishes_the_result() {
        let wf = workflow(
            provisioned_compute(),
            FakeEdge::new().with_zone("z1", "example.com"),
            profile(),
        );

        let launched = wf.launch(DeployOptions::default(), None, None);

        let mut phases = Vec::new();
        while let Ok(line) = launched.channels.events.recv() {
            let event: ProgressEvent = serde_json::from_str(&line).unwrap();
            phases.push(event.phase);
        }
        assert_eq!(phases, SUCCESS_PHASES);

        let outcome = launched.result.recv().unwrap();
        assert!(!outcome.skipped);
        assert!(launched.errors.recv().is_err());
        assert!(launched.adapter.is_closed());
        launched.handle.join().unwrap();
    }

    #[test]
    fn launch_answers_prompts_through_the_adapter() {
        // No cached compute token: acquisition falls back to a pasted token
        // routed over the stream adapter.
        let store = MemorySecretStore::new();
        secrets::save_token(&store, "u", Provider::Edge, "et", None).unwrap();
        let wf = Workflow {
            compute: Arc::new(provisioned_compute().with_token("ct_remote")),
            edge: Arc::new(FakeEdge::new().with_token("et")),
            builder: Arc::new(FakeBuilder::new()),
            store: Arc::new(store),
            profiles: Arc::new(FixedProfile(profile())),
            user: "u".to_string(),
            credentials_dir: tempfile::tempdir().unwrap().keep(),
        };

        let launched = wf.launch(DeployOptions::default(), None, None);

        // Drain prompts until the requires-response token request shows up.
        let request = loop {
            let msg = launched
                .channels
                .prompts
                .recv_timeout(Duration::from_secs(5))
                .unwrap();
            if msg.requires_response {
                break msg;
            }
        };
        launched.adapter.respond(PromptResponse {
            id: request.id,
            secret: Some("ct_remote".to_string()),
            error: None,
        });

        let outcome = launched.result.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(!outcome.skipped);
        launched.handle.join().unwrap();
    }

    #[test]
    fn launch_publishes_errors_on_the_error_channel() {
        let store = MemorySecretStore::new();
        let wf = Workflow {
            compute: Arc::new(FakeCompute::new()),
            edge: Arc::new(FakeEdge::new()),
            builder: Arc::new(FakeBuilder::new()),
            store: Arc::new(store),
            profiles: Arc::new(FixedProfile(profile())),
            user: "u".to_string(),
            credentials_dir: tempfile::tempdir().unwrap().keep(),
        };

        let launched = wf.launch(DeployOptions::default(), None, None);
        // No prompt consumer responds; close the adapter to cancel.
        let _ = launched
            .channels
            .prompts
            .recv_timeout(Duration::from_secs(5));
        launched.adapter.close();

        let err = launched.errors.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(err.is_credential_error());
        assert!(launched.result.recv().is_err());
        launched.handle.join().unwrap();
    }
}
