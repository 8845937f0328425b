//! HTTP event-stream surface over `Workflow::launch`.
//!
//! Each POST /deploys starts one deployment session. Its progress, prompts,
//! and outcome stream over SSE on logical channels (init, progress, prompt,
//! result, error); a companion endpoint resolves pending prompts by id; a
//! status endpoint returns cached settings plus best-effort live lookups.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Args;
use futures::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use airlift::orchestrator::{DeployOptions, DeployOutcome, Workflow};
use airlift::prompt::{PromptMessage, PromptResponse};
use airlift::providers::{ComputeApi, EdgeApi, Provider};
use airlift::stream::StreamAdapter;
use airlift::{log_status, secrets, settings, Error};

#[derive(Args)]
pub struct ServeArgs {
    /// Listen address
    #[arg(long, default_value = "127.0.0.1:8464")]
    pub listen: String,
}

struct SessionStreams {
    events: Receiver<String>,
    prompts: Receiver<PromptMessage>,
    result: Receiver<DeployOutcome>,
    errors: Receiver<Error>,
}

struct Session {
    adapter: StreamAdapter,
    /// Claimed exactly once by the events endpoint.
    streams: Mutex<Option<SessionStreams>>,
}

#[derive(Clone)]
struct ServeState {
    workflow: Workflow,
    sessions: Arc<Mutex<HashMap<String, Arc<Session>>>>,
}

impl ServeState {
    fn session(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().ok()?.get(id).cloned()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DeployBody {
    profile: Option<String>,
    app: Option<String>,
    organization: Option<String>,
    region: Option<String>,
    registry: Option<String>,
    repository: Option<String>,
    tags: Vec<String>,
    timeout_secs: Option<u64>,
    accept_warnings: bool,
}

impl Default for DeployBody {
    fn default() -> Self {
        Self {
            profile: None,
            app: None,
            organization: None,
            region: None,
            registry: None,
            repository: None,
            tags: Vec::new(),
            timeout_secs: None,
            accept_warnings: true,
        }
    }
}

async fn start_deploy(
    State(state): State<ServeState>,
    Json(body): Json<DeployBody>,
) -> (StatusCode, Json<Value>) {
    let options = DeployOptions {
        profile: body.profile,
        app: body.app,
        organization: body.organization,
        region: body.region,
        registry: body.registry,
        repository: body.repository,
        tags: body.tags,
        timeout: body.timeout_secs.map(Duration::from_secs),
        auto_accept_warnings: body.accept_warnings,
        edge_bootstrap: false,
    };

    let launched = state.workflow.launch(options, None, None);
    let session_id = Uuid::new_v4().to_string();
    let session = Arc::new(Session {
        adapter: launched.adapter,
        streams: Mutex::new(Some(SessionStreams {
            events: launched.channels.events,
            prompts: launched.channels.prompts,
            result: launched.result,
            errors: launched.errors,
        })),
    });

    if let Ok(mut sessions) = state.sessions.lock() {
        sessions.insert(session_id.clone(), session);
    }
    log_status!("serve", "Started deployment session {}", session_id);

    (StatusCode::CREATED, Json(json!({ "sessionId": session_id })))
}

/// Bridge the session's std channels onto one SSE stream. Each std receiver
/// gets a forwarding thread; the async side just drains a tokio channel.
fn spawn_forwarders(
    session_id: String,
    streams: SessionStreams,
    tx: tokio::sync::mpsc::Sender<Event>,
) {
    let _ = tx.try_send(
        Event::default()
            .event("init")
            .data(json!({ "sessionId": session_id }).to_string()),
    );

    let SessionStreams {
        events,
        prompts,
        result,
        errors,
    } = streams;

    {
        let tx = tx.clone();
        std::thread::spawn(move || {
            while let Ok(line) = events.recv() {
                let event = Event::default().event("progress").data(line);
                if tx.blocking_send(event).is_err() {
                    break;
                }
            }
        });
    }

    {
        let tx = tx.clone();
        std::thread::spawn(move || {
            while let Ok(prompt) = prompts.recv() {
                let Ok(line) = serde_json::to_string(&prompt) else {
                    continue;
                };
                let event = Event::default().event("prompt").data(line);
                if tx.blocking_send(event).is_err() {
                    break;
                }
            }
        });
    }

    std::thread::spawn(move || {
        // Exactly one of the two channels carries a value.
        let event = match result.recv() {
            Ok(outcome) => serde_json::to_string(&outcome)
                .ok()
                .map(|line| Event::default().event("result").data(line)),
            Err(_) => errors.recv().ok().map(|err| {
                Event::default().event("error").data(
                    json!({
                        "code": err.code.as_str(),
                        "message": err.message,
                        "details": err.details,
                    })
                    .to_string(),
                )
            }),
        };
        if let Some(event) = event {
            let _ = tx.blocking_send(event);
        }
    });
}

async fn session_events(
    State(state): State<ServeState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let session = state.session(&id).ok_or(StatusCode::NOT_FOUND)?;
    let streams = session
        .streams
        .lock()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .take()
        .ok_or(StatusCode::CONFLICT)?;

    let (tx, rx) = tokio::sync::mpsc::channel::<Event>(64);
    spawn_forwarders(id, streams, tx);

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|event| (Ok::<Event, Infallible>(event), rx))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn respond_prompt(
    State(state): State<ServeState>,
    Path(id): Path<String>,
    Json(response): Json<PromptResponse>,
) -> StatusCode {
    match state.session(&id) {
        Some(session) => {
            session.adapter.respond(response);
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

fn status_snapshot(workflow: &Workflow) -> Value {
    let store = &*workflow.store;
    let user = workflow.user.as_str();

    let compute_settings = settings::load_compute(store, user).ok().flatten();
    let edge_settings = settings::load_edge(store, user).ok().flatten();

    // Best-effort live lookups; failures degrade to null.
    let compute_verified = secrets::load_token(store, user, Provider::Compute)
        .ok()
        .flatten()
        .map(|token| workflow.compute.verify_token(&token).is_ok());
    let edge_verified = secrets::load_token(store, user, Provider::Edge)
        .ok()
        .flatten()
        .map(|token| workflow.edge.verify_token(&token).is_ok());

    json!({
        "activeProfile": airlift::profile::active_id().ok().flatten(),
        "profiles": airlift::profile::list_ids().unwrap_or_default(),
        "compute": compute_settings,
        "edge": edge_settings,
        "computeVerified": compute_verified,
        "edgeVerified": edge_verified,
    })
}

async fn status(State(state): State<ServeState>) -> Result<Json<Value>, StatusCode> {
    let workflow = state.workflow.clone();
    let snapshot = tokio::task::spawn_blocking(move || status_snapshot(&workflow))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(snapshot))
}

fn router(state: ServeState) -> Router {
    Router::new()
        .route("/deploys", post(start_deploy))
        .route("/deploys/{id}/events", get(session_events))
        .route("/deploys/{id}/prompts", post(respond_prompt))
        .route("/status", get(status))
        .with_state(state)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    log_status!("serve", "Shutting down");
}

pub fn run(args: &ServeArgs) -> airlift::Result<i32> {
    let state = ServeState {
        workflow: Workflow::from_environment()?,
        sessions: Arc::new(Mutex::new(HashMap::new())),
    };
    let app = router(state);

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| Error::internal_io(e.to_string(), Some("start runtime".to_string())))?;

    runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(&args.listen)
            .await
            .map_err(|e| {
                Error::internal_io(e.to_string(), Some(format!("bind {}", args.listen)))
            })?;
        log_status!("serve", "Listening on http://{}", args.listen);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::internal_io(e.to_string(), Some("serve".to_string())))
    })?;

    Ok(0)
}
