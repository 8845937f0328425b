//! Progress bus for the deployment workflow.
//!
//! One event is emitted per phase transition. Emission is observational only:
//! no emitter may block the workflow indefinitely, and the channel emitter
//! drops events when its queue is full rather than applying backpressure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::Mutex;

/// Fixed linear phase machine for one deployment run. `Failed` is reachable
/// from every non-terminal phase; there are no backward transitions and no
/// skips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Started,
    ComputeAuth,
    ComputeAuthCompleted,
    EdgeAuth,
    EdgeAuthCompleted,
    Deploying,
    DnsReconcile,
    Succeeded,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Started => "started",
            Phase::ComputeAuth => "compute-auth",
            Phase::ComputeAuthCompleted => "compute-auth-completed",
            Phase::EdgeAuth => "edge-auth",
            Phase::EdgeAuthCompleted => "edge-auth-completed",
            Phase::Deploying => "deploying",
            Phase::DnsReconcile => "dns-reconcile",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one phase transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub phase: Phase,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub detail: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(phase: Phase, message: impl Into<String>, detail: BTreeMap<String, String>) -> Self {
        Self {
            phase,
            message: message.into(),
            detail,
            timestamp: Utc::now(),
        }
    }
}

/// Receives phase events. Implementations must not block the workflow
/// indefinitely.
pub trait Emitter: Send {
    fn emit(&self, event: &ProgressEvent);
}

/// Emitter that ignores everything. Used when a caller wants a silent run.
pub struct NullEmitter;

impl Emitter for NullEmitter {
    fn emit(&self, _event: &ProgressEvent) {}
}

/// Human-readable phase rendering onto an owned writer (stderr for the CLI).
pub struct TextEmitter<W: Write + Send> {
    out: Mutex<W>,
}

impl TextEmitter<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write + Send> TextEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    fn render(event: &ProgressEvent) -> String {
        match event.phase {
            Phase::Succeeded => {
                let mut line = format!("[deploy] {}", event.message);
                for key in ["image", "releaseId", "elapsedMs", "hostname"] {
                    if let Some(value) = event.detail.get(key) {
                        line.push_str(&format!("\n[deploy]   {}: {}", key, value));
                    }
                }
                line
            }
            Phase::Failed => {
                let mut line = format!("[deploy] failed: {}", event.message);
                if let Some(phase) = event.detail.get("phase") {
                    line.push_str(&format!(" (during {})", phase));
                }
                line
            }
            _ => format!("[deploy] {}: {}", event.phase, event.message),
        }
    }
}

impl<W: Write + Send> Emitter for TextEmitter<W> {
    fn emit(&self, event: &ProgressEvent) {
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{}", Self::render(event));
            let _ = out.flush();
        }
    }
}

/// One serde-encoded event per line, for automation and log shipping.
pub struct JsonLinesEmitter<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }
}

impl JsonLinesEmitter<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write + Send> Emitter for JsonLinesEmitter<W> {
    fn emit(&self, event: &ProgressEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            if let Ok(mut out) = self.out.lock() {
                let _ = writeln!(out, "{}", line);
                let _ = out.flush();
            }
        }
    }
}

/// Non-blocking send of the serialized event into a bounded queue.
///
/// A full queue drops the event: progress is telemetry, never control flow,
/// so a stalled consumer must not stall the deployment.
pub struct ChannelEmitter {
    tx: SyncSender<String>,
}

impl ChannelEmitter {
    pub fn new(tx: SyncSender<String>) -> Self {
        Self { tx }
    }
}

impl Emitter for ChannelEmitter {
    fn emit(&self, event: &ProgressEvent) {
        let Ok(line) = serde_json::to_string(event) else {
            return;
        };
        match self.tx.try_send(line) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                // The queue bound is the backpressure policy: drop.
            }
        }
    }
}

/// Forwards one event to every member independently, so a stalled consumer
/// cannot block the others.
pub struct FanoutEmitter {
    members: Vec<Box<dyn Emitter>>,
}

impl FanoutEmitter {
    pub fn new(members: Vec<Box<dyn Emitter>>) -> Self {
        Self { members }
    }
}

impl Emitter for FanoutEmitter {
    fn emit(&self, event: &ProgressEvent) {
        for member in &self.members {
            member.emit(event);
        }
    }
}

/// Emitter that records events in memory. Test support.
#[derive(Default)]
pub struct CollectingEmitter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.events
            .lock()
            .map(|events| events.iter().map(|e| e.phase).collect())
            .unwrap_or_default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl Emitter for CollectingEmitter {
    fn emit(&self, event: &ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn event(phase: Phase) -> ProgressEvent {
        ProgressEvent::new(phase, "msg", BTreeMap::new())
    }

    #[test]
    fn events_serialize_with_kebab_case_phases() {
        let line = serde_json::to_string(&event(Phase::DnsReconcile)).unwrap();
        assert!(line.contains("\"dns-reconcile\""));
        let parsed: ProgressEvent = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed.phase, Phase::DnsReconcile);
    }

    #[test]
    fn channel_emitter_drops_on_full_queue_without_blocking() {
        let (tx, rx) = mpsc::sync_channel(1);
        let emitter = ChannelEmitter::new(tx);
        emitter.emit(&event(Phase::Started));
        emitter.emit(&event(Phase::ComputeAuth)); // queue full: dropped
        emitter.emit(&event(Phase::EdgeAuth)); // still dropped, still no block

        let first: ProgressEvent = serde_json::from_str(&rx.recv().unwrap()).unwrap();
        assert_eq!(first.phase, Phase::Started);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn fanout_reaches_all_members() {
        let (tx_a, rx_a) = mpsc::sync_channel(4);
        let (tx_b, rx_b) = mpsc::sync_channel(4);
        let fanout = FanoutEmitter::new(vec![
            Box::new(ChannelEmitter::new(tx_a)),
            Box::new(ChannelEmitter::new(tx_b)),
        ]);
        fanout.emit(&event(Phase::Deploying));
        assert!(rx_a.recv().unwrap().contains("deploying"));
        assert!(rx_b.recv().unwrap().contains("deploying"));
    }

    #[test]
    fn fanout_survives_one_stalled_member() {
        let (tx_full, _rx_full) = mpsc::sync_channel(0);
        let (tx_ok, rx_ok) = mpsc::sync_channel(4);
        let fanout = FanoutEmitter::new(vec![
            Box::new(ChannelEmitter::new(tx_full)),
            Box::new(ChannelEmitter::new(tx_ok)),
        ]);
        fanout.emit(&event(Phase::Started));
        assert!(rx_ok.recv().unwrap().contains("started"));
    }

    #[test]
    fn text_emitter_formats_success_detail() {
        let mut detail = BTreeMap::new();
        detail.insert("image".to_string(), "reg/app:latest".to_string());
        detail.insert("releaseId".to_string(), "rel_42".to_string());
        let rendered =
            TextEmitter::<Vec<u8>>::render(&ProgressEvent::new(Phase::Succeeded, "done", detail));
        assert!(rendered.contains("image: reg/app:latest"));
        assert!(rendered.contains("releaseId: rel_42"));
    }
}
