//! Channel-backed stream adapter.
//!
//! Implements both the progress bus and the prompt bridge over bounded
//! queues so a deployment can be driven from a remote session. Progress is
//! drop-on-overflow telemetry; requires-response prompts get monotonic ids
//! and a pending-response table that `respond` completes exactly once.

use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::progress::{Emitter, ProgressEvent};
use crate::prompt::{PromptMessage, PromptResponse, Prompter};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};

pub const EVENT_QUEUE_CAPACITY: usize = 256;
pub const PROMPT_QUEUE_CAPACITY: usize = 16;

/// Consumer ends of a stream adapter: serialized progress events and
/// outbound prompt messages.
pub struct StreamChannels {
    pub events: Receiver<String>,
    pub prompts: Receiver<PromptMessage>,
}

struct AdapterInner {
    events_tx: Mutex<Option<SyncSender<String>>>,
    prompts_tx: Mutex<Option<SyncSender<PromptMessage>>>,
    pending: Mutex<HashMap<u64, SyncSender<PromptResponse>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

#[derive(Clone)]
pub struct StreamAdapter {
    inner: Arc<AdapterInner>,
}

impl StreamAdapter {
    pub fn bounded(event_capacity: usize, prompt_capacity: usize) -> (Self, StreamChannels) {
        let (events_tx, events_rx) = sync_channel(event_capacity);
        let (prompts_tx, prompts_rx) = sync_channel(prompt_capacity);
        let adapter = Self {
            inner: Arc::new(AdapterInner {
                events_tx: Mutex::new(Some(events_tx)),
                prompts_tx: Mutex::new(Some(prompts_tx)),
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        };
        (
            adapter,
            StreamChannels {
                events: events_rx,
                prompts: prompts_rx,
            },
        )
    }

    pub fn new() -> (Self, StreamChannels) {
        Self::bounded(EVENT_QUEUE_CAPACITY, PROMPT_QUEUE_CAPACITY)
    }

    /// Complete the matching pending prompt. Double-respond is a no-op;
    /// an unknown id is ignored.
    pub fn respond(&self, response: PromptResponse) {
        let waiter = self
            .inner
            .pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(&response.id));
        if let Some(tx) = waiter {
            let _ = tx.send(response);
        }
    }

    /// Close the adapter: drop both queue senders (consumers see
    /// disconnect) and cancel every pending prompt promptly. Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut tx) = self.inner.events_tx.lock() {
            tx.take();
        }
        if let Ok(mut tx) = self.inner.prompts_tx.lock() {
            tx.take();
        }
        if let Ok(mut pending) = self.inner.pending.lock() {
            for (id, tx) in pending.drain() {
                let _ = tx.send(PromptResponse {
                    id,
                    secret: None,
                    error: Some("session closed".to_string()),
                });
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// A dropped requires-response prompt can never be answered, so a full
    /// queue counts as failure here; notifications ignore the result.
    fn push_prompt(&self, msg: PromptMessage) -> bool {
        let Ok(guard) = self.inner.prompts_tx.lock() else {
            return false;
        };
        match guard.as_ref() {
            Some(tx) => !matches!(
                tx.try_send(msg),
                Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_))
            ),
            None => false,
        }
    }
}

impl Emitter for StreamAdapter {
    fn emit(&self, event: &ProgressEvent) {
        let Ok(line) = serde_json::to_string(event) else {
            return;
        };
        if let Ok(guard) = self.inner.events_tx.lock() {
            if let Some(tx) = guard.as_ref() {
                // Full or disconnected both drop the event.
                let _ = tx.try_send(line);
            }
        }
    }
}

impl Prompter for StreamAdapter {
    fn notify(&self, msg: &PromptMessage) {
        let mut msg = msg.clone();
        msg.id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        msg.requires_response = false;
        self.push_prompt(msg);
    }

    fn prompt_secret(&self, msg: &PromptMessage, deadline: Deadline) -> Result<String> {
        if self.is_closed() {
            return Err(Error::auth_prompt_cancelled("session closed"));
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = sync_channel(1);
        {
            let mut pending = self
                .inner
                .pending
                .lock()
                .map_err(|_| Error::auth_prompt_failed("pending table poisoned"))?;
            pending.insert(id, tx);
        }

        let mut outbound = msg.clone();
        outbound.id = id;
        outbound.requires_response = true;
        if !self.push_prompt(outbound) {
            if let Ok(mut pending) = self.inner.pending.lock() {
                pending.remove(&id);
            }
            return Err(Error::auth_prompt_failed("prompt channel unavailable"));
        }

        let received = match deadline.remaining() {
            Some(remaining) => rx.recv_timeout(remaining).map_err(|_| {
                Error::auth_prompt_cancelled("deadline exceeded while waiting for response")
            }),
            None => rx
                .recv()
                .map_err(|_| Error::auth_prompt_cancelled("session closed")),
        };

        // Whatever happened, the id must not linger in the table.
        if let Ok(mut pending) = self.inner.pending.lock() {
            pending.remove(&id);
        }

        let response = received?;
        if let Some(error) = response.error {
            return Err(Error::auth_prompt_failed(error));
        }
        Ok(response.secret.unwrap_or_default())
    }
}
