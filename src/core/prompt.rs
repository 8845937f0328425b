//! Prompt bridge: interactive notify/secret-request abstraction.
//!
//! The same auth flows run against a terminal (Direct-IO) or a remote UI
//! (stream adapter, see `stream.rs`) without knowing which transport is
//! attached.

use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::providers::Provider;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptKind {
    Info,
    Token,
    Link,
}

/// One interactive request. `id` is assigned by the transport for
/// requires-response prompts (monotonic per run); direct-IO ignores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptMessage {
    pub id: u64,
    pub provider: Provider,
    pub kind: PromptKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    pub requires_response: bool,
}

impl PromptMessage {
    pub fn info(provider: Provider, message: impl Into<String>) -> Self {
        Self {
            id: 0,
            provider,
            kind: PromptKind::Info,
            message: message.into(),
            url: None,
            scopes: Vec::new(),
            requires_response: false,
        }
    }

    pub fn link(provider: Provider, message: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: PromptKind::Link,
            url: Some(url.into()),
            ..Self::info(provider, message)
        }
    }

    pub fn token(provider: Provider, message: impl Into<String>) -> Self {
        Self {
            kind: PromptKind::Token,
            requires_response: true,
            ..Self::info(provider, message)
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }
}

/// Resolution of a requires-response prompt: exactly one of secret/error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Transport-agnostic interactive bridge.
pub trait Prompter: Send {
    /// Display an informational or link prompt. Best-effort; a link prompt
    /// must at least surface the URL to the human.
    fn notify(&self, msg: &PromptMessage);

    /// Block until a human supplies a value or the deadline passes.
    ///
    /// Blank input is a valid response (it fails downstream verification);
    /// only transport failure or deadline expiry produce errors.
    fn prompt_secret(&self, msg: &PromptMessage, deadline: Deadline) -> Result<String>;

    /// Requires-response info prompt used for warning confirmation.
    /// Empty input or anything not starting with 'n' means continue.
    fn confirm(&self, msg: &PromptMessage, deadline: Deadline) -> Result<bool> {
        let answer = self.prompt_secret(msg, deadline)?;
        Ok(!answer.trim().to_lowercase().starts_with('n'))
    }
}

/// Synchronous prompter over attached streams (stdin/stderr for the CLI).
pub struct DirectIoPrompter<R: BufRead + Send, W: Write + Send> {
    input: Mutex<R>,
    output: Mutex<W>,
}

impl DirectIoPrompter<std::io::BufReader<std::io::Stdin>, std::io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(std::io::BufReader::new(std::io::stdin()), std::io::stderr())
    }
}

impl<R: BufRead + Send, W: Write + Send> DirectIoPrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
        }
    }

    fn write_message(&self, msg: &PromptMessage) {
        if let Ok(mut out) = self.output.lock() {
            let _ = writeln!(out, "[{}] {}", msg.provider, msg.message);
            if let Some(url) = &msg.url {
                let _ = writeln!(out, "[{}]   {}", msg.provider, url);
            }
            let _ = out.flush();
        }
    }
}

impl<R: BufRead + Send, W: Write + Send> Prompter for DirectIoPrompter<R, W> {
    fn notify(&self, msg: &PromptMessage) {
        self.write_message(msg);
    }

    fn prompt_secret(&self, msg: &PromptMessage, deadline: Deadline) -> Result<String> {
        deadline.check("interactive prompt")?;
        self.write_message(msg);
        if let Ok(mut out) = self.output.lock() {
            let _ = write!(out, "> ");
            let _ = out.flush();
        }

        let mut line = String::new();
        let mut input = self
            .input
            .lock()
            .map_err(|_| Error::auth_prompt_failed("prompt input poisoned"))?;
        input
            .read_line(&mut line)
            .map_err(|e| Error::auth_prompt_failed(format!("failed to read input: {}", e)))?;

        Ok(line.trim().to_string())
    }
}

/// Broadcasts `notify` to both members; `prompt_secret` asks the primary and
/// falls back to the secondary only when the primary yields no value and no
/// error.
pub struct ChainPrompter {
    primary: Box<dyn Prompter>,
    secondary: Box<dyn Prompter>,
}

impl ChainPrompter {
    pub fn new(primary: Box<dyn Prompter>, secondary: Box<dyn Prompter>) -> Self {
        Self { primary, secondary }
    }
}

impl Prompter for ChainPrompter {
    fn notify(&self, msg: &PromptMessage) {
        self.primary.notify(msg);
        self.secondary.notify(msg);
    }

    fn prompt_secret(&self, msg: &PromptMessage, deadline: Deadline) -> Result<String> {
        let value = self.primary.prompt_secret(msg, deadline)?;
        if value.is_empty() {
            return self.secondary.prompt_secret(msg, deadline);
        }
        Ok(value)
    }
}

/// Prompter for non-interactive contexts: notifications are dropped and any
/// secret request fails immediately.
pub struct NonInteractivePrompter;

impl Prompter for NonInteractivePrompter {
    fn notify(&self, _msg: &PromptMessage) {}

    fn prompt_secret(&self, _msg: &PromptMessage, _deadline: Deadline) -> Result<String> {
        Err(Error::auth_prompt_failed(
            "interactive input required but no prompt transport is attached",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn token_msg() -> PromptMessage {
        PromptMessage::token(Provider::Compute, "Paste token")
    }

    #[test]
    fn direct_io_reads_trimmed_line() {
        let prompter = DirectIoPrompter::new(Cursor::new(b"  secret-value \n".to_vec()), Vec::new());
        let value = prompter
            .prompt_secret(&token_msg(), Deadline::none())
            .unwrap();
        assert_eq!(value, "secret-value");
    }

    #[test]
    fn direct_io_notify_prints_url() {
        let prompter = DirectIoPrompter::new(Cursor::new(Vec::new()), Vec::new());
        prompter.notify(&PromptMessage::link(
            Provider::Edge,
            "Open the dashboard",
            "https://dash.canopy.dev/tokens",
        ));
        let out = prompter.output.into_inner().unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("https://dash.canopy.dev/tokens"));
    }

    #[test]
    fn chain_falls_back_only_on_empty_primary() {
        let chain = ChainPrompter::new(
            Box::new(DirectIoPrompter::new(Cursor::new(b"\n".to_vec()), Vec::new())),
            Box::new(DirectIoPrompter::new(
                Cursor::new(b"from-secondary\n".to_vec()),
                Vec::new(),
            )),
        );
        let value = chain.prompt_secret(&token_msg(), Deadline::none()).unwrap();
        assert_eq!(value, "from-secondary");
    }

    #[test]
    fn chain_propagates_primary_error_without_fallback() {
        let chain = ChainPrompter::new(
            Box::new(NonInteractivePrompter),
            Box::new(DirectIoPrompter::new(
                Cursor::new(b"unused\n".to_vec()),
                Vec::new(),
            )),
        );
        let err = chain
            .prompt_secret(&token_msg(), Deadline::none())
            .unwrap_err();
        assert_eq!(err.code.as_str(), "auth.prompt_failed");
    }

    #[test]
    fn confirm_defaults_to_yes_on_blank() {
        let prompter = DirectIoPrompter::new(Cursor::new(b"\n".to_vec()), Vec::new());
        let msg = PromptMessage::info(Provider::Edge, "Continue anyway?");
        assert!(prompter.confirm(&msg, Deadline::none()).unwrap());

        let prompter = DirectIoPrompter::new(Cursor::new(b"no\n".to_vec()), Vec::new());
        assert!(!prompter.confirm(&msg, Deadline::none()).unwrap());
    }
}
