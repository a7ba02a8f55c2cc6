//! Conversation sessions.
//!
//! A [`Session`] pairs a resolved [`SessionConfig`] with a [`Backend`] and
//! offers two independent ways to talk to the model: one-shot generation,
//! which never looks at the conversation, and chat, which records every user
//! and assistant turn and resends the whole transcript on each call.

use crate::backend::Backend;
use crate::chat::{Role, Turn};
use crate::config::{ConfigSource, SessionConfig};
use crate::error::{BackendError, Result};
use std::path::Path;
use tracing::{debug, info};

/// Stateless text generation
pub trait Generator {
    /// Generate text from `prompt` without any conversational context
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Multi-turn conversation with a recorded transcript
pub trait ChatSession {
    /// Send a user message and return the assistant's reply
    fn send_message(&mut self, prompt: &str) -> Result<String>;

    /// Forget the conversation so far
    fn reset(&mut self);

    /// The transcript so far
    fn history(&self) -> &[Turn];
}

/// Whether a session has any conversation recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No turns recorded
    Fresh,
    /// At least one turn recorded
    Active,
}

/// One conversation with a model.
///
/// Sessions do no locking; share one across callers only if they take turns.
#[derive(Debug)]
pub struct Session<B> {
    config: SessionConfig,
    backend: B,
    history: Vec<Turn>,
}

impl<B: Backend> Session<B> {
    /// Resolve configuration from `source` and create a session.
    ///
    /// Fails with [`Error::ConfigError`](crate::Error::ConfigError) before
    /// touching the backend if the model identifier is missing.
    pub fn new(source: &impl ConfigSource, backend: B) -> Result<Self> {
        let config = SessionConfig::resolve(source)?;
        Ok(Self::from_config(config, backend))
    }

    /// Create a session from an already resolved configuration.
    ///
    /// The storage location, if any, is forwarded to the process-wide backend
    /// configuration here, before the session can make any backend call.
    pub fn from_config(config: SessionConfig, backend: B) -> Self {
        config.apply();
        info!("Model '{}' is ready to use.", config.model());
        Self {
            config,
            backend,
            history: Vec::new(),
        }
    }

    /// The model identifier sent with every backend call
    pub fn model(&self) -> &str {
        self.config.model()
    }

    /// The model storage location, if one was configured
    pub fn storage_location(&self) -> Option<&Path> {
        self.config.storage_location()
    }

    /// The session's configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The backend this session talks to
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The recorded transcript, oldest turn first
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// The most recent turn
    pub fn last_turn(&self) -> Option<&Turn> {
        self.history.last()
    }

    /// Whether any turns are recorded
    pub fn state(&self) -> SessionState {
        if self.history.is_empty() {
            SessionState::Fresh
        } else {
            SessionState::Active
        }
    }

    /// Generate text from `prompt`. The transcript is neither read nor changed.
    pub fn generate(&self, prompt: &str) -> Result<String> {
        debug!(model = %self.model(), "Generating");
        let response = self.backend.generate(self.model(), prompt)?;
        Ok(response.text)
    }

    /// Send `prompt` as the next user turn and return the assistant's reply.
    ///
    /// The user turn is recorded before the backend is called and stays in the
    /// transcript if the call fails, so the caller can inspect the history and
    /// decide how to retry. On success the reply is recorded as an assistant
    /// turn.
    pub fn send_message(&mut self, prompt: &str) -> Result<String> {
        self.history.push(Turn::user(prompt));
        debug!(model = %self.model(), turns = self.history.len(), "Sending transcript");

        let response = self.backend.chat(self.config.model(), &self.history)?;
        if response.message.role != Role::Assistant {
            return Err(BackendError::MalformedResponse(format!(
                "expected an assistant reply, got a {} message",
                response.message.role
            ))
            .into());
        }

        let reply = response.message.content;
        self.history.push(Turn::assistant(reply.clone()));
        Ok(reply)
    }

    /// Clear the transcript. Configuration is kept.
    pub fn reset(&mut self) {
        self.history.clear();
        info!("Chat history reset");
    }
}

impl<B: Backend> Generator for Session<B> {
    fn generate(&self, prompt: &str) -> Result<String> {
        Session::generate(self, prompt)
    }
}

impl<B: Backend> ChatSession for Session<B> {
    fn send_message(&mut self, prompt: &str) -> Result<String> {
        Session::send_message(self, prompt)
    }

    fn reset(&mut self) {
        Session::reset(self)
    }

    fn history(&self) -> &[Turn] {
        Session::history(self)
    }
}
