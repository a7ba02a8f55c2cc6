//! The inference backend a session talks to.
//!
//! A backend exposes two synchronous capabilities: one-shot generation from a
//! raw prompt and a chat call over a whole transcript. Both address a model by
//! its identifier and may fail for any reason; failures are reported as
//! [`Error::BackendError`](crate::Error::BackendError).

use crate::chat::{Role, Turn};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Result of a one-shot generation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// The generated text
    pub text: String,
}

/// The reply message carried by a [`ChatResponse`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    /// Role of the reply's author
    #[serde(default = "assistant_role")]
    pub role: Role,
    /// The reply text
    pub content: String,
}

fn assistant_role() -> Role {
    Role::Assistant
}

/// Result of a chat call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The assistant's reply
    pub message: ChatReply,
}

impl ChatResponse {
    /// A response carrying an assistant reply
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            message: ChatReply {
                role: Role::Assistant,
                content: content.into(),
            },
        }
    }
}

/// A text generation backend
pub trait Backend {
    /// Generate text from `prompt` with no conversational context
    fn generate(&self, model: &str, prompt: &str) -> Result<GenerateResponse>;

    /// Produce the next assistant message for the transcript `messages`
    fn chat(&self, model: &str, messages: &[Turn]) -> Result<ChatResponse>;
}

impl<B: Backend + ?Sized> Backend for &B {
    fn generate(&self, model: &str, prompt: &str) -> Result<GenerateResponse> {
        (**self).generate(model, prompt)
    }

    fn chat(&self, model: &str, messages: &[Turn]) -> Result<ChatResponse> {
        (**self).chat(model, messages)
    }
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn generate(&self, model: &str, prompt: &str) -> Result<GenerateResponse> {
        (**self).generate(model, prompt)
    }

    fn chat(&self, model: &str, messages: &[Turn]) -> Result<ChatResponse> {
        (**self).chat(model, messages)
    }
}

impl<B: Backend + ?Sized> Backend for Rc<B> {
    fn generate(&self, model: &str, prompt: &str) -> Result<GenerateResponse> {
        (**self).generate(model, prompt)
    }

    fn chat(&self, model: &str, messages: &[Turn]) -> Result<ChatResponse> {
        (**self).chat(model, messages)
    }
}
