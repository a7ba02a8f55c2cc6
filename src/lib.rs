//! An opinionated, simple interface for talking to local LLMs.
//!
//! A [`Session`] offers one-shot generation and multi-turn chat against a
//! single [`Backend`]. The crate ships [`LlamaCppBackend`], which runs GGUF
//! models in-process with llama.cpp.
//!
//! ```no_run
//! use ezrunner::{EnvSource, LlamaCppBackend, Session};
//!
//! # fn main() -> ezrunner::Result<()> {
//! // MODEL_NAME=llama3.1 LLAMA_MODELS=/srv/models
//! let mut session = Session::new(&EnvSource::load()?, LlamaCppBackend::default())?;
//!
//! let story = session.generate("Once upon a time")?;
//! let reply = session.send_message("What is Rust?")?;
//! let follow_up = session.send_message("Why is it popular?")?;
//! assert_eq!(session.history().len(), 4);
//! # Ok(())
//! # }
//! ```
#![allow(
    clippy::cast_possible_wrap,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

pub mod backend;
pub mod chat;
pub mod config;
pub mod error;
mod generation;
pub mod model;
pub mod session;
pub mod storage;

pub use backend::{Backend, ChatReply, ChatResponse, GenerateResponse};
pub use chat::{ChatTemplateFormat, Role, Turn};
pub use config::{
    ConfigSource, EnvSource, MODEL_NAME_KEY, STORAGE_LOCATION_KEY, SessionConfig,
};
pub use error::{BackendError, Error, Result};
pub use model::{BackendParams, LlamaCppBackend};
pub use session::{ChatSession, Generator, Session, SessionState};
