//! Gemini API client for vimini jobs.
//!
//! `GeminiClient` implements `vimini_job::TextGenerator` on top of the
//! blocking `reqwest` client. It is meant to be called from job worker
//! threads: a response stream blocks on the socket between events.

mod gemini;
mod sse;

use thiserror::Error;
use vimini_job::ProducerError;

pub use gemini::{
  DEFAULT_BASE_URL,
  DEFAULT_TIMEOUT,
  GeminiClient,
  ModelInfo,
};
pub use sse::{
  SseEvent,
  SseReader,
};

#[derive(Debug, Error)]
pub enum GenerateError {
  #[error("API key not set")]
  MissingApiKey,
  #[error("request failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("API returned {status}: {body}")]
  Status { status: u16, body: String },
  #[error("API error: {0}")]
  Api(String),
  #[error("malformed response: {0}")]
  Decode(#[from] serde_json::Error),
  #[error("failed to read response: {0}")]
  Io(#[from] std::io::Error),
}

impl From<GenerateError> for ProducerError {
  fn from(err: GenerateError) -> Self {
    ProducerError::new(err.to_string())
  }
}

pub type Result<T, E = GenerateError> = std::result::Result<T, E>;
