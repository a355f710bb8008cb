//! What a worker thread runs: streaming text requests and step functions.

use std::{
  fmt,
  ops::RangeInclusive,
  sync::Arc,
};

use serde::{
  Deserialize,
  Serialize,
};
use thiserror::Error;

/// Temperatures accepted by the generation API.
pub const TEMPERATURE_RANGE: RangeInclusive<f32> = 0.0..=2.0;

/// The only failure a producer reports back: a description of what went
/// wrong. Network, decoding and API errors all collapse into this.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProducerError {
  message: String,
}

impl ProducerError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
    }
  }

  pub fn message(&self) -> &str {
    &self.message
  }
}

/// One piece of text inside a streamed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
  pub text:    String,
  /// Auxiliary reasoning output rather than part of the answer.
  pub thought: bool,
}

impl Fragment {
  pub fn text(text: impl Into<String>) -> Self {
    Self {
      text:    text.into(),
      thought: false,
    }
  }

  pub fn thought(text: impl Into<String>) -> Self {
    Self {
      text:    text.into(),
      thought: true,
    }
  }
}

/// A single item of a response stream. May carry no fragments at all (for
/// example a usage-only event).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseChunk {
  pub fragments: Vec<Fragment>,
}

impl ResponseChunk {
  pub fn new(fragments: Vec<Fragment>) -> Self {
    Self { fragments }
  }

  /// A chunk holding one ordinary text fragment.
  pub fn text(text: impl Into<String>) -> Self {
    Self::new(vec![Fragment::text(text)])
  }

  /// Concatenated non-thought text of this chunk.
  pub fn answer_text(&self) -> String {
    self
      .fragments
      .iter()
      .filter(|fragment| !fragment.thought)
      .map(|fragment| fragment.text.as_str())
      .collect()
  }
}

impl From<Vec<Fragment>> for ResponseChunk {
  fn from(fragments: Vec<Fragment>) -> Self {
    Self::new(fragments)
  }
}

/// A blocking sequence of response chunks. Errors may surface at any item.
pub type ResponseStream = Box<dyn Iterator<Item = Result<ResponseChunk, ProducerError>> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  User,
  Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
  pub role: Role,
  pub text: String,
}

impl Content {
  pub fn user(text: impl Into<String>) -> Self {
    Self {
      role: Role::User,
      text: text.into(),
    }
  }

  pub fn model(text: impl Into<String>) -> Self {
    Self {
      role: Role::Model,
      text: text.into(),
    }
  }
}

/// Everything a `TextGenerator` needs to answer one request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
  pub model:              String,
  pub contents:           Vec<Content>,
  pub temperature:        Option<f32>,
  /// Ask for thought fragments and forward them to `on_thought`.
  pub verbose:            bool,
  pub response_mime_type: Option<String>,
}

impl GenerationRequest {
  /// A single-turn request.
  pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
    Self::conversation(model, vec![Content::user(prompt)])
  }

  pub fn conversation(model: impl Into<String>, contents: Vec<Content>) -> Self {
    Self {
      model: model.into(),
      contents,
      temperature: None,
      verbose: false,
      response_mime_type: None,
    }
  }

  /// Sets the temperature. Values outside `TEMPERATURE_RANGE` are dropped
  /// with a warning and the API default is used instead.
  pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
    self.temperature = temperature.and_then(|value| {
      let valid = validate_temperature(value);
      if valid.is_none() {
        log::warn!("temperature {value} is outside {TEMPERATURE_RANGE:?}, using the default");
      }
      valid
    });
    self
  }

  pub fn with_verbose(mut self, verbose: bool) -> Self {
    self.verbose = verbose;
    self
  }

  pub fn with_response_mime_type(mut self, mime_type: impl Into<String>) -> Self {
    self.response_mime_type = Some(mime_type.into());
    self
  }
}

/// Returns the temperature if the API accepts it.
pub fn validate_temperature(value: f32) -> Option<f32> {
  TEMPERATURE_RANGE.contains(&value).then_some(value)
}

/// The network client as seen by a job: start a streamed generation.
///
/// Called from worker threads only, so implementations may block.
pub trait TextGenerator: Send + Sync {
  fn generate_stream(&self, request: &GenerationRequest) -> Result<ResponseStream, ProducerError>;
}

/// Result of one call to a session's step function.
pub enum Step {
  /// Nothing new since the last call. The worker sleeps and asks again.
  Idle { seen: u64 },
  /// New input arrived; `stream` is the reply to forward. `seen` is the
  /// counter value the reply answers.
  Reply { seen: u64, stream: ResponseStream },
  /// The session is over. The worker posts `finish` and exits.
  End { reason: String },
}

impl fmt::Debug for Step {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Idle { seen } => f.debug_struct("Idle").field("seen", seen).finish(),
      Self::Reply { seen, .. } => f.debug_struct("Reply").field("seen", seen).finish_non_exhaustive(),
      Self::End { reason } => f.debug_struct("End").field("reason", reason).finish(),
    }
  }
}

/// Step function of a long lived session. Receives the last counter value the
/// worker has seen (0 before the first call). An `Err` ends the job with an
/// error.
pub type StepFn = Box<dyn FnMut(u64) -> Result<Step, ProducerError> + Send>;

/// The work a job performs.
pub enum Producer {
  /// One streamed request against the job's client.
  StreamOnce(GenerationRequest),
  /// A session that keeps its worker alive, asking `step` for new replies
  /// until it reports `Step::End`.
  Stepped { step: StepFn, verbose: bool },
}

impl Producer {
  pub fn stepped(step: impl FnMut(u64) -> Result<Step, ProducerError> + Send + 'static) -> Self {
    Self::Stepped {
      step:    Box::new(step),
      verbose: false,
    }
  }
}

impl fmt::Debug for Producer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::StreamOnce(request) => f.debug_tuple("StreamOnce").field(request).finish(),
      Self::Stepped { verbose, .. } => {
        f.debug_struct("Stepped")
          .field("verbose", verbose)
          .finish_non_exhaustive()
      },
    }
  }
}

/// Shared handle to a client, stored per job so a conversation can continue.
pub(crate) type SharedGenerator = Arc<dyn TextGenerator>;
