//! Background jobs for a single-threaded host.
//!
//! Editors that embed a scripting host run everything on one control thread,
//! driven by a recurring timer. This crate lets that thread start long
//! running, streaming text requests without blocking:
//!
//! - `JobManager::start_job` registers callbacks and spawns one worker thread
//!   per job.
//! - Workers never see the callbacks. They push `Message`s onto a shared
//!   channel and nothing else.
//! - The host calls `JobManager::poll` from its timer. Poll drains the
//!   channel, runs the callbacks on the control thread and tells the host when
//!   the timer can be stopped.
//!
//! ## Producers
//!
//! A job is either a single streamed request (`Producer::StreamOnce`) or a
//! long lived session driven by a step function (`Producer::Stepped`), used
//! for interactive chat where new prompts arrive after the job started.

mod callbacks;
mod manager;
mod message;
mod producer;
mod worker;

pub use callbacks::Callbacks;
pub use manager::{
  DEFAULT_STEP_INTERVAL,
  JobError,
  JobManager,
  JobRequest,
  PollOutcome,
  PollTimer,
};
pub use message::{
  JobId,
  Message,
  MessageKind,
  Outbox,
};
pub use producer::{
  Content,
  Fragment,
  GenerationRequest,
  ProducerError,
  Producer,
  ResponseChunk,
  ResponseStream,
  Role,
  Step,
  StepFn,
  TEMPERATURE_RANGE,
  TextGenerator,
  validate_temperature,
};
pub use worker::{
  debug_assert_control_thread,
  on_worker_thread,
};
