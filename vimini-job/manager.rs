//! The job registry and the poll loop that drains worker output.

use std::{
  collections::HashMap,
  fmt,
  io,
  panic::{
    self,
    AssertUnwindSafe,
  },
  sync::Arc,
  thread::{
    self,
    ThreadId,
  },
  time::Duration,
};

use crossbeam::channel::{
  self,
  Receiver,
  Sender,
};
use thiserror::Error;

use crate::{
  callbacks::Callbacks,
  message::{
    JobId,
    Message,
    MessageKind,
    Outbox,
  },
  producer::{
    GenerationRequest,
    Producer,
    SharedGenerator,
    TextGenerator,
  },
  worker::{
    self,
    Task,
    panic_message,
  },
};

/// Pause between two calls of a session's step function.
pub const DEFAULT_STEP_INTERVAL: Duration = Duration::from_millis(100);

/// The host's recurring timer. `JobManager` starts it when a job is started
/// and stops it once no job is left.
pub trait PollTimer {
  fn start(&mut self);
  fn stop(&mut self);
}

#[derive(Debug, Error)]
pub enum JobError {
  #[error("job {0} has no client to run against")]
  NoClient(JobId),
  #[error("job {0} was never reserved")]
  UnknownJob(JobId),
  #[error("failed to spawn worker for job {job_id}")]
  Spawn {
    job_id: JobId,
    #[source]
    source: io::Error,
  },
}

/// Everything needed to start (or restart) a job.
pub struct JobRequest {
  name:      String,
  producer:  Producer,
  callbacks: Callbacks,
  job_id:    Option<JobId>,
  client:    Option<Arc<dyn TextGenerator>>,
}

impl JobRequest {
  pub fn new(name: impl Into<String>, producer: Producer) -> Self {
    Self {
      name: name.into(),
      producer,
      callbacks: Callbacks::default(),
      job_id: None,
      client: None,
    }
  }

  pub fn callbacks(mut self, callbacks: Callbacks) -> Self {
    self.callbacks = callbacks;
    self
  }

  /// Run under an id reserved earlier instead of reserving a new one. An
  /// existing registry entry for that id is replaced.
  pub fn job_id(mut self, job_id: JobId) -> Self {
    self.job_id = Some(job_id);
    self
  }

  /// Client for `Producer::StreamOnce`. Without one, the client stored for
  /// the job id is used.
  pub fn client(mut self, client: Arc<dyn TextGenerator>) -> Self {
    self.client = Some(client);
    self
  }
}

impl fmt::Debug for JobRequest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("JobRequest")
      .field("name", &self.name)
      .field("producer", &self.producer)
      .field("callbacks", &self.callbacks)
      .field("job_id", &self.job_id)
      .field("client", &self.client.is_some())
      .finish()
  }
}

/// What a single `poll` did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
  /// Number of queue messages handled.
  pub dispatched: usize,
  /// One status line summarizing the latest event, prefixed by its job id.
  pub status:     Option<String>,
  /// No job is left; the host timer was asked to stop.
  pub idle:       bool,
}

/// Owns the job id counter, the callback registry and the queue.
///
/// All methods must be called from the thread that created the manager (the
/// host's control thread). Worker threads only ever see an `Outbox`.
pub struct JobManager {
  next_id:       JobId,
  names:         HashMap<JobId, String>,
  jobs:          HashMap<JobId, Callbacks>,
  clients:       HashMap<JobId, SharedGenerator>,
  tx:            Sender<Message>,
  rx:            Receiver<Message>,
  timer:         Box<dyn PollTimer>,
  timer_running: bool,
  step_interval: Duration,
  owner:         ThreadId,
}

impl JobManager {
  pub fn new(timer: impl PollTimer + 'static) -> Self {
    let (tx, rx) = channel::unbounded();
    Self {
      next_id: 1,
      names: HashMap::new(),
      jobs: HashMap::new(),
      clients: HashMap::new(),
      tx,
      rx,
      timer: Box::new(timer),
      timer_running: false,
      step_interval: DEFAULT_STEP_INTERVAL,
      owner: thread::current().id(),
    }
  }

  pub fn with_step_interval(mut self, interval: Duration) -> Self {
    self.step_interval = interval;
    self
  }

  #[track_caller]
  fn assert_control_thread(&self) {
    debug_assert_eq!(
      thread::current().id(),
      self.owner,
      "JobManager used off its control thread"
    );
  }

  /// Reserves a fresh job id. Ids start at 1 and only grow.
  pub fn reserve_job_id(&mut self, name: impl Into<String>) -> JobId {
    self.assert_control_thread();
    let id = self.next_id;
    self.next_id += 1;
    let name = name.into();
    log::debug!("job {id}: reserved ({name})");
    self.names.insert(id, name);
    id
  }

  /// Registers the callbacks, spawns the worker and makes sure the host timer
  /// runs. Never blocks on the producer.
  pub fn start_job(&mut self, request: JobRequest) -> Result<JobId, JobError> {
    self.assert_control_thread();
    let JobRequest {
      name,
      producer,
      callbacks,
      job_id,
      client,
    } = request;

    let job_id = match job_id {
      Some(id) if id == 0 || id >= self.next_id => return Err(JobError::UnknownJob(id)),
      Some(id) => id,
      None => self.reserve_job_id(name.as_str()),
    };

    if let Some(client) = client {
      self.clients.insert(job_id, client);
    }

    let task = match producer {
      Producer::StreamOnce(request) => {
        let client = self
          .clients
          .get(&job_id)
          .cloned()
          .ok_or(JobError::NoClient(job_id))?;
        Task::Stream { client, request }
      },
      Producer::Stepped { step, verbose } => {
        Task::Stepped {
          step,
          verbose,
          interval: self.step_interval,
        }
      },
    };

    let previous = self.jobs.insert(job_id, callbacks);
    if previous.is_some() {
      log::debug!("job {job_id}: replacing callbacks of running job");
    }

    if let Err(source) = worker::spawn(Outbox::new(job_id, self.tx.clone()), task) {
      self.jobs.remove(&job_id);
      return Err(JobError::Spawn { job_id, source });
    }

    log::info!("job {job_id}: started ({})", self.name(job_id).unwrap_or(&name));
    if !self.timer_running {
      self.timer.start();
      self.timer_running = true;
    }
    Ok(job_id)
  }

  /// Sends a follow-up request under an existing id, reusing the client that
  /// job ran against. Callbacks have to be supplied again.
  pub fn continue_job(
    &mut self,
    job_id: JobId,
    request: GenerationRequest,
    callbacks: Callbacks,
  ) -> Result<JobId, JobError> {
    let name = self
      .names
      .get(&job_id)
      .cloned()
      .ok_or(JobError::UnknownJob(job_id))?;
    self.start_job(
      JobRequest::new(name, Producer::StreamOnce(request))
        .job_id(job_id)
        .callbacks(callbacks),
    )
  }

  /// Drains every queued message and runs the matching callbacks.
  ///
  /// Meant to be called from the host's timer. Messages for jobs that are no
  /// longer registered are dropped. A panicking callback is logged and does
  /// not keep the remaining messages from being handled.
  pub fn poll(&mut self) -> PollOutcome {
    self.assert_control_thread();
    let mut outcome = PollOutcome::default();

    while let Ok(message) = self.rx.try_recv() {
      outcome.dispatched += 1;
      if let Some(status) = self.dispatch(message) {
        outcome.status = Some(status);
      }
    }

    if self.jobs.is_empty() {
      self.timer.stop();
      self.timer_running = false;
      outcome.idle = true;
    }
    outcome
  }

  fn dispatch(&mut self, message: Message) -> Option<String> {
    let Message { job_id, kind } = message;
    if !self.jobs.contains_key(&job_id) {
      log::debug!("job {job_id}: dropping message for inactive job");
      return None;
    }

    let status = match kind {
      MessageKind::Chunk(text) => {
        let callbacks = self.jobs.get_mut(&job_id)?;
        if let Some(hook) = callbacks.on_chunk.as_mut() {
          guarded(job_id, "on_chunk", || hook(&text));
        }
        callbacks.status_message.clone()
      },
      MessageKind::Thought(text) => {
        let callbacks = self.jobs.get_mut(&job_id)?;
        if let Some(hook) = callbacks.on_thought.as_mut() {
          guarded(job_id, "on_thought", || hook(&text));
        }
        callbacks.status_message.clone()
      },
      MessageKind::Error(error) => {
        let callbacks = self.jobs.remove(&job_id)?;
        log::info!("job {job_id}: failed: {error}");
        callbacks
          .on_error
          .and_then(|hook| guarded(job_id, "on_error", || hook(&error)))
          .flatten()
          .or_else(|| Some(format!("Error: {error}")))
      },
      MessageKind::Finish => {
        let callbacks = self.jobs.remove(&job_id)?;
        log::info!("job {job_id}: finished");
        if let Some(hook) = callbacks.on_finish {
          guarded(job_id, "on_finish", hook);
        }
        Some("Done".to_string())
      },
    };

    status.map(|text| format!("[Job {job_id}] {text}"))
  }

  /// Whether the job still has registered callbacks.
  pub fn is_active(&self, job_id: JobId) -> bool {
    self.jobs.contains_key(&job_id)
  }

  /// Ids of all running jobs, ascending.
  pub fn active_jobs(&self) -> Vec<JobId> {
    let mut ids: Vec<JobId> = self.jobs.keys().copied().collect();
    ids.sort_unstable();
    ids
  }

  pub fn name(&self, job_id: JobId) -> Option<&str> {
    self.names.get(&job_id).map(String::as_str)
  }

  /// The client a job ran against, kept after the job finished.
  pub fn client(&self, job_id: JobId) -> Option<Arc<dyn TextGenerator>> {
    self.clients.get(&job_id).cloned()
  }

  /// Messages waiting for the next poll.
  pub fn queued(&self) -> usize {
    self.rx.len()
  }

  /// Whether the host timer is currently requested.
  pub fn is_polling(&self) -> bool {
    self.timer_running
  }

  /// A posting handle for `job_id`, equivalent to what its worker holds.
  pub fn outbox(&self, job_id: JobId) -> Outbox {
    Outbox::new(job_id, self.tx.clone())
  }
}

impl fmt::Debug for JobManager {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("JobManager")
      .field("next_id", &self.next_id)
      .field("active", &self.active_jobs())
      .field("queued", &self.queued())
      .field("timer_running", &self.timer_running)
      .finish()
  }
}

fn guarded<R>(job_id: JobId, hook: &str, f: impl FnOnce() -> R) -> Option<R> {
  match panic::catch_unwind(AssertUnwindSafe(f)) {
    Ok(value) => Some(value),
    Err(payload) => {
      log::error!(
        "job {job_id}: {hook} callback panicked: {}",
        panic_message(payload.as_ref())
      );
      None
    },
  }
}
