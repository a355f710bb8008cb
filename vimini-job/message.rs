use crossbeam::channel::Sender;

/// Unique identifier of a job for the lifetime of the process.
pub type JobId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
  /// Ordinary output text.
  Chunk(String),
  /// Auxiliary output, only produced for verbose requests.
  Thought(String),
  /// The producer failed. Terminal.
  Error(String),
  /// The producer is done. Terminal.
  Finish,
}

/// An item on the queue between worker threads and the control thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
  pub job_id: JobId,
  pub kind:   MessageKind,
}

/// Posting side of the job queue, bound to one job id.
///
/// This is the only thing a worker thread holds.
#[derive(Debug, Clone)]
pub struct Outbox {
  job_id: JobId,
  tx:     Sender<Message>,
}

impl Outbox {
  pub(crate) fn new(job_id: JobId, tx: Sender<Message>) -> Self {
    Self { job_id, tx }
  }

  pub fn job_id(&self) -> JobId {
    self.job_id
  }

  /// Queue a message. Returns false if the manager is gone.
  pub fn push(&self, kind: MessageKind) -> bool {
    let message = Message {
      job_id: self.job_id,
      kind,
    };
    if self.tx.send(message).is_err() {
      log::debug!("job {}: queue closed, dropping message", self.job_id);
      return false;
    }
    true
  }
}
