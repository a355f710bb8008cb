//! Body of the per-job background thread.
//!
//! A worker owns an `Outbox` and the producer, nothing else. Whatever happens
//! inside the producer, including a panic, the worker posts exactly one
//! terminal message before the thread exits.

use std::{
  any::Any,
  cell::Cell,
  io,
  panic::{
    self,
    AssertUnwindSafe,
  },
  thread::{
    self,
    JoinHandle,
  },
  time::Duration,
};

use crate::{
  message::{
    JobId,
    MessageKind,
    Outbox,
  },
  producer::{
    GenerationRequest,
    ProducerError,
    ResponseStream,
    SharedGenerator,
    Step,
    StepFn,
    TextGenerator,
  },
};

thread_local! {
  static WORKER: Cell<bool> = const { Cell::new(false) };
}

/// True on a job worker thread.
pub fn on_worker_thread() -> bool {
  WORKER.with(Cell::get)
}

/// Host-side UI code calls this before touching editor state. Panics in debug
/// builds when reached from a job worker.
#[track_caller]
pub fn debug_assert_control_thread(operation: &str) {
  debug_assert!(
    !on_worker_thread(),
    "`{operation}` must run on the control thread, not a job worker"
  );
}

pub(crate) enum Task {
  Stream {
    client:  SharedGenerator,
    request: GenerationRequest,
  },
  Stepped {
    step:     StepFn,
    verbose:  bool,
    interval: Duration,
  },
}

pub(crate) fn spawn(outbox: Outbox, task: Task) -> io::Result<JoinHandle<()>> {
  thread::Builder::new()
    .name(job_thread_name(outbox.job_id()))
    .spawn(move || run(outbox, task))
}

fn run(outbox: Outbox, task: Task) {
  WORKER.with(|worker| worker.set(true));
  let job_id = outbox.job_id();
  log::debug!("job {job_id}: worker started");

  let result = panic::catch_unwind(AssertUnwindSafe(|| {
    match task {
      Task::Stream { client, request } => run_stream(&outbox, client.as_ref(), &request),
      Task::Stepped {
        step,
        verbose,
        interval,
      } => run_stepped(&outbox, step, verbose, interval),
    }
  }));

  let terminal = match result {
    Ok(Ok(())) => MessageKind::Finish,
    Ok(Err(err)) => {
      log::warn!("job {job_id}: producer failed: {err}");
      MessageKind::Error(err.to_string())
    },
    Err(payload) => {
      let message = panic_message(payload.as_ref());
      log::error!("job {job_id}: producer panicked: {message}");
      MessageKind::Error(message)
    },
  };
  outbox.push(terminal);
  log::debug!("job {job_id}: worker exiting");
}

fn run_stream(
  outbox: &Outbox,
  client: &dyn TextGenerator,
  request: &GenerationRequest,
) -> Result<(), ProducerError> {
  let stream = client.generate_stream(request)?;
  forward(outbox, stream, request.verbose)
}

fn run_stepped(
  outbox: &Outbox,
  mut step: StepFn,
  verbose: bool,
  interval: Duration,
) -> Result<(), ProducerError> {
  let mut seen = 0;
  loop {
    match step(seen)? {
      Step::Idle { seen: latest } => seen = seen.max(latest),
      Step::Reply {
        seen: latest,
        stream,
      } => {
        log::debug!("job {}: reply for input {latest}", outbox.job_id());
        forward(outbox, stream, verbose)?;
        seen = seen.max(latest);
      },
      Step::End { reason } => {
        log::info!("job {}: session ended: {reason}", outbox.job_id());
        return Ok(());
      },
    }
    thread::sleep(interval);
  }
}

/// Pushes one message per non-empty fragment, in stream order.
fn forward(outbox: &Outbox, stream: ResponseStream, verbose: bool) -> Result<(), ProducerError> {
  for chunk in stream {
    for fragment in chunk?.fragments {
      if fragment.text.is_empty() {
        continue;
      }
      let kind = match (fragment.thought, verbose) {
        (true, true) => MessageKind::Thought(fragment.text),
        (true, false) => continue,
        (false, _) => MessageKind::Chunk(fragment.text),
      };
      if !outbox.push(kind) {
        return Err(ProducerError::new("job queue closed"));
      }
    }
  }
  Ok(())
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "unknown panic".to_string()
  }
}

fn job_thread_name(job_id: JobId) -> String {
  format!("vimini-job-{job_id}")
}
