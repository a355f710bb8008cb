//! Persistent chat session running on a single stepped job.
//!
//! The control thread records the newest prompt and bumps a counter; the
//! job's step function notices the counter moved and sends the whole
//! conversation. The streamed reply is copied into the history as it goes by
//! so the next turn carries it.

use std::{
  mem,
  sync::Arc,
};

use anyhow::{
  Context,
  Result,
};
use parking_lot::Mutex;
use vimini_job::{
  Callbacks,
  Content,
  GenerationRequest,
  JobId,
  JobManager,
  JobRequest,
  Producer,
  ProducerError,
  ResponseChunk,
  ResponseStream,
  Step,
  TextGenerator,
};
use vimini_loader::Config;

use crate::{
  host::Host,
  pane::SharedPane,
};

pub const CHAT_PANE: &str = "Vimini Chat";
pub const JOB_NAME: &str = "Persistent Vimini Chat";

const Q_PREFIX: &str = "Q: ";
const A_PREFIX: &str = "A: ";

#[derive(Debug, Default)]
struct ChatState {
  prompt:  String,
  counter: u64,
  running: bool,
  closing: bool,
  history: Vec<Content>,
}

impl ChatState {
  fn reset(&mut self) {
    self.running = false;
    self.closing = false;
    self.history.clear();
  }
}

#[derive(Debug)]
struct Model {
  name:        String,
  temperature: Option<f32>,
}

#[derive(Default)]
pub struct Chat {
  state: Arc<Mutex<ChatState>>,
  pane:  Option<SharedPane>,
  job:   Option<JobId>,
}

impl Chat {
  /// Opens the chat pane and, given a non-empty prompt, queues it. Starts the
  /// session job unless one is already running.
  pub fn submit(
    &mut self,
    jobs: &mut JobManager,
    client: Option<Arc<dyn TextGenerator>>,
    host: &mut dyn Host,
    config: &Config,
    prompt: Option<&str>,
  ) -> Result<Option<JobId>> {
    let pane = self.pane(host, config);
    let Some(prompt) = prompt.map(clean_prompt).filter(|prompt| !prompt.is_empty()) else {
      return Ok(None);
    };
    log::info!("chat({prompt})");

    let running = {
      let mut state = self.state.lock();
      if state.closing {
        anyhow::bail!("chat session is closing, try again once it has ended");
      }
      state.prompt.clone_from(&prompt);
      state.counter += 1;
      state.running
    };

    {
      let mut pane = pane.borrow_mut();
      if !pane.last_line().is_empty() {
        pane.push_line("");
      }
      pane.push_line(&format!("{Q_PREFIX}{prompt}"));
      pane.push_line("---");
      pane.push_line(A_PREFIX);
    }

    if running {
      return Ok(self.job);
    }

    let client = client.context("API key not set")?;
    let model = Model {
      name:        config.model.clone(),
      temperature: config.temperature,
    };
    {
      let mut state = self.state.lock();
      state.history.clear();
      state.running = true;
    }

    let step_state = Arc::clone(&self.state);
    let producer = Producer::stepped(move |seen| step(&step_state, client.as_ref(), &model, seen));
    let job_id = jobs
      .start_job(JobRequest::new(JOB_NAME, producer).callbacks(self.callbacks(pane)))
      .inspect_err(|_| self.state.lock().reset())?;
    self.job = Some(job_id);
    Ok(Some(job_id))
  }

  /// Asks the running session to end once the prompts already submitted are
  /// answered. Returns false when there is no session.
  pub fn close(&mut self) -> bool {
    let mut state = self.state.lock();
    if !state.running {
      return false;
    }
    state.closing = true;
    true
  }

  pub fn is_running(&self) -> bool {
    self.state.lock().running
  }

  pub fn job(&self) -> Option<JobId> {
    self.job
  }

  pub fn history(&self) -> Vec<Content> {
    self.state.lock().history.clone()
  }

  fn pane(&mut self, host: &mut dyn Host, config: &Config) -> SharedPane {
    self
      .pane
      .get_or_insert_with(|| host.open_pane(CHAT_PANE, config.split_method))
      .clone()
  }

  fn callbacks(&self, pane: SharedPane) -> Callbacks {
    let finish_state = Arc::clone(&self.state);
    let error_state = Arc::clone(&self.state);
    let chunk_pane = pane.clone();
    let finish_pane = pane.clone();
    let error_pane = pane;

    Callbacks::new()
      .status_message("Running...")
      .on_chunk(move |text| chunk_pane.borrow_mut().append(text))
      .on_finish(move || {
        finish_state.lock().reset();
        let mut pane = finish_pane.borrow_mut();
        pane.push_line("");
        pane.push_line("Terminated");
      })
      .on_error(move |message| {
        error_state.lock().reset();
        error_pane
          .borrow_mut()
          .push_line(&format!("\n[Error: {message}]"));
        Some(format!("Chat Error: {message}"))
      })
  }
}

/// Strips surrounding whitespace and quotes the way a command line argument
/// arrives.
fn clean_prompt(prompt: &str) -> String {
  prompt
    .trim()
    .trim_matches(['\'', '"'])
    .trim()
    .to_string()
}

fn step(
  state: &Arc<Mutex<ChatState>>,
  client: &dyn TextGenerator,
  model: &Model,
  seen: u64,
) -> Result<Step, ProducerError> {
  let mut guard = state.lock();
  let pending = guard.running && guard.counter > seen;
  if !pending && (guard.closing || !guard.running) {
    return Ok(Step::End {
      reason: "chat closed".to_string(),
    });
  }
  if !pending {
    return Ok(Step::Idle {
      seen: guard.counter,
    });
  }
  if guard.prompt.is_empty() {
    return Err(ProducerError::new("Invalid prompt"));
  }

  let seen = guard.counter;
  let prompt = guard.prompt.clone();
  guard.history.push(Content::user(prompt));
  let request = GenerationRequest::conversation(model.name.as_str(), guard.history.clone())
    .with_temperature(model.temperature);
  drop(guard);

  let stream = client.generate_stream(&request)?;
  Ok(Step::Reply {
    seen,
    stream: Box::new(HistoryTee {
      inner:    stream,
      state:    Arc::clone(state),
      reply:    String::new(),
      finished: false,
    }),
  })
}

/// Passes a reply stream through, recording its answer text as the model's
/// turn once the stream ends.
struct HistoryTee {
  inner:    ResponseStream,
  state:    Arc<Mutex<ChatState>>,
  reply:    String,
  finished: bool,
}

impl Iterator for HistoryTee {
  type Item = Result<ResponseChunk, ProducerError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }
    match self.inner.next() {
      Some(Ok(chunk)) => {
        self.reply.push_str(&chunk.answer_text());
        Some(Ok(chunk))
      },
      Some(Err(err)) => {
        self.finished = true;
        Some(Err(err))
      },
      None => {
        self.finished = true;
        let reply = mem::take(&mut self.reply);
        self.state.lock().history.push(Content::model(reply));
        None
      },
    }
  }
}
