use std::{
  cell::{
    Cell,
    RefCell,
  },
  rc::Rc,
  sync::Arc,
};

use anyhow::{
  Context,
  Result,
};
use vimini_job::{
  Callbacks,
  GenerationRequest,
  JobId,
  JobManager,
  JobRequest,
  Producer,
  TextGenerator,
};

pub const CONTEXT_LINES: usize = 20;
pub const CURSOR_MARKER: &str = "<CURSOR>";

/// Single-line completions. Only the newest request counts: starting another
/// one or calling `cancel` turns earlier results stale, and stale results are
/// dropped when they arrive.
#[derive(Debug, Default)]
pub struct Autocomplete {
  current:    Rc<Cell<Option<JobId>>>,
  suggestion: Rc<RefCell<Option<String>>>,
}

impl Autocomplete {
  /// Starts a completion for `lines` with the cursor at `row` (1-based) and
  /// `column` (0-based, in characters). Returns `None` without context.
  pub fn request(
    &mut self,
    jobs: &mut JobManager,
    client: Option<Arc<dyn TextGenerator>>,
    model: &str,
    lines: &[String],
    row: usize,
    column: usize,
  ) -> Result<Option<JobId>> {
    log::info!("autocomplete(row: {row}, column: {column})");
    let Some(context) = cursor_context(lines, row, column) else {
      return Ok(None);
    };
    let client = client.context("API key not set")?;

    let job_id = jobs.reserve_job_id("Autocomplete");
    self.current.set(Some(job_id));
    self.suggestion.borrow_mut().take();

    let request = GenerationRequest::new(model, completion_prompt(&context));
    let started = jobs.start_job(
      JobRequest::new("Autocomplete", Producer::StreamOnce(request))
        .job_id(job_id)
        .client(client)
        .callbacks(self.callbacks(job_id)),
    );
    match started {
      Ok(job_id) => Ok(Some(job_id)),
      Err(err) => {
        self.current.set(None);
        Err(err.into())
      },
    }
  }

  /// Makes any running request stale and forgets an unshown suggestion.
  pub fn cancel(&mut self) {
    self.current.set(None);
    self.suggestion.borrow_mut().take();
  }

  /// The suggestion of the newest request, once it is ready.
  pub fn take_suggestion(&mut self) -> Option<String> {
    self.suggestion.borrow_mut().take()
  }

  pub fn current(&self) -> Option<JobId> {
    self.current.get()
  }

  fn callbacks(&self, job_id: JobId) -> Callbacks {
    let text = Rc::new(RefCell::new(String::new()));
    let chunk_text = Rc::clone(&text);
    let current = Rc::clone(&self.current);
    let error_current = Rc::clone(&self.current);
    let suggestion = Rc::clone(&self.suggestion);

    Callbacks::new()
      .on_chunk(move |chunk| chunk_text.borrow_mut().push_str(chunk))
      .on_finish(move || {
        if current.get() != Some(job_id) {
          log::debug!("autocomplete job {job_id}: stale, dropping result");
          return;
        }
        current.set(None);
        if let Some(line) = first_line(&text.borrow()) {
          *suggestion.borrow_mut() = Some(line);
        }
      })
      .on_error(move |error| {
        if error_current.get() != Some(job_id) {
          return Some("Autocomplete cancelled".to_string());
        }
        error_current.set(None);
        Some(format!("Autocomplete Error: {error}"))
      })
  }
}

/// Up to `CONTEXT_LINES` lines ending at the cursor line, with
/// `CURSOR_MARKER` at the cursor.
pub fn cursor_context(lines: &[String], row: usize, column: usize) -> Option<String> {
  if row == 0 || row > lines.len() {
    return None;
  }
  let start = row.saturating_sub(CONTEXT_LINES);
  let mut context: Vec<String> = lines[start..row].to_vec();
  let current = context.last_mut()?;
  let split = current
    .char_indices()
    .nth(column)
    .map_or(current.len(), |(index, _)| index);
  current.insert_str(split, CURSOR_MARKER);
  Some(context.join("\n"))
}

pub(crate) fn completion_prompt(context: &str) -> String {
  format!(
    "You are an expert coding assistant. Based on the following code snippet, provide a \
     single-line code completion for the position marked by `{CURSOR_MARKER}`.\nIMPORTANT: \
     Return only the code to be inserted. Do not include the original line, any explanations, \
     quotes, or markdown formatting.\n\n--- CODE ---\n{context}\n--- END CODE ---"
  )
}

fn first_line(reply: &str) -> Option<String> {
  reply
    .trim()
    .lines()
    .next()
    .filter(|line| !line.is_empty())
    .map(str::to_string)
}
