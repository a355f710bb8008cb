use std::{
  mem,
  path::{
    Path,
    PathBuf,
  },
  sync::Arc,
};

use vimini_job::{
  JobId,
  JobManager,
  PollOutcome,
  PollTimer,
  TextGenerator,
};
use vimini_loader::{
  Config,
  SplitMethod,
};

use crate::{
  autocomplete::Autocomplete,
  chat::Chat,
  code::{
    self,
    CodeSlot,
    CodeTarget,
    ProposedChanges,
  },
  commit::{
    self,
    CommitSlot,
  },
  host::{
    Host,
    Severity,
  },
  pane::SharedPane,
  review::{
    self,
    ReviewTarget,
  },
  status::StatusLine,
};

/// Plugin state shared by all commands. Lives on the host's control thread.
///
/// Command methods never block on the network; they start jobs and return.
/// The host calls [`Application::tick`] from its timer while
/// `jobs().is_polling()` holds.
pub struct Application {
  config:         Config,
  jobs:           JobManager,
  client:         Option<Arc<dyn TextGenerator>>,
  work_dir:       PathBuf,
  status:         StatusLine,
  chat:           Chat,
  autocomplete:   Autocomplete,
  pending_commit: CommitSlot,
  generated:      CodeSlot,
  proposed:       Option<ProposedChanges>,
}

impl Application {
  pub fn new(
    config: Config,
    client: Option<Arc<dyn TextGenerator>>,
    timer: impl PollTimer + 'static,
    work_dir: impl Into<PathBuf>,
  ) -> Self {
    let work_dir = work_dir.into();
    let jobs = JobManager::new(timer).with_step_interval(config.step_interval());
    Self {
      status: StatusLine::new(&work_dir),
      config,
      jobs,
      client,
      work_dir,
      chat: Chat::default(),
      autocomplete: Autocomplete::default(),
      pending_commit: CommitSlot::default(),
      generated: CodeSlot::default(),
      proposed: None,
    }
  }

  #[must_use]
  pub fn with_status_line(mut self, status: StatusLine) -> Self {
    self.status = status;
    self
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn jobs(&self) -> &JobManager {
    &self.jobs
  }

  pub fn work_dir(&self) -> &Path {
    &self.work_dir
  }

  pub fn status_line(&self) -> &StatusLine {
    &self.status
  }

  /// Shows the problems found while loading the configuration, once.
  pub fn report_config_warnings(&mut self, host: &mut dyn Host) {
    let warnings = mem::take(&mut self.config.warnings);
    let mut host = Prefixed::new(host, &self.status);
    for warning in warnings {
      host.show_message(&warning, Severity::Error);
    }
  }

  /// Sends `prompt` to the chat session, starting it if needed. Without a
  /// prompt only the chat pane is opened.
  pub fn chat(&mut self, host: &mut dyn Host, prompt: Option<&str>) -> Option<JobId> {
    let mut host = Prefixed::new(host, &self.status);
    let result = self.chat.submit(
      &mut self.jobs,
      self.client.clone(),
      &mut host,
      &self.config,
      prompt,
    );
    report(&mut host, "Error starting chat", result)
  }

  /// Ends the chat session once the current reply is done.
  pub fn close_chat(&mut self, host: &mut dyn Host) -> bool {
    let closed = self.chat.close();
    if !closed {
      Prefixed::new(host, &self.status).show_message("No chat session running.", Severity::Info);
    }
    closed
  }

  pub fn chat_session(&self) -> &Chat {
    &self.chat
  }

  pub fn review(&mut self, host: &mut dyn Host, target: ReviewTarget, prompt: &str) -> Option<JobId> {
    let mut host = Prefixed::new(host, &self.status);
    let result = review::review(
      &mut self.jobs,
      self.client.clone(),
      &mut host,
      &self.config,
      &self.work_dir,
      target,
      prompt,
    );
    report(&mut host, "Review failed", result)
  }

  /// Stages everything and generates a commit message. The commit itself
  /// happens in a later [`Application::tick`], after the host confirmed.
  pub fn commit(&mut self, host: &mut dyn Host, author: Option<&str>) -> Option<JobId> {
    let mut host = Prefixed::new(host, &self.status);
    let result = commit::start(
      &mut self.jobs,
      self.client.clone(),
      &mut host,
      &self.config,
      &self.work_dir,
      author,
      &self.pending_commit,
    );
    report(&mut host, "Commit failed", result)
  }

  /// Asks for changes to `target`. Replaces changes not yet applied.
  pub fn code(&mut self, host: &mut dyn Host, target: CodeTarget, prompt: &str) -> Option<JobId> {
    self.proposed = None;
    let mut host = Prefixed::new(host, &self.status);
    let result = code::start(
      &mut self.jobs,
      self.client.clone(),
      &mut host,
      &self.config,
      &self.work_dir,
      target,
      prompt,
      &self.generated,
    );
    report(&mut host, "Code generation failed", result)
  }

  /// Writes the changes of the last code request. Returns true once they
  /// are all on disk.
  pub fn apply_code(&mut self, host: &mut dyn Host) -> bool {
    let mut host = Prefixed::new(host, &self.status);
    let Some(changes) = &self.proposed else {
      host.show_message(
        "No generated changes to apply. Run a code request first.",
        Severity::Error,
      );
      return false;
    };
    let applied = code::apply(&mut host, changes);
    if applied {
      self.proposed = None;
    }
    applied
  }

  pub fn proposed_changes(&self) -> Option<&ProposedChanges> {
    self.proposed.as_ref()
  }

  pub fn show_diff(&mut self, host: &mut dyn Host) {
    let mut host = Prefixed::new(host, &self.status);
    let result = code::show_diff(&mut host, self.config.split_method, &self.work_dir);
    report(&mut host, "Git diff failed", result.map(Some));
  }

  /// Requests a completion at (`row`, `column`) of `lines`. A finished
  /// completion is offered to the host during a later tick.
  pub fn autocomplete(
    &mut self,
    host: &mut dyn Host,
    lines: &[String],
    row: usize,
    column: usize,
  ) -> Option<JobId> {
    let result = self.autocomplete.request(
      &mut self.jobs,
      self.client.clone(),
      &self.config.autocomplete_model,
      lines,
      row,
      column,
    );
    if self.config.verbose && result.as_ref().is_ok_and(Option::is_some) {
      Prefixed::new(host, &self.status).show_message("Autocompleting...", Severity::Info);
    }
    report(
      &mut Prefixed::new(host, &self.status),
      "Autocomplete Error",
      result,
    )
  }

  pub fn cancel_autocomplete(&mut self) {
    self.autocomplete.cancel();
  }

  /// Drains job output, shows the resulting status and runs the follow-ups
  /// that need the host.
  pub fn tick(&mut self, host: &mut dyn Host) -> PollOutcome {
    let outcome = self.jobs.poll();
    let mut host = Prefixed::new(host, &self.status);
    if let Some(status) = &outcome.status {
      host.show_message(status, Severity::Info);
    }

    let pending = self.pending_commit.borrow_mut().take();
    if let Some(pending) = pending {
      commit::finish(&mut host, pending);
    }
    let generated = self.generated.borrow_mut().take();
    if let Some(generated) = generated {
      self.proposed = code::finish(&mut host, self.config.split_method, generated);
    }
    if let Some(suggestion) = self.autocomplete.take_suggestion() {
      host.offer_suggestion(&suggestion);
    }
    outcome
  }
}

fn report<T>(host: &mut dyn Host, context: &str, result: anyhow::Result<Option<T>>) -> Option<T> {
  match result {
    Ok(value) => value,
    Err(err) => {
      log::error!("{context}: {err:#}");
      host.show_message(&format!("{context}: {err:#}"), Severity::Error);
      None
    },
  }
}

/// Puts the status line prefix in front of every message.
struct Prefixed<'a> {
  host:   &'a mut dyn Host,
  status: &'a StatusLine,
}

impl<'a> Prefixed<'a> {
  fn new(host: &'a mut dyn Host, status: &'a StatusLine) -> Self {
    Self { host, status }
  }
}

impl Host for Prefixed<'_> {
  fn open_pane(&mut self, name: &str, split: SplitMethod) -> SharedPane {
    self.host.open_pane(name, split)
  }

  fn show_message(&mut self, text: &str, severity: Severity) {
    let line = self.status.format(text);
    self.host.show_message(&line, severity);
  }

  fn confirm(&mut self, lines: &[String]) -> bool {
    self.host.confirm(lines)
  }

  fn offer_suggestion(&mut self, suggestion: &str) {
    self.host.offer_suggestion(suggestion);
  }

  fn file_changed(&mut self, path: &Path) {
    self.host.file_changed(path);
  }
}
