use std::{
  path::Path,
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
use vimini_loader::Config;

use crate::{
  host::{
    Host,
    Severity,
  },
  pane::SharedPane,
};

pub const REVIEW_PANE: &str = "Vimini Review";
pub const THOUGHTS_PANE: &str = "Vimini Thoughts";

const TARGET_TITLE_WIDTH: usize = 40;

/// What to review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewTarget {
  /// Text of the current buffer and its file type.
  Buffer { text: String, filetype: String },
  /// A list of git objects as typed by the user, e.g. `HEAD~2 main`.
  GitObjects(String),
}

/// Starts a review job. Returns `None` when there was nothing to review.
pub fn review(
  jobs: &mut JobManager,
  client: Option<Arc<dyn TextGenerator>>,
  host: &mut dyn Host,
  config: &Config,
  work_dir: &Path,
  target: ReviewTarget,
  prompt: &str,
) -> Result<Option<JobId>> {
  log::info!("review({prompt:?}, {target:?}, verbose: {})", config.verbose);
  let client = client.context("API key not set")?;

  let (content, source) = match target {
    ReviewTarget::Buffer { text, filetype } => {
      let filetype = if filetype.is_empty() { "text".to_string() } else { filetype };
      (text, format!("the following {filetype} code"))
    },
    ReviewTarget::GitObjects(arg) => {
      let root = vimini_vcs::repo_root(work_dir)?;
      let objects = vimini_vcs::parse_git_objects(&arg)?;
      host.show_message(&format!("Running git show {arg}..."), Severity::Info);
      let output = vimini_vcs::show(&root, &objects).context("Git error")?;

      let target = host.open_pane(
        &format!("Vimini Git Review Target: {}", truncate_title(&arg)),
        config.split_method,
      );
      target.borrow_mut().append(&output);
      (output, format!("the output of `git show {arg}`"))
    },
  };

  if content.trim().is_empty() {
    host.show_message("Nothing to review.", Severity::History);
    return Ok(None);
  }

  let thoughts = config
    .verbose
    .then(|| host.open_pane(THOUGHTS_PANE, config.split_method));
  let pane = host.open_pane(REVIEW_PANE, config.split_method);

  let request = GenerationRequest::new(config.model.as_str(), review_prompt(&source, &content, prompt))
    .with_temperature(config.temperature)
    .with_verbose(config.verbose);

  host.show_message("Processing...", Severity::Info);
  let job_id = jobs.start_job(
    JobRequest::new("Review", Producer::StreamOnce(request))
      .client(client)
      .callbacks(callbacks(pane, thoughts)),
  )?;
  Ok(Some(job_id))
}

fn callbacks(pane: SharedPane, thoughts: Option<SharedPane>) -> Callbacks {
  let mut callbacks = Callbacks::new()
    .status_message("Processing...")
    .on_chunk(move |text| pane.borrow_mut().append(text));
  if let Some(thoughts) = thoughts {
    callbacks = callbacks.on_thought(move |text| thoughts.borrow_mut().append(text));
  }
  callbacks
}

pub(crate) fn review_prompt(source: &str, content: &str, extra: &str) -> String {
  format!(
    "Please review {source} for potential issues, improvements, best practices, and any \
     possible bugs. Provide a concise summary and actionable suggestions.\n\n--- CONTENT TO \
     REVIEW ---\n{content}\n--- END CONTENT TO REVIEW ---\n{extra}\n"
  )
}

fn truncate_title(arg: &str) -> String {
  if arg.chars().count() > TARGET_TITLE_WIDTH {
    let head: String = arg.chars().take(TARGET_TITLE_WIDTH).collect();
    format!("{head}..")
  } else {
    arg.to_string()
  }
}
