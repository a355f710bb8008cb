//! Commit message generation: stage everything, describe the staged diff,
//! confirm with the user, commit.
//!
//! Generation runs as a job. Its result is parked in a slot the application
//! checks after every poll, because confirming needs the host.

use std::{
  cell::RefCell,
  path::{
    Path,
    PathBuf,
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
use vimini_loader::Config;

use crate::host::{
  Host,
  Severity,
};

pub const BODY_WIDTH: usize = 78;
pub const CO_AUTHOR_PREFIX: &str = "Co-authored-by:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMessage {
  pub subject: String,
  /// Wrapped at `BODY_WIDTH`; empty when the model gave none.
  pub body:    String,
}

/// A generated message waiting for confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommit {
  pub root:    PathBuf,
  pub message: Option<CommitMessage>,
  pub trailer: Option<String>,
}

pub type CommitSlot = Rc<RefCell<Option<PendingCommit>>>;

/// Stages all changes and starts generating a message for them. Returns
/// `None` when nothing is staged afterwards.
pub fn start(
  jobs: &mut JobManager,
  client: Option<Arc<dyn TextGenerator>>,
  host: &mut dyn Host,
  config: &Config,
  work_dir: &Path,
  author: Option<&str>,
  slot: &CommitSlot,
) -> Result<Option<JobId>> {
  log::info!("commit(author: {author:?})");
  let root = vimini_vcs::repo_root(work_dir)?;

  host.show_message("Staging all changes... (git add .)", Severity::Info);
  vimini_vcs::stage_all(&root).context("Git add failed")?;

  let diff = vimini_vcs::staged_diff(&root).context("Git error getting staged diff")?;
  let diff = diff.trim();
  if diff.is_empty() {
    host.show_message("No changes to commit.", Severity::History);
    return Ok(None);
  }

  let Some(client) = client else {
    unstage(&root);
    anyhow::bail!("Commit cancelled (API key not set). Reverting `git add`.");
  };

  host.show_message(
    "Generating commit message... (this may take a moment)",
    Severity::Info,
  );
  let request = GenerationRequest::new(config.model.as_str(), commit_prompt(diff))
    .with_temperature(config.temperature);
  let trailer = author.and_then(co_author_trailer);

  let started = jobs.start_job(
    JobRequest::new("Commit message", Producer::StreamOnce(request))
      .client(client)
      .callbacks(callbacks(root.clone(), trailer, Rc::clone(slot))),
  );
  match started {
    Ok(job_id) => Ok(Some(job_id)),
    Err(err) => {
      unstage(&root);
      Err(err.into())
    },
  }
}

fn callbacks(root: PathBuf, trailer: Option<String>, slot: CommitSlot) -> Callbacks {
  let text = Rc::new(RefCell::new(String::new()));
  let chunk_text = Rc::clone(&text);
  let error_root = root.clone();

  Callbacks::new()
    .status_message("Generating commit message...")
    .on_chunk(move |chunk| chunk_text.borrow_mut().push_str(chunk))
    .on_finish(move || {
      let message = parse_commit_message(&text.borrow());
      *slot.borrow_mut() = Some(PendingCommit {
        root,
        message,
        trailer,
      });
    })
    .on_error(move |error| {
      unstage(&error_root);
      Some(format!("Commit Error: {error}. Reverted `git add`."))
    })
}

/// Asks the host to confirm `pending` and commits or reverts the staging.
pub fn finish(host: &mut dyn Host, pending: PendingCommit) {
  let PendingCommit {
    root,
    message,
    trailer,
  } = pending;

  let Some(message) = message else {
    host.show_message(
      "Failed to generate a commit message. Reverting `git add`.",
      Severity::Error,
    );
    unstage(&root);
    return;
  };

  if !host.confirm(&confirmation_lines(&message)) {
    host.show_message("Commit cancelled. Reverting `git add`.", Severity::Error);
    unstage(&root);
    return;
  }

  log::info!("commit message accepted");
  host.show_message(
    &format!("Committing with subject: {}", message.subject),
    Severity::History,
  );
  match vimini_vcs::commit(&root, &message.subject, &message.body, trailer.as_deref()) {
    Ok(summary) => {
      host.show_message(&format!("Commit successful: {summary}"), Severity::History);
    },
    Err(err) => {
      host.show_message(
        &format!("Git commit failed: {err}. The changes are still staged."),
        Severity::Error,
      );
    },
  }
}

fn unstage(root: &Path) {
  if let Err(err) = vimini_vcs::unstage_all(root) {
    log::error!("failed to revert staging in {}: {err}", root.display());
  }
}

pub(crate) fn commit_prompt(diff: &str) -> String {
  format!(
    "Based on the following git diff, generate a commit message with a subject and a \
     body.\n\nRULES:\n1. The subject must be a single line, 50 characters or less, and \
     summarize the change.\n2. Do not add any prefixes like 'feat:' or 'fix:' to the \
     subject.\n3. The body should be a brief description of the changes, explaining the \
     'what' and 'why'.\n4. Separate the subject and body with '---' on its own line.\n5. Only \
     output the raw text, with no extra explanations or markdown.\n\n--- GIT DIFF \
     ---\n{diff}\n--- END GIT DIFF ---"
  )
}

/// Splits a model reply into subject and body. The reply should separate them
/// with `---`; otherwise the first line is the subject. `None` without a
/// subject.
pub fn parse_commit_message(reply: &str) -> Option<CommitMessage> {
  let reply = reply.trim();
  let (subject, raw_body) = match reply.split_once("---") {
    Some((subject, body)) => (subject.trim(), body.trim()),
    None => {
      match reply.split_once('\n') {
        Some((subject, body)) => (subject.trim(), body.trim()),
        None => (reply, ""),
      }
    },
  };

  if subject.is_empty() {
    return None;
  }
  Some(CommitMessage {
    subject: subject.to_string(),
    body:    wrap_body(raw_body),
  })
}

/// Wraps every paragraph line at `BODY_WIDTH`, keeping blank lines.
pub fn wrap_body(body: &str) -> String {
  body
    .lines()
    .flat_map(|line| {
      if line.trim().is_empty() {
        vec![String::new()]
      } else {
        textwrap::wrap(line, BODY_WIDTH)
          .into_iter()
          .map(|piece| piece.into_owned())
          .collect()
      }
    })
    .collect::<Vec<_>>()
    .join("\n")
}

/// `Co-authored-by: <author>` unless the argument already is a trailer.
fn co_author_trailer(author: &str) -> Option<String> {
  let author = author.trim();
  if author.is_empty() {
    None
  } else if author.starts_with(CO_AUTHOR_PREFIX) {
    Some(author.to_string())
  } else {
    Some(format!("{CO_AUTHOR_PREFIX} {author}"))
  }
}

fn confirmation_lines(message: &CommitMessage) -> Vec<String> {
  let mut lines = vec![format!("Subject: {}", message.subject), String::new()];
  if !message.body.is_empty() {
    lines.extend(message.body.lines().map(str::to_string));
  }
  lines.extend([
    String::new(),
    "---".to_string(),
    "Commit with this message? [y/n]".to_string(),
  ]);
  lines
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn separator_splits_subject_and_body() {
    let message = parse_commit_message("Add retries\n---\nRetry failed requests twice.\n").unwrap();
    assert_eq!(message, CommitMessage {
      subject: "Add retries".into(),
      body:    "Retry failed requests twice.".into(),
    });
  }

  #[test]
  fn first_line_is_subject_without_separator() {
    let message = parse_commit_message("Fix typo\n\nIn the README.").unwrap();
    assert_eq!(message.subject, "Fix typo");
    assert_eq!(message.body, "In the README.");

    let message = parse_commit_message("Only a subject").unwrap();
    assert_eq!(message.body, "");
  }

  #[test]
  fn empty_subject_is_rejected() {
    assert_eq!(parse_commit_message("  \n"), None);
    assert_eq!(parse_commit_message("---\nbody only"), None);
  }

  #[test]
  fn body_wraps_and_keeps_paragraphs() {
    let long = "word ".repeat(30);
    let body = wrap_body(&format!("{long}\n\nsecond paragraph"));
    let lines: Vec<&str> = body.lines().collect();
    assert!(lines.len() >= 4);
    assert!(lines.iter().all(|line| line.chars().count() <= BODY_WIDTH));
    assert_eq!(lines[lines.len() - 2], "");
    assert_eq!(lines[lines.len() - 1], "second paragraph");
  }

  #[test]
  fn author_becomes_trailer() {
    assert_eq!(
      co_author_trailer("Ada <ada@example.com>").as_deref(),
      Some("Co-authored-by: Ada <ada@example.com>")
    );
    assert_eq!(
      co_author_trailer("Co-authored-by: Ada <ada@example.com>").as_deref(),
      Some("Co-authored-by: Ada <ada@example.com>")
    );
    assert_eq!(co_author_trailer(" "), None);
  }

  #[test]
  fn confirmation_shows_subject_body_and_question() {
    let lines = confirmation_lines(&CommitMessage {
      subject: "Add retries".into(),
      body:    "line one\nline two".into(),
    });
    assert_eq!(lines, vec![
      "Subject: Add retries",
      "",
      "line one",
      "line two",
      "",
      "---",
      "Commit with this message? [y/n]",
    ]);
  }

  #[test]
  fn prompt_embeds_diff() {
    let prompt = commit_prompt("+new line");
    assert!(prompt.contains("--- GIT DIFF ---\n+new line\n--- END GIT DIFF ---"));
    assert!(prompt.contains("4. Separate the subject and body with '---' on its own line."));
  }
}
