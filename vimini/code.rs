//! Code generation: ask for whole files or patches as JSON, show them as a
//! combined diff, write them on request.
//!
//! Like commit, the finished reply is parked in a slot and turned into panes
//! by the application after the poll. The parsed changes are kept until they
//! are applied or a new request replaces them.

use std::{
  cell::RefCell,
  fs,
  io,
  path::{
    Component,
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
use serde::Deserialize;
use vimini_job::{
  Callbacks,
  GenerationRequest,
  JobId,
  JobManager,
  JobRequest,
  Producer,
  TextGenerator,
};
use vimini_loader::{
  Config,
  SplitMethod,
};

use crate::{
  host::{
    Host,
    Severity,
  },
  pane::SharedPane,
  review::THOUGHTS_PANE,
};

pub const DIFF_PANE: &str = "Vimini Diff";
pub const RAW_OUTPUT_PANE: &str = "Vimini Raw Output";
pub const GIT_DIFF_PANE: &str = "Git Diff";

pub const JSON_MIME_TYPE: &str = "application/json";
pub const PLAIN_TYPE: &str = "text/plain";
pub const PATCH_TYPE: &str = "text/x-diff";

/// One file in the model's reply.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileChange {
  /// Relative to the project root.
  pub file_path:    String,
  #[serde(default = "plain_type")]
  pub file_type:    String,
  /// The whole new file, or a unified diff for `text/x-diff`.
  pub file_content: String,
}

fn plain_type() -> String {
  PLAIN_TYPE.to_string()
}

impl FileChange {
  pub fn is_patch(&self) -> bool {
    self.file_type == PATCH_TYPE
  }
}

#[derive(Debug, Deserialize)]
struct CodeReply {
  files: Vec<FileChange>,
}

/// The buffer a request is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTarget {
  pub path: Option<PathBuf>,
  pub text: String,
}

/// A finished reply waiting to be shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCode {
  pub root:  PathBuf,
  pub reply: String,
}

pub type CodeSlot = Rc<RefCell<Option<GeneratedCode>>>;

/// Changes on display in the diff pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedChanges {
  pub root:  PathBuf,
  pub files: Vec<FileChange>,
}

/// Starts a generation job for `prompt` about `target`. Outside a git
/// repository the working directory is the project root.
#[allow(clippy::too_many_arguments)]
pub fn start(
  jobs: &mut JobManager,
  client: Option<Arc<dyn TextGenerator>>,
  host: &mut dyn Host,
  config: &Config,
  work_dir: &Path,
  target: CodeTarget,
  prompt: &str,
  slot: &CodeSlot,
) -> Result<Option<JobId>> {
  log::info!("code({prompt:?}, verbose: {})", config.verbose);
  let prompt = prompt.trim();
  if prompt.is_empty() {
    host.show_message("Nothing to generate without a prompt.", Severity::History);
    return Ok(None);
  }
  let client = client.context("API key not set")?;

  let root = vimini_vcs::repo_root(work_dir).unwrap_or_else(|err| {
    log::debug!("{err}, using {} as the project root", work_dir.display());
    work_dir.to_path_buf()
  });
  let file_name = target
    .path
    .as_deref()
    .map(|path| path.strip_prefix(&root).unwrap_or(path).display().to_string())
    .unwrap_or_else(|| "Buffer".to_string());

  let thoughts = config
    .verbose
    .then(|| host.open_pane(THOUGHTS_PANE, config.split_method));
  let request = GenerationRequest::new(
    config.model.as_str(),
    code_prompt(prompt, &file_name, &target.text),
  )
  .with_temperature(config.temperature)
  .with_verbose(config.verbose)
  .with_response_mime_type(JSON_MIME_TYPE);

  host.show_message("Processing...", Severity::Info);
  let job_id = jobs.start_job(
    JobRequest::new("Code", Producer::StreamOnce(request))
      .client(client)
      .callbacks(callbacks(root, thoughts, Rc::clone(slot))),
  )?;
  Ok(Some(job_id))
}

fn callbacks(root: PathBuf, thoughts: Option<SharedPane>, slot: CodeSlot) -> Callbacks {
  let reply = Rc::new(RefCell::new(String::new()));
  let chunk_reply = Rc::clone(&reply);

  let mut callbacks = Callbacks::new()
    .status_message("Processing...")
    .on_chunk(move |chunk| chunk_reply.borrow_mut().push_str(chunk))
    .on_finish(move || {
      *slot.borrow_mut() = Some(GeneratedCode {
        root,
        reply: reply.take(),
      });
    })
    .on_error(|error| Some(format!("Error during API call to Gemini: {error}")));
  if let Some(thoughts) = thoughts {
    callbacks = callbacks.on_thought(move |text| thoughts.borrow_mut().append(text));
  }
  callbacks
}

/// Parses a finished reply and shows its diff. Returns the changes when
/// there is something to apply.
pub fn finish(
  host: &mut dyn Host,
  split: SplitMethod,
  generated: GeneratedCode,
) -> Option<ProposedChanges> {
  let GeneratedCode { root, reply } = generated;

  let files = match parse_reply(&reply) {
    Ok(files) => files,
    Err(err) => {
      host.show_message(
        &format!("AI did not return valid JSON for files: {err}"),
        Severity::Error,
      );
      host.open_pane(RAW_OUTPUT_PANE, split).borrow_mut().append(&reply);
      return None;
    },
  };
  if files.is_empty() {
    host.show_message("AI returned no file changes.", Severity::History);
    return None;
  }
  if let Some(outside) = files.iter().find(|file| project_path(&root, &file.file_path).is_err()) {
    host.show_message(
      &format!("Refusing changes outside the project: {}", outside.file_path),
      Severity::Error,
    );
    return None;
  }

  let diff = combined_diff(&root, &files);
  if diff.is_empty() {
    host.show_message(
      "AI content is identical to the original files or returned empty diff.",
      Severity::History,
    );
    return None;
  }
  host.open_pane(DIFF_PANE, split).borrow_mut().append(&diff);
  Some(ProposedChanges { root, files })
}

/// Writes every change to disk. Returns false when any file failed; files
/// written before the failure stay written.
pub fn apply(host: &mut dyn Host, changes: &ProposedChanges) -> bool {
  let mut applied = Vec::new();
  let mut failed = false;

  for change in &changes.files {
    match apply_one(&changes.root, change) {
      Ok(path) => {
        applied.push(change.file_path.as_str());
        host.file_changed(&path);
      },
      Err(err) => {
        log::error!("applying {}: {err:#}", change.file_path);
        host.show_message(
          &format!("Error processing {}: {err:#}", change.file_path),
          Severity::Error,
        );
        failed = true;
      },
    }
  }

  if failed {
    host.show_message(
      "Errors occurred. The changes are kept for another attempt.",
      Severity::Error,
    );
    return false;
  }
  host.show_message(
    &format!("Applied changes to: {}", applied.join(", ")),
    Severity::History,
  );
  true
}

fn apply_one(root: &Path, change: &FileChange) -> Result<PathBuf> {
  let path = project_path(root, &change.file_path)?;
  if let Some(dir) = path.parent() {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
  }
  if change.is_patch() {
    vimini_vcs::apply_patch(root, &change.file_content)?;
  } else {
    fs::write(&path, &change.file_content)
      .with_context(|| format!("failed to write {}", path.display()))?;
  }
  Ok(path)
}

/// Shows `git diff` of the working tree in a pane.
pub fn show_diff(host: &mut dyn Host, split: SplitMethod, work_dir: &Path) -> Result<()> {
  log::info!("show_diff()");
  let root = vimini_vcs::repo_root(work_dir)?;
  host.show_message("Running git diff...", Severity::Info);
  let diff = vimini_vcs::working_diff(&root).context("Git error")?;
  if diff.trim().is_empty() {
    host.show_message("No modifications found.", Severity::History);
    return Ok(());
  }
  host
    .open_pane(GIT_DIFF_PANE, split)
    .borrow_mut()
    .append(diff.trim_end());
  Ok(())
}

pub fn parse_reply(reply: &str) -> serde_json::Result<Vec<FileChange>> {
  serde_json::from_str::<CodeReply>(reply.trim()).map(|reply| reply.files)
}

/// `relative` joined to `root`, refusing absolute paths and `..`.
fn project_path(root: &Path, relative: &str) -> Result<PathBuf> {
  let relative = Path::new(relative);
  let inside = relative
    .components()
    .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
  if relative.as_os_str().is_empty() || !inside {
    anyhow::bail!("{} is not a path inside the project", relative.display());
  }
  Ok(root.join(relative))
}

/// Git style diff of every change. Files that cannot be diffed are skipped.
fn combined_diff(root: &Path, files: &[FileChange]) -> String {
  let mut sections = Vec::new();
  for change in files {
    match file_diff(root, change) {
      Ok(Some(section)) => sections.push(section),
      Ok(None) => {},
      Err(err) => log::warn!("no diff for {}: {err:#}", change.file_path),
    }
  }
  sections.join("\n")
}

fn file_diff(root: &Path, change: &FileChange) -> Result<Option<String>> {
  let name = &change.file_path;
  if change.is_patch() {
    let patch = change.file_content.trim_end();
    return Ok((!patch.trim().is_empty()).then(|| patch.to_string()));
  }

  let path = project_path(root, name)?;
  let original = match fs::read_to_string(&path) {
    Ok(text) => Some(text),
    Err(err) if err.kind() == io::ErrorKind::NotFound => None,
    Err(err) => return Err(err).with_context(|| format!("failed to read {}", path.display())),
  };
  let hunks = vimini_vcs::unified_diff(original.as_deref(), &change.file_content)?;
  if hunks.is_empty() {
    return Ok(None);
  }

  let mut lines = vec![format!("diff --git a/{name} b/{name}")];
  if original.is_some() {
    lines.push(format!("--- a/{name}"));
  } else {
    lines.push("new file mode 100644".to_string());
    lines.push("--- /dev/null".to_string());
  }
  lines.push(format!("+++ b/{name}"));
  lines.push(hunks);
  Ok(Some(lines.join("\n")))
}

pub(crate) fn code_prompt(prompt: &str, file_name: &str, text: &str) -> String {
  format!(
    "{prompt}\n\nBased on the user's request, please generate the code. Your primary task is \
     to modify the file named '{file_name}'.\n\nIMPORTANT:\n1. Your response must be a single \
     JSON object with a 'files' key.\n2. The value of 'files' must be an array of file \
     objects.\n3. Each file object must have three string keys: 'file_path', 'file_type', and \
     'file_content'.\n4. 'file_path' must be the path of the file relative to the project \
     directory.\n5. 'file_type' must be either '{PLAIN_TYPE}' for the full file content or \
     '{PATCH_TYPE}' for a patch in the unified diff format.\n6. 'file_content' must contain \
     either the new, complete source code or the diff patch, corresponding to the \
     'file_type'.\n7. Prefer returning the entire modified file; use diffs only for files that \
     are too large.\n8. You can modify existing files or create new files as needed.\n\n--- \
     FILE: {file_name} ---\n{text}\n--- END FILE ---"
  )
}
