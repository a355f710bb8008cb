use std::{
  io::{
    self,
    Write,
  },
  path::Path,
  process::{
    Command,
    Output,
    Stdio,
  },
};

use tempfile::NamedTempFile;

use crate::{
  Result,
  VcsError,
};

const NO_FILE: &str = "/dev/null";

fn spawn_error(tool: &'static str, err: io::Error) -> VcsError {
  match err.kind() {
    io::ErrorKind::NotFound => VcsError::ToolNotFound(tool),
    _ => VcsError::Io(err),
  }
}

fn tool_output(output: &Output) -> String {
  let stdout = String::from_utf8_lossy(&output.stdout);
  let stderr = String::from_utf8_lossy(&output.stderr);
  format!("{}\n{}", stdout.trim(), stderr.trim())
    .trim()
    .to_string()
}

fn temp_file_with(text: &str) -> Result<NamedTempFile> {
  let mut file = NamedTempFile::new()?;
  file.write_all(text.as_bytes())?;
  file.flush()?;
  Ok(file)
}

/// Hunks of `diff -u` from `original` to `updated`, without the two file
/// header lines. `original` is `None` for a file that does not exist yet.
/// Empty when nothing changed.
pub fn unified_diff(original: Option<&str>, updated: &str) -> Result<String> {
  let old = original.map(temp_file_with).transpose()?;
  let new = temp_file_with(updated)?;
  let old_path = old
    .as_ref()
    .map_or(Path::new(NO_FILE), |file| file.path());

  let output = Command::new("diff")
    .arg("-u")
    .arg(old_path)
    .arg(new.path())
    .output()
    .map_err(|err| spawn_error("diff", err))?;

  // 0: same, 1: different, anything else: trouble
  if !matches!(output.status.code(), Some(0 | 1)) {
    return Err(VcsError::Tool {
      tool:   "diff",
      output: tool_output(&output),
    });
  }

  let text = String::from_utf8_lossy(&output.stdout);
  Ok(text.lines().skip(2).collect::<Vec<_>>().join("\n"))
}

/// Feeds `patch` to `patch -p1 -N` inside `root`, never asking questions. No
/// reject files are left behind on failure.
pub fn apply_patch(root: &Path, patch: &str) -> Result<()> {
  log::debug!("patch -p1 in {}", root.display());
  let mut child = Command::new("patch")
    .args(["-p1", "-N", "-t", "-r", "-"])
    .current_dir(root)
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .spawn()
    .map_err(|err| spawn_error("patch", err))?;

  if let Some(mut stdin) = child.stdin.take() {
    stdin.write_all(patch.as_bytes())?;
    if !patch.ends_with('\n') {
      stdin.write_all(b"\n")?;
    }
  }

  let output = child.wait_with_output()?;
  if output.status.success() {
    Ok(())
  } else {
    Err(VcsError::Tool {
      tool:   "patch",
      output: tool_output(&output),
    })
  }
}
