use std::{
  io,
  path::{
    Path,
    PathBuf,
  },
  process::{
    Command,
    Output,
  },
};

use crate::{
  FALLBACK_REPO_NAME,
  Result,
  VcsError,
};


fn run_git(cwd: &Path, args: &[&str]) -> Result<Output> {
  log::debug!("git -C {} {}", cwd.display(), args.join(" "));
  let output = Command::new("git")
    .arg("-C")
    .arg(cwd)
    .args(args)
    .env_remove("GIT_DIR")
    .env_remove("GIT_WORK_TREE")
    .output()
    .map_err(|err| {
      match err.kind() {
        io::ErrorKind::NotFound => VcsError::GitNotFound,
        _ => VcsError::Io(err),
      }
    })?;

  if output.status.success() {
    Ok(output)
  } else {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let message = if stderr.trim().is_empty() { stdout } else { stderr };
    Err(VcsError::Git {
      command: args.first().copied().unwrap_or_default().to_string(),
      stderr:  message.trim().to_string(),
    })
  }
}

fn stdout_of(output: Output) -> String {
  String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Top level directory of the repository containing `path` (a file or a
/// directory).
pub fn repo_root(path: &Path) -> Result<PathBuf> {
  let dir = if path.is_dir() {
    path
  } else {
    match path.parent() {
      Some(parent) if !parent.as_os_str().is_empty() => parent,
      _ => Path::new("."),
    }
  };

  let output = run_git(dir, &["rev-parse", "--show-toplevel"]).map_err(|err| {
    match err {
      VcsError::Git { .. } => VcsError::NotARepo(dir.to_path_buf()),
      err => err,
    }
  })?;
  let root = stdout_of(output);
  let root = root.trim();
  if root.is_empty() {
    return Err(VcsError::NotARepo(dir.to_path_buf()));
  }
  Ok(PathBuf::from(root))
}

/// Directory name of the repository containing `path`, or
/// [`FALLBACK_REPO_NAME`] when there is none.
pub fn repo_name(path: &Path) -> String {
  match repo_root(path) {
    Ok(root) => {
      root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| FALLBACK_REPO_NAME.to_string())
    },
    Err(err) => {
      log::debug!("no repository for {}: {err}", path.display());
      FALLBACK_REPO_NAME.to_string()
    },
  }
}

/// Splits a user supplied object list (`HEAD~2 main`) the way a shell would.
/// Options are refused so the list cannot change what `git show` does.
pub fn parse_git_objects(input: &str) -> Result<Vec<String>> {
  let objects = shlex::split(input).ok_or_else(|| VcsError::InvalidObjects(input.to_string()))?;
  if let Some(option) = objects.iter().find(|object| object.starts_with('-')) {
    return Err(VcsError::OptionNotAllowed(option.clone()));
  }
  Ok(objects)
}

/// Output of `git show <objects>`.
pub fn show(root: &Path, objects: &[String]) -> Result<String> {
  if let Some(option) = objects.iter().find(|object| object.starts_with('-')) {
    return Err(VcsError::OptionNotAllowed(option.clone()));
  }
  let mut args = vec!["show"];
  args.extend(objects.iter().map(String::as_str));
  run_git(root, &args).map(stdout_of)
}

/// `git add .`
pub fn stage_all(root: &Path) -> Result<()> {
  run_git(root, &["add", "."]).map(|_| ())
}

pub fn staged_diff(root: &Path) -> Result<String> {
  run_git(root, &["diff", "--staged"]).map(stdout_of)
}

/// Unstaged modifications of tracked files, without color codes.
pub fn working_diff(root: &Path) -> Result<String> {
  run_git(root, &["diff", "--color=never"]).map(stdout_of)
}

/// Reverts `stage_all`.
pub fn unstage_all(root: &Path) -> Result<()> {
  run_git(root, &["reset", "HEAD", "--"]).map(|_| ())
}

/// Commits the index with a sign-off. `trailer` (for example a
/// `Co-authored-by:` line) goes into its own paragraph after the body.
/// Returns the first line git prints on success.
pub fn commit(root: &Path, subject: &str, body: &str, trailer: Option<&str>) -> Result<String> {
  let mut args = vec!["commit", "-s", "-m", subject];
  if !body.is_empty() {
    args.extend(["-m", body]);
  }
  if let Some(trailer) = trailer.filter(|trailer| !trailer.trim().is_empty()) {
    args.extend(["-m", trailer]);
  }

  let output = run_git(root, &args)?;
  Ok(
    stdout_of(output)
      .lines()
      .next()
      .unwrap_or_default()
      .trim()
      .to_string(),
  )
}
