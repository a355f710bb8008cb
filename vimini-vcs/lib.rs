//! Thin wrappers around the `git`, `diff` and `patch` binaries used by the
//! review, commit and code commands.

mod git;
mod patch;

use std::{
  io,
  path::PathBuf,
};

use thiserror::Error;

pub use git::{
  commit,
  parse_git_objects,
  repo_name,
  repo_root,
  show,
  stage_all,
  staged_diff,
  unstage_all,
  working_diff,
};
pub use patch::{
  apply_patch,
  unified_diff,
};

/// Repository name used when the working directory is not inside a repo.
pub const FALLBACK_REPO_NAME: &str = "temp";

#[derive(Debug, Error)]
pub enum VcsError {
  #[error("`git` command not found. Is it in your PATH?")]
  GitNotFound,
  #[error("not inside a git repository: {}", .0.display())]
  NotARepo(PathBuf),
  #[error("git {command} failed: {stderr}")]
  Git { command: String, stderr: String },
  #[error("git options (arguments starting with '-') are not allowed: {0}")]
  OptionNotAllowed(String),
  #[error("could not parse git objects: {0}")]
  InvalidObjects(String),
  #[error("`{0}` command not found. Is it in your PATH?")]
  ToolNotFound(&'static str),
  #[error("{tool} failed: {output}")]
  Tool { tool: &'static str, output: String },
  #[error("failed to run an external tool: {0}")]
  Io(#[from] io::Error),
}

pub type Result<T, E = VcsError> = std::result::Result<T, E>;
