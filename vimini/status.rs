use std::path::PathBuf;

use once_cell::unsync::OnceCell;

/// Formats messages for the host's message area as
/// `[Vimini (<repo>)] <text>`.
///
/// The repository name is looked up once, on first use.
#[derive(Debug)]
pub struct StatusLine {
  work_dir: PathBuf,
  repo:     OnceCell<String>,
}

impl StatusLine {
  pub fn new(work_dir: impl Into<PathBuf>) -> Self {
    Self {
      work_dir: work_dir.into(),
      repo:     OnceCell::new(),
    }
  }

  pub fn with_repo_name(work_dir: impl Into<PathBuf>, repo: impl Into<String>) -> Self {
    Self {
      work_dir: work_dir.into(),
      repo:     OnceCell::with_value(repo.into()),
    }
  }

  pub fn repo_name(&self) -> &str {
    self
      .repo
      .get_or_init(|| vimini_vcs::repo_name(&self.work_dir))
  }

  /// Single line form of `text` with the plugin prefix.
  pub fn format(&self, text: &str) -> String {
    let text = text.replace('\r', "").replace('\n', " ");
    format!("[Vimini ({})] {}", self.repo_name(), text)
  }
}
