//! What the commands need from the program embedding them.

use std::path::Path;

use vimini_loader::SplitMethod;

use crate::pane::SharedPane;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
  /// Transient progress text.
  Info,
  /// Kept in the message history.
  History,
  Error,
}

/// The editor (or terminal) side. Every method is called on the control
/// thread, either from a command entry point or after a poll.
pub trait Host {
  /// Opens, or switches to, the pane called `name`.
  fn open_pane(&mut self, name: &str, split: SplitMethod) -> SharedPane;

  fn show_message(&mut self, text: &str, severity: Severity);

  /// Shows `lines` and asks for a yes/no answer.
  fn confirm(&mut self, lines: &[String]) -> bool;

  /// Offers an inline completion at the cursor.
  fn offer_suggestion(&mut self, suggestion: &str);

  /// `path` was rewritten on disk. Editors reload it if it is open.
  fn file_changed(&mut self, path: &Path) {
    log::debug!("{} changed on disk", path.display());
  }
}
