//! Output surfaces the commands stream into.

use std::{
  cell::RefCell,
  rc::Rc,
};

use vimini_job::debug_assert_control_thread;

/// A named, append-only text surface owned by the host: an editor buffer, a
/// terminal, a test recorder.
///
/// Panes are only touched from job callbacks and command entry points, both
/// of which run on the control thread.
pub trait Pane {
  fn name(&self) -> &str;

  /// Continues the last line. Embedded newlines start new lines.
  fn append(&mut self, text: &str);

  /// Adds `line` as a new line after the last one.
  fn push_line(&mut self, line: &str);

  fn last_line(&self) -> &str;
}

pub type SharedPane = Rc<RefCell<dyn Pane>>;

/// In-memory pane with buffer semantics: it always holds at least one
/// (possibly empty) line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferPane {
  name:  String,
  lines: Vec<String>,
}

impl BufferPane {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name:  name.into(),
      lines: vec![String::new()],
    }
  }

  pub fn shared(name: impl Into<String>) -> Rc<RefCell<Self>> {
    Rc::new(RefCell::new(Self::new(name)))
  }

  pub fn lines(&self) -> &[String] {
    &self.lines
  }

  pub fn text(&self) -> String {
    self.lines.join("\n")
  }
}

impl Pane for BufferPane {
  fn name(&self) -> &str {
    &self.name
  }

  fn append(&mut self, text: &str) {
    debug_assert_control_thread("Pane::append");
    let mut pieces = text.split('\n');
    if let Some(first) = pieces.next() {
      match self.lines.last_mut() {
        Some(last) => last.push_str(first),
        None => self.lines.push(first.to_string()),
      }
    }
    self.lines.extend(pieces.map(str::to_string));
  }

  fn push_line(&mut self, line: &str) {
    debug_assert_control_thread("Pane::push_line");
    self.lines.extend(line.split('\n').map(str::to_string));
  }

  fn last_line(&self) -> &str {
    self.lines.last().map(String::as_str).unwrap_or_default()
  }
}
