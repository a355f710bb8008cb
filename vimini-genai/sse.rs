//! Server-sent events over a blocking reader.

use std::io::{
  self,
  BufRead,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
  /// `event:` field, empty when the server sent none.
  pub event: String,
  /// All `data:` lines of the event joined with `\n`.
  pub data:  String,
}

/// Iterates the events of a `text/event-stream` body, one blocking line read
/// at a time.
pub struct SseReader<R> {
  reader: R,
  line:   String,
  done:   bool,
}

impl<R: BufRead> SseReader<R> {
  pub fn new(reader: R) -> Self {
    Self {
      reader,
      line: String::new(),
      done: false,
    }
  }

  fn next_event(&mut self) -> io::Result<Option<SseEvent>> {
    let mut current = SseEvent::default();
    let mut has_data = false;

    loop {
      self.line.clear();
      if self.reader.read_line(&mut self.line)? == 0 {
        self.done = true;
        return Ok(has_data.then_some(current));
      }

      let line = self
        .line
        .trim_end_matches(['\n', '\r'])
        .trim_start_matches('\u{FEFF}');
      if line.is_empty() {
        if has_data {
          return Ok(Some(current));
        }
        continue;
      }
      if line.starts_with(':') {
        continue;
      }

      let (field, value) = match line.split_once(':') {
        Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
        None => (line, ""),
      };
      match field {
        "event" => current.event = value.to_string(),
        "data" => {
          if has_data {
            current.data.push('\n');
          }
          current.data.push_str(value);
          has_data = true;
        },
        _ => {},
      }
    }
  }
}

impl<R: BufRead> Iterator for SseReader<R> {
  type Item = io::Result<SseEvent>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.done {
      return None;
    }
    match self.next_event() {
      Ok(Some(event)) => Some(Ok(event)),
      Ok(None) => None,
      Err(err) => {
        self.done = true;
        Some(Err(err))
      },
    }
  }
}
