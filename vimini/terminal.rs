//! Headless host: panes are printed to stdout, messages to stderr, answers
//! are read from stdin.

use std::{
  cell::{
    Cell,
    RefCell,
  },
  collections::HashMap,
  io::{
    self,
    BufRead,
    Write,
  },
  rc::Rc,
  thread,
  time::Duration,
};

use crossbeam::channel::{
  self,
  Receiver,
  RecvTimeoutError,
};
use vimini_job::{
  PollTimer,
  debug_assert_control_thread,
};
use vimini_loader::SplitMethod;

use crate::{
  application::Application,
  host::{
    Host,
    Severity,
  },
  pane::{
    Pane,
    SharedPane,
  },
  review::THOUGHTS_PANE,
};

pub type SharedWriter = Rc<RefCell<dyn Write>>;

/// Command that ends an interactive chat.
pub const QUIT_COMMAND: &str = "/quit";

/// `PollTimer` for a loop that polls while a flag is set.
#[derive(Debug, Clone, Default)]
pub struct TimerFlag(Rc<Cell<bool>>);

impl TimerFlag {
  pub fn is_running(&self) -> bool {
    self.0.get()
  }
}

impl PollTimer for TimerFlag {
  fn start(&mut self) {
    self.0.set(true);
  }

  fn stop(&mut self) {
    self.0.set(false);
  }
}

/// Reads stdin lines on a background thread. The receiver disconnects at
/// end of input.
pub fn spawn_stdin_reader() -> io::Result<Receiver<String>> {
  let (tx, rx) = channel::unbounded();
  thread::Builder::new()
    .name("vimini-stdin".to_string())
    .spawn(move || {
      for line in io::stdin().lock().lines() {
        match line {
          Ok(line) => {
            if tx.send(line).is_err() {
              break;
            }
          },
          Err(err) => {
            log::warn!("failed to read stdin: {err}");
            break;
          },
        }
      }
    })?;
  Ok(rx)
}

struct TerminalPane {
  name: String,
  out:  SharedWriter,
  last: String,
}

impl TerminalPane {
  fn write(&mut self, text: &str) {
    debug_assert_control_thread("TerminalPane::write");
    let mut out = self.out.borrow_mut();
    if let Err(err) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
      log::warn!("failed to write to pane {}: {err}", self.name);
    }
  }
}

impl Pane for TerminalPane {
  fn name(&self) -> &str {
    &self.name
  }

  fn append(&mut self, text: &str) {
    self.write(text);
    match text.rsplit_once('\n') {
      Some((_, tail)) => self.last = tail.to_string(),
      None => self.last.push_str(text),
    }
  }

  fn push_line(&mut self, line: &str) {
    self.write(&format!("\n{line}"));
    self.last = line.rsplit('\n').next().unwrap_or_default().to_string();
  }

  fn last_line(&self) -> &str {
    &self.last
  }
}

pub struct TerminalHost {
  out:         SharedWriter,
  err:         SharedWriter,
  input:       Receiver<String>,
  panes:       HashMap<String, SharedPane>,
  last_status: Option<String>,
}

impl TerminalHost {
  pub fn new(out: SharedWriter, err: SharedWriter, input: Receiver<String>) -> Self {
    Self {
      out,
      err,
      input,
      panes: HashMap::new(),
      last_status: None,
    }
  }

  pub fn stdio(input: Receiver<String>) -> Self {
    let out: SharedWriter = Rc::new(RefCell::new(io::stdout()));
    let err: SharedWriter = Rc::new(RefCell::new(io::stderr()));
    Self::new(out, err, input)
  }

  fn write_err(&mut self, text: &str) {
    let mut err = self.err.borrow_mut();
    if let Err(error) = writeln!(err, "{text}") {
      log::warn!("failed to write message: {error}");
    }
  }

  /// Ends the current pane line so the shell prompt starts on a fresh one.
  pub fn finish(&mut self) {
    let mut out = self.out.borrow_mut();
    if let Err(err) = writeln!(out).and_then(|()| out.flush()) {
      log::warn!("failed to flush output: {err}");
    }
  }
}

impl Host for TerminalHost {
  fn open_pane(&mut self, name: &str, split: SplitMethod) -> SharedPane {
    if let Some(pane) = self.panes.get(name) {
      return pane.clone();
    }
    log::debug!("opening pane {name} ({split:?})");
    let out = if name == THOUGHTS_PANE {
      self.err.clone()
    } else {
      self.out.clone()
    };
    let mut pane = TerminalPane {
      name: name.to_string(),
      out,
      last: String::new(),
    };
    pane.write(&format!("==> {name} <==\n"));

    let pane: SharedPane = Rc::new(RefCell::new(pane));
    self.panes.insert(name.to_string(), pane.clone());
    pane
  }

  fn show_message(&mut self, text: &str, severity: Severity) {
    debug_assert_control_thread("TerminalHost::show_message");
    match severity {
      Severity::Info => {
        if self.last_status.as_deref() == Some(text) {
          return;
        }
        self.last_status = Some(text.to_string());
        self.write_err(text);
      },
      Severity::History => self.write_err(text),
      Severity::Error => self.write_err(&format!("error: {text}")),
    }
  }

  fn confirm(&mut self, lines: &[String]) -> bool {
    for line in lines {
      self.write_err(line);
    }
    match self.input.recv() {
      Ok(answer) => answer.trim_start().starts_with(['y', 'Y']),
      Err(_) => false,
    }
  }

  fn offer_suggestion(&mut self, suggestion: &str) {
    let mut out = self.out.borrow_mut();
    if let Err(err) = writeln!(out, "{suggestion}") {
      log::warn!("failed to write suggestion: {err}");
    }
  }
}

/// Ticks `app` every `interval` until no job is left.
pub fn run_until_idle(
  app: &mut Application,
  host: &mut dyn Host,
  timer: &TimerFlag,
  interval: Duration,
) {
  while timer.is_running() {
    thread::sleep(interval);
    app.tick(host);
  }
}

/// Interactive chat: every input line is a prompt, `/quit` or end of input
/// closes the session. Returns once the session has ended.
pub fn run_chat(
  app: &mut Application,
  host: &mut dyn Host,
  timer: &TimerFlag,
  interval: Duration,
  input: &Receiver<String>,
) {
  let mut input_open = true;
  loop {
    if input_open {
      let received = if timer.is_running() {
        input.recv_timeout(interval)
      } else {
        input.recv().map_err(|_| RecvTimeoutError::Disconnected)
      };
      match received {
        Ok(line) if line.trim() == QUIT_COMMAND => {
          input_open = false;
          app.close_chat(host);
        },
        Ok(line) => {
          app.chat(host, Some(line.as_str()));
        },
        Err(RecvTimeoutError::Timeout) => {},
        Err(RecvTimeoutError::Disconnected) => {
          input_open = false;
          if app.chat_session().is_running() {
            app.close_chat(host);
          }
        },
      }
    } else if timer.is_running() {
      thread::sleep(interval);
    } else {
      break;
    }

    if timer.is_running() {
      app.tick(host);
    }
  }
}
