use std::fmt;

type TextHook = Box<dyn FnMut(&str)>;
type FinishHook = Box<dyn FnOnce()>;
type ErrorHook = Box<dyn FnOnce(&str) -> Option<String>>;

/// Hooks a caller attaches to a job. All of them run on the control thread,
/// inside `JobManager::poll`.
///
/// The hooks are not `Send`; holding them keeps the manager on the thread
/// that created it.
#[derive(Default)]
pub struct Callbacks {
  pub(crate) on_chunk:       Option<TextHook>,
  pub(crate) on_thought:     Option<TextHook>,
  pub(crate) on_finish:      Option<FinishHook>,
  pub(crate) on_error:       Option<ErrorHook>,
  pub(crate) status_message: Option<String>,
}

impl Callbacks {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn on_chunk(mut self, hook: impl FnMut(&str) + 'static) -> Self {
    self.on_chunk = Some(Box::new(hook));
    self
  }

  pub fn on_thought(mut self, hook: impl FnMut(&str) + 'static) -> Self {
    self.on_thought = Some(Box::new(hook));
    self
  }

  pub fn on_finish(mut self, hook: impl FnOnce() + 'static) -> Self {
    self.on_finish = Some(Box::new(hook));
    self
  }

  /// The returned string, if any, replaces the status line for this poll.
  pub fn on_error(mut self, hook: impl FnOnce(&str) -> Option<String> + 'static) -> Self {
    self.on_error = Some(Box::new(hook));
    self
  }

  /// Status text shown while the job streams output.
  pub fn status_message(mut self, message: impl Into<String>) -> Self {
    self.status_message = Some(message.into());
    self
  }
}

impl fmt::Debug for Callbacks {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Callbacks")
      .field("on_chunk", &self.on_chunk.is_some())
      .field("on_thought", &self.on_thought.is_some())
      .field("on_finish", &self.on_finish.is_some())
      .field("on_error", &self.on_error.is_some())
      .field("status_message", &self.status_message)
      .finish()
  }
}
