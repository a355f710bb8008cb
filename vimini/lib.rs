//! Gemini assistant commands for an editor: chat, code generation, review,
//! commit and inline completion.
//!
//! Every command starts a background job through `vimini_job::JobManager`
//! and returns at once. The host drives [`Application::tick`] from its timer
//! to stream results into panes.

pub mod application;
pub mod autocomplete;
pub mod chat;
pub mod code;
pub mod commit;
pub mod host;
pub mod logging;
pub mod models;
pub mod pane;
pub mod review;
pub mod status;
pub mod terminal;

pub use application::Application;
pub use code::CodeTarget;
pub use host::{
  Host,
  Severity,
};
pub use pane::{
  BufferPane,
  Pane,
  SharedPane,
};
pub use review::ReviewTarget;
