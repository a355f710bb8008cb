use std::path::PathBuf;

use clap::{
  ArgAction,
  Parser,
  Subcommand,
};

#[derive(Parser, Debug)]
#[command(name = "vimini", about, version)]
pub struct Cli {
  /// Increase logging verbosity (repeat for more detail)
  #[arg(short = 'v', action = ArgAction::Count, global = true)]
  pub verbosity: u8,

  /// Save logs to a specific file
  #[arg(long = "log", value_name = "FILE", global = true)]
  pub log_file: Option<PathBuf>,

  /// Load configuration from a specific file
  #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
  pub config_file: Option<PathBuf>,

  /// Set the working directory (used to find the git repository)
  #[arg(short = 'w', long = "working-dir", value_name = "PATH", global = true)]
  pub working_dir: Option<PathBuf>,

  /// Model to use instead of the configured one
  #[arg(short = 'm', long = "model", global = true)]
  pub model: Option<String>,

  /// Request and show the model's thoughts
  #[arg(long = "verbose", global = true)]
  pub verbose: bool,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
  /// Chat interactively; each stdin line is a prompt, `/quit` ends it
  Chat {
    /// First prompt to send
    prompt: Vec<String>,
  },
  /// Generate changes to a file and show them as a diff
  Code {
    /// File the request is about
    file:   PathBuf,
    /// What to change
    #[arg(short = 'p', long = "prompt")]
    prompt: String,
    /// Write the changes without asking
    #[arg(long = "apply")]
    apply:  bool,
  },
  /// Show unstaged modifications (`git diff`)
  Diff,
  /// Review a file, or the output of `git show` for some objects
  Review {
    /// File to review
    #[arg(conflicts_with = "git", required_unless_present = "git")]
    file: Option<PathBuf>,
    /// Git objects to review, e.g. "HEAD~2 main"
    #[arg(long = "git", value_name = "OBJECTS")]
    git: Option<String>,
    /// Extra instructions appended to the review prompt
    #[arg(short = 'p', long = "prompt", default_value = "")]
    prompt: String,
  },
  /// Stage everything and commit with a generated message
  Commit {
    /// Co-author to credit in a trailer
    #[arg(long = "author")]
    author: Option<String>,
  },
  /// Print a single-line completion for a cursor position in a file
  Complete {
    file:   PathBuf,
    /// Cursor line, 1-based
    #[arg(long = "line")]
    line:   usize,
    /// Cursor column in characters, 0-based
    #[arg(long = "column", default_value_t = 0)]
    column: usize,
  },
  /// List the models available to the API key
  Models,
}
