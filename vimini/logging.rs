use std::{
  io,
  path::Path,
};

use anyhow::{
  Context,
  Result,
};

/// Level for a `-v` count.
pub fn level_for(verbosity: u8) -> log::LevelFilter {
  match verbosity {
    0 => log::LevelFilter::Warn,
    1 => log::LevelFilter::Info,
    2 => log::LevelFilter::Debug,
    _ => log::LevelFilter::Trace,
  }
}

/// Installs the global logger. Without a log file records go nowhere.
pub fn setup_logging(verbosity: u8, log_file: Option<&Path>) -> Result<()> {
  let base_config = fern::Dispatch::new().level(level_for(verbosity));

  let output: fern::Output = match log_file {
    Some(path) => {
      vimini_loader::ensure_parent_dir(path);
      fern::log_file(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?
        .into()
    },
    None => fern::Output::writer(Box::new(io::sink()), "\n"),
  };

  let file_config = fern::Dispatch::new()
    .format(|out, message, record| {
      out.finish(format_args!(
        "{} {} [{}] {}",
        chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
        record.target(),
        record.level(),
        message
      ))
    })
    .chain(output);

  base_config
    .chain(file_config)
    .apply()
    .context("logger already installed")?;
  Ok(())
}
