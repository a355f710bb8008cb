mod cli;

use std::{
  fs,
  path::Path,
  sync::Arc,
};

use anyhow::{
  Context,
  Result,
};
use clap::Parser;
use vimini::{
  Application,
  CodeTarget,
  Host,
  ReviewTarget,
  logging::setup_logging,
  models::model_lines,
  terminal::{
    TerminalHost,
    TimerFlag,
    run_chat,
    run_until_idle,
    spawn_stdin_reader,
  },
};
use vimini_genai::GeminiClient;
use vimini_job::TextGenerator;
use vimini_loader::{
  Config,
  config::API_KEY_ENV,
  resolve_api_key,
};

use crate::cli::{
  Cli,
  Command,
};

fn main() -> Result<()> {
  let cli = Cli::parse();

  vimini_loader::initialize_config_file(cli.config_file.clone())?;
  let config_path = vimini_loader::config_file()?;
  let mut config = Config::load(&config_path)?;

  let log_file = cli.log_file.clone().or_else(|| config.log_file.clone());
  setup_logging(cli.verbosity, log_file.as_deref())?;
  log::info!("loaded config from {}", config_path.display());
  for warning in &config.warnings {
    log::warn!("{}: {warning}", config_path.display());
  }

  if let Some(model) = cli.model {
    config.model = model;
  }
  config.verbose |= cli.verbose;
  let work_dir = match cli.working_dir {
    Some(dir) => dir,
    None => std::env::current_dir().context("unable to read the working directory")?,
  };

  let gemini = build_client(&config)?.map(Arc::new);
  let client = gemini
    .clone()
    .map(|client| client as Arc<dyn TextGenerator>);
  let timer = TimerFlag::default();
  let interval = config.poll_interval();
  let mut app = Application::new(config, client, timer.clone(), work_dir);
  let input = spawn_stdin_reader().context("failed to read stdin")?;
  let mut host = TerminalHost::stdio(input.clone());
  app.report_config_warnings(&mut host);

  match cli.command {
    Command::Chat { prompt } => {
      let prompt = prompt.join(" ");
      app.chat(&mut host, Some(prompt.as_str()));
      run_chat(&mut app, &mut host, &timer, interval, &input);
    },
    Command::Code {
      file,
      prompt,
      apply,
    } => {
      let text = read_file(&file)?;
      let target = CodeTarget {
        path: Some(fs::canonicalize(&file).unwrap_or(file)),
        text,
      };
      app.code(&mut host, target, &prompt);
      run_until_idle(&mut app, &mut host, &timer, interval);
      if app.proposed_changes().is_some()
        && (apply || host.confirm(&["Apply these changes? [y/n]".to_string()]))
      {
        app.apply_code(&mut host);
      }
    },
    Command::Diff => app.show_diff(&mut host),
    Command::Review { file, git, prompt } => {
      let target = match (file, git) {
        (_, Some(objects)) => ReviewTarget::GitObjects(objects),
        (Some(file), None) => buffer_target(&file)?,
        (None, None) => anyhow::bail!("nothing to review"),
      };
      app.review(&mut host, target, &prompt);
      run_until_idle(&mut app, &mut host, &timer, interval);
    },
    Command::Commit { author } => {
      app.commit(&mut host, author.as_deref());
      run_until_idle(&mut app, &mut host, &timer, interval);
    },
    Command::Complete { file, line, column } => {
      let lines: Vec<String> = read_file(&file)?.lines().map(str::to_string).collect();
      app.autocomplete(&mut host, &lines, line, column);
      run_until_idle(&mut app, &mut host, &timer, interval);
    },
    Command::Models => {
      let client = gemini.context("API key not set")?;
      for line in model_lines(&client.list_models()?) {
        println!("{line}");
      }
    },
  }

  host.finish();
  Ok(())
}

fn build_client(config: &Config) -> Result<Option<GeminiClient>> {
  let token_file = vimini_loader::token_file().ok();
  let Some((key, source)) = resolve_api_key(
    config,
    std::env::var(API_KEY_ENV).ok(),
    token_file.as_deref(),
  ) else {
    log::warn!("no API key in config, ${API_KEY_ENV} or the token file");
    return Ok(None);
  };
  log::debug!("using API key from {source:?}");

  let mut client = GeminiClient::with_timeout(key, config.request_timeout())?;
  if let Some(base_url) = &config.base_url {
    client = client.with_base_url(base_url.as_str());
  }
  Ok(Some(client))
}

fn read_file(file: &Path) -> Result<String> {
  fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))
}

fn buffer_target(file: &Path) -> Result<ReviewTarget> {
  let text = read_file(file)?;
  let filetype = file
    .extension()
    .map(|ext| ext.to_string_lossy().into_owned())
    .unwrap_or_default();
  Ok(ReviewTarget::Buffer { text, filetype })
}
