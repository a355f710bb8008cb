//! Commands driven the way an editor would: start, then tick from a timer.

use std::{
  cell::RefCell,
  collections::HashMap,
  fs,
  path::{
    Path,
    PathBuf,
  },
  process::Command,
  rc::Rc,
  sync::Arc,
  thread,
  time::{
    Duration,
    Instant,
  },
};

use parking_lot::Mutex;
use tempfile::TempDir;
use vimini::{
  Application,
  BufferPane,
  CodeTarget,
  Host,
  ReviewTarget,
  Severity,
  SharedPane,
  status::StatusLine,
  terminal::{
    SharedWriter,
    TerminalHost,
    TimerFlag,
    run_chat,
    run_until_idle,
  },
};
use vimini_job::{
  Content,
  Fragment,
  GenerationRequest,
  ProducerError,
  ResponseChunk,
  ResponseStream,
  Role,
  TextGenerator,
};
use vimini_loader::{
  Config,
  SplitMethod,
};

const DEADLINE: Duration = Duration::from_secs(5);

type Reply = Box<dyn Fn(&GenerationRequest) -> Result<Vec<Fragment>, String> + Send + Sync>;

/// Answers every request with `reply(request)` and keeps what it was asked.
struct ScriptedClient {
  reply:    Reply,
  requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl ScriptedClient {
  fn new(
    reply: impl Fn(&GenerationRequest) -> Result<Vec<Fragment>, String> + Send + Sync + 'static,
  ) -> Self {
    Self {
      reply:    Box::new(reply),
      requests: Arc::new(Mutex::new(Vec::new())),
    }
  }

  fn text(text: &'static str) -> Self {
    Self::new(move |_| Ok(vec![Fragment::text(text)]))
  }
}

impl TextGenerator for ScriptedClient {
  fn generate_stream(&self, request: &GenerationRequest) -> Result<ResponseStream, ProducerError> {
    self.requests.lock().push(request.clone());
    let fragments = (self.reply)(request).map_err(ProducerError::new)?;
    let chunks: Vec<Result<ResponseChunk, ProducerError>> = fragments
      .into_iter()
      .map(|fragment| Ok(ResponseChunk::new(vec![fragment])))
      .collect();
    Ok(Box::new(chunks.into_iter()))
  }
}

#[derive(Default)]
struct RecordingHost {
  panes:         HashMap<String, Rc<RefCell<BufferPane>>>,
  messages:      Vec<(String, Severity)>,
  confirm:       bool,
  confirmations: Vec<Vec<String>>,
  suggestions:   Vec<String>,
  changed:       Vec<PathBuf>,
}

impl RecordingHost {
  fn pane_text(&self, name: &str) -> String {
    self
      .panes
      .get(name)
      .map(|pane| pane.borrow().text())
      .unwrap_or_default()
  }

  fn has_message(&self, needle: &str) -> bool {
    self.messages.iter().any(|(text, _)| text.contains(needle))
  }

  fn errors(&self) -> Vec<&str> {
    self
      .messages
      .iter()
      .filter(|(_, severity)| *severity == Severity::Error)
      .map(|(text, _)| text.as_str())
      .collect()
  }
}

impl Host for RecordingHost {
  fn open_pane(&mut self, name: &str, _split: SplitMethod) -> SharedPane {
    self
      .panes
      .entry(name.to_string())
      .or_insert_with(|| BufferPane::shared(name))
      .clone()
  }

  fn show_message(&mut self, text: &str, severity: Severity) {
    self.messages.push((text.to_string(), severity));
  }

  fn confirm(&mut self, lines: &[String]) -> bool {
    self.confirmations.push(lines.to_vec());
    self.confirm
  }

  fn offer_suggestion(&mut self, suggestion: &str) {
    self.suggestions.push(suggestion.to_string());
  }

  fn file_changed(&mut self, path: &Path) {
    self.changed.push(path.to_path_buf());
  }
}

fn test_config() -> Config {
  Config {
    step_interval_ms: 5,
    poll_interval_ms: 5,
    ..Config::default()
  }
}

fn app_with(client: Option<ScriptedClient>, work_dir: &Path) -> (Application, TimerFlag) {
  app_with_config(test_config(), client, work_dir)
}

fn app_with_config(
  config: Config,
  client: Option<ScriptedClient>,
  work_dir: &Path,
) -> (Application, TimerFlag) {
  let timer = TimerFlag::default();
  let client = client.map(|client| Arc::new(client) as Arc<dyn TextGenerator>);
  let app = Application::new(config, client, timer.clone(), work_dir)
    .with_status_line(StatusLine::with_repo_name(work_dir, "test"));
  (app, timer)
}

/// Ticks like a host timer until `done` holds.
fn tick_until(
  app: &mut Application,
  host: &mut RecordingHost,
  mut done: impl FnMut(&Application, &RecordingHost) -> bool,
) {
  let start = Instant::now();
  while !done(app, host) {
    assert!(start.elapsed() < DEADLINE, "timed out waiting for jobs");
    thread::sleep(Duration::from_millis(2));
    app.tick(host);
  }
}

fn tick_until_idle(app: &mut Application, host: &mut RecordingHost) {
  tick_until(app, host, |app, _| !app.jobs().is_polling());
}

fn git(args: &[&str], dir: &Path) -> String {
  let output = Command::new("git")
    .arg("-C")
    .arg(dir)
    .args(args)
    .env_remove("GIT_DIR")
    .env("GIT_TERMINAL_PROMPT", "false")
    .output()
    .unwrap_or_else(|_| panic!("`git {args:?}` failed"));
  assert!(
    output.status.success(),
    "`git {args:?}` failed: {}",
    String::from_utf8_lossy(&output.stderr)
  );
  String::from_utf8_lossy(&output.stdout).into_owned()
}

fn repo_with_change() -> TempDir {
  let repo = tempfile::tempdir().unwrap();
  git(&["init"], repo.path());
  git(&["config", "user.email", "test@vimini.dev"], repo.path());
  git(&["config", "user.name", "vimini-test"], repo.path());
  git(&["config", "commit.gpgsign", "false"], repo.path());
  fs::write(repo.path().join("README"), "vimini\n").unwrap();
  git(&["add", "-A"], repo.path());
  git(&["commit", "-m", "initial"], repo.path());
  fs::write(repo.path().join("hello.txt"), "hello\n").unwrap();
  repo
}

#[test]
fn chat_keeps_conversation_and_terminates() {
  let dir = tempfile::tempdir().unwrap();
  let client = ScriptedClient::new(|request| {
    let turns = request.contents.len();
    Ok(vec![Fragment::text(format!("reply {turns}"))])
  });
  let requests = Arc::clone(&client.requests);
  let (mut app, _timer) = app_with(Some(client), dir.path());
  let mut host = RecordingHost::default();

  let job = app.chat(&mut host, Some("  'hello'  ")).expect("chat job");
  tick_until(&mut app, &mut host, |app, _| app.chat_session().history().len() == 2);
  tick_until(&mut app, &mut host, |_, host| host.pane_text("Vimini Chat").contains("reply 1"));

  assert_eq!(app.chat(&mut host, Some("again")), Some(job));
  tick_until(&mut app, &mut host, |_, host| host.pane_text("Vimini Chat").contains("reply 3"));

  let second = requests.lock()[1].clone();
  assert_eq!(second.contents, vec![
    Content::user("hello"),
    Content::model("reply 1"),
    Content::user("again"),
  ]);
  assert!(app.jobs().is_active(job));

  assert!(app.close_chat(&mut host));
  tick_until_idle(&mut app, &mut host);
  assert!(!app.chat_session().is_running());
  assert_eq!(
    host.panes["Vimini Chat"].borrow().lines(),
    ["", "Q: hello", "---", "A: reply 1", "", "Q: again", "---", "A: reply 3", "", "Terminated"]
  );
  assert!(host.has_message("[Vimini (test)] [Job 1] Done"));
}

#[test]
fn chat_error_resets_session() {
  let dir = tempfile::tempdir().unwrap();
  let (mut app, _timer) = app_with(
    Some(ScriptedClient::new(|_| Err("quota exceeded".to_string()))),
    dir.path(),
  );
  let mut host = RecordingHost::default();

  app.chat(&mut host, Some("hi")).expect("chat job");
  tick_until_idle(&mut app, &mut host);

  assert!(!app.chat_session().is_running());
  assert!(host.pane_text("Vimini Chat").contains("[Error: quota exceeded]"));
  assert!(host.has_message("[Job 1] Chat Error: quota exceeded"));
}

#[test]
fn chat_without_key_reports_error() {
  let dir = tempfile::tempdir().unwrap();
  let (mut app, timer) = app_with(None, dir.path());
  let mut host = RecordingHost::default();

  assert_eq!(app.chat(&mut host, Some("hi")), None);
  assert!(!timer.is_running());
  assert!(host.errors().iter().any(|error| error.contains("API key not set")));
  assert!(!app.close_chat(&mut host));
}

#[test]
fn review_streams_answer_and_thoughts() {
  let dir = tempfile::tempdir().unwrap();
  let client = ScriptedClient::new(|_| {
    Ok(vec![
      Fragment::thought("looking"),
      Fragment::text("Looks "),
      Fragment::text("fine."),
    ])
  });
  let requests = Arc::clone(&client.requests);
  let config = Config {
    verbose: true,
    ..test_config()
  };
  let (mut app, _timer) = app_with_config(config, Some(client), dir.path());
  let mut host = RecordingHost::default();

  let target = ReviewTarget::Buffer {
    text:     "fn main() {}".to_string(),
    filetype: "rust".to_string(),
  };
  app.review(&mut host, target, "Be brief.").expect("review job");
  tick_until_idle(&mut app, &mut host);

  assert_eq!(host.pane_text("Vimini Review"), "Looks fine.");
  assert_eq!(host.pane_text("Vimini Thoughts"), "looking");
  assert!(host.has_message("[Vimini (test)] Processing..."));
  assert!(host.has_message("[Vimini (test)] [Job 1] Done"));

  let request = requests.lock()[0].clone();
  assert!(request.verbose);
  let prompt = &request.contents[0].text;
  assert!(prompt.starts_with("Please review the following rust code"));
  assert!(prompt.contains("fn main() {}"));
  assert!(prompt.contains("Be brief."));
}

#[test]
fn quiet_review_drops_thoughts() {
  let dir = tempfile::tempdir().unwrap();
  let client = ScriptedClient::new(|_| Ok(vec![Fragment::thought("hidden"), Fragment::text("ok")]));
  let (mut app, _timer) = app_with(Some(client), dir.path());
  let mut host = RecordingHost::default();

  let target = ReviewTarget::Buffer {
    text:     "x = 1".to_string(),
    filetype: String::new(),
  };
  app.review(&mut host, target, "").expect("review job");
  tick_until_idle(&mut app, &mut host);

  assert_eq!(host.pane_text("Vimini Review"), "ok");
  assert!(!host.panes.contains_key("Vimini Thoughts"));
}

#[test]
fn empty_review_starts_nothing() {
  let dir = tempfile::tempdir().unwrap();
  let (mut app, timer) = app_with(Some(ScriptedClient::text("unused")), dir.path());
  let mut host = RecordingHost::default();

  let target = ReviewTarget::Buffer {
    text:     " \n\t".to_string(),
    filetype: "rust".to_string(),
  };
  assert_eq!(app.review(&mut host, target, ""), None);
  assert!(!timer.is_running());
  assert!(
    host
      .messages
      .contains(&("[Vimini (test)] Nothing to review.".to_string(), Severity::History))
  );
}

#[test]
fn git_review_refuses_options() {
  let repo = repo_with_change();
  let (mut app, _timer) = app_with(Some(ScriptedClient::text("unused")), repo.path());
  let mut host = RecordingHost::default();

  let target = ReviewTarget::GitObjects("HEAD --output=/tmp/owned".to_string());
  assert_eq!(app.review(&mut host, target, ""), None);
  assert!(host.errors().iter().any(|error| error.contains("not allowed")));
  assert!(host.panes.is_empty());
}

#[test]
fn git_review_shows_target_and_reviews_it() {
  let repo = repo_with_change();
  let client = ScriptedClient::text("LGTM");
  let requests = Arc::clone(&client.requests);
  let (mut app, _timer) = app_with(Some(client), repo.path());
  let mut host = RecordingHost::default();

  app
    .review(&mut host, ReviewTarget::GitObjects("HEAD".to_string()), "")
    .expect("review job");
  tick_until_idle(&mut app, &mut host);

  assert!(host.pane_text("Vimini Git Review Target: HEAD").contains("initial"));
  assert_eq!(host.pane_text("Vimini Review"), "LGTM");
  let prompt = requests.lock()[0].contents[0].text.clone();
  assert!(prompt.contains("the output of `git show HEAD`"));
}

#[test]
fn commit_confirmed_creates_commit() {
  let repo = repo_with_change();
  let client = ScriptedClient::text("Add greeting\n---\nAdds a hello file.");
  let requests = Arc::clone(&client.requests);
  let (mut app, _timer) = app_with(Some(client), repo.path());
  let mut host = RecordingHost {
    confirm: true,
    ..RecordingHost::default()
  };

  app
    .commit(&mut host, Some("Ada <ada@example.com>"))
    .expect("commit job");
  tick_until_idle(&mut app, &mut host);

  assert!(requests.lock()[0].contents[0].text.contains("+hello"));
  assert_eq!(host.confirmations.len(), 1);
  assert_eq!(host.confirmations[0][0], "Subject: Add greeting");
  assert!(host.has_message("Commit successful"));

  let message = git(&["log", "-1", "--format=%B"], repo.path());
  assert!(message.starts_with("Add greeting\n\nAdds a hello file."));
  assert!(message.contains("Co-authored-by: Ada <ada@example.com>"));
  assert!(message.contains("Signed-off-by: vimini-test <test@vimini.dev>"));
}

#[test]
fn commit_rejected_unstages() {
  let repo = repo_with_change();
  let (mut app, _timer) = app_with(Some(ScriptedClient::text("Add greeting")), repo.path());
  let mut host = RecordingHost::default();

  app.commit(&mut host, None).expect("commit job");
  tick_until_idle(&mut app, &mut host);

  assert_eq!(host.confirmations.len(), 1);
  assert!(host.errors().iter().any(|error| error.contains("Commit cancelled")));
  assert!(git(&["diff", "--staged"], repo.path()).is_empty());
  assert_eq!(git(&["log", "--format=%s"], repo.path()).trim(), "initial");
}

#[test]
fn commit_generation_error_unstages() {
  let repo = repo_with_change();
  let (mut app, _timer) = app_with(
    Some(ScriptedClient::new(|_| Err("timeout".to_string()))),
    repo.path(),
  );
  let mut host = RecordingHost::default();

  app.commit(&mut host, None).expect("commit job");
  tick_until_idle(&mut app, &mut host);

  assert!(host.confirmations.is_empty());
  assert!(host.has_message("Commit Error: timeout"));
  assert!(git(&["diff", "--staged"], repo.path()).is_empty());
}

#[test]
fn commit_without_changes() {
  let repo = repo_with_change();
  fs::remove_file(repo.path().join("hello.txt")).unwrap();
  let (mut app, timer) = app_with(Some(ScriptedClient::text("unused")), repo.path());
  let mut host = RecordingHost::default();

  assert_eq!(app.commit(&mut host, None), None);
  assert!(!timer.is_running());
  assert!(host.has_message("No changes to commit."));
}

#[cfg(unix)]
#[test]
fn failed_git_commit_keeps_changes_staged() {
  use std::os::unix::fs::PermissionsExt;

  let repo = repo_with_change();
  let hook = repo.path().join(".git/hooks/pre-commit");
  fs::create_dir_all(hook.parent().unwrap()).unwrap();
  fs::write(&hook, "#!/bin/sh\nexit 1\n").unwrap();
  fs::set_permissions(&hook, fs::Permissions::from_mode(0o755)).unwrap();

  let (mut app, _timer) = app_with(Some(ScriptedClient::text("Add greeting")), repo.path());
  let mut host = RecordingHost {
    confirm: true,
    ..RecordingHost::default()
  };
  app.commit(&mut host, None).expect("commit job");
  tick_until_idle(&mut app, &mut host);

  let errors = host.errors();
  assert!(
    errors
      .iter()
      .any(|error| error.contains("Git commit failed") && error.contains("still staged")),
    "{errors:?}"
  );
  assert!(git(&["diff", "--staged"], repo.path()).contains("+hello"));
  assert_eq!(git(&["log", "--format=%s"], repo.path()).trim(), "initial");
}

#[test]
fn invalid_temperature_is_shown_once() {
  let dir = tempfile::tempdir().unwrap();
  let config = Config {
    step_interval_ms: 5,
    poll_interval_ms: 5,
    ..Config::parse("temperature = 5.0").unwrap()
  };
  let (mut app, _timer) = app_with_config(config, None, dir.path());
  let mut host = RecordingHost::default();

  app.report_config_warnings(&mut host);
  assert_eq!(host.errors(), [
    "[Vimini (test)] Temperature must be between 0.0 and 2.0. Using default."
  ]);
  assert_eq!(app.config().temperature, None);

  app.report_config_warnings(&mut host);
  assert_eq!(host.messages.len(), 1);
}

fn json_client(reply: serde_json::Value) -> ScriptedClient {
  let reply = reply.to_string();
  ScriptedClient::new(move |_| Ok(vec![Fragment::text(reply.clone())]))
}

fn greet_dir() -> TempDir {
  let dir = tempfile::tempdir().unwrap();
  fs::write(dir.path().join("greet.txt"), "hello\n").unwrap();
  dir
}

fn greet_target(dir: &Path) -> CodeTarget {
  CodeTarget {
    path: Some(dir.join("greet.txt")),
    text: "hello\n".to_string(),
  }
}

#[test]
fn code_shows_diff_and_applies() {
  let dir = greet_dir();
  let client = json_client(serde_json::json!({
    "files": [
      {"file_path": "greet.txt", "file_type": "text/plain", "file_content": "hello world\n"},
      {"file_path": "sub/new.txt", "file_type": "text/plain", "file_content": "fresh\n"}
    ]
  }));
  let requests = Arc::clone(&client.requests);
  let (mut app, _timer) = app_with(Some(client), dir.path());
  let mut host = RecordingHost::default();

  app
    .code(&mut host, greet_target(dir.path()), "Greet the world.")
    .expect("code job");
  tick_until_idle(&mut app, &mut host);

  let request = requests.lock()[0].clone();
  assert_eq!(request.response_mime_type.as_deref(), Some("application/json"));
  assert!(request.contents[0].text.starts_with("Greet the world."));
  assert!(request.contents[0].text.contains("--- FILE: greet.txt ---\nhello\n"));

  let diff = host.pane_text("Vimini Diff");
  assert!(diff.contains("--- a/greet.txt\n+++ b/greet.txt"));
  assert!(diff.contains("-hello\n+hello world"));
  assert!(diff.contains("new file mode 100644\n--- /dev/null\n+++ b/sub/new.txt"));
  assert!(diff.contains("+fresh"));
  assert_eq!(fs::read_to_string(dir.path().join("greet.txt")).unwrap(), "hello\n");
  assert_eq!(app.proposed_changes().map(|changes| changes.files.len()), Some(2));

  assert!(app.apply_code(&mut host));
  assert_eq!(fs::read_to_string(dir.path().join("greet.txt")).unwrap(), "hello world\n");
  assert_eq!(fs::read_to_string(dir.path().join("sub/new.txt")).unwrap(), "fresh\n");
  assert!(host.has_message("Applied changes to: greet.txt, sub/new.txt"));
  assert_eq!(host.changed, [
    dir.path().join("greet.txt"),
    dir.path().join("sub/new.txt"),
  ]);
  assert!(app.proposed_changes().is_none());
}

#[test]
fn code_applies_patches() {
  let dir = greet_dir();
  let patch = "--- a/greet.txt\n+++ b/greet.txt\n@@ -1 +1 @@\n-hello\n+hi\n";
  let client = json_client(serde_json::json!({
    "files": [{"file_path": "greet.txt", "file_type": "text/x-diff", "file_content": patch}]
  }));
  let (mut app, _timer) = app_with(Some(client), dir.path());
  let mut host = RecordingHost::default();

  app.code(&mut host, greet_target(dir.path()), "Shorter.").expect("code job");
  tick_until_idle(&mut app, &mut host);

  assert_eq!(host.pane_text("Vimini Diff"), patch.trim_end());
  assert!(app.apply_code(&mut host));
  assert_eq!(fs::read_to_string(dir.path().join("greet.txt")).unwrap(), "hi\n");
}

#[test]
fn failed_patch_keeps_changes() {
  let dir = greet_dir();
  let patch = "--- a/greet.txt\n+++ b/greet.txt\n@@ -1 +1 @@\n-goodbye\n+hi\n";
  let client = json_client(serde_json::json!({
    "files": [{"file_path": "greet.txt", "file_type": "text/x-diff", "file_content": patch}]
  }));
  let (mut app, _timer) = app_with(Some(client), dir.path());
  let mut host = RecordingHost::default();

  app.code(&mut host, greet_target(dir.path()), "Shorter.").expect("code job");
  tick_until_idle(&mut app, &mut host);

  assert!(!app.apply_code(&mut host));
  assert!(host.has_message("Error processing greet.txt"));
  assert!(host.has_message("The changes are kept for another attempt."));
  assert!(app.proposed_changes().is_some());
  assert_eq!(fs::read_to_string(dir.path().join("greet.txt")).unwrap(), "hello\n");
}

#[test]
fn code_reply_that_is_not_json_goes_to_raw_pane() {
  let dir = greet_dir();
  let (mut app, _timer) = app_with(Some(ScriptedClient::text("Sure, here you go")), dir.path());
  let mut host = RecordingHost::default();

  app.code(&mut host, greet_target(dir.path()), "Anything.").expect("code job");
  tick_until_idle(&mut app, &mut host);

  assert!(
    host
      .errors()
      .iter()
      .any(|error| error.contains("AI did not return valid JSON for files"))
  );
  assert_eq!(host.pane_text("Vimini Raw Output"), "Sure, here you go");
  assert!(!host.panes.contains_key("Vimini Diff"));
  assert!(app.proposed_changes().is_none());
}

#[test]
fn identical_code_proposes_nothing() {
  let dir = greet_dir();
  let client = json_client(serde_json::json!({
    "files": [{"file_path": "greet.txt", "file_content": "hello\n"}]
  }));
  let (mut app, _timer) = app_with(Some(client), dir.path());
  let mut host = RecordingHost::default();

  app.code(&mut host, greet_target(dir.path()), "No-op.").expect("code job");
  tick_until_idle(&mut app, &mut host);

  assert!(host.has_message("AI content is identical to the original files"));
  assert!(app.proposed_changes().is_none());
  assert!(!app.apply_code(&mut host));
  assert!(host.has_message("No generated changes to apply."));
}

#[test]
fn code_outside_the_project_is_refused() {
  let dir = greet_dir();
  let client = json_client(serde_json::json!({
    "files": [{"file_path": "../escape.txt", "file_content": "out\n"}]
  }));
  let (mut app, _timer) = app_with(Some(client), dir.path());
  let mut host = RecordingHost::default();

  app.code(&mut host, greet_target(dir.path()), "Escape.").expect("code job");
  tick_until_idle(&mut app, &mut host);

  assert!(host.has_message("Refusing changes outside the project: ../escape.txt"));
  assert!(app.proposed_changes().is_none());
  assert!(!dir.path().parent().unwrap().join("escape.txt").exists());
}

#[test]
fn verbose_code_streams_thoughts() {
  let dir = greet_dir();
  let reply = serde_json::json!({
    "files": [{"file_path": "greet.txt", "file_content": "hey\n"}]
  })
  .to_string();
  let client = ScriptedClient::new(move |_| {
    Ok(vec![Fragment::thought("weighing greetings"), Fragment::text(reply.clone())])
  });
  let requests = Arc::clone(&client.requests);
  let config = Config {
    verbose: true,
    ..test_config()
  };
  let (mut app, _timer) = app_with_config(config, Some(client), dir.path());
  let mut host = RecordingHost::default();

  app.code(&mut host, greet_target(dir.path()), "Shorter.").expect("code job");
  tick_until_idle(&mut app, &mut host);

  assert!(requests.lock()[0].verbose);
  assert_eq!(host.pane_text("Vimini Thoughts"), "weighing greetings");
  assert!(host.pane_text("Vimini Diff").contains("+hey"));
}

#[test]
fn empty_code_prompt_starts_nothing() {
  let dir = greet_dir();
  let (mut app, timer) = app_with(Some(ScriptedClient::text("unused")), dir.path());
  let mut host = RecordingHost::default();

  assert_eq!(app.code(&mut host, greet_target(dir.path()), "   "), None);
  assert!(!timer.is_running());
  assert!(host.has_message("Nothing to generate without a prompt."));
}

#[test]
fn show_diff_lists_working_tree_changes() {
  let repo = repo_with_change();
  let (mut app, _timer) = app_with(None, repo.path());
  let mut host = RecordingHost::default();

  app.show_diff(&mut host);
  assert!(host.has_message("No modifications found."));
  assert!(!host.panes.contains_key("Git Diff"));

  fs::write(repo.path().join("README"), "vimini\nmore\n").unwrap();
  app.show_diff(&mut host);
  let diff = host.pane_text("Git Diff");
  assert!(diff.starts_with("diff --git a/README b/README"));
  assert!(diff.contains("+more"));
  assert!(!diff.contains("hello.txt"));
}

fn completion_client() -> ScriptedClient {
  ScriptedClient::new(|request| {
    let prompt = &request.contents[0].text;
    let reply = if prompt.contains("alpha<CURSOR>") {
      "\n alpha_done();\nignored"
    } else {
      "beta_done();"
    };
    Ok(vec![Fragment::text(reply)])
  })
}

#[test]
fn completion_offers_first_line() {
  let dir = tempfile::tempdir().unwrap();
  let client = completion_client();
  let requests = Arc::clone(&client.requests);
  let (mut app, _timer) = app_with(Some(client), dir.path());
  let mut host = RecordingHost::default();

  let lines = vec!["let x = 1;".to_string(), "alpha".to_string()];
  app.autocomplete(&mut host, &lines, 2, 5).expect("completion job");
  tick_until_idle(&mut app, &mut host);

  assert_eq!(host.suggestions, vec!["alpha_done();"]);
  let request = requests.lock()[0].clone();
  assert_eq!(request.model, app.config().autocomplete_model);
  assert_eq!(request.contents[0].role, Role::User);
}

#[test]
fn newer_completion_makes_older_stale() {
  let dir = tempfile::tempdir().unwrap();
  let (mut app, _timer) = app_with(Some(completion_client()), dir.path());
  let mut host = RecordingHost::default();

  let first = app
    .autocomplete(&mut host, &["alpha".to_string()], 1, 5)
    .expect("first job");
  let second = app
    .autocomplete(&mut host, &["beta".to_string()], 1, 4)
    .expect("second job");
  assert!(second > first);
  tick_until_idle(&mut app, &mut host);

  assert_eq!(host.suggestions, vec!["beta_done();"]);
}

#[test]
fn cancelled_completion_is_dropped() {
  let dir = tempfile::tempdir().unwrap();
  let (mut app, _timer) = app_with(Some(completion_client()), dir.path());
  let mut host = RecordingHost::default();

  app
    .autocomplete(&mut host, &["alpha".to_string()], 1, 5)
    .expect("completion job");
  app.cancel_autocomplete();
  tick_until_idle(&mut app, &mut host);

  assert!(host.suggestions.is_empty());
}

#[derive(Clone, Default)]
struct Captured(Rc<RefCell<Vec<u8>>>);

impl Captured {
  fn writer(&self) -> SharedWriter {
    self.0.clone()
  }

  fn text(&self) -> String {
    String::from_utf8_lossy(&self.0.borrow()).into_owned()
  }
}

#[test]
fn terminal_chat_answers_then_ends_at_eof() {
  let dir = tempfile::tempdir().unwrap();
  let (mut app, timer) = app_with(Some(ScriptedClient::text("Hi there")), dir.path());
  let (out, err) = (Captured::default(), Captured::default());
  let (tx, rx) = crossbeam::channel::unbounded();
  let mut host = TerminalHost::new(out.writer(), err.writer(), rx.clone());

  tx.send("hello".to_string()).unwrap();
  drop(tx);
  run_chat(&mut app, &mut host, &timer, Duration::from_millis(5), &rx);

  assert!(!timer.is_running());
  let stdout = out.text();
  assert!(stdout.starts_with("==> Vimini Chat <==\n"));
  assert!(stdout.contains("Q: hello\n---\nA: Hi there"));
  assert!(stdout.ends_with("\nTerminated"));
  assert!(err.text().contains("[Vimini (test)] [Job 1] Done"));
}

#[test]
fn terminal_commit_reads_confirmation() {
  let repo = repo_with_change();
  let (mut app, timer) = app_with(Some(ScriptedClient::text("Add greeting")), repo.path());
  let (out, err) = (Captured::default(), Captured::default());
  let (tx, rx) = crossbeam::channel::unbounded();
  let mut host = TerminalHost::new(out.writer(), err.writer(), rx);

  tx.send("y".to_string()).unwrap();
  app.commit(&mut host, None).expect("commit job");
  run_until_idle(&mut app, &mut host, &timer, Duration::from_millis(5));

  assert!(err.text().contains("Commit with this message? [y/n]"));
  assert_eq!(git(&["log", "-1", "--format=%s"], repo.path()).trim(), "Add greeting");
}
