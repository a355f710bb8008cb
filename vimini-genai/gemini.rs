use std::{
  io::BufReader,
  time::Duration,
};

use reqwest::blocking::{
  Client,
  Response,
};
use serde::{
  Deserialize,
  Serialize,
};
use vimini_job::{
  Fragment,
  GenerationRequest,
  ProducerError,
  ResponseChunk,
  ResponseStream,
  Role,
  TextGenerator,
};

use crate::{
  GenerateError,
  Result,
  sse::{
    SseEvent,
    SseReader,
  },
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Blocking client for the Gemini `generateContent` API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
  http:     Client,
  api_key:  String,
  base_url: String,
}

impl GeminiClient {
  pub fn new(api_key: impl Into<String>) -> Result<Self> {
    Self::with_timeout(api_key, DEFAULT_TIMEOUT)
  }

  pub fn with_timeout(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
    let api_key = api_key.into();
    if api_key.trim().is_empty() {
      return Err(GenerateError::MissingApiKey);
    }
    let http = Client::builder()
      .timeout(timeout)
      .user_agent(concat!("vimini/", env!("CARGO_PKG_VERSION")))
      .build()?;
    Ok(Self {
      http,
      api_key,
      base_url: DEFAULT_BASE_URL.to_string(),
    })
  }

  #[must_use]
  pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
    self.base_url = base_url.into().trim_end_matches('/').to_string();
    self
  }

  pub fn streaming_url(&self, model: &str) -> String {
    format!(
      "{}/{}:streamGenerateContent?alt=sse",
      self.base_url,
      model_path(model)
    )
  }

  fn models_url(&self) -> String {
    format!("{}/models", self.base_url)
  }

  /// Starts a streamed generation and returns its chunks as they arrive.
  pub fn stream(&self, request: &GenerationRequest) -> Result<ResponseStream> {
    let url = self.streaming_url(&request.model);
    log::debug!(
      "POST {url} ({} content turns, verbose: {})",
      request.contents.len(),
      request.verbose
    );

    let response = self
      .http
      .post(&url)
      .header(API_KEY_HEADER, &self.api_key)
      .json(&WireRequest::from_request(request))
      .send()?;
    let response = check_status(response)?;

    let events = SseReader::new(BufReader::new(response));
    Ok(Box::new(events.filter_map(|event| {
      let chunk = event.map_err(GenerateError::from).and_then(event_chunk);
      match chunk {
        Ok(Some(chunk)) => Some(Ok(chunk)),
        Ok(None) => None,
        Err(err) => Some(Err(ProducerError::from(err))),
      }
    })))
  }

  /// Names of the models available to this key.
  pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
    let mut models = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
      let mut call = self
        .http
        .get(self.models_url())
        .header(API_KEY_HEADER, &self.api_key);
      if let Some(token) = &page_token {
        call = call.query(&[("pageToken", token)]);
      }
      let page: ModelPage = check_status(call.send()?)?.json()?;
      models.extend(page.models);

      match page.next_page_token.filter(|token| !token.is_empty()) {
        Some(token) => page_token = Some(token),
        None => break,
      }
    }
    Ok(models)
  }
}

impl TextGenerator for GeminiClient {
  fn generate_stream(&self, request: &GenerationRequest) -> Result<ResponseStream, ProducerError> {
    self.stream(request).map_err(ProducerError::from)
  }
}

fn model_path(model: &str) -> String {
  if model.starts_with("models/") || model.starts_with("tunedModels/") {
    model.to_string()
  } else {
    format!("models/{model}")
  }
}

fn check_status(response: Response) -> Result<Response> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }
  let body = response.text().unwrap_or_default();
  let message = serde_json::from_str::<ErrorEnvelope>(&body)
    .map(|envelope| envelope.error.message)
    .unwrap_or(body);
  Err(GenerateError::Status {
    status: status.as_u16(),
    body:   message,
  })
}

/// Decodes one SSE payload. `None` when the event carries no text.
/// Only `message` events, the default type, carry response chunks.
fn event_chunk(event: SseEvent) -> Result<Option<ResponseChunk>> {
  if !event.event.is_empty() && event.event != "message" {
    log::debug!("skipping `{}` event", event.event);
    return Ok(None);
  }
  parse_chunk(&event.data)
}

pub(crate) fn parse_chunk(data: &str) -> Result<Option<ResponseChunk>> {
  let data = data.trim();
  if data.is_empty() || data == "[DONE]" {
    return Ok(None);
  }

  let response: WireResponse = serde_json::from_str(data)?;
  if let Some(error) = response.error {
    return Err(GenerateError::Api(error.message));
  }

  let fragments: Vec<Fragment> = response
    .candidates
    .into_iter()
    .next()
    .and_then(|candidate| candidate.content)
    .map(|content| content.parts)
    .unwrap_or_default()
    .into_iter()
    .filter_map(|part| {
      let text = part.text.filter(|text| !text.is_empty())?;
      Some(Fragment {
        text,
        thought: part.thought,
      })
    })
    .collect();

  if fragments.is_empty() {
    Ok(None)
  } else {
    Ok(Some(ResponseChunk::new(fragments)))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
  pub name:         String,
  #[serde(default)]
  pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelPage {
  #[serde(default)]
  models:          Vec<ModelInfo>,
  #[serde(default)]
  next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest<'a> {
  contents:          Vec<WireContent<'a>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  generation_config: Option<WireGenerationConfig<'a>>,
}

#[derive(Debug, Serialize)]
struct WireContent<'a> {
  role:  &'static str,
  parts: Vec<WirePart<'a>>,
}

#[derive(Debug, Serialize)]
struct WirePart<'a> {
  text: &'a str,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig<'a> {
  #[serde(skip_serializing_if = "Option::is_none")]
  temperature:        Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  thinking_config:    Option<WireThinkingConfig>,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_mime_type: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireThinkingConfig {
  include_thoughts: bool,
}

impl<'a> WireRequest<'a> {
  fn from_request(request: &'a GenerationRequest) -> Self {
    let contents = request
      .contents
      .iter()
      .map(|content| {
        WireContent {
          role:  match content.role {
            Role::User => "user",
            Role::Model => "model",
          },
          parts: vec![WirePart {
            text: &content.text,
          }],
        }
      })
      .collect();

    let config = WireGenerationConfig {
      temperature:        request.temperature,
      thinking_config:    request.verbose.then_some(WireThinkingConfig {
        include_thoughts: true,
      }),
      response_mime_type: request.response_mime_type.as_deref(),
    };
    let has_config = config.temperature.is_some()
      || config.thinking_config.is_some()
      || config.response_mime_type.is_some();

    Self {
      contents,
      generation_config: has_config.then_some(config),
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
  #[serde(default)]
  candidates: Vec<WireCandidate>,
  #[serde(default)]
  error:      Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct WireCandidate {
  #[serde(default)]
  content: Option<WireCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct WireCandidateContent {
  #[serde(default)]
  parts: Vec<WireResponsePart>,
}

#[derive(Debug, Deserialize)]
struct WireResponsePart {
  #[serde(default)]
  text:    Option<String>,
  #[serde(default)]
  thought: bool,
}

#[derive(Debug, Deserialize)]
struct WireError {
  message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
  error: WireError,
}
