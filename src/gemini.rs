use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{Message, Role};

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8192;
const DEFAULT_IMAGE_MIME: &str = "image/png";

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
  #[error("request failed: {0}")]
  Transport(#[from] reqwest::Error),
  #[error("model endpoint returned {0}: {1}")]
  Status(StatusCode, String),
  #[error("unexpected model response: {0}")]
  Decode(String),
  #[error("model returned no candidates")]
  Empty,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
  pub mime_type: String,
  pub data: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Part {
  Text(String),
  InlineData(InlineData),
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
  User,
  Model,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Turn {
  pub role: TurnRole,
  pub parts: Vec<Part>,
}

/// Drops a `data:<mime>;base64,` prefix if present.
pub fn clean_base64(content: &str) -> &str {
  match content.split_once(',') {
    Some((head, rest)) if head.starts_with("data:") => rest,
    _ => content,
  }
}

/// Text plus optional inline attachment. Empty text is left out when an
/// attachment carries the turn.
pub fn message_parts(message: &Message) -> Vec<Part> {
  let mut parts = Vec::new();
  if !message.content.is_empty() || message.attachment.is_none() {
    parts.push(Part::Text(message.content.clone()));
  }
  if let Some(attachment) = &message.attachment {
    parts.push(Part::InlineData(InlineData {
      mime_type: attachment.mime_type.clone(),
      data: clean_base64(&attachment.content).to_string(),
    }));
  }
  parts
}

pub fn to_turn(message: &Message) -> Turn {
  let role = match message.role {
    Role::User => TurnRole::User,
    Role::Assistant | Role::Model => TurnRole::Model,
  };
  Turn {
    role,
    parts: message_parts(message),
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenerateRequest {
  pub model: String,
  pub system_instruction: String,
  pub history: Vec<Turn>,
  pub message: Vec<Part>,
  pub code_execution: bool,
  pub temperature: f32,
  pub max_output_tokens: u32,
}

impl GenerateRequest {
  /// Splits the conversation into history and the turn being answered.
  /// `None` when there are no messages.
  pub fn from_messages(model: &str, system_instruction: String, messages: &[Message]) -> Option<Self> {
    let (last, earlier) = messages.split_last()?;
    Some(Self {
      model: model.to_string(),
      system_instruction,
      history: earlier.iter().map(to_turn).collect(),
      message: message_parts(last),
      code_execution: false,
      temperature: DEFAULT_TEMPERATURE,
      max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
    })
  }

  pub fn with_code_execution(mut self, enabled: bool) -> Self {
    self.code_execution = enabled;
    self
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedImage {
  pub bytes: Vec<u8>,
  pub mime_type: String,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
  async fn generate(&self, request: GenerateRequest) -> Result<String, LlmError>;

  /// `Ok(None)` when the endpoint answered but produced no image.
  async fn generate_image(&self, model: &str, prompt: &str) -> Result<Option<GeneratedImage>, LlmError>;
}

#[derive(Serialize)]
struct SystemContent {
  parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
  max_output_tokens: u32,
  temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody<'a> {
  #[serde(skip_serializing_if = "Option::is_none")]
  system_instruction: Option<SystemContent>,
  contents: Vec<&'a Turn>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  tools: Vec<serde_json::Value>,
  generation_config: GenerationConfig,
}

#[derive(Deserialize)]
struct GenerateResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
  content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
  #[serde(default)]
  parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
  text: Option<String>,
}

#[derive(Deserialize)]
struct PredictResponse {
  #[serde(default)]
  predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
  bytes_base64_encoded: Option<String>,
  mime_type: Option<String>,
}

/// REST client for the Generative Language API.
pub struct GeminiClient {
  client: Client,
  base_url: String,
  api_key: String,
}

impl GeminiClient {
  pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
    Self {
      client,
      base_url: base_url.into().trim_end_matches('/').to_string(),
      api_key: api_key.into(),
    }
  }

  fn endpoint(&self, model: &str, method: &str) -> String {
    format!("{}/models/{}:{}", self.base_url, model, method)
  }

  async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<reqwest::Response, LlmError> {
    let resp = self
      .client
      .post(url)
      .query(&[("key", self.api_key.as_str())])
      .json(body)
      .send()
      .await?;
    if !resp.status().is_success() {
      let status = resp.status();
      let text = resp.text().await.unwrap_or_default();
      return Err(LlmError::Status(status, text));
    }
    Ok(resp)
  }
}

#[async_trait]
impl LanguageModel for GeminiClient {
  async fn generate(&self, request: GenerateRequest) -> Result<String, LlmError> {
    let current = Turn {
      role: TurnRole::User,
      parts: request.message.clone(),
    };
    let mut contents: Vec<&Turn> = request.history.iter().collect();
    contents.push(&current);

    let body = GenerateBody {
      system_instruction: (!request.system_instruction.is_empty()).then(|| SystemContent {
        parts: vec![Part::Text(request.system_instruction.clone())],
      }),
      contents,
      tools: if request.code_execution {
        vec![serde_json::json!({ "codeExecution": {} })]
      } else {
        Vec::new()
      },
      generation_config: GenerationConfig {
        max_output_tokens: request.max_output_tokens,
        temperature: request.temperature,
      },
    };

    debug!(
      model = %request.model,
      history = request.history.len(),
      code_execution = request.code_execution,
      "calling generateContent"
    );
    let resp = self.post(&self.endpoint(&request.model, "generateContent"), &body).await?;
    let parsed: GenerateResponse = resp.json().await.map_err(|e| LlmError::Decode(e.to_string()))?;

    let candidate = parsed.candidates.into_iter().next().ok_or(LlmError::Empty)?;
    let text = candidate
      .content
      .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<String>())
      .unwrap_or_default();
    Ok(text)
  }

  async fn generate_image(&self, model: &str, prompt: &str) -> Result<Option<GeneratedImage>, LlmError> {
    let body = serde_json::json!({
      "instances": [{ "prompt": prompt }],
      "parameters": { "sampleCount": 1, "aspectRatio": "1:1" }
    });
    debug!(model, "calling predict");
    let resp = self.post(&self.endpoint(model, "predict"), &body).await?;
    let parsed: PredictResponse = resp.json().await.map_err(|e| LlmError::Decode(e.to_string()))?;

    let Some(prediction) = parsed.predictions.into_iter().next() else {
      return Ok(None);
    };
    let Some(encoded) = prediction.bytes_base64_encoded else {
      return Ok(None);
    };
    let bytes = base64::engine::general_purpose::STANDARD
      .decode(encoded.as_bytes())
      .map_err(|e| LlmError::Decode(e.to_string()))?;
    Ok(Some(GeneratedImage {
      bytes,
      mime_type: prediction.mime_type.unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string()),
    }))
  }
}
