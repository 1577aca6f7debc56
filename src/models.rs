use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
  Coding,
  Report,
  Daily,
  #[default]
  #[serde(other)]
  Unknown,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  User,
  Assistant,
  Model,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
  Image,
  File,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
  #[serde(rename = "type")]
  pub kind: AttachmentKind,
  pub mime_type: String,
  /// URL or inline `data:` payload.
  pub content: String,
  #[serde(default)]
  pub file_name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
  #[serde(default)]
  pub id: String,
  pub role: Role,
  #[serde(default)]
  pub content: String,
  #[serde(default)]
  pub timestamp: Option<DateTime<Utc>>,
  #[serde(default)]
  pub attachment: Option<Attachment>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
  pub time: String,
  pub utc_time: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
  #[serde(default, deserialize_with = "null_as_default")]
  pub messages: Vec<Message>,
  #[serde(default, deserialize_with = "null_as_default")]
  pub mode: ChatMode,
  #[serde(default)]
  pub model: Option<String>,
  #[serde(default)]
  pub tools: Option<Vec<String>>,
  #[serde(default)]
  pub client_info: Option<ClientInfo>,
}

/// Clients send `null` for fields they leave unset.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de> + Default,
{
  Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ChatRequest {
  /// Known tool identifiers in request order; unknown strings are dropped.
  pub fn enabled_tools(&self) -> Vec<ToolId> {
    self
      .tools
      .as_deref()
      .unwrap_or_default()
      .iter()
      .filter_map(|t| t.parse().ok())
      .collect()
  }
}

#[derive(Serialize, Deserialize)]
pub struct ChatResponse {
  pub response: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ModelInfo {
  pub id: String,
  pub label: String,
  pub capability: String,
}

#[derive(Serialize, Deserialize)]
pub struct ModelsResponse {
  pub default_model: String,
  pub models: Vec<ModelInfo>,
}

/// Tool identifiers accepted in `tools[]`. Declaration order is the order in
/// which the composer evaluates them.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolId {
  Time,
  Weather,
  Calculator,
  Currency,
  Scraper,
  Units,
  DataAnalysis,
  Colors,
  EmailValidator,
  PasswordGen,
  WebSearch,
  Flowchart,
}

impl ToolId {
  pub const ALL: [ToolId; 12] = [
    ToolId::Time,
    ToolId::Weather,
    ToolId::Calculator,
    ToolId::Currency,
    ToolId::Scraper,
    ToolId::Units,
    ToolId::DataAnalysis,
    ToolId::Colors,
    ToolId::EmailValidator,
    ToolId::PasswordGen,
    ToolId::WebSearch,
    ToolId::Flowchart,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      ToolId::Time => "time",
      ToolId::Weather => "weather",
      ToolId::Calculator => "calculator",
      ToolId::Currency => "currency",
      ToolId::Scraper => "scraper",
      ToolId::Units => "units",
      ToolId::DataAnalysis => "data_analysis",
      ToolId::Colors => "colors",
      ToolId::EmailValidator => "email_validator",
      ToolId::PasswordGen => "password_gen",
      ToolId::WebSearch => "web_search",
      ToolId::Flowchart => "flowchart",
    }
  }
}

impl FromStr for ToolId {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    ToolId::ALL
      .iter()
      .copied()
      .find(|t| t.as_str() == s)
      .ok_or_else(|| format!("unknown tool: {s}"))
  }
}
