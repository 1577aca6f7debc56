use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::ModelInfo;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Endpoints {
  pub gemini_base_url: String,
  pub geocoding_url: String,
  pub forecast_url: String,
  pub currency_url: String,
  pub search_url: String,
}

impl Default for Endpoints {
  fn default() -> Self {
    Self {
      gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
      geocoding_url: "https://geocoding-api.open-meteo.com/v1/search".to_string(),
      forecast_url: "https://api.open-meteo.com/v1/forecast".to_string(),
      currency_url: "https://api.frankfurter.app/latest".to_string(),
      search_url: "https://api.tavily.com/search".to_string(),
    }
  }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AppConfig {
  pub host: String,
  pub port: u16,
  pub default_model: String,
  pub models: Vec<ModelInfo>,
  pub reference_doc_path: PathBuf,
  pub reference_trigger: String,
  pub scrape_char_limit: usize,
  pub search_max_results: usize,
  pub request_timeout_secs: u64,
  pub public_base_url: String,
  pub endpoints: Endpoints,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      host: "127.0.0.1".to_string(),
      port: 3000,
      default_model: "gemini-2.5-flash".to_string(),
      models: vec![
        ModelInfo {
          id: "gemini-2.5-flash".to_string(),
          label: "Gemini 2.5 Flash".to_string(),
          capability: "text".to_string(),
        },
        ModelInfo {
          id: "gemini-2.5-pro".to_string(),
          label: "Gemini 2.5 Pro".to_string(),
          capability: "text".to_string(),
        },
        ModelInfo {
          id: "imagen-3.0-generate-002".to_string(),
          label: "Imagen 3".to_string(),
          capability: "image".to_string(),
        },
      ],
      reference_doc_path: PathBuf::from("public/AETPCR.docx"),
      reference_trigger: "aet".to_string(),
      scrape_char_limit: 3000,
      search_max_results: 5,
      request_timeout_secs: 20,
      public_base_url: "http://127.0.0.1:3000".to_string(),
      endpoints: Endpoints::default(),
    }
  }
}

pub fn load_or_init(path: &Path) -> anyhow::Result<AppConfig> {
  if path.exists() {
    let data = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&data)?;
    Ok(config)
  } else {
    let config = AppConfig::default();
    save_config(path, &config)?;
    Ok(config)
  }
}

pub fn save_config(path: &Path, config: &AppConfig) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(config)?;
  std::fs::write(path, json)?;
  Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
  Development,
  Production,
}

impl Environment {
  /// `APP_ENV` wins; otherwise debug builds count as development.
  pub fn from_env() -> Self {
    Self::parse(std::env::var("APP_ENV").ok().as_deref())
  }

  fn parse(value: Option<&str>) -> Self {
    match value.map(|v| v.trim().to_lowercase()).as_deref() {
      Some("production") | Some("prod") => Environment::Production,
      Some("development") | Some("dev") => Environment::Development,
      _ if cfg!(debug_assertions) => Environment::Development,
      _ => Environment::Production,
    }
  }

  pub fn is_production(&self) -> bool {
    *self == Environment::Production
  }
}

/// Secrets are only ever read from the environment.
#[derive(Clone, Default)]
pub struct Credentials {
  pub gemini_api_key: Option<String>,
  pub search_api_key: Option<String>,
}

impl Credentials {
  pub fn from_env() -> Self {
    let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
    Self {
      gemini_api_key: read("GEMINI_API_KEY"),
      search_api_key: read("TAVILY_API_KEY"),
    }
  }
}
