mod composer;
mod compute;
mod config;
mod error;
mod fetch;
mod gemini;
mod instruction;
mod intent;
mod logger;
mod models;
mod persona;
mod router;
mod storage;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{info, warn};

use config::{load_or_init, Credentials, Environment};
use fetch::HttpFetcher;
use gemini::{GeminiClient, LanguageModel};
use router::{run_router, RouterState};
use storage::{init_db, SqliteBlobStore};

const DEFAULT_DATA_DIR: &str = "data";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // A missing .env is fine; the real environment may carry everything.
  let _ = dotenvy::dotenv();

  let data_dir = std::env::var_os("AET_DATA_DIR")
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
  std::fs::create_dir_all(&data_dir).with_context(|| format!("creating data dir {}", data_dir.display()))?;

  let config_path = data_dir.join("config.json");
  let db_path = data_dir.join("blobs.sqlite3");
  let log_path = data_dir.join("aet-assistant.log");

  let config = load_or_init(&config_path).context("loading config.json")?;
  logger::init(&log_path)?;
  info!(config = %config_path.display(), "AET assistant starting up");

  let environment = Environment::from_env();
  let credentials = Credentials::from_env();

  let blobs = SqliteBlobStore::new(init_db(&db_path)?, &config.public_base_url);

  let client = reqwest::Client::builder()
    .timeout(Duration::from_secs(config.request_timeout_secs))
    .build()?;

  let llm: Option<Arc<dyn LanguageModel>> = match &credentials.gemini_api_key {
    Some(key) => Some(Arc::new(GeminiClient::new(
      client.clone(),
      config.endpoints.gemini_base_url.clone(),
      key.clone(),
    ))),
    None => {
      warn!("GEMINI_API_KEY is not set; /api/chat will answer 500");
      None
    }
  };
  if credentials.search_api_key.is_none() {
    warn!("TAVILY_API_KEY is not set; web search will report a configuration error");
  }

  let fetcher = HttpFetcher::new(
    client,
    config.endpoints.clone(),
    credentials.search_api_key.clone(),
    config.scrape_char_limit,
    config.search_max_results,
  );

  let listener = std::net::TcpListener::bind((config.host.as_str(), config.port))
    .with_context(|| format!("binding {}:{}", config.host, config.port))?;

  let state = RouterState {
    started_at: Instant::now(),
    config: Arc::new(config),
    environment,
    llm,
    fetcher: Arc::new(fetcher),
    blobs: Arc::new(blobs),
  };

  run_router(listener, state).await
}
