use std::net::TcpListener;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::composer::{compose, Capability, ComposeContext, ReferenceDoc};
use crate::config::{AppConfig, Environment};
use crate::error::ChatError;
use crate::fetch::ToolFetcher;
use crate::gemini::{GenerateRequest, LanguageModel, LlmError};
use crate::models::{ChatRequest, ChatResponse, ModelsResponse};
use crate::storage::BlobStore;

pub struct RouterState {
  pub started_at: Instant,
  pub config: Arc<AppConfig>,
  pub environment: Environment,
  /// `None` when no model credential is configured.
  pub llm: Option<Arc<dyn LanguageModel>>,
  pub fetcher: Arc<dyn ToolFetcher>,
  pub blobs: Arc<dyn BlobStore>,
}

pub fn app(state: RouterState) -> Router {
  Router::new()
    .route("/health", get(health))
    .route("/v1/models", get(models))
    .route("/api/chat", post(chat))
    .route("/blobs/:id", get(blob))
    .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
    .with_state(Arc::new(state))
}

pub async fn run_router(listener: TcpListener, state: RouterState) -> anyhow::Result<()> {
  listener.set_nonblocking(true)?;
  let listener = tokio::net::TcpListener::from_std(listener)?;
  info!(addr = %listener.local_addr()?, "router listening");
  axum::serve(listener, app(state)).await?;
  Ok(())
}

async fn health(State(state): State<Arc<RouterState>>) -> Json<serde_json::Value> {
  let uptime = state.started_at.elapsed().as_millis();
  Json(serde_json::json!({
    "status": "ok",
    "version": env!("CARGO_PKG_VERSION"),
    "uptime_ms": uptime
  }))
}

async fn models(State(state): State<Arc<RouterState>>) -> Json<ModelsResponse> {
  Json(ModelsResponse {
    default_model: state.config.default_model.clone(),
    models: state.config.models.clone(),
  })
}

async fn blob(State(state): State<Arc<RouterState>>, Path(id): Path<String>) -> Response {
  match state.blobs.get(&id).await {
    Ok(Some(blob)) => ([(header::CONTENT_TYPE, blob.content_type)], blob.bytes).into_response(),
    Ok(None) => (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "Blob not found" }))).into_response(),
    Err(err) => {
      error!(id = %id, error = %err, "blob lookup failed");
      ChatError::from(err).into_response_for(state.environment)
    }
  }
}

async fn chat(State(state): State<Arc<RouterState>>, payload: Result<Json<ChatRequest>, JsonRejection>) -> Response {
  let result = match payload {
    Ok(Json(req)) => handle_chat(&state, req).await,
    // The credential check still comes first for unreadable bodies.
    Err(_) if state.llm.is_none() => Err(ChatError::MissingCredential("GEMINI_API_KEY")),
    Err(rejection) => Err(ChatError::InvalidBody(rejection.body_text())),
  };
  match result {
    Ok(res) => (StatusCode::OK, Json(res)).into_response(),
    Err(err) => {
      match &err {
        ChatError::MissingCredential(_) | ChatError::NoMessages => warn!(error = %err, "chat request rejected"),
        ChatError::InvalidBody(reason) => warn!(reason = %reason, "chat request rejected"),
        ChatError::Upstream(cause) => error!(error = %cause, "chat request failed"),
        ChatError::Storage(cause) => error!(error = %cause, "chat request failed"),
      }
      err.into_response_for(state.environment)
    }
  }
}

fn resolve_model(req: &ChatRequest, config: &AppConfig) -> String {
  req
    .model
    .as_deref()
    .map(str::trim)
    .filter(|m| !m.is_empty())
    .unwrap_or(&config.default_model)
    .to_string()
}

fn is_image_model(model: &str) -> bool {
  model.to_lowercase().contains("imagen")
}

async fn handle_chat(state: &RouterState, req: ChatRequest) -> Result<ChatResponse, ChatError> {
  let llm = state
    .llm
    .as_ref()
    .ok_or(ChatError::MissingCredential("GEMINI_API_KEY"))?;
  let last = req.messages.last().ok_or(ChatError::NoMessages)?;

  let config = state.config.as_ref();
  let model = resolve_model(&req, config);

  if is_image_model(&model) {
    return generate_image(state, llm.as_ref(), &model, &last.content).await;
  }

  let message = last.content.to_lowercase();
  let tools = req.enabled_tools();
  let ctx = ComposeContext {
    mode: req.mode,
    message: &message,
    tools: &tools,
    client_info: req.client_info.as_ref(),
    reference: Some(ReferenceDoc {
      trigger: &config.reference_trigger,
      path: &config.reference_doc_path,
    }),
  };
  let composition = compose(&ctx, state.fetcher.as_ref()).await;
  let code_execution = composition.capabilities.contains(&Capability::CodeExecution);

  let request = GenerateRequest::from_messages(&model, composition.instruction.render(), &req.messages)
    .ok_or(ChatError::NoMessages)?
    .with_code_execution(code_execution);

  info!(model = %model, tools = tools.len(), code_execution, "sending chat turn");
  let response = llm.generate(request).await?;
  Ok(ChatResponse { response })
}

fn image_warning(reason: &str) -> ChatResponse {
  ChatResponse {
    response: format!("⚠️ Gagal generate gambar. Error: {reason}"),
  }
}

async fn generate_image(
  state: &RouterState,
  llm: &dyn LanguageModel,
  model: &str,
  prompt: &str,
) -> Result<ChatResponse, ChatError> {
  let image = match llm.generate_image(model, prompt).await {
    Ok(Some(image)) => image,
    Ok(None) => {
      warn!(model, "image endpoint returned no image");
      return Ok(image_warning("No image returned"));
    }
    Err(LlmError::Status(status, body)) => {
      warn!(model, %status, body = %body, "image generation rejected");
      return Ok(image_warning(status.canonical_reason().unwrap_or(status.as_str())));
    }
    Err(err) => return Err(err.into()),
  };

  let name = format!("aet_ai-{}.png", Utc::now().timestamp_millis());
  let url = state.blobs.put(&name, image.bytes, &image.mime_type).await?;
  info!(model, url = %url, "generated image stored");
  Ok(ChatResponse {
    response: format!("![Generated Image]({url})"),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fetch::{CurrencyQuote, FetchError, ScrapedPage, SearchResults, WeatherReport};
  use crate::gemini::{GeneratedImage, Part, TurnRole};
  use crate::intent::CurrencyQuery;
  use crate::storage::SqliteBlobStore;
  use async_trait::async_trait;
  use std::sync::Mutex;

  struct FakeLlm {
    reply: Result<String, StatusCode>,
    image: Result<Option<GeneratedImage>, StatusCode>,
    seen: Mutex<Vec<GenerateRequest>>,
  }

  impl FakeLlm {
    fn replying(text: &str) -> Self {
      Self {
        reply: Ok(text.to_string()),
        image: Ok(None),
        seen: Mutex::new(Vec::new()),
      }
    }
  }

  #[async_trait]
  impl LanguageModel for FakeLlm {
    async fn generate(&self, request: GenerateRequest) -> Result<String, LlmError> {
      self.seen.lock().expect("lock").push(request);
      self
        .reply
        .clone()
        .map_err(|status| LlmError::Status(status, "upstream said no".into()))
    }

    async fn generate_image(&self, _model: &str, _prompt: &str) -> Result<Option<GeneratedImage>, LlmError> {
      self
        .image
        .clone()
        .map_err(|status| LlmError::Status(status, String::new()))
    }
  }

  struct OfflineFetcher;

  #[async_trait]
  impl ToolFetcher for OfflineFetcher {
    async fn weather(&self, city: &str) -> Result<WeatherReport, FetchError> {
      Err(FetchError::NotFound(city.to_string()))
    }
    async fn currency(&self, query: &CurrencyQuery) -> Result<CurrencyQuote, FetchError> {
      Err(FetchError::NotFound(query.from.clone()))
    }
    async fn scrape(&self, url: &str) -> Result<ScrapedPage, FetchError> {
      Err(FetchError::NotFound(url.to_string()))
    }
    async fn search(&self, _query: &str) -> Result<SearchResults, FetchError> {
      Err(FetchError::MissingApiKey("TAVILY_API_KEY"))
    }
  }

  /// Serves the app on an ephemeral port; the blob store's public URL points
  /// back at it.
  async fn serve(llm: Option<Arc<FakeLlm>>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let base = format!("http://{}", listener.local_addr().expect("addr"));
    let config = AppConfig {
      public_base_url: base.clone(),
      ..AppConfig::default()
    };
    let state = RouterState {
      started_at: Instant::now(),
      config: Arc::new(config),
      environment: Environment::Development,
      llm: llm.map(|l| l as Arc<dyn LanguageModel>),
      fetcher: Arc::new(OfflineFetcher),
      blobs: Arc::new(SqliteBlobStore::in_memory(&base).expect("blob store")),
    };
    let router = app(state);
    tokio::spawn(async move {
      let _ = axum::serve(listener, router).await;
    });
    base
  }

  async fn post_chat(base: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let resp = reqwest::Client::new()
      .post(format!("{base}/api/chat"))
      .json(&body)
      .send()
      .await
      .expect("send");
    let status = resp.status();
    (status, resp.json().await.expect("json body"))
  }

  fn user(content: &str) -> serde_json::Value {
    serde_json::json!({ "id": "1", "role": "user", "content": content })
  }

  #[tokio::test]
  async fn missing_credential_is_500() {
    let base = serve(None).await;
    let (status, body) = post_chat(&base, serde_json::json!({ "messages": [user("halo")] })).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, serde_json::json!({ "error": "GEMINI_API_KEY is not configured" }));
  }

  #[tokio::test]
  async fn empty_messages_is_400() {
    let base = serve(Some(Arc::new(FakeLlm::replying("x")))).await;
    let (status, body) = post_chat(&base, serde_json::json!({ "messages": [], "mode": "daily" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No messages provided");
  }

  #[tokio::test]
  async fn null_messages_is_400() {
    let base = serve(Some(Arc::new(FakeLlm::replying("x")))).await;
    let (status, body) = post_chat(&base, serde_json::json!({ "messages": null, "mode": "daily" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, serde_json::json!({ "error": "No messages provided" }));
  }

  #[tokio::test]
  async fn unreadable_body_is_json_400() {
    let base = serve(Some(Arc::new(FakeLlm::replying("x")))).await;
    let resp = reqwest::Client::new()
      .post(format!("{base}/api/chat"))
      .header(header::CONTENT_TYPE, "application/json")
      .body("{not json")
      .send()
      .await
      .expect("send");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
    let body: serde_json::Value = resp.json().await.expect("json body");
    assert_eq!(body["error"], "Invalid request body");
    assert!(body["details"].is_string());

    let (status, body) = post_chat(&base, serde_json::json!({ "messages": "halo" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request body");
  }

  #[tokio::test]
  async fn chat_turn_carries_instruction_and_history() {
    let llm = Arc::new(FakeLlm::replying("Halo juga!"));
    let base = serve(Some(llm.clone())).await;

    let body = serde_json::json!({
      "messages": [user("hai"), { "role": "assistant", "content": "Halo" }, user("Cuaca di Pekanbaru, lalu hitung 3*7")],
      "mode": "daily",
      "tools": ["weather", "calculator"]
    });
    let (status, reply) = post_chat(&base, body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply, serde_json::json!({ "response": "Halo juga!" }));

    let seen = llm.seen.lock().expect("lock");
    let req = &seen[0];
    assert_eq!(req.model, "gemini-2.5-flash");
    assert!(req.code_execution);
    assert_eq!(req.history.len(), 2);
    assert_eq!(req.history[1].role, TurnRole::Model);
    assert_eq!(req.message, vec![Part::Text("Cuaca di Pekanbaru, lalu hitung 3*7".into())]);
    assert!(req.system_instruction.contains("Mode DAILY"));
    assert!(req.system_instruction.contains("Gagal mengambil data cuaca"));
    assert!(req.system_instruction.contains("Kota yang diminta user: pekanbaru"));
  }

  #[tokio::test]
  async fn upstream_failure_reports_details_outside_production() {
    let llm = Arc::new(FakeLlm {
      reply: Err(StatusCode::SERVICE_UNAVAILABLE),
      ..FakeLlm::replying("")
    });
    let base = serve(Some(llm)).await;
    let (status, body) = post_chat(&base, serde_json::json!({ "messages": [user("halo")] })).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to process chat request");
    assert!(body["details"].as_str().expect("details").contains("503"));
  }

  #[tokio::test]
  async fn imagen_stores_blob_and_links_it() {
    let llm = Arc::new(FakeLlm {
      image: Ok(Some(GeneratedImage {
        bytes: vec![0x89, b'P', b'N', b'G'],
        mime_type: "image/png".into(),
      })),
      ..FakeLlm::replying("unused")
    });
    let base = serve(Some(llm.clone())).await;

    let body = serde_json::json!({ "messages": [user("kucing astronot")], "model": "imagen-3.0-generate-002" });
    let (status, reply) = post_chat(&base, body).await;
    assert_eq!(status, StatusCode::OK);

    let text = reply["response"].as_str().expect("response");
    let url = text
      .strip_prefix("![Generated Image](")
      .and_then(|rest| rest.strip_suffix(')'))
      .expect("markdown image");
    assert!(url.starts_with(&format!("{base}/blobs/")));
    assert!(llm.seen.lock().expect("lock").is_empty());

    let resp = reqwest::get(url).await.expect("fetch blob");
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(resp.bytes().await.expect("bytes").as_ref(), [0x89, b'P', b'N', b'G']);
  }

  #[tokio::test]
  async fn imagen_rejection_is_soft_warning() {
    let llm = Arc::new(FakeLlm {
      image: Err(StatusCode::TOO_MANY_REQUESTS),
      ..FakeLlm::replying("unused")
    });
    let base = serve(Some(llm)).await;
    let body = serde_json::json!({ "messages": [user("gambar")], "model": "Imagen-3" });
    let (status, reply) = post_chat(&base, body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["response"], "⚠️ Gagal generate gambar. Error: Too Many Requests");
  }

  #[tokio::test]
  async fn unknown_blob_is_404() {
    let base = serve(None).await;
    let resp = reqwest::get(format!("{base}/blobs/nope")).await.expect("get");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn models_lists_configured_catalogue() {
    let base = serve(None).await;
    let body: serde_json::Value = reqwest::get(format!("{base}/v1/models"))
      .await
      .expect("get")
      .json()
      .await
      .expect("json");
    assert_eq!(body["default_model"], "gemini-2.5-flash");
    assert_eq!(body["models"].as_array().expect("models").len(), 3);
  }

  #[test]
  fn model_resolution() {
    let config = AppConfig::default();
    let mut req = ChatRequest::default();
    assert_eq!(resolve_model(&req, &config), "gemini-2.5-flash");
    req.model = Some("  ".into());
    assert_eq!(resolve_model(&req, &config), "gemini-2.5-flash");
    req.model = Some("gemini-2.5-pro".into());
    assert_eq!(resolve_model(&req, &config), "gemini-2.5-pro");
    assert!(is_image_model("IMAGEN-3.0"));
  }
}
