//! Route handlers and request shaping

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use crate::completion::{
    ChatMessage, CompletionError, CompletionRequest, CompletionResult, FailureKind,
};

use super::AppState;

/// Model served by the fixed `/gpt4o` route
pub const GPT4O_MODEL: &str = "gpt-4o";

#[derive(Debug, Deserialize)]
pub(super) struct PromptQuery {
    prompt: Option<String>,
}

pub(super) async fn index_handler() -> Html<&'static str> {
    Html("<h1>Hello World</h1>")
}

/// Health check endpoint - returns JSON status plus proxy cache counters
pub(super) async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let mut body = json!({
        "status": "ok",
        "proxy_mode": state.proxy_mode.as_str(),
        "max_attempts": state.orchestrator.max_attempts(),
    });
    if let Some(stats) = state.orchestrator.cache_stats() {
        body["proxy_cache"] = json!({
            "acquisitions": stats.acquisitions,
            "invalidations": stats.invalidations,
        });
    }
    Json(body)
}

/// `GET /gpt4o?prompt=...`
pub(super) async fn gpt4o_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PromptQuery>,
) -> Response {
    let prompt = match query.prompt.filter(|p| !p.trim().is_empty()) {
        Some(prompt) => prompt,
        None => return failure_response(&CompletionError::Input("No prompt provided".into())),
    };

    let request = CompletionRequest::from_prompt(GPT4O_MODEL, prompt);
    run_completion(&state, request).await
}

/// `POST /advance` with `{"messages": [...]}`
pub(super) async fn advance_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request = parse_json(&body).and_then(|value| {
        let messages = value.get("messages").ok_or_else(|| {
            CompletionError::Input("'messages' field is required".to_string())
        })?;
        Ok(CompletionRequest::new(
            state.default_model.clone(),
            parse_messages(messages)?,
        ))
    });

    match request {
        Ok(request) => run_completion(&state, request).await,
        Err(e) => failure_response(&e),
    }
}

/// `POST /v1/complete` with `{"prompt"?, "messages"?, "model"?}`
pub(super) async fn complete_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    match parse_json(&body).and_then(|value| parse_inbound(&value, &state.default_model)) {
        Ok(request) => run_completion(&state, request).await,
        Err(e) => failure_response(&e),
    }
}

/// Shape an inbound JSON body into a completion request
///
/// `messages` wins over `prompt` when both are present; a body with
/// neither is an input failure.
pub fn parse_inbound(value: &Value, default_model: &str) -> Result<CompletionRequest, CompletionError> {
    if !value.is_object() {
        return Err(CompletionError::Input(
            "Request body must be a JSON object".to_string(),
        ));
    }

    let model = match value.get("model") {
        None | Some(Value::Null) => default_model.to_string(),
        Some(Value::String(model)) => model.clone(),
        Some(_) => return Err(CompletionError::Input("'model' must be a string".to_string())),
    };

    if let Some(messages) = value.get("messages") {
        return Ok(CompletionRequest::new(model, parse_messages(messages)?));
    }

    match value.get("prompt") {
        Some(Value::String(prompt)) if !prompt.trim().is_empty() => {
            Ok(CompletionRequest::from_prompt(model, prompt.clone()))
        }
        Some(Value::String(_)) => Err(CompletionError::Input("No prompt provided".to_string())),
        Some(_) => Err(CompletionError::Input("'prompt' must be a string".to_string())),
        None => Err(CompletionError::Input(
            "'prompt' or 'messages' field is required".to_string(),
        )),
    }
}

fn parse_json(body: &[u8]) -> Result<Value, CompletionError> {
    serde_json::from_slice(body)
        .map_err(|e| CompletionError::Input(format!("Request body is not valid JSON: {e}")))
}

fn parse_messages(messages: &Value) -> Result<Vec<ChatMessage>, CompletionError> {
    messages
        .as_array()
        .ok_or_else(|| CompletionError::Input("'messages' must be an array".to_string()))?
        .iter()
        .enumerate()
        .map(|(index, message)| ChatMessage::from_value(index, message))
        .collect()
}

async fn run_completion(state: &AppState, request: CompletionRequest) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("completion", %request_id, model = %request.model);

    let result = state
        .orchestrator
        .complete(&request)
        .instrument(span.clone())
        .await;

    span.in_scope(|| log_outcome(&result));
    match result {
        Ok(text) => (StatusCode::OK, Json(json!({ "response": text }))).into_response(),
        Err(e) => failure_response(&e),
    }
}

fn log_outcome(result: &CompletionResult) {
    match result {
        Ok(text) => tracing::info!(chars = text.len(), "Completion succeeded"),
        Err(e) => tracing::warn!(kind = e.kind().as_str(), "Completion failed: {e}"),
    }
}

/// Map a classified failure to a status code and `{"error": ...}` body
fn failure_response(error: &CompletionError) -> Response {
    let status = match error.kind() {
        FailureKind::Input => StatusCode::BAD_REQUEST,
        FailureKind::Proxy | FailureKind::Upstream | FailureKind::RetriesExhausted => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}
