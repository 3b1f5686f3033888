use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use bytes::Bytes;
use futures::StreamExt;
use paperthread::chat::ConversationEngine;
use paperthread::error::EngineError;
use paperthread::types::TurnRequest;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

pub fn create_router(engine: Arc<ConversationEngine>) -> Router {
    Router::new()
        .route("/api/message", post(send_message_handler))
        .route("/api/documents/:id/messages", get(list_messages_handler))
        .route("/api/documents/:id", delete(delete_document_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(engine)
}

/// Caller identity, injected by the upstream auth gateway.
fn caller_id(headers: &HeaderMap) -> Result<String, EngineError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or(EngineError::Unauthorized)
}

fn error_response(err: EngineError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &err {
        EngineError::Unauthorized => StatusCode::UNAUTHORIZED,
        EngineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::DocumentNotFound => StatusCode::NOT_FOUND,
        EngineError::Retrieval(_) | EngineError::Provider(_) => StatusCode::BAD_GATEWAY,
        EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() })))
}

#[axum::debug_handler]
async fn send_message_handler(
    State(engine): State<Arc<ConversationEngine>>,
    headers: HeaderMap,
    Json(request): Json<TurnRequest>,
) -> Response {
    let user_id = match caller_id(&headers) {
        Ok(id) => id,
        Err(e) => return error_response(e).into_response(),
    };

    match engine.handle_turn(&user_id, request).await {
        Ok(stream) => {
            // Chunked transfer: tokens reach the client as they arrive. A
            // mid-stream provider failure terminates the body; tokens
            // already sent are not retracted.
            let body = Body::from_stream(stream.map(|item| item.map(Bytes::from)));
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                body,
            )
                .into_response()
        }
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Deserialize)]
struct PageQuery {
    limit: Option<usize>,
    cursor: Option<i64>,
}

#[axum::debug_handler]
async fn list_messages_handler(
    State(engine): State<Arc<ConversationEngine>>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Response {
    let user_id = match caller_id(&headers) {
        Ok(id) => id,
        Err(e) => return error_response(e).into_response(),
    };

    let limit = page.limit.unwrap_or(20).min(100);
    match engine
        .list_messages(&user_id, &document_id, limit, page.cursor)
        .await
    {
        Ok(page) => Json(page).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[axum::debug_handler]
async fn delete_document_handler(
    State(engine): State<Arc<ConversationEngine>>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
) -> Response {
    let user_id = match caller_id(&headers) {
        Ok(id) => id,
        Err(e) => return error_response(e).into_response(),
    };

    match engine.delete_document(&user_id, &document_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e).into_response(),
    }
}
