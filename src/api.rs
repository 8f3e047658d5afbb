//! HTTP surface for docuspace.
//!
//! A compact Axum router over the ingestion pipeline and the collaboration layer:
//!
//! - `POST /documents` / `GET /documents` – ingest an uploaded PDF and list the registry.
//! - `POST /query` – retrieval-augmented question answering against one document.
//! - `POST /spaces`, `POST /spaces/join`, `GET /spaces`, `GET /spaces/{id}`,
//!   `GET /spaces/{id}/messages` – shared collaboration spaces.
//! - `POST /chats`, `GET /chats`, `GET /chats/{id}`, `PATCH /chats/{id}`,
//!   `DELETE /chats/{id}` – private per-user chats.
//! - `GET /metrics` – ingestion and query counters.
//!
//! Credential verification happens upstream; handlers read the caller's identity from the
//! `x-user-id` header. An absent header means an anonymous caller, which is acceptable only
//! for context-less queries.

use std::path::PathBuf;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::collab::{CollabError, CollabService};
use crate::metrics::MetricsSnapshot;
use crate::pipeline::{IngestError, PipelineService, QueryError, QueryOutcome, QueryRequest};
use crate::store::{Chat, Document, DocumentStore, Message, MessageContext, Space, StoreError};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Ingestion and query engine.
    pub pipeline: PipelineService,
    /// Spaces, chats, and conversation log.
    pub collab: CollabService,
    /// Document registry reads.
    pub documents: DocumentStore,
}

/// Build the HTTP router exposing the full API surface.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/documents", post(ingest_document).get(list_documents))
        .route("/query", post(query_document))
        .route("/spaces", post(create_space).get(list_spaces))
        .route("/spaces/join", post(join_space))
        .route("/spaces/:id", get(get_space))
        .route("/spaces/:id/messages", get(space_messages))
        .route("/chats", post(create_chat).get(list_chats))
        .route(
            "/chats/:id",
            get(get_chat).patch(rename_chat).delete(delete_chat),
        )
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

fn user_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn require_user(headers: &HeaderMap) -> Result<String, AppError> {
    user_id(headers).ok_or_else(AppError::access_denied)
}

/// Request body for `POST /documents`.
#[derive(Deserialize)]
struct IngestRequest {
    /// Filesystem path of the already-materialized upload.
    path: String,
    /// Original filename; its stem becomes the document title.
    filename: String,
}

async fn ingest_document(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<Document>, AppError> {
    let document = state
        .pipeline
        .ingest_document(PathBuf::from(request.path), &request.filename)
        .await?;
    Ok(Json(document))
}

async fn list_documents(State(state): State<AppState>) -> Result<Json<Vec<Document>>, AppError> {
    Ok(Json(state.documents.list().await?))
}

/// Request body for `POST /query`.
#[derive(Deserialize)]
struct ApiQueryRequest {
    /// Target document id.
    document_id: String,
    /// Natural-language question.
    query: String,
    /// Optional completion model override.
    #[serde(default)]
    model: Option<String>,
    /// Space the exchange belongs to; mutually exclusive with `chat_id`.
    #[serde(default)]
    space_id: Option<String>,
    /// Chat the exchange belongs to; mutually exclusive with `space_id`.
    #[serde(default)]
    chat_id: Option<String>,
}

async fn query_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ApiQueryRequest>,
) -> Result<Json<QueryOutcome>, AppError> {
    let context = match (request.space_id, request.chat_id) {
        (Some(_), Some(_)) => {
            return Err(AppError::bad_request(
                "space_id and chat_id are mutually exclusive",
            ));
        }
        (Some(space_id), None) => MessageContext::Space(space_id),
        (None, Some(chat_id)) => MessageContext::Chat(chat_id),
        (None, None) => MessageContext::None,
    };

    let outcome = state
        .pipeline
        .answer_query(QueryRequest {
            document_id: request.document_id,
            query: request.query,
            model: request.model,
            context,
            user_id: user_id(&headers),
        })
        .await?;
    Ok(Json(outcome))
}

/// Request body for `POST /spaces`.
#[derive(Deserialize)]
struct CreateSpaceRequest {
    /// Display name for the space.
    name: String,
    /// Free-text description.
    #[serde(default)]
    description: String,
    /// Document the space collaborates on.
    document_id: String,
}

/// Response for `POST /spaces`: the space plus the shareable access token.
#[derive(Serialize)]
struct SpaceCreatedResponse {
    #[serde(flatten)]
    space: Space,
    access_token: String,
}

async fn create_space(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateSpaceRequest>,
) -> Result<(StatusCode, Json<SpaceCreatedResponse>), AppError> {
    let user = require_user(&headers)?;
    let space = state
        .collab
        .create_space(&request.name, &request.description, &request.document_id, &user)
        .await?;
    let access_token = space.access_token.clone();
    Ok((
        StatusCode::CREATED,
        Json(SpaceCreatedResponse {
            space,
            access_token,
        }),
    ))
}

/// Request body for `POST /spaces/join`.
#[derive(Deserialize)]
struct JoinSpaceRequest {
    /// Token shared by the space creator.
    access_token: String,
}

async fn join_space(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<JoinSpaceRequest>,
) -> Result<Json<Space>, AppError> {
    let user = require_user(&headers)?;
    let space = state.collab.join_space(&request.access_token, &user).await?;
    Ok(Json(space))
}

async fn list_spaces(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Space>>, AppError> {
    let user = require_user(&headers)?;
    Ok(Json(state.collab.list_spaces(&user).await?))
}

/// Response for `GET /spaces/{id}`: the space plus its member set.
#[derive(Serialize)]
struct SpaceDetailResponse {
    #[serde(flatten)]
    space: Space,
    members: Vec<String>,
}

async fn get_space(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(space_id): Path<String>,
) -> Result<Json<SpaceDetailResponse>, AppError> {
    let user = require_user(&headers)?;
    let (space, members) = state.collab.get_space(&space_id, &user).await?;
    Ok(Json(SpaceDetailResponse { space, members }))
}

async fn space_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(space_id): Path<String>,
) -> Result<Json<Vec<Message>>, AppError> {
    let user = require_user(&headers)?;
    Ok(Json(state.collab.space_messages(&space_id, &user).await?))
}

/// Request body for `POST /chats`.
#[derive(Deserialize)]
struct CreateChatRequest {
    /// Optional document the chat is grounded in.
    #[serde(default)]
    document_id: Option<String>,
    /// Optional title; defaults to one derived from the creation time.
    #[serde(default)]
    title: Option<String>,
    /// Optional preferred completion model.
    #[serde(default)]
    model: Option<String>,
}

async fn create_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<Chat>), AppError> {
    let user = require_user(&headers)?;
    let model = request
        .model
        .unwrap_or_else(|| state.pipeline.default_model().to_string());
    let chat = state
        .collab
        .create_chat(
            &user,
            request.document_id.as_deref(),
            request.title.as_deref(),
            &model,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(chat)))
}

async fn list_chats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Chat>>, AppError> {
    let user = require_user(&headers)?;
    Ok(Json(state.collab.list_chats(&user).await?))
}

/// Response for `GET /chats/{id}`: the chat plus its ordered history.
#[derive(Serialize)]
struct ChatDetailResponse {
    #[serde(flatten)]
    chat: Chat,
    messages: Vec<Message>,
}

async fn get_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
) -> Result<Json<ChatDetailResponse>, AppError> {
    let user = require_user(&headers)?;
    let (chat, messages) = state.collab.get_chat(&chat_id, &user).await?;
    Ok(Json(ChatDetailResponse { chat, messages }))
}

/// Request body for `PATCH /chats/{id}`.
#[derive(Deserialize)]
struct RenameChatRequest {
    /// New display title.
    title: String,
}

async fn rename_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
    Json(request): Json<RenameChatRequest>,
) -> Result<StatusCode, AppError> {
    let user = require_user(&headers)?;
    state.collab.rename_chat(&chat_id, &user, &request.title).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let user = require_user(&headers)?;
    state.collab.delete_chat(&chat_id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.pipeline.metrics().snapshot())
}

/// Error wrapper mapping domain failures onto HTTP statuses and stable error codes.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn access_denied() -> Self {
        Self::new(StatusCode::FORBIDDEN, "access_denied", "Access denied")
    }

    fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": { "code": self.code, "message": self.message }
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        tracing::error!(error = %error, "Persistence failure");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "persistence_failed",
            error.to_string(),
        )
    }
}

impl From<CollabError> for AppError {
    fn from(error: CollabError) -> Self {
        let message = error.to_string();
        match error {
            CollabError::DocumentNotFound => {
                Self::new(StatusCode::NOT_FOUND, "document_not_found", message)
            }
            CollabError::SpaceNotFound => {
                Self::new(StatusCode::NOT_FOUND, "space_not_found", message)
            }
            CollabError::ChatNotFound => {
                Self::new(StatusCode::NOT_FOUND, "chat_not_found", message)
            }
            CollabError::AccessDenied => Self::access_denied(),
            CollabError::Store(inner) => inner.into(),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(error: IngestError) -> Self {
        let code = error.kind();
        let status = match &error {
            IngestError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            IngestError::Embedding(_) | IngestError::Index(_) => StatusCode::BAD_GATEWAY,
            IngestError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, code, error.to_string())
    }
}

impl From<QueryError> for AppError {
    fn from(error: QueryError) -> Self {
        let message = error.to_string();
        match error {
            QueryError::DocumentNotFound => {
                Self::new(StatusCode::NOT_FOUND, "document_not_found", message)
            }
            QueryError::Access(inner) => inner.into(),
            QueryError::NoRelevantContent => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "no_relevant_content",
                message,
            ),
            QueryError::Embedding(_) => {
                Self::new(StatusCode::BAD_GATEWAY, "embedding_failed", message)
            }
            QueryError::Index(_) => Self::new(StatusCode::BAD_GATEWAY, "index_failed", message),
            QueryError::Completion(_) => {
                Self::new(StatusCode::BAD_GATEWAY, "completion_failed", message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::CollabService;
    use crate::completion::ChatCompletionClient;
    use crate::embedding::HashEmbeddingClient;
    use crate::index::VectorIndexClient;
    use crate::metrics::PipelineMetrics;
    use crate::pipeline::{PipelineService, PipelineSettings};
    use crate::store::{ChatStore, DocumentStore, MessageStore, SpaceStore, test_pool};
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request},
    };
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let pool = test_pool().await;
        let documents = DocumentStore::new(pool.clone());
        let collab = CollabService::new(
            documents.clone(),
            SpaceStore::new(pool.clone()),
            ChatStore::new(pool.clone()),
            MessageStore::new(pool),
        );
        // provider endpoints are never reached by the routes under test
        let index = Arc::new(
            VectorIndexClient::new("http://127.0.0.1:1", None, "documents", 8, Duration::from_secs(1))
                .unwrap(),
        );
        let completion = Arc::new(
            ChatCompletionClient::new("http://127.0.0.1:1", None, Duration::from_secs(1)).unwrap(),
        );
        let pipeline = PipelineService::new(
            Arc::new(HashEmbeddingClient::new(8)),
            completion,
            index,
            documents.clone(),
            collab.clone(),
            Arc::new(PipelineMetrics::new()),
            PipelineSettings::default(),
        );
        AppState {
            pipeline,
            collab,
            documents,
        }
    }

    async fn seed_ready_document(state: &AppState, id: &str) {
        state
            .documents
            .insert_pending(id, "report", "report.pdf", &format!("ns-{id}"))
            .await
            .unwrap();
        state.documents.mark_ready(id, 3).await.unwrap();
    }

    fn request(method: Method, uri: &str, user: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-user-id", user);
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn space_lifecycle_over_http() {
        let state = test_state().await;
        seed_ready_document(&state, "doc-1").await;
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/spaces",
                Some("alice"),
                Some(serde_json::json!({ "name": "study", "document_id": "doc-1" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        let space_id = created["id"].as_str().unwrap().to_string();
        let token = created["access_token"].as_str().unwrap().to_string();

        // second user joins by token and can read the space
        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/spaces/join",
                Some("bob"),
                Some(serde_json::json!({ "access_token": token })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(request(
                Method::GET,
                &format!("/spaces/{space_id}"),
                Some("bob"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let detail = body_json(response).await;
        assert_eq!(detail["members"].as_array().unwrap().len(), 2);
        assert!(detail.get("access_token").is_none());

        // outsiders are rejected
        let response = app
            .oneshot(request(
                Method::GET,
                &format!("/spaces/{space_id}/messages"),
                Some("mallory"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn chat_lifecycle_over_http() {
        let state = test_state().await;
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/chats",
                Some("alice"),
                Some(serde_json::json!({ "title": "notes" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let chat = body_json(response).await;
        let chat_id = chat["id"].as_str().unwrap().to_string();
        assert_eq!(chat["title"], "notes");

        let response = app
            .clone()
            .oneshot(request(
                Method::PATCH,
                &format!("/chats/{chat_id}"),
                Some("bob"),
                Some(serde_json::json!({ "title": "stolen" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .clone()
            .oneshot(request(
                Method::PATCH,
                &format!("/chats/{chat_id}"),
                Some("alice"),
                Some(serde_json::json!({ "title": "renamed" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .clone()
            .oneshot(request(
                Method::DELETE,
                &format!("/chats/{chat_id}"),
                Some("alice"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(request(
                Method::GET,
                &format!("/chats/{chat_id}"),
                Some("alice"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn identity_header_is_required_for_spaces() {
        let state = test_state().await;
        let app = create_router(state);

        let response = app
            .oneshot(request(Method::GET, "/spaces", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "access_denied");
    }

    #[tokio::test]
    async fn query_rejects_ambiguous_context() {
        let state = test_state().await;
        seed_ready_document(&state, "doc-1").await;
        let app = create_router(state);

        let response = app
            .oneshot(request(
                Method::POST,
                "/query",
                Some("alice"),
                Some(serde_json::json!({
                    "document_id": "doc-1",
                    "query": "q",
                    "space_id": "s",
                    "chat_id": "c",
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn query_against_missing_document_is_not_found() {
        let state = test_state().await;
        let app = create_router(state);

        let response = app
            .oneshot(request(
                Method::POST,
                "/query",
                None,
                Some(serde_json::json!({ "document_id": "nope", "query": "q" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "document_not_found");
    }

    #[tokio::test]
    async fn metrics_route_reports_counters() {
        let state = test_state().await;
        let app = create_router(state);

        let response = app
            .oneshot(request(Method::GET, "/metrics", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["documents_indexed"], 0);
        assert_eq!(body["queries_answered"], 0);
    }
}
