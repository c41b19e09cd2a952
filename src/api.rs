//! Request API (C10): the HTTP surface for chat turns, version
//! management, and A/B experiments (§4.10).
//!
//! Chat replies are produced whole by the Router (specialists must see
//! the full text before compliance post-processing can run), so `/chat`
//! simulates token streaming by chunking the finished reply over SSE and
//! closing with a `done` event carrying the routing envelope.

use crate::abtest::{AbTestManager, AnalysisSummary, Arm};
use crate::config::ConfigDocument;
use crate::error::{ConfigError, RouterError, RuntimeError};
use crate::factory::AgentFactory;
use crate::knowledge::KnowledgeGateway;
use crate::llm::LlmClient;
use crate::memory::session::SessionState;
use crate::memory::MemoryStore;
use crate::router::Router;
use crate::store::{AgentConfigRecord, ConfigStore};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router as AxumRouter};
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::{OpenApi, ToSchema};

/// Shared application state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub factory: Arc<AgentFactory>,
    pub store: Arc<ConfigStore>,
    pub knowledge: Arc<KnowledgeGateway>,
    pub memory: Arc<MemoryStore>,
    pub ab_tests: Arc<AbTestManager>,
    pub llm: Arc<dyn LlmClient>,
    pub router: Arc<Router>,
    sessions: Arc<RwLock<HashMap<String, Arc<Mutex<SessionState>>>>>,
}

impl AppState {
    pub fn new(
        factory: Arc<AgentFactory>,
        store: Arc<ConfigStore>,
        knowledge: Arc<KnowledgeGateway>,
        memory: Arc<MemoryStore>,
        ab_tests: Arc<AbTestManager>,
        llm: Arc<dyn LlmClient>,
        router: Arc<Router>,
    ) -> Self {
        Self {
            factory,
            store,
            knowledge,
            memory,
            ab_tests,
            llm,
            router,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Looks the session up in the in-process cache first, then falls back
    /// to the Memory Store (§4.5: sessions are durable across process
    /// restarts, not just across turns within one), and only creates a
    /// fresh session when neither has it.
    async fn session_for(&self, session_id: &str, customer_id: &str) -> Arc<Mutex<SessionState>> {
        if let Some(existing) = self.sessions.read().await.get(session_id) {
            return existing.clone();
        }

        let restored = self.memory.get_session(session_id).await.ok().flatten();
        let state = restored.unwrap_or_else(|| SessionState::new(session_id, customer_id));

        let mut sessions = self.sessions.write().await;
        sessions.entry(session_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(state))).clone()
    }
}

#[derive(Debug)]
pub struct ApiError(RuntimeError);

impl From<RuntimeError> for ApiError {
    fn from(err: RuntimeError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RuntimeError::Config(ConfigError::VersionNotFound { .. } | ConfigError::NoActiveVersion { .. }) => {
                StatusCode::NOT_FOUND
            }
            RuntimeError::Config(ConfigError::VersionExists { .. } | ConfigError::InvalidDocument(_)) => {
                StatusCode::BAD_REQUEST
            }
            RuntimeError::Router(RouterError::TimeoutEscalation(_)) => StatusCode::GATEWAY_TIMEOUT,
            RuntimeError::Router(RouterError::CancelledTurn) => StatusCode::BAD_REQUEST,
            RuntimeError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse {
            error: self.0.to_string(),
            category: self.0.category().to_string(),
        });

        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub category: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub session_id: Option<String>,
    pub customer_id: String,
    pub agent_id: String,
    pub message: String,
}

/// Final SSE event payload of a `/chat` stream (§4.10).
#[derive(Debug, Serialize, ToSchema)]
pub struct ChatEnvelope {
    pub session_id: String,
    pub version_used: i64,
    pub routing_trail: Vec<String>,
    pub ticket_id: Option<String>,
    pub escalation: bool,
}

#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatRequest,
    responses((status = 200, description = "Server-sent token stream terminated by a done envelope"))
)]
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let session_id = request.session_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let session = state.session_for(&session_id, &request.customer_id).await;
    let token = tokio_util::sync::CancellationToken::new();

    let result = state
        .router
        .handle_turn(&session, &request.agent_id, state.llm.clone(), &request.customer_id, &request.message, &token)
        .await?;

    let routing_trail: Vec<String> = {
        let locked = session.lock().await;
        locked.routing_history.iter().map(|e| e.specialist.clone()).collect()
    };

    let envelope = ChatEnvelope {
        session_id,
        version_used: result.version_used,
        routing_trail,
        ticket_id: result.protocol.clone(),
        escalation: result.escalated,
    };

    let chunks: Vec<String> = result.reply.split_whitespace().map(|w| w.to_string()).collect();
    let token_events = stream::iter(chunks).map(|chunk| Ok(Event::default().event("token").data(chunk)));
    let done_event = stream::once(async move {
        Ok(Event::default().event("done").data(serde_json::to_string(&envelope).unwrap_or_default()))
    });

    Ok(Sse::new(token_events.chain(done_event)).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[utoipa::path(get, path = "/health", responses((status = 200, body = HealthResponse)))]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
    })
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub session: SessionState,
}

#[utoipa::path(get, path = "/sessions/:session_id", responses((status = 200, body = SessionResponse), (status = 404)))]
pub async fn get_session_handler(State(state): State<AppState>, Path(session_id): Path<String>) -> ApiResult<Json<SessionResponse>> {
    if let Some(session) = state.sessions.read().await.get(&session_id) {
        let locked = session.lock().await;
        return Ok(Json(SessionResponse { session: locked.clone() }));
    }

    let persisted = state.memory.get_session(&session_id).await?;
    let session = persisted.ok_or_else(|| ApiError(RuntimeError::NotFound(format!("session '{session_id}'"))))?;
    Ok(Json(SessionResponse { session }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateVersionRequest {
    pub version: i64,
    pub config: ConfigDocument,
    pub created_by: String,
    #[serde(default)]
    pub description: String,
}

#[utoipa::path(
    post,
    path = "/agents/:agent_id/versions",
    request_body = CreateVersionRequest,
    responses((status = 200, body = AgentConfigRecord))
)]
pub async fn create_version_handler(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(body): Json<CreateVersionRequest>,
) -> ApiResult<Json<AgentConfigRecord>> {
    let record = state
        .store
        .create_version(&agent_id, body.version, body.config, &body.created_by, &body.description)
        .await?;
    Ok(Json(record))
}

#[utoipa::path(get, path = "/agents/:agent_id/versions", responses((status = 200, body = Vec<AgentConfigRecord>)))]
pub async fn list_versions_handler(State(state): State<AppState>, Path(agent_id): Path<String>) -> ApiResult<Json<Vec<AgentConfigRecord>>> {
    let versions = state.store.list_versions(&agent_id).await?;
    Ok(Json(versions))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ActivateVersionRequest {
    pub actor: String,
    pub reason: String,
}

#[utoipa::path(
    put,
    path = "/agents/:agent_id/versions/:version/activate",
    request_body = ActivateVersionRequest,
    responses((status = 200))
)]
pub async fn activate_version_handler(
    State(state): State<AppState>,
    Path((agent_id, version)): Path<(String, i64)>,
    Json(body): Json<ActivateVersionRequest>,
) -> ApiResult<StatusCode> {
    state.store.activate_version(&agent_id, version, &body.actor, &body.reason).await?;
    info!(agent_id, version, "activated via API");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RunAgentRequest {
    pub session_id: Option<String>,
    pub customer_id: String,
    pub message: String,
    pub version: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RunAgentResponse {
    pub reply: String,
    pub version_used: i64,
    pub specialist_key: String,
    pub escalated: bool,
}

/// Single-turn, non-streaming convenience endpoint (batch integrations,
/// test harnesses) — the same Router path `/chat` uses, minus SSE.
#[utoipa::path(
    post,
    path = "/agents/:agent_id/run",
    request_body = RunAgentRequest,
    responses((status = 200, body = RunAgentResponse))
)]
pub async fn run_agent_handler(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(body): Json<RunAgentRequest>,
) -> ApiResult<Json<RunAgentResponse>> {
    let session_id = body.session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let session = state.session_for(&session_id, &body.customer_id).await;
    let token = tokio_util::sync::CancellationToken::new();

    let result = state
        .router
        .handle_turn_with_version(&session, &agent_id, body.version, state.llm.clone(), &body.customer_id, &body.message, &token)
        .await?;

    Ok(Json(RunAgentResponse {
        reply: result.reply,
        version_used: result.version_used,
        specialist_key: result.specialist_key,
        escalated: result.escalated,
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAbTestRequest {
    pub test_id: String,
    pub agent_id: String,
    pub arms: Vec<Arm>,
    pub min_sample: u64,
}

#[utoipa::path(post, path = "/ab_tests", request_body = CreateAbTestRequest, responses((status = 200)))]
pub async fn create_ab_test_handler(State(state): State<AppState>, Json(body): Json<CreateAbTestRequest>) -> ApiResult<StatusCode> {
    state.ab_tests.create_test(&body.test_id, &body.agent_id, body.arms, body.min_sample).await?;
    state.ab_tests.start_test(&body.test_id).await?;
    Ok(StatusCode::CREATED)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordAbTestRequest {
    pub version: i64,
    pub success: bool,
    pub satisfaction: Option<f64>,
}

#[utoipa::path(post, path = "/ab_tests/:test_id/record", request_body = RecordAbTestRequest, responses((status = 200)))]
pub async fn record_ab_test_handler(
    State(state): State<AppState>,
    Path(test_id): Path<String>,
    Json(body): Json<RecordAbTestRequest>,
) -> ApiResult<StatusCode> {
    state.ab_tests.record(&test_id, body.version, body.success, body.satisfaction).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(get, path = "/ab_tests/:test_id/analysis", responses((status = 200, body = AnalysisSummary)))]
pub async fn analyze_ab_test_handler(State(state): State<AppState>, Path(test_id): Path<String>) -> ApiResult<Json<AnalysisSummary>> {
    let analysis = state.ab_tests.analyze(&test_id).await?;
    Ok(Json(analysis))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        chat_handler,
        get_session_handler,
        create_version_handler,
        list_versions_handler,
        activate_version_handler,
        run_agent_handler,
        create_ab_test_handler,
        record_ab_test_handler,
        analyze_ab_test_handler,
    ),
    components(schemas(
        HealthResponse,
        ErrorResponse,
        ChatRequest,
        ChatEnvelope,
        SessionResponse,
        CreateVersionRequest,
        ActivateVersionRequest,
        RunAgentRequest,
        RunAgentResponse,
        CreateAbTestRequest,
        RecordAbTestRequest,
        AgentConfigRecord,
        ConfigDocument,
        Arm,
        AnalysisSummary,
    )),
    tags((name = "pagbank-routing-runtime", description = "Agent routing and versioned-configuration runtime"))
)]
pub struct ApiDoc;

pub fn router(state: AppState) -> AxumRouter {
    AxumRouter::new()
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .route("/sessions/:session_id", get(get_session_handler))
        .route("/agents/:agent_id/versions", post(create_version_handler).get(list_versions_handler))
        .route("/agents/:agent_id/versions/:version/activate", put(activate_version_handler))
        .route("/agents/:agent_id/run", post(run_agent_handler))
        .route("/ab_tests", post(create_ab_test_handler))
        .route("/ab_tests/:test_id/record", post(record_ab_test_handler))
        .route("/ab_tests/:test_id/analysis", get(analyze_ab_test_handler))
        .merge(utoipa_swagger_ui::SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
