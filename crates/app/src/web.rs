use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use azure_rag_core::{
    ChatCompletion, ChatError, ChatOrchestrator, ChatSession, Retriever, TranscriptEntry,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

const CHAT_PAGE: &str = include_str!("chat.html");

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

type SessionMap = HashMap<Uuid, Arc<Mutex<ChatSession>>>;

pub struct AppState<R, C> {
    orchestrator: Arc<ChatOrchestrator<R, C>>,
    sessions: Arc<RwLock<SessionMap>>,
    idle_timeout: Duration,
}

impl<R, C> Clone for AppState<R, C> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
            sessions: Arc::clone(&self.sessions),
            idle_timeout: self.idle_timeout,
        }
    }
}

impl<R, C> AppState<R, C> {
    pub fn new(orchestrator: ChatOrchestrator<R, C>) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Drops every session idle for at least the timeout and returns how many
    /// went. A session with a turn in flight is kept.
    pub async fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|id, session| match session.try_lock() {
            Ok(session) if session.idle_for(now) >= self.idle_timeout => {
                info!(
                    session = %id,
                    created_at = %session.created_at().to_rfc3339(),
                    turns = session.len(),
                    "idle session evicted"
                );
                false
            }
            _ => true,
        });

        before - sessions.len()
    }
}

/// Periodically evicts idle sessions for as long as the server runs.
pub fn spawn_idle_sweep<R, C>(state: AppState<R, C>, every: Duration) -> JoinHandle<()>
where
    R: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let evicted = state.evict_idle(Utc::now()).await;
            if evicted > 0 {
                debug!(evicted, "idle sweep finished");
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct MessageRequest {
    message: String,
}

#[derive(Debug, Serialize)]
struct SessionView {
    session_id: Uuid,
    transcript: Vec<TranscriptEntry>,
}

#[derive(Debug, Serialize)]
struct TurnView {
    session_id: Uuid,
    answer: String,
    transcript: Vec<TranscriptEntry>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

enum ApiError {
    SessionNotFound(Uuid),
    Chat(ChatError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::SessionNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("unknown session {id}"))
            }
            ApiError::Chat(ChatError::EmptyInput) => {
                (StatusCode::BAD_REQUEST, ChatError::EmptyInput.to_string())
            }
            ApiError::Chat(error) => (StatusCode::BAD_GATEWAY, error.to_string()),
        };
        (status, Json(ErrorBody { message })).into_response()
    }
}

pub fn router<R, C>(state: AppState<R, C>) -> Router
where
    R: Retriever + Send + Sync + 'static,
    C: ChatCompletion + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(chat_page))
        .route("/healthz", get(healthz))
        .route("/api/sessions", post(create_session::<R, C>))
        .route("/api/sessions/{id}", delete(end_session::<R, C>))
        .route("/api/sessions/{id}/messages", post(post_message::<R, C>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn chat_page() -> Html<&'static str> {
    Html(CHAT_PAGE)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn create_session<R, C>(
    State(state): State<AppState<R, C>>,
) -> (StatusCode, Json<SessionView>)
where
    R: Retriever + Send + Sync + 'static,
    C: ChatCompletion + Send + Sync + 'static,
{
    state.evict_idle(Utc::now()).await;

    let session = ChatSession::rag();
    let view = SessionView {
        session_id: session.id(),
        transcript: session.transcript(),
    };

    state
        .sessions
        .write()
        .await
        .insert(session.id(), Arc::new(Mutex::new(session)));
    info!(session = %view.session_id, "session started");

    (StatusCode::CREATED, Json(view))
}

async fn end_session<R, C>(
    State(state): State<AppState<R, C>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
    R: Retriever + Send + Sync + 'static,
    C: ChatCompletion + Send + Sync + 'static,
{
    match state.sessions.write().await.remove(&id) {
        Some(_) => {
            info!(session = %id, "session ended");
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(ApiError::SessionNotFound(id)),
    }
}

async fn post_message<R, C>(
    State(state): State<AppState<R, C>>,
    Path(id): Path<Uuid>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<TurnView>, ApiError>
where
    R: Retriever + Send + Sync + 'static,
    C: ChatCompletion + Send + Sync + 'static,
{
    let session = state
        .sessions
        .read()
        .await
        .get(&id)
        .cloned()
        .ok_or(ApiError::SessionNotFound(id))?;

    let mut session = session.lock().await;
    let answer = state
        .orchestrator
        .handle_turn(&mut session, &request.message)
        .await
        .map_err(|error| {
            warn!(session = %id, %error, "turn failed");
            ApiError::Chat(error)
        })?;

    Ok(Json(TurnView {
        session_id: id,
        answer,
        transcript: session.transcript(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use azure_rag_core::{ChatTurn, CompletionParams, SearchError};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    struct StaticRetriever;

    #[async_trait]
    impl Retriever for StaticRetriever {
        async fn retrieve(&self, _query: &str) -> Result<Vec<String>, SearchError> {
            Ok(vec!["Glasbruch ist mitversichert.".to_string()])
        }
    }

    struct EchoCompleter;

    #[async_trait]
    impl ChatCompletion for EchoCompleter {
        async fn complete(
            &self,
            turns: &[ChatTurn],
            _params: &CompletionParams,
        ) -> Result<String, ChatError> {
            Ok(format!("{} turns", turns.len()))
        }
    }

    fn app() -> Router {
        router(state())
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should be readable")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("body should be json")
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request should build")
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let app = app();

        let created = app
            .clone()
            .oneshot(post_json("/api/sessions", "{}"))
            .await
            .expect("create should respond");
        assert_eq!(created.status(), StatusCode::CREATED);
        let created = json_body(created).await;
        let id = created["session_id"].as_str().expect("session id").to_string();
        assert_eq!(created["transcript"], Value::Array(Vec::new()));

        let turn = app
            .clone()
            .oneshot(post_json(
                &format!("/api/sessions/{id}/messages"),
                r#"{"message":"Ist Glas versichert?"}"#,
            ))
            .await
            .expect("turn should respond");
        assert_eq!(turn.status(), StatusCode::OK);
        let turn = json_body(turn).await;
        assert_eq!(turn["answer"], "2 turns");
        assert_eq!(turn["transcript"][0]["text"], "Ist Glas versichert?");
        assert_eq!(turn["transcript"][0]["context"], "Glasbruch ist mitversichert.");
        assert_eq!(turn["transcript"][1]["role"], "assistant");

        let ended = app
            .clone()
            .oneshot(
                Request::delete(format!("/api/sessions/{id}"))
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("delete should respond");
        assert_eq!(ended.status(), StatusCode::NO_CONTENT);

        let after = app
            .oneshot(post_json(
                &format!("/api/sessions/{id}/messages"),
                r#"{"message":"noch da?"}"#,
            ))
            .await
            .expect("turn should respond");
        assert_eq!(after.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn empty_message_is_a_bad_request() {
        let app = app();
        let created = json_body(
            app.clone()
                .oneshot(post_json("/api/sessions", "{}"))
                .await
                .expect("create should respond"),
        )
        .await;
        let id = created["session_id"].as_str().expect("session id").to_string();

        let response = app
            .oneshot(post_json(
                &format!("/api/sessions/{id}/messages"),
                r#"{"message":"   "}"#,
            ))
            .await
            .expect("turn should respond");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    async fn create(app: &Router) -> String {
        let created = app
            .clone()
            .oneshot(post_json("/api/sessions", "{}"))
            .await
            .expect("create should respond");
        assert_eq!(created.status(), StatusCode::CREATED);
        json_body(created).await["session_id"]
            .as_str()
            .expect("session id")
            .to_string()
    }

    fn state() -> AppState<StaticRetriever, EchoCompleter> {
        AppState::new(ChatOrchestrator::new(StaticRetriever, EchoCompleter))
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted() {
        let state = state();
        let app = router(state.clone());
        for _ in 0..3 {
            create(&app).await;
        }

        assert_eq!(state.evict_idle(Utc::now()).await, 0);
        assert_eq!(state.sessions.read().await.len(), 3);

        let later = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(state.evict_idle(later).await, 3);
        assert!(state.sessions.read().await.is_empty());
    }

    #[tokio::test]
    async fn busy_sessions_survive_the_sweep() {
        let state = state();
        let app = router(state.clone());
        let id: Uuid = create(&app).await.parse().expect("uuid");

        let session = state.sessions.read().await[&id].clone();
        let _turn_in_flight = session.lock().await;

        let later = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(state.evict_idle(later).await, 0);
        assert!(state.sessions.read().await.contains_key(&id));
    }

    #[tokio::test]
    async fn abandoned_sessions_do_not_accumulate() {
        let state = state().with_idle_timeout(Duration::ZERO);
        let app = router(state.clone());
        for _ in 0..500 {
            create(&app).await;
        }
        assert_eq!(state.sessions.read().await.len(), 1);
    }

    #[tokio::test]
    async fn chat_page_is_served() {
        let response = app()
            .oneshot(Request::get("/").body(Body::empty()).expect("request should build"))
            .await
            .expect("page should respond");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
