use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    http::Method,
    middleware,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use parley_shared::constants::RECOMMENDED_POLL_INTERVAL_SECS;
use parley_shared::message::Message;
use parley_shared::protocol::{ChatRequest, DeleteRequest, ReactionRequest};
use parley_shared::types::UserId;
use parley_store::{ProfileUpdate, User};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::rate_limit::{http_rate_limit, EventRateLimiter, IpRateLimiter};
use crate::router::DeliveryRouter;
use crate::session;

#[derive(Clone)]
pub struct AppState {
    pub router: DeliveryRouter,
    pub http_limiter: IpRateLimiter,
    pub event_limiter: EventRateLimiter,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    // The socket is throttled per identity inside the session, so only the
    // REST surface sits behind the per-IP limiter.
    let rest = Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/api/messages/:viewer_id/:other_id", get(conversation))
        .route("/api/messages/send", post(send_message))
        .route("/api/messages/delete", post(delete_message))
        .route("/api/messages/react", post(react_to_message))
        .route("/api/auth/login", post(login))
        .route("/api/users", get(list_users))
        .route("/api/users/update", post(update_profile))
        .route("/api/users/:phone", get(user_by_phone))
        .layer(middleware::from_fn_with_state(
            state.http_limiter.clone(),
            http_rate_limit,
        ));

    Router::new()
        .route("/ws", get(ws_upgrade))
        .merge(rest)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    online: usize,
    max_content_len: usize,
    poll_interval_secs: u64,
}

#[derive(Deserialize)]
struct LoginRequest {
    phone: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct UpdateProfileRequest {
    id: UserId,
    #[serde(flatten)]
    update: ProfileUpdate,
}

/// Directory entry; block lists and privacy settings stay private.
#[derive(Debug, Serialize, Deserialize)]
struct UserSummary {
    id: UserId,
    phone: String,
    name: String,
    avatar_url: Option<String>,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            phone: user.phone,
            name: user.name,
            avatar_url: user.avatar_url,
        }
    }
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        online: state.router.presence().online_count(),
        max_content_len: state.config.max_content_len,
        poll_interval_secs: RECOMMENDED_POLL_INTERVAL_SECS,
    })
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        session::run(socket, state.router, state.event_limiter, &state.config).await;
    })
}

// ─── Messages ───

async fn conversation(
    State(state): State<AppState>,
    Path((viewer_id, other_id)): Path<(UserId, UserId)>,
) -> Result<Json<Vec<Message>>, ServerError> {
    Ok(Json(state.router.conversation(&viewer_id, &other_id)?))
}

async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<Message>, ServerError> {
    let outcome = state.router.send(None, &req)?;
    Ok(Json(outcome.into_message()))
}

async fn delete_message(
    State(state): State<AppState>,
    Json(req): Json<DeleteRequest>,
) -> Result<Json<Message>, ServerError> {
    Ok(Json(state.router.delete(None, &req)?))
}

async fn react_to_message(
    State(state): State<AppState>,
    Json(req): Json<ReactionRequest>,
) -> Result<Json<Message>, ServerError> {
    Ok(Json(state.router.react(None, &req)?))
}

// ─── Users ───

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<User>, ServerError> {
    let user = state
        .router
        .with_store(|db| db.login(&req.phone, req.name.as_deref()))?;
    info!(user = %user.id.short(), "User logged in");
    Ok(Json(user))
}

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserSummary>>, ServerError> {
    let users = state.router.with_store(|db| db.list_users())?;
    Ok(Json(users.into_iter().map(UserSummary::from).collect()))
}

/// Resolve a phone number to an identity, creating a shadow identity for
/// numbers nobody has registered yet so a chat can start right away.
async fn user_by_phone(
    State(state): State<AppState>,
    Path(phone): Path<String>,
) -> Result<Json<UserSummary>, ServerError> {
    let user = state
        .router
        .with_store(|db| db.find_or_create_shadow(&phone))?;
    Ok(Json(user.into()))
}

/// Replies with the public summary; block lists are never echoed.
async fn update_profile(
    State(state): State<AppState>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserSummary>, ServerError> {
    let user = state
        .router
        .with_store(|db| db.update_profile(&req.id, &req.update))?;
    Ok(Json(user.into()))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP + WebSocket server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
