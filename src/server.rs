//! HTTP surface: JSON routes plus a per-user event stream.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{Request, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde_json::json;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tracing::{debug, info, instrument, warn};

use crate::games::tictactoe::UserId;
use crate::matchmaking::QueueStatus;
use crate::protocol::{
    GameEvent, GameResponse, JoinQueueResponse, LeaderboardQuery, LeaderboardResponse,
    ListActiveGamesResponse, MakeMoveRequest, MakeMoveResponse, MatchHistoryQuery,
    MatchHistoryResponse, PlayerStatsResponse, RematchResponse, SuccessResponse,
    WatchGameResponse,
};
use crate::service::{ArenaService, ServiceError};

/// Header naming the calling user.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The calling user, taken from [`USER_ID_HEADER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Caller(v.to_string()))
            .ok_or(ServiceError::MissingIdentity)
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::MissingIdentity => StatusCode::BAD_REQUEST,
            ServiceError::NotParticipant => StatusCode::FORBIDDEN,
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::Storage(e) => {
                warn!(error = %e, "Storage failure while handling request");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match &self {
            ServiceError::Storage(_) => "Storage unavailable".to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Builds the router over a shared service.
pub fn router(service: ArenaService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/games", get(list_active_games))
        .route("/games/ai", post(create_ai_game))
        .route("/games/{id}", get(get_game))
        .route("/games/{id}/moves", post(make_move))
        .route("/games/{id}/forfeit", post(forfeit))
        .route("/games/{id}/rematch", post(request_rematch))
        .route("/games/{id}/watch", post(watch_game).delete(stop_watching))
        .route("/queue", post(join_queue).delete(leave_queue).get(queue_status))
        .route("/leaderboard", get(leaderboard))
        .route("/players/{id}/stats", get(player_stats))
        .route("/players/{id}/matches", get(match_history))
        .route("/events", get(events))
        .layer(ServiceBuilder::new().map_request(|req: Request<Body>| {
            debug!(method = %req.method(), uri = %req.uri(), "Incoming HTTP request");
            req
        }))
        .with_state(service)
}

/// Binds `addr` and serves until the listener fails.
///
/// # Errors
///
/// Returns the I/O error from binding or serving.
#[instrument(skip(service))]
pub async fn serve(service: ArenaService, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Arena listening");
    axum::serve(listener, router(service)).await
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn create_ai_game(State(service): State<ArenaService>, Caller(caller): Caller) -> Json<GameResponse> {
    Json(GameResponse {
        game: service.create_ai_game(&caller).await,
    })
}

async fn get_game(
    State(service): State<ArenaService>,
    Path(game_id): Path<String>,
) -> Result<Json<GameResponse>, ServiceError> {
    Ok(Json(GameResponse {
        game: service.get_game(&game_id)?,
    }))
}

async fn make_move(
    State(service): State<ArenaService>,
    Caller(caller): Caller,
    Path(game_id): Path<String>,
    Json(request): Json<MakeMoveRequest>,
) -> Json<MakeMoveResponse> {
    Json(service.make_move(&game_id, &caller, request.position).await)
}

async fn forfeit(
    State(service): State<ArenaService>,
    Caller(caller): Caller,
    Path(game_id): Path<String>,
) -> Result<Json<GameResponse>, ServiceError> {
    Ok(Json(GameResponse {
        game: service.forfeit(&game_id, &caller).await?,
    }))
}

async fn request_rematch(
    State(service): State<ArenaService>,
    Caller(caller): Caller,
    Path(game_id): Path<String>,
) -> Result<Json<RematchResponse>, ServiceError> {
    Ok(Json(service.request_rematch(&game_id, &caller).await?))
}

async fn watch_game(
    State(service): State<ArenaService>,
    Caller(caller): Caller,
    Path(game_id): Path<String>,
) -> Json<WatchGameResponse> {
    Json(service.watch_game(&game_id, &caller))
}

async fn stop_watching(
    State(service): State<ArenaService>,
    Caller(caller): Caller,
    Path(game_id): Path<String>,
) -> Json<SuccessResponse> {
    Json(service.stop_watching(&game_id, &caller))
}

async fn list_active_games(State(service): State<ArenaService>) -> Json<ListActiveGamesResponse> {
    Json(service.list_active_games())
}

async fn join_queue(State(service): State<ArenaService>, Caller(caller): Caller) -> Json<JoinQueueResponse> {
    Json(service.join_queue(&caller).await)
}

async fn leave_queue(State(service): State<ArenaService>, Caller(caller): Caller) -> Json<SuccessResponse> {
    Json(service.leave_queue(&caller))
}

async fn queue_status(State(service): State<ArenaService>, Caller(caller): Caller) -> Json<QueueStatus> {
    Json(service.queue_status(&caller))
}

async fn leaderboard(
    State(service): State<ArenaService>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, ServiceError> {
    Ok(Json(service.leaderboard(query.limit, query.offset).await?))
}

async fn player_stats(
    State(service): State<ArenaService>,
    Caller(caller): Caller,
    Path(user_id): Path<String>,
) -> Result<Json<PlayerStatsResponse>, ServiceError> {
    Ok(Json(service.player_stats(&user_id, &caller).await?))
}

async fn match_history(
    State(service): State<ArenaService>,
    Path(user_id): Path<String>,
    Query(query): Query<MatchHistoryQuery>,
) -> Result<Json<MatchHistoryResponse>, ServiceError> {
    Ok(Json(service.match_history(&user_id, query.limit).await?))
}

async fn events(
    State(service): State<ArenaService>,
    Caller(caller): Caller,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(user_id = %caller, "Event stream opened");
    let receiver = service.connect(&caller);
    let stream = futures::stream::unfold(receiver, |mut receiver| async move {
        let event = receiver.recv().await?;
        Some((Ok(to_sse(&event)), receiver))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_sse(event: &GameEvent) -> Event {
    let sse = Event::default().event(event.kind());
    match serde_json::to_string(event) {
        Ok(data) => sse.data(data),
        Err(e) => {
            warn!(error = %e, "Failed to encode event");
            sse.comment("encoding error")
        }
    }
}
