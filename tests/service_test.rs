//! Tests for the service layer and HTTP routes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use chrono::{TimeDelta, Utc};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt;

use tictactoe_arena::{
    AiPlayer, ArenaService, DEFAULT_FINISHED_GAME_TTL, DEFAULT_TICK, GameEvent, GameStatus, InMemoryStatsStore,
    StaticDirectory, USER_ID_HEADER, router,
};

fn service() -> ArenaService {
    service_with_ttl(DEFAULT_FINISHED_GAME_TTL)
}

fn service_with_ttl(finished_ttl: Duration) -> ArenaService {
    let directory = StaticDirectory::new(BTreeMap::from([("alice".to_string(), "Alice".to_string())]));
    ArenaService::new(
        Arc::new(InMemoryStatsStore::new()),
        Arc::new(directory),
        AiPlayer::default(),
        finished_ttl,
    )
}

fn drain(rx: &mut UnboundedReceiver<GameEvent>) -> Vec<GameEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn kinds(events: &[GameEvent]) -> Vec<&'static str> {
    events.iter().map(GameEvent::kind).collect()
}

#[tokio::test]
async fn test_match_found_reaches_both_players() {
    let svc = service();
    let mut alice = svc.connect("alice");
    let mut bob = svc.connect("bob");

    svc.join_queue("alice").await;
    let joined = svc.join_queue("bob").await;
    let game = joined.game.expect("matched on join");

    assert_eq!(game.player_x.display_name, "Alice");
    // No directory entry: the raw id is the name.
    assert_eq!(game.player_o.as_ref().map(|p| p.display_name.as_str()), Some("bob"));

    assert_eq!(kinds(&drain(&mut alice)), vec!["queueUpdated", "queueUpdated", "matchFound"]);
    assert_eq!(kinds(&drain(&mut bob)), vec!["queueUpdated", "matchFound"]);
    assert_eq!(svc.tracker().game_clients(&game.game_id), vec!["alice", "bob"]);
}

#[tokio::test]
async fn test_move_updates_are_scoped_and_skip_the_mover() {
    let svc = service();
    svc.join_queue("alice").await;
    let game = svc.join_queue("bob").await.game.expect("matched");
    let mut alice = svc.connect("alice");
    let mut bob = svc.connect("bob");
    let mut carol = svc.connect("carol");
    let mut dave = svc.connect("dave");

    assert!(svc.watch_game(&game.game_id, "carol").success);
    let reply = svc.make_move(&game.game_id, "alice", 4).await;
    assert!(reply.success);

    assert!(drain(&mut alice).is_empty());
    assert_eq!(kinds(&drain(&mut bob)), vec!["gameUpdated"]);
    assert_eq!(kinds(&drain(&mut carol)), vec!["spectatorUpdate"]);
    assert!(drain(&mut dave).is_empty());
}

#[tokio::test]
async fn test_forfeit_ends_game_for_opponent_and_clears_scope() {
    let svc = service();
    svc.join_queue("alice").await;
    let game = svc.join_queue("bob").await.game.expect("matched");
    let mut bob = svc.connect("bob");

    let ended = svc.forfeit(&game.game_id, "alice").await.expect("forfeit");
    assert_eq!(ended.status, GameStatus::Abandoned);
    assert_eq!(ended.winner_id.as_deref(), Some("bob"));
    assert_eq!(kinds(&drain(&mut bob)), vec!["gameEnded"]);
    assert!(svc.tracker().game_clients(&game.game_id).is_empty());
}

#[tokio::test]
async fn test_bad_moves_report_errors_without_broadcast() {
    let svc = service();
    let game = svc.create_ai_game("alice").await;
    let mut alice = svc.connect("alice");

    let reply = svc.make_move(&game.game_id, "alice", -1).await;
    assert!(!reply.success);
    assert_eq!(reply.error_message, "Invalid position");
    assert_eq!(reply.game.map(|g| g.moves.len()), Some(0));

    let missing = svc.make_move("nope", "alice", 0).await;
    assert!(missing.game.is_none());
    assert_eq!(missing.error_message, "Game not found");
    assert!(drain(&mut alice).is_empty());
}

#[tokio::test]
async fn test_rematch_after_ai_game() {
    let svc = service();
    let game = svc.create_ai_game("alice").await;
    let early = svc.request_rematch(&game.game_id, "alice").await.expect("rematch");
    assert!(!early.success);

    svc.forfeit(&game.game_id, "alice").await.expect("forfeit");
    let rematch = svc.request_rematch(&game.game_id, "alice").await.expect("rematch");
    let new_game = rematch.new_game.expect("new game");
    assert_ne!(new_game.game_id, game.game_id);
    assert!(new_game.is_ai_game);
}

#[tokio::test]
async fn test_rematch_while_queued_leaves_the_queue() {
    let svc = service();
    let game = svc.create_ai_game("alice").await;
    svc.forfeit(&game.game_id, "alice").await.expect("forfeit");
    assert_eq!(svc.join_queue("alice").await.position, 1);

    let rematch = svc.request_rematch(&game.game_id, "alice").await.expect("rematch");
    let new_game = rematch.new_game.expect("new game");
    assert!(!svc.queue_status("alice").in_queue);

    let bob = svc.join_queue("bob").await;
    assert!(bob.game.is_none());
    assert_eq!(bob.position, 1);
    assert_eq!(
        svc.manager().player_current_game("alice").map(|g| g.game_id().clone()),
        Some(new_game.game_id)
    );
    assert!(svc.list_active_games().games.is_empty());
}

#[tokio::test]
async fn test_ai_game_removes_caller_from_queue() {
    let svc = service();
    svc.join_queue("alice").await;
    let game = svc.create_ai_game("alice").await;
    assert!(!svc.queue_status("alice").in_queue);

    svc.join_queue("bob").await;
    assert_eq!(
        svc.manager().player_current_game("alice").map(|g| g.game_id().clone()),
        Some(game.game_id)
    );
}

#[tokio::test]
async fn test_repeat_forfeit_is_silent() {
    let svc = service();
    svc.join_queue("alice").await;
    let game = svc.join_queue("bob").await.game.expect("matched");
    svc.forfeit(&game.game_id, "alice").await.expect("forfeit");

    assert!(svc.watch_game(&game.game_id, "carol").success);
    let mut bob = svc.connect("bob");
    let mut carol = svc.connect("carol");

    let again = svc.forfeit(&game.game_id, "alice").await.expect("second forfeit");
    assert_eq!(again.status, GameStatus::Abandoned);
    assert!(drain(&mut bob).is_empty());
    assert!(drain(&mut carol).is_empty());
    assert_eq!(svc.tracker().game_clients(&game.game_id), vec!["carol"]);
}

#[tokio::test]
async fn test_sweep_forgets_watchers_of_evicted_games() {
    let svc = service();
    let game = svc.create_ai_game("alice").await;
    svc.forfeit(&game.game_id, "alice").await.expect("forfeit");
    assert!(svc.watch_game(&game.game_id, "carol").success);

    assert_eq!(svc.sweep_finished(Utc::now()), 0);
    assert_eq!(svc.tracker().client_game("carol"), Some(game.game_id.clone()));

    let later = Utc::now() + TimeDelta::seconds(601);
    assert_eq!(svc.sweep_finished(later), 1);
    assert!(svc.get_game(&game.game_id).is_err());
    assert!(svc.tracker().game_clients(&game.game_id).is_empty());
    assert_eq!(svc.tracker().client_game("carol"), None);
}

#[tokio::test(start_paused = true)]
async fn test_background_sweeper_evicts_on_each_period() {
    let svc = service_with_ttl(Duration::ZERO);
    let sweep_every = Duration::from_secs(30);
    let first = svc.create_ai_game("alice").await;
    svc.forfeit(&first.game_id, "alice").await.expect("forfeit");

    let tasks = svc.spawn_background(DEFAULT_TICK, sweep_every);
    // Both loops tick once on start.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(svc.get_game(&first.game_id).is_err());

    let second = svc.create_ai_game("bob").await;
    svc.forfeit(&second.game_id, "bob").await.expect("forfeit");
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(svc.get_game(&second.game_id).is_ok());

    tokio::time::sleep(sweep_every).await;
    assert!(svc.get_game(&second.game_id).is_err());
    for task in tasks {
        task.abort();
    }
}

#[tokio::test]
async fn test_own_stats_are_created_on_request() {
    let svc = service();
    let other = svc.player_stats("ghost", "alice").await.expect("stats");
    assert!(other.stats.is_none());
    assert_eq!(other.rank, 0);

    let own = svc.player_stats("alice", "alice").await.expect("stats");
    assert_eq!(own.stats.map(|s| s.display_name), Some("Alice".to_string()));
    assert_eq!(own.rank, 1);
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn post(uri: &str, user: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_ID_HEADER, user);
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).expect("request")
}

#[tokio::test]
async fn test_http_play_against_ai() {
    let app = router(service());

    let (status, created) = send(app.clone(), post("/games/ai", Some("alice"), None)).await;
    assert_eq!(status, StatusCode::OK);
    let game_id = created["game"]["gameId"].as_str().expect("game id").to_string();

    let (status, moved) = send(
        app.clone(),
        post(
            &format!("/games/{game_id}/moves"),
            Some("alice"),
            Some(serde_json::json!({ "position": 4 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["success"], true);
    assert_eq!(moved["game"]["moves"].as_array().map(Vec::len), Some(2));

    let (status, fetched) = send(app.clone(), get(&format!("/games/{game_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["game"]["currentTurn"], "X");
}

#[tokio::test]
async fn test_http_error_statuses() {
    let svc = service();
    let app = router(svc.clone());

    let (status, _) = send(app.clone(), post("/games/ai", None, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(app.clone(), get("/games/unknown")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Game not found");

    let game = svc.create_ai_game("alice").await;
    let (status, _) = send(
        app.clone(),
        post(&format!("/games/{}/forfeit", game.game_id), Some("mallory"), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_http_leaderboard_defaults() {
    let svc = service();
    svc.join_queue("alice").await;
    let app = router(svc);

    let (status, body) = send(app, get("/leaderboard")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalCount"], 1);
    assert_eq!(body["players"][0]["userId"], "alice");
    assert_eq!(body["players"][0]["totalGames"], 0);
}
