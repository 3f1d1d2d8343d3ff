//! Tests for the SQLite stats repository.

use tempfile::NamedTempFile;

use tictactoe_arena::{GameOutcome, NewMatchRecord, RecordedMove, StatsRepository, StatsStore};

/// Creates a temporary database file with schema applied, returns the file
/// handle (must stay in scope to keep the file alive) and a ready repository.
fn setup_test_db() -> (NamedTempFile, StatsRepository) {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = db_file.path().to_str().expect("Invalid path").to_string();
    let repo = StatsRepository::open(db_path).expect("Failed to open repository");
    (db_file, repo)
}

fn seed(repo: &StatsRepository, user_id: &str, wins: usize, losses: usize) {
    repo.get_or_create_player(user_id, user_id).expect("Create failed");
    for _ in 0..wins {
        repo.increment(user_id, GameOutcome::Win).expect("Win failed");
    }
    for _ in 0..losses {
        repo.increment(user_id, GameOutcome::Loss).expect("Loss failed");
    }
}

#[test]
fn test_empty_path_is_rejected() {
    assert!(StatsRepository::new("  ".to_string()).is_err());
}

#[test]
fn test_get_or_create_starts_at_zero() {
    let (_db, repo) = setup_test_db();
    let stats = repo.get_or_create_player("u1", "Alice").expect("Create failed");
    assert_eq!(stats.user_id(), "u1");
    assert_eq!(stats.display_name(), "Alice");
    assert_eq!((*stats.wins(), *stats.losses(), *stats.draws()), (0, 0, 0));
    assert!(*stats.id() > 0);
}

#[test]
fn test_get_or_create_returns_existing_row() {
    let (_db, repo) = setup_test_db();
    let first = repo.get_or_create_player("u1", "Alice").expect("Create failed");
    let second = repo.get_or_create_player("u1", "Other").expect("Lookup failed");
    assert_eq!(first.id(), second.id());
    assert_eq!(second.display_name(), "Alice");
    assert_eq!(repo.count_players().expect("Count failed"), 1);
}

#[test]
fn test_rename_player() {
    let (_db, repo) = setup_test_db();
    repo.get_or_create_player("u1", "Alice").expect("Create failed");
    repo.rename_player("u1", "Alicia").expect("Rename failed");
    let stats = repo.find_player("u1").expect("Query failed").expect("Missing row");
    assert_eq!(stats.display_name(), "Alicia");
}

#[test]
fn test_increment_counts_each_outcome() {
    let (_db, repo) = setup_test_db();
    repo.get_or_create_player("u1", "Alice").expect("Create failed");
    repo.increment("u1", GameOutcome::Win).expect("Win failed");
    repo.increment("u1", GameOutcome::Draw).expect("Draw failed");
    repo.increment("u1", GameOutcome::Draw).expect("Draw failed");
    repo.increment("u1", GameOutcome::Loss).expect("Loss failed");

    let stats = repo.find_player("u1").expect("Query failed").expect("Missing row");
    assert_eq!((*stats.wins(), *stats.losses(), *stats.draws()), (1, 1, 2));
    assert_eq!(stats.total_games(), 4);
}

#[test]
fn test_increment_unknown_user_is_noop() {
    let (_db, repo) = setup_test_db();
    repo.increment("ghost", GameOutcome::Win).expect("Update failed");
    assert!(repo.find_player("ghost").expect("Query failed").is_none());
}

#[test]
fn test_leaderboard_orders_by_wins_then_losses() {
    let (_db, repo) = setup_test_db();
    seed(&repo, "c", 3, 0);
    seed(&repo, "b", 5, 3);
    seed(&repo, "a", 5, 1);

    let board = repo.load_leaderboard(10, 0).expect("Leaderboard failed");
    let records: Vec<_> = board.iter().map(|p| (*p.wins(), *p.losses())).collect();
    assert_eq!(records, vec![(5, 1), (5, 3), (3, 0)]);

    let page = repo.load_leaderboard(1, 1).expect("Leaderboard failed");
    assert_eq!(page[0].user_id(), "b");
}

#[test]
fn test_rank_is_one_based_and_zero_for_unknown() {
    let (_db, repo) = setup_test_db();
    seed(&repo, "c", 3, 0);
    seed(&repo, "b", 5, 3);
    seed(&repo, "a", 5, 1);

    assert_eq!(repo.player_rank("a").expect("Rank failed"), 1);
    assert_eq!(repo.player_rank("b").expect("Rank failed"), 2);
    assert_eq!(repo.player_rank("c").expect("Rank failed"), 3);
    assert_eq!(repo.player_rank("ghost").expect("Rank failed"), 0);
}

#[test]
fn test_match_history_round_trip() {
    let (_db, repo) = setup_test_db();
    let moves = vec![RecordedMove::new("a".into(), 4), RecordedMove::new("ai-player".into(), 0)];
    let row = NewMatchRecord::new("a".into(), Some("ai-player".into()), None, true, &moves)
        .expect("Encode failed");
    let stored = repo.insert_match(row).expect("Insert failed");

    assert!(*stored.is_ai_game());
    assert_eq!(stored.winner_id(), &None);
    assert_eq!(stored.parse_moves().expect("Decode failed"), moves);
}

#[test]
fn test_matches_for_player_filters_and_orders() {
    let (_db, repo) = setup_test_db();
    for (x, o) in [("a", "b"), ("c", "a"), ("c", "d")] {
        let row = NewMatchRecord::new(x.into(), Some(o.into()), Some(x.into()), false, &[])
            .expect("Encode failed");
        repo.insert_match(row).expect("Insert failed");
    }

    let matches = repo.load_matches("a", 10).expect("Query failed");
    let pairs: Vec<_> = matches
        .iter()
        .map(|m| (m.player_x_id().as_str(), m.player_o_id().as_deref()))
        .collect();
    assert_eq!(pairs, vec![("c", Some("a")), ("a", Some("b"))]);
    assert_eq!(repo.load_matches("a", 1).expect("Query failed").len(), 1);
}

#[tokio::test]
async fn test_async_store_interface() {
    let (_db, repo) = setup_test_db();
    let store: &dyn StatsStore = &repo;

    store.get_or_create("u1", "Alice").await.expect("Create failed");
    store.record_win("u1").await.expect("Win failed");
    store.record_draw("u1").await.expect("Draw failed");

    let stats = store.get_by_user_id("u1").await.expect("Query failed").expect("Missing row");
    assert_eq!((*stats.wins(), *stats.draws()), (1, 1));
    assert_eq!(store.rank("u1").await.expect("Rank failed"), 1);
    assert_eq!(store.total_count().await.expect("Count failed"), 1);
}
