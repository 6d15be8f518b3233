// Integration tests for the auction core.
//
// These drive the engine through whole auctions using the public API only,
// and check that snapshots survive the SQLite store and that the purse and
// roster invariants hold after every accepted operation.

use std::sync::Arc;

use gavel_core::audit::{AuditAction, AuditSink, SqliteAudit};
use gavel_core::dataset::{normalize_players, parse_json};
use gavel_core::db::Database;
use gavel_core::engine::{
    AuctionEngine, DrawOutcome, EngineError, PreconditionError, SaleTarget, TeamSeed,
    ValidationError,
};
use gavel_core::model::AuctionState;
use gavel_core::store::{SqliteStore, StateStore, Stored};
use gavel_core::summary;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ===========================================================================
// Test helpers
// ===========================================================================

const DATASET: &str = r#"[
    {"id": 1, "name": "Aarav", "gender": "M", "category": "Platinum", "basePrice": 4},
    {"id": 2, "name": "Diya", "gender": "F", "category": "Platinum", "basePrice": 4},
    {"id": 3, "name": "Kabir", "gender": "M", "category": "Gold", "basePrice": 3},
    {"id": 4, "name": "Meera", "gender": "F", "category": "Gold", "basePrice": 3},
    {"id": 5, "name": "Rohan", "gender": "M", "category": "Silver", "basePrice": 2},
    {"id": 6, "name": "Ananya", "gender": "F", "category": "Silver", "basePrice": 2},
    {"id": 7, "name": "Vikram", "gender": "M", "category": "Bronze", "basePrice": 1},
    {"id": 8, "name": "Isha", "gender": "F", "category": "Bronze", "basePrice": 1}
]"#;

fn seeds() -> Vec<TeamSeed> {
    [("RED_HAWKS", "Red Hawks"), ("BLUE_BEAST", "Blue Beast")]
        .into_iter()
        .map(|(id, name)| TeamSeed {
            id: id.to_string(),
            name: name.to_string(),
            logo_url: String::new(),
        })
        .collect()
}

fn engine() -> AuctionEngine {
    let players = normalize_players(parse_json(DATASET).unwrap());
    let categories = ["Platinum", "Gold", "Silver", "Bronze"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    AuctionEngine::new(players, seeds(), 60, categories)
}

fn draw(engine: &AuctionEngine, state: &AuctionState, rng: &mut StdRng) -> AuctionState {
    match engine.draw_next_player(state, rng).unwrap() {
        DrawOutcome::Drawn { state, .. } => state,
        DrawOutcome::Complete => panic!("auction ended early"),
    }
}

fn assert_consistent(state: &AuctionState) {
    let violations = state.check_invariants();
    assert!(violations.is_empty(), "invariants broken: {violations:?}");
}

// ===========================================================================
// Whole auctions
// ===========================================================================

#[test]
fn full_auction_runs_category_by_category() {
    let engine = engine();
    let mut rng = StdRng::seed_from_u64(11);
    let mut state = engine.reset();
    let mut drawn_categories = Vec::new();

    for i in 0..8 {
        state = draw(&engine, &state, &mut rng);
        drawn_categories.push(state.current_player().unwrap().category.clone());
        let team = if i % 2 == 0 { "RED_HAWKS" } else { "BLUE_BEAST" };
        state = engine
            .finalize_sale(&state, &SaleTarget::Team(team.to_string()), 5)
            .unwrap();
        assert_consistent(&state);
    }

    assert_eq!(
        drawn_categories,
        vec!["Platinum", "Platinum", "Gold", "Gold", "Silver", "Silver", "Bronze", "Bronze"]
    );
    assert!(state.is_complete());
    assert_eq!(state.total_spent(), 40);
    assert_eq!(state.sold_history.len(), 8);
    assert!(matches!(
        engine.draw_next_player(&state, &mut rng).unwrap(),
        DrawOutcome::Complete
    ));
}

#[test]
fn skipped_players_return_after_every_category_is_drained() {
    let engine = engine();
    let mut rng = StdRng::seed_from_u64(3);
    let mut state = engine.reset();

    // Skip the first player drawn, sell the rest.
    state = draw(&engine, &state, &mut rng);
    let skipped_id = state.current_player_id.clone().unwrap();
    state = engine.finalize_sale(&state, &SaleTarget::Skip, 0).unwrap();

    for _ in 0..7 {
        state = draw(&engine, &state, &mut rng);
        assert_ne!(state.current_player_id.as_deref(), Some(skipped_id.as_str()));
        state = engine
            .finalize_sale(&state, &SaleTarget::Team("RED_HAWKS".to_string()), 1)
            .unwrap();
    }

    match engine.draw_next_player(&state, &mut rng).unwrap() {
        DrawOutcome::Drawn {
            player_id,
            second_pass,
            ..
        } => {
            assert_eq!(player_id, skipped_id);
            assert!(second_pass);
        }
        DrawOutcome::Complete => panic!("skipped player was never redrawn"),
    }
}

#[test]
fn rejected_sale_leaves_block_and_purses_alone() {
    let engine = engine();
    let mut rng = StdRng::seed_from_u64(5);
    let state = draw(&engine, &engine.reset(), &mut rng);

    let err = engine
        .finalize_sale(&state, &SaleTarget::Team("BLUE_BEAST".to_string()), 61)
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::Validation(ValidationError::OverBudget {
            team_id: "BLUE_BEAST".to_string(),
            bid: 61,
            remaining: 60,
        })
    );

    // The admin corrects the bid and the sale goes through.
    let sold = engine
        .finalize_sale(&state, &SaleTarget::Team("BLUE_BEAST".to_string()), 60)
        .unwrap();
    assert_eq!(sold.team("BLUE_BEAST").unwrap().remaining_purse, 0);
    assert_consistent(&sold);
}

// ===========================================================================
// Randomized walk
// ===========================================================================

/// Random admin sessions: every accepted step keeps the invariants, and every
/// sale followed by an undo restores the rosters, purses and history.
#[test]
fn random_sessions_keep_invariants() {
    let engine = engine();

    for seed in 0..20u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut state = engine.reset();

        for _ in 0..200 {
            match rng.gen_range(0..4) {
                0 => match engine.draw_next_player(&state, &mut rng) {
                    Ok(DrawOutcome::Drawn { state: next, .. }) => state = next,
                    Ok(DrawOutcome::Complete) => assert!(state.is_complete()),
                    Err(EngineError::Precondition(PreconditionError::PlayerOnBlock { .. })) => {
                        assert!(state.current_player_id.is_some())
                    }
                    Err(e) => panic!("unexpected draw error: {e}"),
                },
                1 | 2 => {
                    let target = match rng.gen_range(0..3) {
                        0 => SaleTarget::Skip,
                        1 => SaleTarget::Team("RED_HAWKS".to_string()),
                        _ => SaleTarget::Team("BLUE_BEAST".to_string()),
                    };
                    let bid = rng.gen_range(0..=30);
                    if let Ok(next) = engine.finalize_sale(&state, &target, bid) {
                        let undone = engine.undo_last_sale(&next).unwrap();
                        assert_eq!(undone.state.players.len(), state.players.len());
                        assert_eq!(undone.state.teams, state.teams);
                        assert_eq!(undone.state.sold_history, state.sold_history);
                        state = next;
                    }
                }
                _ => {
                    if let Ok(undo) = engine.undo_last_sale(&state) {
                        state = undo.state;
                    } else {
                        assert!(state.sold_history.is_empty());
                    }
                }
            }
            assert_consistent(&state);
            for team in &state.teams {
                assert!(team.remaining_purse <= team.initial_purse);
            }
        }
    }
}

// ===========================================================================
// Persistence and recovery
// ===========================================================================

#[tokio::test]
async fn snapshot_and_audit_survive_reopen() {
    let path = std::env::temp_dir().join("gavel_core_recovery.db");
    let _ = std::fs::remove_file(&path);
    let path_str = path.to_str().unwrap().to_string();

    let engine = engine();
    let mut rng = StdRng::seed_from_u64(9);
    let mut state = draw(&engine, &engine.reset(), &mut rng);
    state = engine
        .finalize_sale(&state, &SaleTarget::Team("RED_HAWKS".to_string()), 12)
        .unwrap();
    state = draw(&engine, &state, &mut rng);
    state = engine
        .finalize_sale(&state, &SaleTarget::Team("BLUE_BEAST".to_string()), 7)
        .unwrap();
    let undo = engine.undo_last_sale(&state).unwrap();

    {
        let db = Arc::new(Database::open(&path_str).unwrap());
        SqliteStore::new(db.clone()).put(&undo.state).await.unwrap();
        SqliteAudit::new(db).record(undo.audit.clone()).await.unwrap();
    }

    let db = Arc::new(Database::open(&path_str).unwrap());
    let restored = match SqliteStore::new(db.clone()).get().await.unwrap() {
        Stored::Snapshot(s) => *s,
        Stored::Waiting => panic!("snapshot lost on reopen"),
    };
    assert_eq!(restored, undo.state);
    assert_consistent(&restored);

    let entries = SqliteAudit::new(db).entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, AuditAction::UndoSale);
    assert_eq!(entries[0].team_id.as_deref(), Some("BLUE_BEAST"));
    assert_eq!(entries[0].price, 7);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn dashboard_tracks_a_running_auction() {
    let engine = engine();
    let mut rng = StdRng::seed_from_u64(21);
    let mut state = draw(&engine, &engine.reset(), &mut rng);
    state = engine
        .finalize_sale(&state, &SaleTarget::Team("RED_HAWKS".to_string()), 52)
        .unwrap();

    let view = summary::dashboard(&state, engine.categories(), 10);
    assert_eq!(view.current_category, "Platinum");
    assert_eq!(view.last_sale.as_ref().unwrap().price, 52);
    assert_eq!(view.top_spender.as_ref().unwrap().team_id, "RED_HAWKS");
    assert!(view.teams[0].low_purse);
    assert_eq!(view.categories[0].sold, 1);
    assert_eq!(view.categories[0].total, 2);
}
