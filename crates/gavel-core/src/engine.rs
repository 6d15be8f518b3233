// Auction engine: the state machine behind draw, finalize, undo and reset.
//
// Every operation takes the current snapshot by reference and returns a new
// one. A rejected operation returns an error and leaves the caller's
// snapshot as the only valid state.

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;
use tracing::debug;

use crate::audit::AuditEntry;
use crate::model::{AuctionState, Player, PlayerStatus, SaleRecord, Team};

/// Team selection value meaning "skip this player".
pub const SKIP_SENTINEL: &str = "SKIP";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Bad input from the admin. Nothing was changed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no team selected")]
    MissingTeam,

    #[error("unknown team `{team_id}`")]
    UnknownTeam { team_id: String },

    #[error("bid must be a positive whole amount")]
    NonPositiveBid,

    #[error("bid {bid} exceeds remaining purse {remaining} of team `{team_id}`")]
    OverBudget {
        team_id: String,
        bid: u32,
        remaining: u32,
    },
}

/// The operation is not allowed in the current auction phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("player `{player_id}` is already on the block")]
    PlayerOnBlock { player_id: String },

    #[error("no player is on the block")]
    NoPlayerOnBlock,

    #[error("player `{player_id}` has already been sold")]
    AlreadySold { player_id: String },

    #[error("no sale to undo")]
    NothingToUndo,
}

/// The snapshot contradicts itself. Signals a bug elsewhere rather than a
/// recoverable case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InconsistencyError {
    #[error("player `{player_id}` not found")]
    PlayerMissing { player_id: String },

    #[error("team `{team_id}` not found")]
    TeamMissing { team_id: String },

    #[error("player `{player_id}` is not on the roster of team `{team_id}`")]
    RosterMismatch { player_id: String, team_id: String },

    #[error("refunding {price} would push team `{team_id}` above its initial purse")]
    PurseOverflow { team_id: String, price: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    Inconsistency(#[from] InconsistencyError),
}

// ---------------------------------------------------------------------------
// Inputs and outcomes
// ---------------------------------------------------------------------------

/// Where the player on the block goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaleTarget {
    Skip,
    Team(String),
}

impl SaleTarget {
    /// Parse a team selection: the `SKIP` sentinel or a team id.
    pub fn parse(selection: &str) -> Result<Self, ValidationError> {
        match selection.trim() {
            "" => Err(ValidationError::MissingTeam),
            SKIP_SENTINEL => Ok(SaleTarget::Skip),
            id => Ok(SaleTarget::Team(id.to_string())),
        }
    }
}

/// Static description of a team the auction starts with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamSeed {
    pub id: String,
    pub name: String,
    pub logo_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawOutcome {
    /// A player is now on the block.
    Drawn {
        state: AuctionState,
        player_id: String,
        /// The player was drawn from the skipped pool.
        second_pass: bool,
    },
    /// No unsold or skipped player remains.
    Complete,
}

/// Result of a successful undo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Undo {
    pub state: AuctionState,
    /// The record that was reversed.
    pub record: SaleRecord,
    /// Entry for the audit sink.
    pub audit: AuditEntry,
}

// ---------------------------------------------------------------------------
// AuctionEngine
// ---------------------------------------------------------------------------

/// Owns the session's starting data and the category order; applies the
/// auction rules to snapshots.
#[derive(Debug, Clone)]
pub struct AuctionEngine {
    players: Vec<Player>,
    teams: Vec<TeamSeed>,
    purse: u32,
    categories: Vec<String>,
}

impl AuctionEngine {
    /// # Arguments
    /// - `players`: normalized dataset, every player `UNSOLD`
    /// - `teams`: the bidding teams, all starting with `purse`
    /// - `categories`: draw order of the categories
    pub fn new(players: Vec<Player>, teams: Vec<TeamSeed>, purse: u32, categories: Vec<String>) -> Self {
        AuctionEngine {
            players,
            teams,
            purse,
            categories,
        }
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// A fresh auction: dataset players, full purses, empty history.
    pub fn reset(&self) -> AuctionState {
        let teams = self
            .teams
            .iter()
            .map(|seed| Team::new(&seed.id, &seed.name, &seed.logo_url, self.purse))
            .collect();
        let first_category = self
            .categories
            .first()
            .or_else(|| self.players.first().map(|p| &p.category))
            .cloned()
            .unwrap_or_default();
        AuctionState::new(self.players.clone(), teams, &first_category)
    }

    /// Put the next player on the block.
    ///
    /// Stays in the current category while it has unsold players, then walks
    /// the category order from the top. Skipped players come back only once
    /// every category is out of unsold players.
    pub fn draw_next_player<R: Rng + ?Sized>(
        &self,
        state: &AuctionState,
        rng: &mut R,
    ) -> Result<DrawOutcome, EngineError> {
        if let Some(player_id) = &state.current_player_id {
            return Err(PreconditionError::PlayerOnBlock {
                player_id: player_id.clone(),
            }
            .into());
        }

        let mut chosen = unsold_in(&state.players, &state.meta.current_category)
            .choose(rng)
            .copied();
        if chosen.is_none() {
            chosen = self
                .category_sequence(&state.players)
                .into_iter()
                .map(|category| unsold_in(&state.players, category))
                .find(|pool| !pool.is_empty())
                .and_then(|pool| pool.choose(rng).copied());
        }

        let second_pass = chosen.is_none();
        if second_pass {
            let skipped: Vec<&Player> = state.players.iter().filter(|p| p.is_skipped()).collect();
            chosen = skipped.choose(rng).copied();
        }

        let Some(player) = chosen else {
            debug!("Draw requested but no players remain");
            return Ok(DrawOutcome::Complete);
        };

        let mut next = state.clone();
        next.current_player_id = Some(player.id.clone());
        next.meta.auction_started = true;
        next.meta.current_category = player.category.clone();
        next.touch();

        Ok(DrawOutcome::Drawn {
            player_id: player.id.clone(),
            state: next,
            second_pass,
        })
    }

    /// Commit the outcome for the player on the block: a skip, or a sale to
    /// a team for `bid`. `bid` is ignored when skipping.
    pub fn finalize_sale(
        &self,
        state: &AuctionState,
        target: &SaleTarget,
        bid: u32,
    ) -> Result<AuctionState, EngineError> {
        let player_id = state
            .current_player_id
            .as_deref()
            .ok_or(PreconditionError::NoPlayerOnBlock)?;
        let player_idx = state
            .players
            .iter()
            .position(|p| p.id == player_id)
            .ok_or_else(|| InconsistencyError::PlayerMissing {
                player_id: player_id.to_string(),
            })?;
        let player = &state.players[player_idx];
        if player.is_sold() {
            return Err(PreconditionError::AlreadySold {
                player_id: player.id.clone(),
            }
            .into());
        }

        let mut next = state.clone();
        match target {
            SaleTarget::Skip => {
                next.players[player_idx].status = PlayerStatus::Skipped;
                next.sold_history.insert(0, SaleRecord::skip(player));
            }
            SaleTarget::Team(team_id) => {
                let team_idx = state
                    .teams
                    .iter()
                    .position(|t| t.id == *team_id)
                    .ok_or_else(|| ValidationError::UnknownTeam {
                        team_id: team_id.clone(),
                    })?;
                if bid == 0 {
                    return Err(ValidationError::NonPositiveBid.into());
                }
                let team = &state.teams[team_idx];
                if bid > team.remaining_purse {
                    return Err(ValidationError::OverBudget {
                        team_id: team.id.clone(),
                        bid,
                        remaining: team.remaining_purse,
                    }
                    .into());
                }

                next.players[player_idx].status = PlayerStatus::Sold {
                    sold_to: team.id.clone(),
                    sold_price: bid,
                };
                let buyer = &mut next.teams[team_idx];
                buyer.remaining_purse -= bid;
                buyer.roster.push(player.id.clone());
                next.sold_history.insert(0, SaleRecord::sale(player, team, bid));
            }
        }

        next.current_player_id = None;
        next.touch();
        Ok(next)
    }

    /// Reverse the most recent sale or skip.
    ///
    /// Undoing a skip puts the player back to `UNSOLD` without touching any
    /// purse. Fails without changes if the record points at a player or team
    /// that no longer matches it.
    pub fn undo_last_sale(&self, state: &AuctionState) -> Result<Undo, EngineError> {
        let record = state
            .sold_history
            .first()
            .ok_or(PreconditionError::NothingToUndo)?;
        let player_idx = state
            .players
            .iter()
            .position(|p| p.id == record.player_id)
            .ok_or_else(|| InconsistencyError::PlayerMissing {
                player_id: record.player_id.clone(),
            })?;
        let player = &state.players[player_idx];

        let mut next = state.clone();
        match &record.team_id {
            Some(team_id) => {
                let team_idx = state
                    .teams
                    .iter()
                    .position(|t| t.id == *team_id)
                    .ok_or_else(|| InconsistencyError::TeamMissing {
                        team_id: team_id.clone(),
                    })?;
                let team = &state.teams[team_idx];
                if player.sold_to() != Some(team_id.as_str()) || !team.has_player(&player.id) {
                    return Err(InconsistencyError::RosterMismatch {
                        player_id: player.id.clone(),
                        team_id: team_id.clone(),
                    }
                    .into());
                }
                let refunded = team
                    .remaining_purse
                    .checked_add(record.price)
                    .filter(|purse| *purse <= team.initial_purse)
                    .ok_or_else(|| InconsistencyError::PurseOverflow {
                        team_id: team_id.clone(),
                        price: record.price,
                    })?;

                let seller = &mut next.teams[team_idx];
                seller.remaining_purse = refunded;
                seller.roster.retain(|id| *id != player.id);
            }
            None => {
                // A skip record cannot be reversed once the player was sold.
                if let Some(team_id) = player.sold_to() {
                    return Err(InconsistencyError::RosterMismatch {
                        player_id: player.id.clone(),
                        team_id: team_id.to_string(),
                    }
                    .into());
                }
            }
        }

        next.players[player_idx].status = PlayerStatus::Unsold;
        next.sold_history.remove(0);
        next.touch();

        Ok(Undo {
            audit: AuditEntry::undo(record, Utc::now()),
            record: record.clone(),
            state: next,
        })
    }

    /// Categories in draw order: the configured list, then any category that
    /// only appears in the dataset, in first-seen order.
    fn category_sequence<'a>(&'a self, players: &'a [Player]) -> Vec<&'a str> {
        let mut sequence: Vec<&str> = self.categories.iter().map(String::as_str).collect();
        for player in players {
            if !sequence.contains(&player.category.as_str()) {
                sequence.push(&player.category);
            }
        }
        sequence
    }
}

fn unsold_in<'a>(players: &'a [Player], category: &str) -> Vec<&'a Player> {
    players
        .iter()
        .filter(|p| p.is_unsold() && p.category == category)
        .collect()
}
