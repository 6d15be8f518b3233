// Auction data model: players, teams, sale records and the state snapshot.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Team name written into a sale record when the player was skipped.
pub const SKIPPED_TEAM_NAME: &str = "SKIPPED";

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// Auction status of a single player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerStatus {
    Unsold,
    Sold { sold_to: String, sold_price: u32 },
    Skipped,
}

/// A player in the auction pool.
///
/// Serialized flat with explicit `status`, `soldTo` and `soldPrice` fields:
/// `soldTo` is null unless SOLD, `soldPrice` is null when UNSOLD and 0 when
/// SKIPPED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "PlayerRecord", try_from = "PlayerRecord")]
pub struct Player {
    pub id: String,
    pub name: String,
    pub gender: String,
    /// Tier bucket the player is drawn in (e.g. "Platinum").
    pub category: String,
    pub image_url: String,
    pub base_price: u32,
    pub status: PlayerStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum StatusTag {
    Unsold,
    Sold,
    Skipped,
}

/// Wire shape of [`Player`].
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerRecord {
    id: String,
    name: String,
    gender: String,
    category: String,
    #[serde(alias = "image")]
    image_url: String,
    base_price: u32,
    status: StatusTag,
    #[serde(default)]
    sold_to: Option<String>,
    #[serde(default)]
    sold_price: Option<u32>,
}

impl From<Player> for PlayerRecord {
    fn from(player: Player) -> Self {
        let (status, sold_to, sold_price) = match player.status {
            PlayerStatus::Unsold => (StatusTag::Unsold, None, None),
            PlayerStatus::Sold {
                sold_to,
                sold_price,
            } => (StatusTag::Sold, Some(sold_to), Some(sold_price)),
            PlayerStatus::Skipped => (StatusTag::Skipped, None, Some(0)),
        };
        PlayerRecord {
            id: player.id,
            name: player.name,
            gender: player.gender,
            category: player.category,
            image_url: player.image_url,
            base_price: player.base_price,
            status,
            sold_to,
            sold_price,
        }
    }
}

impl TryFrom<PlayerRecord> for Player {
    type Error = String;

    fn try_from(record: PlayerRecord) -> Result<Self, Self::Error> {
        let status = match (record.status, record.sold_to, record.sold_price) {
            (StatusTag::Sold, Some(sold_to), Some(sold_price)) => PlayerStatus::Sold {
                sold_to,
                sold_price,
            },
            (StatusTag::Sold, _, _) => {
                return Err(format!(
                    "player `{}` is SOLD without both soldTo and soldPrice",
                    record.id
                ))
            }
            (StatusTag::Unsold, _, _) => PlayerStatus::Unsold,
            (StatusTag::Skipped, _, _) => PlayerStatus::Skipped,
        };
        Ok(Player {
            id: record.id,
            name: record.name,
            gender: record.gender,
            category: record.category,
            image_url: record.image_url,
            base_price: record.base_price,
            status,
        })
    }
}

impl Player {
    pub fn is_unsold(&self) -> bool {
        matches!(self.status, PlayerStatus::Unsold)
    }

    pub fn is_sold(&self) -> bool {
        matches!(self.status, PlayerStatus::Sold { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, PlayerStatus::Skipped)
    }

    /// Team the player was sold to, if sold.
    pub fn sold_to(&self) -> Option<&str> {
        match &self.status {
            PlayerStatus::Sold { sold_to, .. } => Some(sold_to),
            _ => None,
        }
    }

    /// Price the player went for. Skipped players read as 0.
    pub fn sold_price(&self) -> Option<u32> {
        match &self.status {
            PlayerStatus::Sold { sold_price, .. } => Some(*sold_price),
            PlayerStatus::Skipped => Some(0),
            PlayerStatus::Unsold => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Team
// ---------------------------------------------------------------------------

/// A bidding team and its purse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(alias = "logo")]
    pub logo_url: String,
    pub initial_purse: u32,
    pub remaining_purse: u32,
    /// Ids of the players bought, in purchase order.
    #[serde(alias = "players")]
    pub roster: Vec<String>,
}

impl Team {
    /// A team with a full purse and an empty roster.
    pub fn new(id: &str, name: &str, logo_url: &str, purse: u32) -> Self {
        Team {
            id: id.to_string(),
            name: name.to_string(),
            logo_url: logo_url.to_string(),
            initial_purse: purse,
            remaining_purse: purse,
            roster: Vec::new(),
        }
    }

    /// Amount spent so far.
    pub fn spent(&self) -> u32 {
        self.initial_purse.saturating_sub(self.remaining_purse)
    }

    pub fn has_player(&self, player_id: &str) -> bool {
        self.roster.iter().any(|id| id == player_id)
    }
}

// ---------------------------------------------------------------------------
// Sale history
// ---------------------------------------------------------------------------

/// One entry of the append-only sale history. A record with no `team_id`
/// (and team name `SKIPPED`) is a skip, not a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleRecord {
    pub player_id: String,
    pub player_name: String,
    pub category: String,
    pub team_id: Option<String>,
    pub team_name: String,
    pub price: u32,
}

impl SaleRecord {
    pub fn sale(player: &Player, team: &Team, price: u32) -> Self {
        SaleRecord {
            player_id: player.id.clone(),
            player_name: player.name.clone(),
            category: player.category.clone(),
            team_id: Some(team.id.clone()),
            team_name: team.name.clone(),
            price,
        }
    }

    pub fn skip(player: &Player) -> Self {
        SaleRecord {
            player_id: player.id.clone(),
            player_name: player.name.clone(),
            category: player.category.clone(),
            team_id: None,
            team_name: SKIPPED_TEAM_NAME.to_string(),
            price: 0,
        }
    }

    pub fn is_skip(&self) -> bool {
        self.team_id.is_none()
    }
}

// ---------------------------------------------------------------------------
// AuctionState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionMeta {
    /// Category the last draw resolved to.
    pub current_category: String,
    pub auction_started: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

/// The complete auction snapshot exchanged with every collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionState {
    pub meta: AuctionMeta,
    pub players: Vec<Player>,
    pub teams: Vec<Team>,
    /// The player currently on the block.
    pub current_player_id: Option<String>,
    /// Sale and skip records, most recent first.
    pub sold_history: Vec<SaleRecord>,
}

impl AuctionState {
    pub fn new(players: Vec<Player>, teams: Vec<Team>, first_category: &str) -> Self {
        AuctionState {
            meta: AuctionMeta {
                current_category: first_category.to_string(),
                auction_started: false,
                last_updated: None,
            },
            players,
            teams,
            current_player_id: None,
            sold_history: Vec::new(),
        }
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn team(&self, team_id: &str) -> Option<&Team> {
        self.teams.iter().find(|t| t.id == team_id)
    }

    /// The player on the block, if any.
    pub fn current_player(&self) -> Option<&Player> {
        self.current_player_id
            .as_deref()
            .and_then(|id| self.player(id))
    }

    /// Whether no player is left to draw in either pass.
    pub fn is_complete(&self) -> bool {
        self.current_player_id.is_none()
            && !self.players.iter().any(|p| p.is_unsold() || p.is_skipped())
    }

    /// Total amount spent across all teams.
    pub fn total_spent(&self) -> u32 {
        self.teams.iter().map(|t| t.spent()).sum()
    }

    pub(crate) fn touch(&mut self) {
        self.meta.last_updated = Some(Utc::now());
    }

    /// Check the purse, roster and on-block invariants, returning every
    /// violation found.
    pub fn check_invariants(&self) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();

        let mut seen: HashMap<&str, usize> = HashMap::new();
        for player in &self.players {
            *seen.entry(player.id.as_str()).or_default() += 1;
        }
        let mut duplicates: Vec<&str> = seen
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(id, _)| *id)
            .collect();
        duplicates.sort_unstable();
        for id in duplicates {
            violations.push(InvariantViolation::DuplicatePlayer {
                player_id: id.to_string(),
            });
        }

        let mut roster_count: HashMap<&str, usize> = HashMap::new();
        for team in &self.teams {
            if team.remaining_purse > team.initial_purse {
                violations.push(InvariantViolation::PurseAboveInitial {
                    team_id: team.id.clone(),
                });
            }

            let mut roster_total: u32 = 0;
            for player_id in &team.roster {
                *roster_count.entry(player_id.as_str()).or_default() += 1;
                match self.player(player_id).map(|p| &p.status) {
                    Some(PlayerStatus::Sold {
                        sold_to,
                        sold_price,
                    }) if *sold_to == team.id => {
                        roster_total = roster_total.saturating_add(*sold_price);
                    }
                    _ => violations.push(InvariantViolation::RosterPlayerNotSold {
                        team_id: team.id.clone(),
                        player_id: player_id.clone(),
                    }),
                }
            }

            if team.spent() != roster_total {
                violations.push(InvariantViolation::PurseMismatch {
                    team_id: team.id.clone(),
                    spent: team.spent(),
                    roster_total,
                });
            }
        }

        for player in &self.players {
            let listed = roster_count.get(player.id.as_str()).copied().unwrap_or(0);
            if listed > 1 {
                violations.push(InvariantViolation::PlayerOnMultipleRosters {
                    player_id: player.id.clone(),
                });
            }
            if let Some(team_id) = player.sold_to() {
                let on_roster = self.team(team_id).is_some_and(|t| t.has_player(&player.id));
                if !on_roster {
                    violations.push(InvariantViolation::SoldPlayerNotOnRoster {
                        player_id: player.id.clone(),
                        team_id: team_id.to_string(),
                    });
                }
            }
        }

        if let Some(player_id) = &self.current_player_id {
            match self.player(player_id) {
                None => violations.push(InvariantViolation::DanglingCurrentPlayer {
                    player_id: player_id.clone(),
                }),
                Some(player) if player.is_sold() => {
                    violations.push(InvariantViolation::CurrentPlayerSold {
                        player_id: player_id.clone(),
                    })
                }
                Some(_) => {}
            }
        }

        violations
    }
}

/// A broken snapshot invariant found by [`AuctionState::check_invariants`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("player id `{player_id}` appears more than once")]
    DuplicatePlayer { player_id: String },

    #[error("team `{team_id}` has more purse remaining than it started with")]
    PurseAboveInitial { team_id: String },

    #[error("team `{team_id}` spent {spent} but its roster adds up to {roster_total}")]
    PurseMismatch {
        team_id: String,
        spent: u32,
        roster_total: u32,
    },

    #[error("team `{team_id}` lists player `{player_id}` who was not sold to it")]
    RosterPlayerNotSold { team_id: String, player_id: String },

    #[error("player `{player_id}` is sold to `{team_id}` but missing from its roster")]
    SoldPlayerNotOnRoster { player_id: String, team_id: String },

    #[error("player `{player_id}` is on more than one roster")]
    PlayerOnMultipleRosters { player_id: String },

    #[error("player `{player_id}` is on the block but not in the pool")]
    DanglingCurrentPlayer { player_id: String },

    #[error("player `{player_id}` is on the block but already sold")]
    CurrentPlayerSold { player_id: String },
}
