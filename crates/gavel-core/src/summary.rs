// Read-only summaries of a snapshot for the admin overview and the public
// dashboard.

use serde::Serialize;

use crate::model::{AuctionState, Player, SaleRecord};

/// Progress through one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryProgress {
    pub category: String,
    pub total: usize,
    /// Players sold or skipped.
    pub decided: usize,
    pub sold: usize,
}

/// Spend figures for one team.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    pub team_id: String,
    pub team_name: String,
    pub spent: u32,
    pub remaining: u32,
    /// Share of the initial purse spent, 0.0 to 100.0.
    pub spent_percent: f64,
    pub player_count: usize,
    pub average_price: f64,
    pub low_purse: bool,
}

/// Everything a dashboard shows for one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub current_category: String,
    pub current_player: Option<Player>,
    pub last_sale: Option<SaleRecord>,
    pub costliest: Option<Player>,
    pub top_spender: Option<TeamSummary>,
    pub teams: Vec<TeamSummary>,
    pub categories: Vec<CategoryProgress>,
    pub complete: bool,
}

/// Category progress in the given order, followed by any category only
/// present in the player list.
pub fn category_progress(state: &AuctionState, order: &[String]) -> Vec<CategoryProgress> {
    let mut categories: Vec<&str> = order.iter().map(String::as_str).collect();
    for player in &state.players {
        if !categories.contains(&player.category.as_str()) {
            categories.push(&player.category);
        }
    }

    categories
        .into_iter()
        .map(|category| {
            let in_category = state.players.iter().filter(|p| p.category == category);
            let (total, decided, sold) = in_category.fold((0, 0, 0), |(t, d, s), p| {
                (t + 1, d + usize::from(!p.is_unsold()), s + usize::from(p.is_sold()))
            });
            CategoryProgress {
                category: category.to_string(),
                total,
                decided,
                sold,
            }
        })
        .collect()
}

/// Per-team spend. A team is flagged low once its remaining purse is at or
/// below `low_purse_threshold`.
pub fn team_summaries(state: &AuctionState, low_purse_threshold: u32) -> Vec<TeamSummary> {
    state
        .teams
        .iter()
        .map(|team| {
            let spent = team.spent();
            let player_count = team.roster.len();
            let spent_percent = if team.initial_purse == 0 {
                0.0
            } else {
                f64::from(spent) / f64::from(team.initial_purse) * 100.0
            };
            let average_price = if player_count == 0 {
                0.0
            } else {
                f64::from(spent) / player_count as f64
            };
            TeamSummary {
                team_id: team.id.clone(),
                team_name: team.name.clone(),
                spent,
                remaining: team.remaining_purse,
                spent_percent,
                player_count,
                average_price,
                low_purse: team.remaining_purse <= low_purse_threshold,
            }
        })
        .collect()
}

/// The most expensive sold player. Ties go to the earliest in the list.
pub fn costliest_player(state: &AuctionState) -> Option<&Player> {
    state
        .players
        .iter()
        .filter(|p| p.is_sold())
        .fold(None, |best: Option<&Player>, p| match best {
            Some(b) if b.sold_price() >= p.sold_price() => Some(b),
            _ => Some(p),
        })
}

pub fn dashboard(state: &AuctionState, order: &[String], low_purse_threshold: u32) -> DashboardView {
    let teams = team_summaries(state, low_purse_threshold);
    let top_spender = teams
        .iter()
        .filter(|t| t.spent > 0)
        .fold(None, |best: Option<&TeamSummary>, t| match best {
            Some(b) if b.spent >= t.spent => Some(b),
            _ => Some(t),
        })
        .cloned();

    DashboardView {
        current_category: state.meta.current_category.clone(),
        current_player: state.current_player().cloned(),
        last_sale: state.sold_history.first().cloned(),
        costliest: costliest_player(state).cloned(),
        top_spender,
        teams,
        categories: category_progress(state, order),
        complete: state.is_complete(),
    }
}
