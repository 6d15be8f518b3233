// Public dashboard observer: polls the state store and emits a summary
// whenever the published auction changes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use gavel_core::store::{StateStore, StoreError, Stored};
use gavel_core::summary::{self, DashboardView};

/// What the public dashboard should show.
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardUpdate {
    /// Nothing has been published yet.
    Waiting,
    Live(Box<DashboardView>),
}

pub struct DashboardObserver {
    store: Arc<dyn StateStore>,
    categories: Vec<String>,
    low_purse_threshold: u32,
    interval: Duration,
}

impl DashboardObserver {
    pub fn new(
        store: Arc<dyn StateStore>,
        categories: Vec<String>,
        low_purse_threshold: u32,
        interval: Duration,
    ) -> Self {
        DashboardObserver {
            store,
            categories,
            low_purse_threshold,
            interval,
        }
    }

    /// Read the store once.
    pub async fn poll_once(&self) -> Result<DashboardUpdate, StoreError> {
        Ok(match self.store.get().await? {
            Stored::Waiting => DashboardUpdate::Waiting,
            Stored::Snapshot(state) => DashboardUpdate::Live(Box::new(summary::dashboard(
                &state,
                &self.categories,
                self.low_purse_threshold,
            ))),
        })
    }

    /// Poll on a fixed interval until `tx` is closed. Only changes are sent;
    /// a failed read keeps the last view.
    pub async fn run(self, tx: mpsc::Sender<DashboardUpdate>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last: Option<DashboardUpdate> = None;

        loop {
            ticker.tick().await;

            let update = match self.poll_once().await {
                Ok(update) => update,
                Err(e) => {
                    warn!("Dashboard poll failed: {}", e);
                    continue;
                }
            };
            if last.as_ref() == Some(&update) {
                continue;
            }

            debug!("Dashboard changed");
            last = Some(update.clone());
            if tx.send(update).await.is_err() {
                info!("Dashboard channel closed, observer exiting");
                return;
            }
        }
    }
}

/// One-line summary of an update for the log.
pub fn headline(update: &DashboardUpdate) -> String {
    let view = match update {
        DashboardUpdate::Waiting => return "Waiting for the auction to start".to_string(),
        DashboardUpdate::Live(view) => view,
    };
    if view.complete {
        return match &view.top_spender {
            Some(top) => format!("Auction complete; top spender {} ({})", top.team_name, top.spent),
            None => "Auction complete".to_string(),
        };
    }

    let block = view
        .current_player
        .as_ref()
        .map(|p| format!("{} on the block", p.name))
        .unwrap_or_else(|| "nobody on the block".to_string());
    match &view.last_sale {
        Some(sale) if sale.is_skip() => {
            format!("{}: {}; last: {} skipped", view.current_category, block, sale.player_name)
        }
        Some(sale) => format!(
            "{}: {}; last: {} to {} for {}",
            view.current_category, block, sale.player_name, sale.team_name, sale.price
        ),
        None => format!("{}: {}", view.current_category, block),
    }
}
