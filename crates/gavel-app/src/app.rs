// Application state and the admin event loop.
//
// The loop is the only writer of the auction snapshot. Admin requests arrive
// from the WebSocket one at a time; each accepted change is committed
// locally first and then handed to the replicator, whose outcome never
// reaches the admin.

use std::sync::Arc;

use anyhow::Context;
use rand::rngs::StdRng;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use gavel_core::config::Config;
use gavel_core::engine::{AuctionEngine, DrawOutcome, EngineError, SaleTarget, Undo};
use gavel_core::gate::{Access, AccessGate};
use gavel_core::model::AuctionState;
use gavel_core::store::{StateStore, Stored};

use crate::protocol::{parse_bid, AdminCommand, AdminReply, AdminRequest, ErrorKind};
use crate::replicator::Replicator;
use crate::ws_server::WsEvent;

/// Commands from the process itself (signal handling) to the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    Quit,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState {
    pub config: Config,
    pub engine: AuctionEngine,
    /// The canonical snapshot.
    pub auction: AuctionState,
    pub store: Arc<dyn StateStore>,
    pub gate: Arc<dyn AccessGate>,
    pub replicator: Replicator,
    pub rng: StdRng,
}

impl AppState {
    /// Create the state with a fresh auction. Call `recover_from_store` to
    /// pick up a previous session instead.
    pub fn new(
        config: Config,
        engine: AuctionEngine,
        store: Arc<dyn StateStore>,
        gate: Arc<dyn AccessGate>,
        replicator: Replicator,
        rng: StdRng,
    ) -> Self {
        let auction = engine.reset();
        AppState {
            config,
            engine,
            auction,
            store,
            gate,
            replicator,
            rng,
        }
    }

    /// Authorize and apply one admin request.
    pub async fn handle_request(&mut self, request: AdminRequest) -> AdminReply {
        let name = request.command.name();

        if request.command.requires_admission() {
            let credentials = match request.presented_credentials() {
                Ok(credentials) => credentials,
                Err(reason) => {
                    warn!("Rejected {} request: malformed authorization", name);
                    return AdminReply::Denied { reason };
                }
            };
            if let Access::Deny(reason) = self.gate.authorize(credentials.as_ref()) {
                warn!("Rejected {} request: {:?} credentials", name, reason);
                return AdminReply::Denied { reason };
            }
        }

        match request.command {
            AdminCommand::GetState => AdminReply::State {
                state: Box::new(self.auction.clone()),
            },
            AdminCommand::DrawNextPlayer => self.draw(),
            AdminCommand::FinalizeSale { team_id, bid } => self.finalize(&team_id, bid.as_ref()),
            AdminCommand::UndoLastSale => self.undo(),
            AdminCommand::ResetAuction => self.reset(),
            AdminCommand::AuditLog => match self.replicator.audit_entries().await {
                Ok(entries) => AdminReply::AuditLog { entries },
                Err(e) => {
                    warn!("Failed to read audit log: {}", e);
                    AdminReply::Error {
                        kind: ErrorKind::Storage,
                        message: e.to_string(),
                    }
                }
            },
        }
    }

    fn draw(&mut self) -> AdminReply {
        match self.engine.draw_next_player(&self.auction, &mut self.rng) {
            Ok(DrawOutcome::Drawn {
                state,
                player_id,
                second_pass,
            }) => {
                if let Some(player) = state.player(&player_id) {
                    info!(
                        "On the block: {} ({}){}",
                        player.name,
                        player.category,
                        if second_pass { " [second pass]" } else { "" }
                    );
                }
                self.commit(state);
                AdminReply::Drawn {
                    player_id,
                    second_pass,
                    state: Box::new(self.auction.clone()),
                }
            }
            Ok(DrawOutcome::Complete) => {
                info!("Auction complete: no players left to draw");
                AdminReply::AuctionComplete {
                    state: Box::new(self.auction.clone()),
                }
            }
            Err(e) => self.rejected("DRAW_NEXT_PLAYER", &e),
        }
    }

    fn finalize(&mut self, team_id: &str, bid: Option<&serde_json::Value>) -> AdminReply {
        let target = match SaleTarget::parse(team_id) {
            Ok(target) => target,
            Err(e) => return self.rejected("FINALIZE_SALE", &e.into()),
        };
        let bid = match &target {
            SaleTarget::Skip => 0,
            SaleTarget::Team(_) => match parse_bid(bid) {
                Ok(bid) => bid,
                Err(e) => return self.rejected("FINALIZE_SALE", &e.into()),
            },
        };

        match self.engine.finalize_sale(&self.auction, &target, bid) {
            Ok(next) => {
                let Some(record) = next.sold_history.first().cloned() else {
                    error!("FINALIZE_SALE produced no sale record; keeping previous state");
                    return AdminReply::Error {
                        kind: ErrorKind::Inconsistency,
                        message: "sale record missing after finalize".into(),
                    };
                };
                if record.is_skip() {
                    info!("Skipped {} ({})", record.player_name, record.category);
                } else {
                    info!(
                        "Sold {} to {} for {}",
                        record.player_name, record.team_name, record.price
                    );
                }
                self.commit(next);
                AdminReply::SaleFinalized {
                    record,
                    state: Box::new(self.auction.clone()),
                }
            }
            Err(e) => self.rejected("FINALIZE_SALE", &e),
        }
    }

    fn undo(&mut self) -> AdminReply {
        match self.engine.undo_last_sale(&self.auction) {
            Ok(Undo {
                state,
                record,
                audit,
            }) => {
                info!(
                    "Undid {} of {} ({} for {})",
                    if record.is_skip() { "skip" } else { "sale" },
                    record.player_name,
                    record.team_name,
                    record.price
                );
                self.replicator.audit(audit);
                self.commit(state);
                AdminReply::Undone {
                    record,
                    state: Box::new(self.auction.clone()),
                }
            }
            Err(e) => self.rejected("UNDO_LAST_SALE", &e),
        }
    }

    fn reset(&mut self) -> AdminReply {
        info!("Resetting auction '{}'", self.config.auction.name);
        self.replicator.clear_audit();
        self.replicator.clear_snapshot();
        let fresh = self.engine.reset();
        self.commit(fresh);
        AdminReply::Reset {
            state: Box::new(self.auction.clone()),
        }
    }

    /// Replace the canonical snapshot and queue it for replication.
    fn commit(&mut self, next: AuctionState) {
        for violation in next.check_invariants() {
            error!("Invariant violated after commit: {}", violation);
        }
        self.auction = next;
        self.replicator.publish(&self.auction);
    }

    fn rejected(&self, command: &str, err: &EngineError) -> AdminReply {
        match err {
            EngineError::Inconsistency(_) => error!("{} failed on inconsistent state: {}", command, err),
            _ => info!("{} rejected: {}", command, err),
        }
        AdminReply::engine_error(err)
    }
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

/// Run the admin event loop.
///
/// Listens on two channels using `tokio::select!`:
/// 1. WebSocket events from the admin console
/// 2. Process commands (shutdown)
///
/// Replies are serialized to JSON and pushed through `reply_tx`.
pub async fn run(
    mut ws_rx: mpsc::Receiver<WsEvent>,
    mut cmd_rx: mpsc::Receiver<AppCommand>,
    reply_tx: mpsc::Sender<String>,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!("Admin event loop started");

    loop {
        tokio::select! {
            ws_event = ws_rx.recv() => {
                match ws_event {
                    Some(WsEvent::Connected { addr }) => {
                        info!("Admin console connected from {}", addr);
                    }
                    Some(WsEvent::Disconnected) => {
                        info!("Admin console disconnected");
                    }
                    Some(WsEvent::Message(json_str)) => {
                        handle_ws_message(&mut state, &json_str, &reply_tx).await;
                    }
                    None => {
                        info!("WebSocket channel closed, shutting down");
                        break;
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(AppCommand::Quit) => {
                        info!("Quit command received, shutting down");
                        break;
                    }
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
            }
        }
    }

    state.replicator.flush().await;
    info!("Admin event loop exiting");
    Ok(())
}

/// Handle one raw message from the console and queue the reply.
async fn handle_ws_message(state: &mut AppState, json_str: &str, reply_tx: &mpsc::Sender<String>) {
    let reply = match serde_json::from_str::<AdminRequest>(json_str) {
        Ok(request) => state.handle_request(request).await,
        Err(e) => {
            warn!("Failed to parse admin message: {}", e);
            AdminReply::bad_request(format!("invalid request: {e}"))
        }
    };

    let text = match serde_json::to_string(&reply) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize reply: {}", e);
            return;
        }
    };
    if let Err(e) = reply_tx.try_send(text) {
        debug!("Reply dropped: {}", e);
    }
}

// ---------------------------------------------------------------------------
// Crash recovery
// ---------------------------------------------------------------------------

/// Restore the auction from the state store after a restart.
///
/// Returns `Ok(true)` when a stored snapshot was adopted. Otherwise the fresh
/// auction is published so dashboards stop waiting.
pub async fn recover_from_store(state: &mut AppState) -> anyhow::Result<bool> {
    let stored = state
        .store
        .get()
        .await
        .context("failed to read stored auction snapshot")?;

    match stored {
        Stored::Snapshot(snapshot) => {
            let violations = snapshot.check_invariants();
            if !violations.is_empty() {
                for violation in &violations {
                    warn!("Stored snapshot: {}", violation);
                }
                warn!("Stored snapshot is inconsistent, starting a fresh auction");
                state.replicator.publish(&state.auction);
                return Ok(false);
            }

            let decided = snapshot.players.iter().filter(|p| !p.is_unsold()).count();
            info!(
                "Crash recovery: restored auction with {}/{} players decided, {} in history",
                decided,
                snapshot.players.len(),
                snapshot.sold_history.len()
            );
            state.auction = *snapshot;
            Ok(true)
        }
        Stored::Waiting => {
            info!("No stored auction, starting fresh");
            state.replicator.publish(&state.auction);
            Ok(false)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
