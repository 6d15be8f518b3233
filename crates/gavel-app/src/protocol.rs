// JSON messages exchanged with the admin console over the WebSocket.

use serde::{Deserialize, Serialize};

use gavel_core::audit::AuditEntry;
use gavel_core::engine::{EngineError, ValidationError};
use gavel_core::gate::{Credentials, DenyReason};
use gavel_core::model::{AuctionState, SaleRecord};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// One admin message: an optional identity plus the command itself.
///
/// ```json
/// {"type": "FINALIZE_SALE", "teamId": "RED_HAWKS", "bid": 12,
///  "credentials": {"username": "admin", "password": "..."}}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AdminRequest {
    #[serde(default)]
    pub credentials: Option<Credentials>,
    /// HTTP Basic `Authorization` value, accepted in place of `credentials`.
    #[serde(default)]
    pub authorization: Option<String>,
    #[serde(flatten)]
    pub command: AdminCommand,
}

impl AdminRequest {
    /// The identity presented with the request. A malformed Basic value
    /// counts as wrong credentials rather than missing ones.
    pub fn presented_credentials(&self) -> Result<Option<Credentials>, DenyReason> {
        match (&self.credentials, &self.authorization) {
            (Some(creds), _) => Ok(Some(creds.clone())),
            (None, Some(header)) => Credentials::from_basic_header(header)
                .map(Some)
                .ok_or(DenyReason::Invalid),
            (None, None) => Ok(None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdminCommand {
    /// Read the admin's current snapshot. Needs no credentials.
    GetState,
    DrawNextPlayer,
    FinalizeSale {
        /// Team id, or `SKIP`.
        #[serde(rename = "teamId", default)]
        team_id: String,
        /// Whole amount as a JSON number or a numeric string.
        #[serde(default)]
        bid: Option<serde_json::Value>,
    },
    UndoLastSale,
    ResetAuction,
    AuditLog,
}

impl AdminCommand {
    /// Whether the command must pass the access gate.
    pub fn requires_admission(&self) -> bool {
        !matches!(self, AdminCommand::GetState)
    }

    pub fn name(&self) -> &'static str {
        match self {
            AdminCommand::GetState => "GET_STATE",
            AdminCommand::DrawNextPlayer => "DRAW_NEXT_PLAYER",
            AdminCommand::FinalizeSale { .. } => "FINALIZE_SALE",
            AdminCommand::UndoLastSale => "UNDO_LAST_SALE",
            AdminCommand::ResetAuction => "RESET_AUCTION",
            AdminCommand::AuditLog => "AUDIT_LOG",
        }
    }
}

/// Read a bid from the console. Accepts positive whole numbers, either as a
/// JSON number (`12`, `12.0`) or a string (`"12"`).
pub fn parse_bid(value: Option<&serde_json::Value>) -> Result<u32, ValidationError> {
    let amount = match value {
        Some(serde_json::Value::Number(n)) => match n.as_u64() {
            Some(whole) => Some(whole),
            None => n
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f > 0.0 && *f <= f64::from(u32::MAX))
                .map(|f| f as u64),
        },
        Some(serde_json::Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };

    amount
        .filter(|a| *a > 0)
        .and_then(|a| u32::try_from(a).ok())
        .ok_or(ValidationError::NonPositiveBid)
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The message could not be parsed.
    BadRequest,
    Validation,
    Precondition,
    Inconsistency,
    /// The audit log could not be read.
    Storage,
}

impl ErrorKind {
    pub fn of(err: &EngineError) -> Self {
        match err {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::Precondition(_) => ErrorKind::Precondition,
            EngineError::Inconsistency(_) => ErrorKind::Inconsistency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdminReply {
    State {
        state: Box<AuctionState>,
    },
    #[serde(rename_all = "camelCase")]
    Drawn {
        player_id: String,
        second_pass: bool,
        state: Box<AuctionState>,
    },
    AuctionComplete {
        state: Box<AuctionState>,
    },
    SaleFinalized {
        record: SaleRecord,
        state: Box<AuctionState>,
    },
    Undone {
        record: SaleRecord,
        state: Box<AuctionState>,
    },
    Reset {
        state: Box<AuctionState>,
    },
    AuditLog {
        entries: Vec<AuditEntry>,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
    Denied {
        reason: DenyReason,
    },
}

impl AdminReply {
    pub fn engine_error(err: &EngineError) -> Self {
        AdminReply::Error {
            kind: ErrorKind::of(err),
            message: err.to_string(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        AdminReply::Error {
            kind: ErrorKind::BadRequest,
            message: message.into(),
        }
    }
}
