//! Ticket check-in at the venue entrance.
//!
//! Each operator drives one [`CheckInFlow`]:
//!
//! ```text
//! Idle --start--> Scanning --code--> Found | NotFound | AlreadyCheckedIn
//! Found --confirm/reject--> Idle
//! NotFound | AlreadyCheckedIn --dismiss--> Scanning
//! ```
//!
//! Decoded codes come from a camera widget through a [`ScanSource`]. A miss
//! or an already used ticket keeps the scanner running; a hit freezes it
//! until the operator confirms or rejects.

use chrono::NaiveDate;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::RemoteOperationError;
use crate::models::TicketLookup;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    #[default]
    Environment,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{0}")]
pub struct ScanError(pub String);

/// One decode attempt from the camera.
pub type ScanAttempt = Result<String, ScanError>;

/// Camera collaborator: yields decode attempts until dropped.
pub trait ScanSource {
    fn open(self, facing_mode: FacingMode) -> BoxStream<'static, ScanAttempt>;
}

#[derive(Debug, Error)]
pub enum CheckInError {
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("ticket code {0:?} matches more than one booking")]
    AmbiguousTicket(String),

    #[error(transparent)]
    Remote(#[from] RemoteOperationError),
}

/// What the operator sees for a scanned ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketInfo {
    pub booking_id: Uuid,
    pub ticket_code: String,
    pub first_name: String,
    pub last_name: String,
    pub row_number: i32,
    pub seat_number: i32,
    pub event_id: Uuid,
    pub event_name: String,
    pub event_date: NaiveDate,
    pub theater_name: String,
}

impl From<TicketLookup> for TicketInfo {
    fn from(found: TicketLookup) -> Self {
        TicketInfo {
            booking_id: found.booking.id,
            ticket_code: found.booking.ticket_code,
            first_name: found.booking.first_name,
            last_name: found.booking.last_name,
            row_number: found.booking.row_number,
            seat_number: found.booking.seat_number,
            event_id: found.booking.event_id,
            event_name: found.event_name,
            event_date: found.event_date,
            theater_name: found.theater_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckInState {
    Idle,
    Scanning,
    #[serde(rename = "RESULT_FOUND")]
    Found { ticket: TicketInfo },
    #[serde(rename = "RESULT_NOT_FOUND")]
    NotFound { ticket_code: String },
    #[serde(rename = "RESULT_ALREADY_CHECKED_IN")]
    AlreadyCheckedIn { ticket: TicketInfo },
}

impl CheckInState {
    fn label(&self) -> &'static str {
        match self {
            CheckInState::Idle => "idle",
            CheckInState::Scanning => "scanning",
            CheckInState::Found { .. } => "a ticket is awaiting confirmation",
            CheckInState::NotFound { .. } => "showing a missing ticket",
            CheckInState::AlreadyCheckedIn { .. } => "showing a used ticket",
        }
    }

    /// The camera keeps decoding in these states.
    pub fn is_scanning(&self) -> bool {
        matches!(
            self,
            CheckInState::Scanning | CheckInState::NotFound { .. } | CheckInState::AlreadyCheckedIn { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckInAck {
    pub booking_id: Uuid,
    pub ticket_code: String,
    pub message: String,
}

/// State of one operator's check-in screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckInFlow {
    #[serde(flatten)]
    state: CheckInState,
    /// Inline, dismissible error from the last lookup or update.
    error: Option<String>,
}

impl Default for CheckInFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckInFlow {
    pub fn new() -> Self {
        Self {
            state: CheckInState::Idle,
            error: None,
        }
    }

    pub fn state(&self) -> &CheckInState {
        &self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn invalid(&self, action: &'static str) -> CheckInError {
        CheckInError::InvalidTransition {
            action,
            state: self.state.label(),
        }
    }

    pub fn start(&mut self) -> Result<(), CheckInError> {
        match self.state {
            CheckInState::Idle => {
                self.state = CheckInState::Scanning;
                self.error = None;
                Ok(())
            }
            CheckInState::Scanning => Ok(()),
            _ => Err(self.invalid("start scanning")),
        }
    }

    /// Looks up a decoded ticket code. Lookup never mutates the booking.
    pub async fn submit_code(
        &mut self,
        store: &Store,
        ticket_code: &str,
    ) -> Result<&CheckInState, CheckInError> {
        if !self.state.is_scanning() {
            return Err(self.invalid("scan a ticket"));
        }
        self.error = None;
        // Codes are stored trimmed at booking time.
        let ticket_code = ticket_code.trim();

        let mut found = match store.find_booking_by_ticket(ticket_code).await {
            Ok(found) => found,
            Err(e) => {
                self.error = Some(format!("Error while verifying the ticket: {e}"));
                return Err(e.into());
            }
        };

        if found.len() > 1 {
            let err = CheckInError::AmbiguousTicket(ticket_code.to_string());
            self.error = Some(err.to_string());
            return Err(err);
        }

        self.state = match found.pop() {
            None => {
                info!(ticket_code, "Ticket not found");
                CheckInState::NotFound {
                    ticket_code: ticket_code.to_string(),
                }
            }
            Some(hit) if hit.booking.checked_in => {
                warn!(ticket_code, "Ticket already used for entry");
                CheckInState::AlreadyCheckedIn { ticket: hit.into() }
            }
            Some(hit) => CheckInState::Found { ticket: hit.into() },
        };
        Ok(&self.state)
    }

    pub async fn confirm(&mut self, store: &Store) -> Result<CheckInAck, CheckInError> {
        let CheckInState::Found { ticket } = &self.state else {
            return Err(self.invalid("confirm"));
        };
        let booking_id = ticket.booking_id;

        let booking = match store.update_check_in(booking_id, true).await {
            Ok(booking) => booking,
            Err(e) => {
                self.error = Some(format!("Error during check-in: {e}"));
                return Err(e.into());
            }
        };

        info!(%booking_id, ticket_code = %booking.ticket_code, "Check-in completed");
        self.state = CheckInState::Idle;
        self.error = None;
        Ok(CheckInAck {
            booking_id,
            ticket_code: booking.ticket_code,
            message: "Check-in completed successfully".to_string(),
        })
    }

    /// Turns the attendee away. The reason is logged and nothing is stored.
    pub fn reject(&mut self, reason: Option<&str>) -> Result<(), CheckInError> {
        let CheckInState::Found { ticket } = &self.state else {
            return Err(self.invalid("reject"));
        };
        match reason.map(str::trim).filter(|r| !r.is_empty()) {
            Some(reason) => info!(
                ticket_code = %ticket.ticket_code,
                reason,
                "Check-in rejected"
            ),
            None => info!(ticket_code = %ticket.ticket_code, "Check-in rejected"),
        }
        self.state = CheckInState::Idle;
        self.error = None;
        Ok(())
    }

    /// Clears the inline error; a miss or a used ticket goes back to scanning.
    pub fn dismiss(&mut self) {
        self.error = None;
        if matches!(
            self.state,
            CheckInState::NotFound { .. } | CheckInState::AlreadyCheckedIn { .. }
        ) {
            self.state = CheckInState::Scanning;
        }
    }

    pub fn stop(&mut self) {
        self.state = CheckInState::Idle;
        self.error = None;
    }

    /// Feeds one camera decode attempt into the flow. Decode failures and
    /// attempts arriving while a ticket is on screen are ignored.
    pub async fn handle_attempt(
        &mut self,
        store: &Store,
        attempt: ScanAttempt,
    ) -> &CheckInState {
        match attempt {
            Err(e) => warn!("Camera decode failed: {}", e),
            Ok(code) if self.state.is_scanning() => {
                // Lookup errors are already recorded inline.
                let _ = self.submit_code(store, &code).await;
            }
            Ok(_) => {}
        }
        &self.state
    }

    /// Starts scanning and consumes attempts until a ticket is found or the
    /// source ends.
    pub async fn scan_with<S: ScanSource>(
        &mut self,
        store: &Store,
        source: S,
        facing_mode: FacingMode,
    ) -> Result<&CheckInState, CheckInError> {
        self.start()?;
        let mut attempts = source.open(facing_mode);
        while let Some(attempt) = attempts.next().await {
            if let CheckInState::Found { .. } = self.handle_attempt(store, attempt).await {
                break;
            }
        }
        Ok(&self.state)
    }
}

/// Check-in screens of every signed-in operator.
#[derive(Default)]
pub struct CheckInDesk {
    flows: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<CheckInFlow>>>>,
}

impl CheckInDesk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flow_for(&self, operator: Uuid) -> Arc<tokio::sync::Mutex<CheckInFlow>> {
        let mut flows = self.flows.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        flows.entry(operator).or_default().clone()
    }

    /// Drops the operator's screen, e.g. on sign-out.
    pub fn forget(&self, operator: Uuid) {
        let mut flows = self.flows.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        flows.remove(&operator);
    }
}
