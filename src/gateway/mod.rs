//! Backend gateway contract.
//!
//! The gateway owns all durable state: table-level CRUD, foreign-key
//! expansion for events, and a change feed for the `theaters` and `events`
//! tables. `PgGateway` talks to PostgreSQL; `MemoryGateway` keeps the same
//! rules in process and backs the tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::RemoteOperationError;
use crate::models::{
    AuthAccount, Booking, Event, EventDetails, EventPatch, NewBooking, NewEvent, NewTheater,
    Role, Theater, TicketLookup, UserProfile,
};

pub use memory::MemoryGateway;
pub use postgres::PgGateway;

pub type GatewayResult<T> = Result<T, RemoteOperationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Theaters,
    Events,
    Bookings,
    UserProfiles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// One row-change notification pushed by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableChange {
    pub table: Table,
    pub op: ChangeOp,
}

#[async_trait]
pub trait Gateway: Send + Sync {
    /// All theaters, newest first.
    async fn select_theaters(&self) -> GatewayResult<Vec<Theater>>;

    async fn insert_theater(&self, input: &NewTheater) -> GatewayResult<Theater>;

    /// Replaces the whole blocked-seat list and stamps `updated_at`.
    async fn update_theater_unavailable_seats(
        &self,
        theater_id: Uuid,
        seats: &[String],
    ) -> GatewayResult<Theater>;

    /// All events with theater and bookings expanded, by date ascending.
    async fn select_events(&self) -> GatewayResult<Vec<EventDetails>>;

    async fn insert_event(&self, input: &NewEvent) -> GatewayResult<EventDetails>;

    async fn update_event(&self, event_id: Uuid, patch: &EventPatch) -> GatewayResult<Event>;

    /// Hard delete; bookings of the event go with it.
    async fn delete_event(&self, event_id: Uuid) -> GatewayResult<()>;

    async fn insert_booking(&self, input: &NewBooking) -> GatewayResult<Booking>;

    async fn update_check_in(&self, booking_id: Uuid, checked_in: bool) -> GatewayResult<Booking>;

    /// Exact, case-sensitive match on the ticket code.
    async fn select_bookings_by_ticket(&self, ticket_code: &str)
        -> GatewayResult<Vec<TicketLookup>>;

    async fn find_account_by_email(&self, email: &str) -> GatewayResult<Option<AuthAccount>>;

    async fn select_profile(&self, user_id: Uuid) -> GatewayResult<Option<UserProfile>>;

    async fn select_profiles(&self) -> GatewayResult<Vec<UserProfile>>;

    async fn update_profile_role(&self, user_id: Uuid, role: Role) -> GatewayResult<UserProfile>;

    /// Change feed for the `theaters` and `events` tables.
    fn subscribe(&self) -> broadcast::Receiver<TableChange>;
}
