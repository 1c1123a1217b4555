use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub event_id: Uuid,
    pub row_number: i32,
    pub seat_number: i32,
    pub first_name: String,
    pub last_name: String,
    pub ticket_code: String,
    pub checked_in: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub event_id: Uuid,
    pub row_number: i32,
    pub seat_number: i32,
    pub first_name: String,
    pub last_name: String,
    pub ticket_code: String,
}

/// A booking joined with the event and theater it belongs to, as shown at the door.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct TicketLookup {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub booking: Booking,
    pub event_name: String,
    pub event_date: NaiveDate,
    pub theater_name: String,
}
