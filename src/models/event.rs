use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{Booking, TheaterSummary};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub date: NaiveDate,
    pub theater_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// An event as the screens see it: its theater expanded and its bookings attached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventDetails {
    #[serde(flatten)]
    pub event: Event,
    pub theater: TheaterSummary,
    pub bookings: Vec<Booking>,
}

impl EventDetails {
    pub fn id(&self) -> Uuid {
        self.event.id
    }

    pub fn capacity(&self) -> i64 {
        i64::from(self.theater.rows) * i64::from(self.theater.seats_per_row)
    }

    pub fn booked_count(&self) -> usize {
        self.bookings.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub name: String,
    pub date: NaiveDate,
    pub theater_id: Uuid,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPatch {
    pub name: Option<String>,
    pub date: Option<NaiveDate>,
    pub theater_id: Option<Uuid>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.date.is_none() && self.theater_id.is_none()
    }

    pub fn apply(&self, event: &mut Event) {
        if let Some(name) = &self.name {
            event.name = name.clone();
        }
        if let Some(date) = self.date {
            event.date = date;
        }
        if let Some(theater_id) = self.theater_id {
            event.theater_id = theater_id;
        }
    }
}
