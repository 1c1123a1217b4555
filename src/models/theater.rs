use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Theater {
    pub id: Uuid,
    pub name: String,
    pub rows: i32,
    pub seats_per_row: i32,
    /// Blocked seats encoded as `"row-seat"`.
    pub unavailable_seats: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Theater {
    pub fn capacity(&self) -> i64 {
        i64::from(self.rows) * i64::from(self.seats_per_row)
    }

    pub fn summary(&self) -> TheaterSummary {
        TheaterSummary {
            name: self.name.clone(),
            rows: self.rows,
            seats_per_row: self.seats_per_row,
            unavailable_seats: self.unavailable_seats.clone(),
        }
    }
}

/// The slice of a theater embedded into every loaded event.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct TheaterSummary {
    pub name: String,
    pub rows: i32,
    pub seats_per_row: i32,
    pub unavailable_seats: Vec<String>,
}

/// Geometry limits, mirrored by the `theaters` CHECK constraints.
pub const MAX_ROWS: i32 = 200;
pub const MAX_SEATS_PER_ROW: i32 = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTheater {
    pub name: String,
    pub rows: i32,
    pub seats_per_row: i32,
}

/// A 1-based `(row, seat)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeatCoord {
    pub row: i32,
    pub seat: i32,
}

impl SeatCoord {
    pub fn new(row: i32, seat: i32) -> Self {
        Self { row, seat }
    }

    pub fn is_within(&self, rows: i32, seats_per_row: i32) -> bool {
        (1..=rows).contains(&self.row) && (1..=seats_per_row).contains(&self.seat)
    }
}

impl fmt::Display for SeatCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.row, self.seat)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("seat coordinate {0:?} is not of the form \"row-seat\"")]
pub struct SeatCoordParseError(pub String);

impl FromStr for SeatCoord {
    type Err = SeatCoordParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || SeatCoordParseError(s.to_string());
        let (row, seat) = s.trim().split_once('-').ok_or_else(err)?;
        let row = row.parse::<i32>().map_err(|_| err())?;
        let seat = seat.parse::<i32>().map_err(|_| err())?;
        Ok(SeatCoord { row, seat })
    }
}
