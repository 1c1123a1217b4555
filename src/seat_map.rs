//! Seat grid for one event.
//!
//! A seat's state is never stored. It is derived from the theater's blocked
//! seats, the event's bookings and their check-in flags, in that order of
//! precedence: a blocked seat renders as blocked even when somebody holds a
//! booking for it.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::warn;
use uuid::Uuid;

use crate::models::{Booking, EventDetails, SeatCoord, TheaterSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatState {
    Blocked,
    CheckedIn,
    Booked,
    Available,
}

impl SeatState {
    /// Only available seats open the booking form.
    pub fn is_interactive(self) -> bool {
        self == SeatState::Available
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SeatMapError {
    #[error("seat {0} is outside the theater")]
    OutOfRange(SeatCoord),
    #[error("seat {0} is not available")]
    NotAvailable(SeatCoord),
}

/// Administratively blocked seats of a theater, with set semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnavailableSeats {
    seats: BTreeSet<SeatCoord>,
}

impl UnavailableSeats {
    /// Reads the stored `"r-s"` list. Entries that do not parse are skipped.
    pub fn from_stored(stored: &[String]) -> Self {
        let seats = stored
            .iter()
            .filter_map(|s| match s.parse::<SeatCoord>() {
                Ok(coord) => Some(coord),
                Err(e) => {
                    warn!("Skipping stored blocked seat: {}", e);
                    None
                }
            })
            .collect();
        Self { seats }
    }

    /// Strict parse of operator input against the theater geometry.
    pub fn parse_within(
        input: &[String],
        rows: i32,
        seats_per_row: i32,
    ) -> Result<Self, String> {
        let mut seats = BTreeSet::new();
        for raw in input {
            let coord = raw.parse::<SeatCoord>().map_err(|e| e.to_string())?;
            if !coord.is_within(rows, seats_per_row) {
                return Err(SeatMapError::OutOfRange(coord).to_string());
            }
            seats.insert(coord);
        }
        Ok(Self { seats })
    }

    pub fn contains(&self, coord: SeatCoord) -> bool {
        self.seats.contains(&coord)
    }

    pub fn block(&mut self, coord: SeatCoord) {
        self.seats.insert(coord);
    }

    pub fn unblock(&mut self, coord: SeatCoord) {
        self.seats.remove(&coord);
    }

    /// Flips one seat, as a click in the theater management dialog does.
    pub fn toggle(&mut self, coord: SeatCoord) {
        if !self.seats.remove(&coord) {
            self.seats.insert(coord);
        }
    }

    pub fn len(&self) -> usize {
        self.seats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    /// The list the backend stores, ordered by row then seat.
    pub fn to_stored(&self) -> Vec<String> {
        self.seats.iter().map(ToString::to_string).collect()
    }
}

pub fn seat_state(
    coord: SeatCoord,
    unavailable: &UnavailableSeats,
    bookings: &HashMap<SeatCoord, &Booking>,
) -> SeatState {
    if unavailable.contains(coord) {
        return SeatState::Blocked;
    }
    match bookings.get(&coord) {
        Some(b) if b.checked_in => SeatState::CheckedIn,
        Some(_) => SeatState::Booked,
        None => SeatState::Available,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatCell {
    pub row: i32,
    pub seat: i32,
    pub state: SeatState,
    pub interactive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeatSummary {
    pub capacity: i64,
    pub available: usize,
    pub booked: usize,
    pub checked_in: usize,
    pub blocked: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatGrid {
    pub rows: i32,
    pub seats_per_row: i32,
    /// Row-major, `cells[r - 1][s - 1]`.
    pub cells: Vec<Vec<SeatCell>>,
    pub summary: SeatSummary,
}

impl SeatGrid {
    pub fn derive(theater: &TheaterSummary, bookings: &[Booking]) -> Self {
        let unavailable = UnavailableSeats::from_stored(&theater.unavailable_seats);
        let by_seat: HashMap<SeatCoord, &Booking> = bookings
            .iter()
            .map(|b| (SeatCoord::new(b.row_number, b.seat_number), b))
            .collect();

        let mut summary = SeatSummary {
            capacity: i64::from(theater.rows.max(0)) * i64::from(theater.seats_per_row.max(0)),
            ..SeatSummary::default()
        };

        let cells = (1..=theater.rows)
            .map(|row| {
                (1..=theater.seats_per_row)
                    .map(|seat| {
                        let coord = SeatCoord::new(row, seat);
                        let state = seat_state(coord, &unavailable, &by_seat);
                        match state {
                            SeatState::Blocked => summary.blocked += 1,
                            SeatState::CheckedIn => summary.checked_in += 1,
                            SeatState::Booked => summary.booked += 1,
                            SeatState::Available => summary.available += 1,
                        }
                        let booking_id = match state {
                            SeatState::CheckedIn | SeatState::Booked => {
                                by_seat.get(&coord).map(|b| b.id)
                            }
                            _ => None,
                        };
                        SeatCell {
                            row,
                            seat,
                            state,
                            interactive: state.is_interactive(),
                            booking_id,
                        }
                    })
                    .collect()
            })
            .collect();

        SeatGrid {
            rows: theater.rows,
            seats_per_row: theater.seats_per_row,
            cells,
            summary,
        }
    }

    pub fn for_event(event: &EventDetails) -> Self {
        Self::derive(&event.theater, &event.bookings)
    }

    pub fn cell(&self, coord: SeatCoord) -> Option<&SeatCell> {
        let row = usize::try_from(coord.row).ok()?.checked_sub(1)?;
        let seat = usize::try_from(coord.seat).ok()?.checked_sub(1)?;
        self.cells.get(row)?.get(seat)
    }

    /// Picks a seat for the booking form. Only available seats can be picked.
    pub fn select(&self, coord: SeatCoord) -> Result<SeatCoord, SeatMapError> {
        let cell = self.cell(coord).ok_or(SeatMapError::OutOfRange(coord))?;
        if cell.interactive {
            Ok(coord)
        } else {
            Err(SeatMapError::NotAvailable(coord))
        }
    }
}
