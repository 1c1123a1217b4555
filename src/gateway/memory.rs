use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::{ChangeOp, Gateway, GatewayResult, Table, TableChange};
use crate::error::RemoteOperationError;
use crate::models::{
    AuthAccount, Booking, Event, EventDetails, EventPatch, NewBooking, NewEvent, NewTheater,
    Role, Theater, TicketLookup, UserProfile, MAX_ROWS, MAX_SEATS_PER_ROW,
};

#[derive(Default)]
struct Tables {
    // Insertion order doubles as creation order.
    theaters: Vec<Theater>,
    events: Vec<Event>,
    bookings: Vec<Booking>,
    accounts: Vec<AuthAccount>,
    profiles: Vec<(Uuid, Role)>,
    pending_failure: Option<RemoteOperationError>,
}

impl Tables {
    fn take_failure(&mut self) -> GatewayResult<()> {
        match self.pending_failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn theater(&self, id: Uuid) -> GatewayResult<&Theater> {
        self.theaters
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| fk_violation("events_theater_id_fkey"))
    }

    fn details(&self, event: &Event) -> GatewayResult<EventDetails> {
        let theater = self.theater(event.theater_id)?.summary();
        let bookings = self
            .bookings
            .iter()
            .filter(|b| b.event_id == event.id)
            .cloned()
            .collect();
        Ok(EventDetails {
            event: event.clone(),
            theater,
            bookings,
        })
    }

    fn profile(&self, user_id: Uuid, role: Role) -> UserProfile {
        let email = self
            .accounts
            .iter()
            .find(|a| a.id == user_id)
            .map(|a| a.email.clone())
            .unwrap_or_default();
        UserProfile {
            id: user_id,
            email,
            role,
        }
    }
}

fn unique_violation(constraint: &str) -> RemoteOperationError {
    RemoteOperationError::Constraint(format!(
        "duplicate key value violates unique constraint \"{constraint}\""
    ))
}

fn fk_violation(constraint: &str) -> RemoteOperationError {
    RemoteOperationError::Constraint(format!(
        "insert or update violates foreign key constraint \"{constraint}\""
    ))
}

fn no_rows(table: &str) -> RemoteOperationError {
    RemoteOperationError::NotFound(format!("no {table} row matched"))
}

/// Process-local gateway with the same uniqueness, cascade and notification
/// rules as the PostgreSQL schema.
pub struct MemoryGateway {
    tables: RwLock<Tables>,
    changes: broadcast::Sender<TableChange>,
    calls: AtomicUsize,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            tables: RwLock::new(Tables::default()),
            changes,
            calls: AtomicUsize::new(0),
        }
    }

    /// Registers an auth account with its profile and returns the user id.
    pub async fn add_account(&self, email: &str, password_hash: &str, role: Option<Role>) -> Uuid {
        let id = Uuid::new_v4();
        let mut tables = self.tables.write().await;
        tables.accounts.push(AuthAccount {
            id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
        });
        if let Some(role) = role {
            tables.profiles.push((id, role));
        }
        id
    }

    /// Makes the next gateway call fail with `err`.
    pub async fn fail_next(&self, err: RemoteOperationError) {
        self.tables.write().await.pending_failure = Some(err);
    }

    /// Number of gateway operations served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Simulates a write made by another client: the row changes and a
    /// notification is pushed, without going through any store.
    #[cfg(test)]
    pub async fn rename_theater_externally(&self, theater_id: Uuid, name: &str) -> bool {
        let mut tables = self.tables.write().await;
        let Some(theater) = tables.theaters.iter_mut().find(|t| t.id == theater_id) else {
            return false;
        };
        theater.name = name.to_string();
        theater.updated_at = Some(Utc::now());
        drop(tables);
        self.notify(Table::Theaters, ChangeOp::Update);
        true
    }

    async fn begin(&self) -> GatewayResult<tokio::sync::RwLockWriteGuard<'_, Tables>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.write().await;
        tables.take_failure()?;
        Ok(tables)
    }

    fn notify(&self, table: Table, op: ChangeOp) {
        // No subscribers is not an error.
        let _ = self.changes.send(TableChange { table, op });
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn select_theaters(&self) -> GatewayResult<Vec<Theater>> {
        let tables = self.begin().await?;
        Ok(tables.theaters.iter().rev().cloned().collect())
    }

    async fn insert_theater(&self, input: &NewTheater) -> GatewayResult<Theater> {
        let mut tables = self.begin().await?;
        if !(1..=MAX_ROWS).contains(&input.rows)
            || !(1..=MAX_SEATS_PER_ROW).contains(&input.seats_per_row)
        {
            return Err(RemoteOperationError::Constraint(
                "new row violates check constraint \"theaters_geometry_check\"".to_string(),
            ));
        }
        let theater = Theater {
            id: Uuid::new_v4(),
            name: input.name.clone(),
            rows: input.rows,
            seats_per_row: input.seats_per_row,
            unavailable_seats: Vec::new(),
            created_at: Utc::now(),
            updated_at: None,
        };
        tables.theaters.push(theater.clone());
        drop(tables);
        self.notify(Table::Theaters, ChangeOp::Insert);
        Ok(theater)
    }

    async fn update_theater_unavailable_seats(
        &self,
        theater_id: Uuid,
        seats: &[String],
    ) -> GatewayResult<Theater> {
        let mut tables = self.begin().await?;
        let theater = tables
            .theaters
            .iter_mut()
            .find(|t| t.id == theater_id)
            .ok_or_else(|| no_rows("theaters"))?;
        theater.unavailable_seats = seats.to_vec();
        theater.updated_at = Some(Utc::now());
        let updated = theater.clone();
        drop(tables);
        self.notify(Table::Theaters, ChangeOp::Update);
        Ok(updated)
    }

    async fn select_events(&self) -> GatewayResult<Vec<EventDetails>> {
        let tables = self.begin().await?;
        let mut events = tables
            .events
            .iter()
            .map(|e| tables.details(e))
            .collect::<GatewayResult<Vec<_>>>()?;
        events.sort_by_key(|e| e.event.date);
        Ok(events)
    }

    async fn insert_event(&self, input: &NewEvent) -> GatewayResult<EventDetails> {
        let mut tables = self.begin().await?;
        tables.theater(input.theater_id)?;
        let event = Event {
            id: Uuid::new_v4(),
            name: input.name.clone(),
            date: input.date,
            theater_id: input.theater_id,
            created_at: Utc::now(),
        };
        tables.events.push(event.clone());
        let details = tables.details(&event)?;
        drop(tables);
        self.notify(Table::Events, ChangeOp::Insert);
        Ok(details)
    }

    async fn update_event(&self, event_id: Uuid, patch: &EventPatch) -> GatewayResult<Event> {
        let mut tables = self.begin().await?;
        if let Some(theater_id) = patch.theater_id {
            tables.theater(theater_id)?;
        }
        let event = tables
            .events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| no_rows("events"))?;
        patch.apply(event);
        let updated = event.clone();
        drop(tables);
        self.notify(Table::Events, ChangeOp::Update);
        Ok(updated)
    }

    async fn delete_event(&self, event_id: Uuid) -> GatewayResult<()> {
        let mut tables = self.begin().await?;
        let before = tables.events.len();
        tables.events.retain(|e| e.id != event_id);
        if tables.events.len() != before {
            tables.bookings.retain(|b| b.event_id != event_id);
            drop(tables);
            self.notify(Table::Events, ChangeOp::Delete);
        }
        Ok(())
    }

    async fn insert_booking(&self, input: &NewBooking) -> GatewayResult<Booking> {
        let mut tables = self.begin().await?;
        if !tables.events.iter().any(|e| e.id == input.event_id) {
            return Err(fk_violation("bookings_event_id_fkey"));
        }
        let clash = tables
            .bookings
            .iter()
            .filter(|b| b.event_id == input.event_id)
            .find_map(|b| {
                if b.row_number == input.row_number && b.seat_number == input.seat_number {
                    Some("bookings_event_seat_key")
                } else if b.ticket_code == input.ticket_code {
                    Some("bookings_event_ticket_key")
                } else {
                    None
                }
            });
        if let Some(constraint) = clash {
            return Err(unique_violation(constraint));
        }
        let booking = Booking {
            id: Uuid::new_v4(),
            event_id: input.event_id,
            row_number: input.row_number,
            seat_number: input.seat_number,
            first_name: input.first_name.clone(),
            last_name: input.last_name.clone(),
            ticket_code: input.ticket_code.clone(),
            checked_in: false,
            created_at: Utc::now(),
        };
        tables.bookings.push(booking.clone());
        Ok(booking)
    }

    async fn update_check_in(&self, booking_id: Uuid, checked_in: bool) -> GatewayResult<Booking> {
        let mut tables = self.begin().await?;
        let booking = tables
            .bookings
            .iter_mut()
            .find(|b| b.id == booking_id)
            .ok_or_else(|| no_rows("bookings"))?;
        booking.checked_in = checked_in;
        Ok(booking.clone())
    }

    async fn select_bookings_by_ticket(
        &self,
        ticket_code: &str,
    ) -> GatewayResult<Vec<TicketLookup>> {
        let tables = self.begin().await?;
        let mut found = Vec::new();
        for booking in tables.bookings.iter().filter(|b| b.ticket_code == ticket_code) {
            let Some(event) = tables.events.iter().find(|e| e.id == booking.event_id) else {
                continue;
            };
            let theater = tables.theater(event.theater_id)?;
            found.push(TicketLookup {
                booking: booking.clone(),
                event_name: event.name.clone(),
                event_date: event.date,
                theater_name: theater.name.clone(),
            });
        }
        Ok(found)
    }

    async fn find_account_by_email(&self, email: &str) -> GatewayResult<Option<AuthAccount>> {
        let tables = self.begin().await?;
        Ok(tables.accounts.iter().find(|a| a.email == email).cloned())
    }

    async fn select_profile(&self, user_id: Uuid) -> GatewayResult<Option<UserProfile>> {
        let tables = self.begin().await?;
        Ok(tables
            .profiles
            .iter()
            .find(|(id, _)| *id == user_id)
            .map(|(id, role)| tables.profile(*id, *role)))
    }

    async fn select_profiles(&self) -> GatewayResult<Vec<UserProfile>> {
        let tables = self.begin().await?;
        Ok(tables
            .profiles
            .iter()
            .map(|(id, role)| tables.profile(*id, *role))
            .collect())
    }

    async fn update_profile_role(&self, user_id: Uuid, role: Role) -> GatewayResult<UserProfile> {
        let mut tables = self.begin().await?;
        let entry = tables
            .profiles
            .iter_mut()
            .find(|(id, _)| *id == user_id)
            .ok_or_else(|| no_rows("user_profiles"))?;
        entry.1 = role;
        Ok(tables.profile(user_id, role))
    }

    fn subscribe(&self) -> broadcast::Receiver<TableChange> {
        self.changes.subscribe()
    }
}
