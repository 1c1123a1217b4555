//! Data-access layer.
//!
//! Wraps a [`Gateway`] with typed operations and keeps the theater and event
//! lists cached in memory. Every mutation reloads the collections it affects;
//! change notifications pushed by the backend reload the same lists. Lists are
//! always replaced wholesale, except for the create-append and the blocked-seat
//! merge which patch the cache before the reload lands.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::RemoteOperationError;
use crate::gateway::{Gateway, Table, TableChange};
use crate::models::{
    AuthAccount, Booking, Event, EventDetails, EventPatch, NewBooking, NewEvent, NewTheater,
    Role, Theater, TicketLookup, UserProfile,
};

pub type StoreResult<T> = Result<T, RemoteOperationError>;

/// Sent to observers whenever a cached list has been replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreUpdate {
    Theaters,
    Events,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collection {
    Theaters,
    Events,
}

// Theaters are embedded into events, so theater writes refresh both.
const AFTER_THEATER_WRITE: &[Collection] = &[Collection::Theaters, Collection::Events];
const AFTER_EVENT_WRITE: &[Collection] = &[Collection::Events];

pub struct Store {
    gateway: Arc<dyn Gateway>,
    theaters: RwLock<Vec<Theater>>,
    events: RwLock<Vec<EventDetails>>,
    updates: broadcast::Sender<StoreUpdate>,
}

impl Store {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        let (updates, _) = broadcast::channel(64);
        Self {
            gateway,
            theaters: RwLock::new(Vec::new()),
            events: RwLock::new(Vec::new()),
            updates,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreUpdate> {
        self.updates.subscribe()
    }

    fn notify(&self, update: StoreUpdate) {
        let _ = self.updates.send(update);
    }

    /// Loads both lists concurrently.
    pub async fn load_all(&self) -> StoreResult<()> {
        let (theaters, events) = tokio::join!(self.load_theaters(), self.load_events());
        theaters?;
        events?;
        Ok(())
    }

    pub async fn load_theaters(&self) -> StoreResult<Vec<Theater>> {
        let theaters = self.gateway.select_theaters().await.map_err(|e| {
            error!("Error loading theaters: {}", e);
            e
        })?;
        *self.theaters.write().await = theaters.clone();
        debug!(count = theaters.len(), "Theaters reloaded");
        self.notify(StoreUpdate::Theaters);
        Ok(theaters)
    }

    pub async fn load_events(&self) -> StoreResult<Vec<EventDetails>> {
        let events = self.gateway.select_events().await.map_err(|e| {
            error!("Error loading events: {}", e);
            e
        })?;
        *self.events.write().await = events.clone();
        debug!(count = events.len(), "Events reloaded");
        self.notify(StoreUpdate::Events);
        Ok(events)
    }

    pub async fn theaters(&self) -> Vec<Theater> {
        self.theaters.read().await.clone()
    }

    pub async fn theater(&self, theater_id: Uuid) -> Option<Theater> {
        self.theaters
            .read()
            .await
            .iter()
            .find(|t| t.id == theater_id)
            .cloned()
    }

    pub async fn events(&self) -> Vec<EventDetails> {
        self.events.read().await.clone()
    }

    /// The loaded event with its theater and bookings, if it is in the cache.
    pub async fn event(&self, event_id: Uuid) -> Option<EventDetails> {
        self.events
            .read()
            .await
            .iter()
            .find(|e| e.id() == event_id)
            .cloned()
    }

    /// Reload failures after a successful write are logged, not returned:
    /// the write happened and the next notification corrects the cache.
    async fn reload(&self, affected: &[Collection]) {
        for collection in affected {
            let result = match collection {
                Collection::Theaters => self.load_theaters().await.map(|_| ()),
                Collection::Events => self.load_events().await.map(|_| ()),
            };
            if let Err(e) = result {
                warn!(?collection, "Reload after write failed: {}", e);
            }
        }
    }

    pub async fn create_theater(&self, input: NewTheater) -> StoreResult<Theater> {
        let theater = self.gateway.insert_theater(&input).await.map_err(|e| {
            error!("Error creating theater: {}", e);
            e
        })?;
        info!(theater_id = %theater.id, name = %theater.name, "Theater created");

        self.theaters.write().await.push(theater.clone());
        self.reload(AFTER_THEATER_WRITE).await;
        Ok(theater)
    }

    pub async fn update_theater_unavailable_seats(
        &self,
        theater_id: Uuid,
        seats: Vec<String>,
    ) -> StoreResult<Theater> {
        let theater = self
            .gateway
            .update_theater_unavailable_seats(theater_id, &seats)
            .await
            .map_err(|e| {
                error!("Error updating theater unavailable seats: {}", e);
                e
            })?;
        info!(%theater_id, blocked = seats.len(), "Blocked seats saved");

        {
            let mut cached = self.theaters.write().await;
            for slot in cached.iter_mut().filter(|t| t.id == theater_id) {
                *slot = theater.clone();
            }
        }
        self.reload(AFTER_THEATER_WRITE).await;
        Ok(theater)
    }

    pub async fn create_event(&self, input: NewEvent) -> StoreResult<EventDetails> {
        let event = self.gateway.insert_event(&input).await.map_err(|e| {
            error!("Error creating event: {}", e);
            e
        })?;
        info!(event_id = %event.id(), name = %event.event.name, "Event created");

        self.events.write().await.push(event.clone());
        self.reload(AFTER_EVENT_WRITE).await;
        Ok(event)
    }

    pub async fn update_event(&self, event_id: Uuid, patch: EventPatch) -> StoreResult<Event> {
        let event = self.gateway.update_event(event_id, &patch).await.map_err(|e| {
            error!("Error updating event: {}", e);
            e
        })?;
        info!(%event_id, "Event updated");
        self.reload(AFTER_EVENT_WRITE).await;
        Ok(event)
    }

    pub async fn delete_event(&self, event_id: Uuid) -> StoreResult<()> {
        self.gateway.delete_event(event_id).await.map_err(|e| {
            error!("Error deleting event: {}", e);
            e
        })?;
        info!(%event_id, "Event deleted");
        self.reload(AFTER_EVENT_WRITE).await;
        Ok(())
    }

    pub async fn create_booking(&self, input: NewBooking) -> StoreResult<Booking> {
        let booking = self.gateway.insert_booking(&input).await.map_err(|e| {
            error!("Error creating booking: {}", e);
            e
        })?;
        info!(
            booking_id = %booking.id,
            event_id = %booking.event_id,
            row = booking.row_number,
            seat = booking.seat_number,
            "Seat booked"
        );
        self.reload(AFTER_EVENT_WRITE).await;
        Ok(booking)
    }

    pub async fn update_check_in(&self, booking_id: Uuid, checked_in: bool) -> StoreResult<Booking> {
        let booking = self
            .gateway
            .update_check_in(booking_id, checked_in)
            .await
            .map_err(|e| {
                error!("Error updating check-in: {}", e);
                e
            })?;
        info!(%booking_id, checked_in, "Check-in flag updated");
        self.reload(AFTER_EVENT_WRITE).await;
        Ok(booking)
    }

    /// Read-only; never touches the cache.
    pub async fn find_booking_by_ticket(&self, ticket_code: &str) -> StoreResult<Vec<TicketLookup>> {
        self.gateway.select_bookings_by_ticket(ticket_code).await
    }

    pub async fn find_account(&self, email: &str) -> StoreResult<Option<AuthAccount>> {
        self.gateway.find_account_by_email(email).await
    }

    pub async fn role_of(&self, user_id: Uuid) -> StoreResult<Option<Role>> {
        Ok(self.gateway.select_profile(user_id).await?.map(|p| p.role))
    }

    pub async fn list_profiles(&self) -> StoreResult<Vec<UserProfile>> {
        self.gateway.select_profiles().await
    }

    pub async fn update_role(&self, user_id: Uuid, role: Role) -> StoreResult<UserProfile> {
        let profile = self.gateway.update_profile_role(user_id, role).await?;
        info!(%user_id, %role, "Role updated");
        Ok(profile)
    }

    async fn apply_change(&self, change: TableChange) {
        let result = match change.table {
            Table::Theaters => self.load_theaters().await.map(|_| ()),
            Table::Events => self.load_events().await.map(|_| ()),
            // Not subscribed; seen on the next reload.
            Table::Bookings | Table::UserProfiles => Ok(()),
        };
        if let Err(e) = result {
            warn!(?change, "Reload after change notification failed: {}", e);
        }
    }

    /// Reloads the matching list on every pushed change until the feed closes.
    pub fn spawn_change_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let mut changes = store.gateway.subscribe();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => store.apply_change(change).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Change feed lagged, reloading everything");
                        if let Err(e) = store.load_all().await {
                            warn!("Full reload failed: {}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Change feed closed");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn store() -> (Arc<MemoryGateway>, Arc<Store>) {
        let gw = Arc::new(MemoryGateway::new());
        let store = Arc::new(Store::new(gw.clone()));
        (gw, store)
    }

    fn new_theater(name: &str, rows: i32, seats_per_row: i32) -> NewTheater {
        NewTheater {
            name: name.into(),
            rows,
            seats_per_row,
        }
    }

    async fn with_event(store: &Store) -> (Theater, EventDetails) {
        let theater = store.create_theater(new_theater("Odeon", 4, 6)).await.unwrap();
        let event = store
            .create_event(NewEvent {
                name: "Tosca".into(),
                date: NaiveDate::from_ymd_opt(2026, 12, 1).unwrap(),
                theater_id: theater.id,
            })
            .await
            .unwrap();
        (theater, event)
    }

    fn seat(event_id: Uuid, row: i32, seat: i32, code: &str) -> NewBooking {
        NewBooking {
            event_id,
            row_number: row,
            seat_number: seat,
            first_name: "Giulia".into(),
            last_name: "Bianchi".into(),
            ticket_code: code.into(),
        }
    }

    #[tokio::test]
    async fn created_theater_round_trips_through_load() {
        let (_, store) = store();
        store.create_theater(new_theater("Verdi", 5, 8)).await.unwrap();

        let loaded = store.load_theaters().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].rows, 5);
        assert_eq!(loaded[0].seats_per_row, 8);
        assert!(loaded[0].unavailable_seats.is_empty());
        assert_eq!(store.theaters().await, loaded);
    }

    #[tokio::test]
    async fn booking_refreshes_the_cached_event() {
        let (_, store) = store();
        let (_, event) = with_event(&store).await;

        store.create_booking(seat(event.id(), 2, 3, "ABC123")).await.unwrap();

        let cached = store.event(event.id()).await.unwrap();
        assert_eq!(cached.bookings.len(), 1);
        assert_eq!(cached.bookings[0].ticket_code, "ABC123");
    }

    #[tokio::test]
    async fn blocked_seats_are_merged_and_reach_the_events() {
        let (_, store) = store();
        let (theater, event) = with_event(&store).await;

        let saved = store
            .update_theater_unavailable_seats(theater.id, vec!["1-1".into(), "4-6".into()])
            .await
            .unwrap();
        assert!(saved.updated_at.is_some());

        let cached = store.theater(theater.id).await.unwrap();
        assert_eq!(cached.unavailable_seats, vec!["1-1", "4-6"]);
        let cached_event = store.event(event.id()).await.unwrap();
        assert_eq!(cached_event.theater.unavailable_seats, vec!["1-1", "4-6"]);
    }

    #[tokio::test]
    async fn deleting_an_event_drops_it_and_its_bookings() {
        let (_, store) = store();
        let (_, event) = with_event(&store).await;
        store.create_booking(seat(event.id(), 1, 1, "DEL-1")).await.unwrap();

        store.delete_event(event.id()).await.unwrap();

        assert!(store.event(event.id()).await.is_none());
        assert!(store.load_events().await.unwrap().is_empty());
        assert!(store.find_booking_by_ticket("DEL-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn event_edit_is_visible_after_the_call() {
        let (_, store) = store();
        let (_, event) = with_event(&store).await;

        store
            .update_event(
                event.id(),
                EventPatch {
                    name: Some("Tosca (matinee)".into()),
                    ..EventPatch::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(store.event(event.id()).await.unwrap().event.name, "Tosca (matinee)");
    }

    #[tokio::test]
    async fn gateway_errors_surface_and_leave_the_cache_alone() {
        let (gw, store) = store();
        store.create_theater(new_theater("Verdi", 2, 2)).await.unwrap();
        gw.fail_next(RemoteOperationError::Backend("timeout".into())).await;

        let err = store.load_theaters().await.unwrap_err();
        assert_eq!(err.to_string(), "timeout");
        assert_eq!(store.theaters().await.len(), 1);
    }

    #[tokio::test]
    async fn pushed_changes_reload_the_list() {
        let (gw, store) = store();
        let theater = store.create_theater(new_theater("Verdi", 2, 2)).await.unwrap();
        let mut updates = store.subscribe();
        let _listener = store.spawn_change_listener();

        assert!(gw.rename_theater_externally(theater.id, "Teatro Nuovo").await);

        let update = tokio::time::timeout(Duration::from_secs(2), updates.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update, StoreUpdate::Theaters);
        assert_eq!(store.theater(theater.id).await.unwrap().name, "Teatro Nuovo");
    }
}
