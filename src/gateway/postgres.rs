use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgListener;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Gateway, GatewayResult, TableChange};
use crate::database::Database;
use crate::error::RemoteOperationError;
use crate::models::{
    AuthAccount, Booking, Event, EventDetails, EventPatch, NewBooking, NewEvent, NewTheater,
    Role, Theater, TheaterSummary, TicketLookup, UserProfile,
};

const THEATER_COLUMNS: &str =
    "id, name, rows, seats_per_row, unavailable_seats, created_at, updated_at";
const EVENT_COLUMNS: &str = "id, name, date, theater_id, created_at";
const BOOKING_COLUMNS: &str = "id, event_id, row_number, seat_number, first_name, last_name, \
     ticket_code, checked_in, created_at";

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    name: String,
    date: NaiveDate,
    theater_id: Uuid,
    created_at: DateTime<Utc>,
    theater_name: String,
    rows: i32,
    seats_per_row: i32,
    unavailable_seats: Vec<String>,
}

impl EventRow {
    fn into_details(self, bookings: Vec<Booking>) -> EventDetails {
        EventDetails {
            event: Event {
                id: self.id,
                name: self.name,
                date: self.date,
                theater_id: self.theater_id,
                created_at: self.created_at,
            },
            theater: TheaterSummary {
                name: self.theater_name,
                rows: self.rows,
                seats_per_row: self.seats_per_row,
                unavailable_seats: self.unavailable_seats,
            },
            bookings,
        }
    }
}

fn profile_from_row((id, email, role): (Uuid, String, String)) -> GatewayResult<UserProfile> {
    let role = role
        .parse::<Role>()
        .map_err(|e| RemoteOperationError::Backend(e.to_string()))?;
    Ok(UserProfile { id, email, role })
}

/// Gateway over the PostgreSQL schema in `src/migrations`.
#[derive(Clone)]
pub struct PgGateway {
    db: Database,
    changes: broadcast::Sender<TableChange>,
}

impl PgGateway {
    /// Wraps the pool and starts forwarding `table_changes` notifications.
    pub async fn connect(db: Database) -> Result<Self, sqlx::Error> {
        let listener = db.change_listener().await?;
        let (changes, _) = broadcast::channel(64);
        tokio::spawn(forward_notifications(listener, changes.clone()));
        Ok(Self { db, changes })
    }

    async fn theater_summary(&self, theater_id: Uuid) -> GatewayResult<TheaterSummary> {
        let summary = sqlx::query_as::<_, TheaterSummary>(
            "SELECT name, rows, seats_per_row, unavailable_seats FROM theaters WHERE id = $1",
        )
        .bind(theater_id)
        .fetch_one(&self.db.pool)
        .await?;
        Ok(summary)
    }
}

async fn forward_notifications(mut listener: PgListener, changes: broadcast::Sender<TableChange>) {
    loop {
        match listener.recv().await {
            Ok(notification) => {
                match serde_json::from_str::<TableChange>(notification.payload()) {
                    Ok(change) => {
                        debug!(?change, "Row change notification");
                        let _ = changes.send(change);
                    }
                    Err(e) => warn!(
                        payload = notification.payload(),
                        "Ignoring malformed change notification: {}", e
                    ),
                }
            }
            Err(e) => {
                // PgListener reconnects on the next recv.
                warn!("Change listener connection lost: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

#[async_trait]
impl Gateway for PgGateway {
    async fn select_theaters(&self) -> GatewayResult<Vec<Theater>> {
        let theaters = sqlx::query_as::<_, Theater>(&format!(
            "SELECT {THEATER_COLUMNS} FROM theaters ORDER BY created_at DESC"
        ))
        .fetch_all(&self.db.pool)
        .await?;
        Ok(theaters)
    }

    async fn insert_theater(&self, input: &NewTheater) -> GatewayResult<Theater> {
        let theater = sqlx::query_as::<_, Theater>(&format!(
            "INSERT INTO theaters (name, rows, seats_per_row)
             VALUES ($1, $2, $3)
             RETURNING {THEATER_COLUMNS}"
        ))
        .bind(&input.name)
        .bind(input.rows)
        .bind(input.seats_per_row)
        .fetch_one(&self.db.pool)
        .await?;
        Ok(theater)
    }

    async fn update_theater_unavailable_seats(
        &self,
        theater_id: Uuid,
        seats: &[String],
    ) -> GatewayResult<Theater> {
        let theater = sqlx::query_as::<_, Theater>(&format!(
            "UPDATE theaters
             SET unavailable_seats = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING {THEATER_COLUMNS}"
        ))
        .bind(theater_id)
        .bind(seats)
        .fetch_one(&self.db.pool)
        .await?;
        Ok(theater)
    }

    async fn select_events(&self) -> GatewayResult<Vec<EventDetails>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT e.id, e.name, e.date, e.theater_id, e.created_at,
                   t.name AS theater_name, t.rows, t.seats_per_row, t.unavailable_seats
            FROM events e
            JOIN theaters t ON t.id = e.theater_id
            ORDER BY e.date ASC, e.created_at ASC
            "#,
        )
        .fetch_all(&self.db.pool)
        .await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let bookings = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE event_id = ANY($1)
             ORDER BY row_number, seat_number"
        ))
        .bind(&ids)
        .fetch_all(&self.db.pool)
        .await?;

        let mut by_event: HashMap<Uuid, Vec<Booking>> = HashMap::new();
        for booking in bookings {
            by_event.entry(booking.event_id).or_default().push(booking);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let bookings = by_event.remove(&row.id).unwrap_or_default();
                row.into_details(bookings)
            })
            .collect())
    }

    async fn insert_event(&self, input: &NewEvent) -> GatewayResult<EventDetails> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "INSERT INTO events (name, date, theater_id)
             VALUES ($1, $2, $3)
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(&input.name)
        .bind(input.date)
        .bind(input.theater_id)
        .fetch_one(&self.db.pool)
        .await?;

        let theater = self.theater_summary(event.theater_id).await?;
        Ok(EventDetails {
            event,
            theater,
            bookings: Vec::new(),
        })
    }

    async fn update_event(&self, event_id: Uuid, patch: &EventPatch) -> GatewayResult<Event> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "UPDATE events
             SET name = COALESCE($2, name),
                 date = COALESCE($3, date),
                 theater_id = COALESCE($4, theater_id)
             WHERE id = $1
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(event_id)
        .bind(patch.name.as_deref())
        .bind(patch.date)
        .bind(patch.theater_id)
        .fetch_one(&self.db.pool)
        .await?;
        Ok(event)
    }

    async fn delete_event(&self, event_id: Uuid) -> GatewayResult<()> {
        sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(event_id)
            .execute(&self.db.pool)
            .await?;
        Ok(())
    }

    async fn insert_booking(&self, input: &NewBooking) -> GatewayResult<Booking> {
        let booking = sqlx::query_as::<_, Booking>(&format!(
            "INSERT INTO bookings
                (event_id, row_number, seat_number, first_name, last_name, ticket_code, checked_in)
             VALUES ($1, $2, $3, $4, $5, $6, FALSE)
             RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(input.event_id)
        .bind(input.row_number)
        .bind(input.seat_number)
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&input.ticket_code)
        .fetch_one(&self.db.pool)
        .await?;
        Ok(booking)
    }

    async fn update_check_in(&self, booking_id: Uuid, checked_in: bool) -> GatewayResult<Booking> {
        let booking = sqlx::query_as::<_, Booking>(&format!(
            "UPDATE bookings SET checked_in = $2 WHERE id = $1 RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(booking_id)
        .bind(checked_in)
        .fetch_one(&self.db.pool)
        .await?;
        Ok(booking)
    }

    async fn select_bookings_by_ticket(
        &self,
        ticket_code: &str,
    ) -> GatewayResult<Vec<TicketLookup>> {
        let found = sqlx::query_as::<_, TicketLookup>(
            r#"
            SELECT b.id, b.event_id, b.row_number, b.seat_number, b.first_name, b.last_name,
                   b.ticket_code, b.checked_in, b.created_at,
                   e.name AS event_name, e.date AS event_date, t.name AS theater_name
            FROM bookings b
            JOIN events e ON e.id = b.event_id
            JOIN theaters t ON t.id = e.theater_id
            WHERE b.ticket_code = $1
            "#,
        )
        .bind(ticket_code)
        .fetch_all(&self.db.pool)
        .await?;
        Ok(found)
    }

    async fn find_account_by_email(&self, email: &str) -> GatewayResult<Option<AuthAccount>> {
        let account = sqlx::query_as::<_, AuthAccount>(
            "SELECT id, email, password_hash FROM auth_users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(account)
    }

    async fn select_profile(&self, user_id: Uuid) -> GatewayResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, (Uuid, String, String)>(
            "SELECT p.id, u.email, p.role
             FROM user_profiles p
             JOIN auth_users u ON u.id = p.id
             WHERE p.id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db.pool)
        .await?;
        row.map(profile_from_row).transpose()
    }

    async fn select_profiles(&self) -> GatewayResult<Vec<UserProfile>> {
        let rows = sqlx::query_as::<_, (Uuid, String, String)>(
            "SELECT p.id, u.email, p.role
             FROM user_profiles p
             JOIN auth_users u ON u.id = p.id
             ORDER BY u.email",
        )
        .fetch_all(&self.db.pool)
        .await?;
        rows.into_iter().map(profile_from_row).collect()
    }

    async fn update_profile_role(&self, user_id: Uuid, role: Role) -> GatewayResult<UserProfile> {
        let row = sqlx::query_as::<_, (Uuid, String, String)>(
            r#"
            WITH updated AS (
                UPDATE user_profiles SET role = $2 WHERE id = $1 RETURNING id, role
            )
            SELECT updated.id, u.email, updated.role
            FROM updated
            JOIN auth_users u ON u.id = updated.id
            "#,
        )
        .bind(user_id)
        .bind(role.as_str())
        .fetch_one(&self.db.pool)
        .await?;
        profile_from_row(row)
    }

    fn subscribe(&self) -> broadcast::Receiver<TableChange> {
        self.changes.subscribe()
    }
}
