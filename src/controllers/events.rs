use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::{ApiJson, ApiPath, validated};
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::{EventDetails, EventPatch, NewEvent, Role};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events", get(list_events).post(create_event))
        .route(
            "/events/{id}",
            get(get_event).patch(update_event).delete(delete_event),
        )
}

/// One card on the Events and Bookings screens.
#[derive(Debug, Serialize)]
pub struct EventCard {
    pub id: Uuid,
    pub name: String,
    pub date: NaiveDate,
    pub theater_id: Uuid,
    pub theater_name: String,
    pub rows: i32,
    pub seats_per_row: i32,
    pub capacity: i64,
    pub booked: usize,
}

impl From<&EventDetails> for EventCard {
    fn from(details: &EventDetails) -> Self {
        EventCard {
            id: details.id(),
            name: details.event.name.clone(),
            date: details.event.date,
            theater_id: details.event.theater_id,
            theater_name: details.theater.name.clone(),
            rows: details.theater.rows,
            seats_per_row: details.theater.seats_per_row,
            capacity: details.capacity(),
            booked: details.booked_count(),
        }
    }
}

// GET /api/events
async fn list_events(State(state): State<Arc<AppState>>, _user: AuthUser) -> Json<Vec<EventCard>> {
    let events = state.store.events().await;
    Json(events.iter().map(EventCard::from).collect())
}

// GET /api/events/{id}
async fn get_event(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    ApiPath(event_id): ApiPath<Uuid>,
) -> Result<Json<EventDetails>, AppError> {
    state
        .store
        .event(event_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("event {event_id} not found")))
}

// POST /api/events
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
struct CreateEventRequest {
    #[validate(custom(function = "crate::controllers::not_blank"))]
    name: String,
    #[validate(required(message = "is required"))]
    date: Option<NaiveDate>,
    #[validate(required(message = "is required"))]
    theater_id: Option<Uuid>,
}

async fn create_event(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateEventRequest>,
) -> Result<impl IntoResponse, AppError> {
    user.require(&state, &[Role::Admin])?;
    let req = validated(req)?;
    let (Some(date), Some(theater_id)) = (req.date, req.theater_id) else {
        return Err(AppError::validation("date and theater_id are required"));
    };

    let event = state
        .store
        .create_event(NewEvent {
            name: req.name.trim().to_string(),
            date,
            theater_id,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(EventCard::from(&event))))
}

// PATCH /api/events/{id}
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
struct UpdateEventRequest {
    #[validate(custom(function = "crate::controllers::not_blank"))]
    name: Option<String>,
    date: Option<NaiveDate>,
    theater_id: Option<Uuid>,
}

async fn update_event(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(event_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateEventRequest>,
) -> Result<Json<EventCard>, AppError> {
    user.require(&state, &[Role::Admin])?;
    let req = validated(req)?;
    let patch = EventPatch {
        name: req.name.map(|n| n.trim().to_string()),
        date: req.date,
        theater_id: req.theater_id,
    };
    if patch.is_empty() {
        return Err(AppError::validation("nothing to update"));
    }

    state.store.update_event(event_id, patch).await?;
    let event = state
        .store
        .event(event_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("event {event_id} not found")))?;
    Ok(Json(EventCard::from(&event)))
}

// DELETE /api/events/{id}
async fn delete_event(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(event_id): ApiPath<Uuid>,
) -> Result<StatusCode, AppError> {
    user.require(&state, &[Role::Admin])?;
    state.store.delete_event(event_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
