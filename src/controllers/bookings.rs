use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::{ApiJson, ApiPath, validated};
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::{Booking, EventDetails, NewBooking, Role, SeatCoord};
use crate::seat_map::{SeatGrid, SeatMapError};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events/{id}/seats", get(seat_grid))
        .route("/events/{id}/bookings", get(list_bookings).post(create_booking))
}

async fn cached_event(state: &AppState, event_id: Uuid) -> Result<EventDetails, AppError> {
    state
        .store
        .event(event_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("event {event_id} not found")))
}

// GET /api/events/{id}/seats
async fn seat_grid(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    ApiPath(event_id): ApiPath<Uuid>,
) -> Result<Json<SeatGrid>, AppError> {
    let event = cached_event(&state, event_id).await?;
    Ok(Json(SeatGrid::for_event(&event)))
}

// GET /api/events/{id}/bookings
async fn list_bookings(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    ApiPath(event_id): ApiPath<Uuid>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let mut bookings = cached_event(&state, event_id).await?.bookings;
    bookings.sort_by_key(|b| (b.row_number, b.seat_number));
    Ok(Json(bookings))
}

// POST /api/events/{id}/bookings
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
struct CreateBookingRequest {
    #[validate(range(min = 1, message = "must be positive"))]
    row_number: i32,
    #[validate(range(min = 1, message = "must be positive"))]
    seat_number: i32,
    #[validate(custom(function = "crate::controllers::not_blank"))]
    first_name: String,
    #[validate(custom(function = "crate::controllers::not_blank"))]
    last_name: String,
    #[validate(custom(function = "crate::controllers::not_blank"))]
    ticket_code: String,
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(event_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<CreateBookingRequest>,
) -> Result<impl IntoResponse, AppError> {
    user.require(&state, &[Role::Admin, Role::Seller])?;
    let req = validated(req)?;

    let event = cached_event(&state, event_id).await?;
    let coord = SeatGrid::for_event(&event)
        .select(SeatCoord::new(req.row_number, req.seat_number))
        .map_err(|e| match e {
            SeatMapError::OutOfRange(_) => AppError::Validation(e.to_string()),
            SeatMapError::NotAvailable(_) => AppError::Conflict(e.to_string()),
        })?;

    let booking = state
        .store
        .create_booking(NewBooking {
            event_id,
            row_number: coord.row,
            seat_number: coord.seat,
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            // Matched exactly at check-in, so only outer whitespace goes.
            ticket_code: req.ticket_code.trim().to_string(),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}
