use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::{ApiJson, ApiPath, validated};
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::{NewTheater, Role, SeatCoord, Theater};
use crate::seat_map::UnavailableSeats;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/theaters", get(list_theaters).post(create_theater))
        .route(
            "/theaters/{id}/unavailable-seats",
            put(replace_unavailable_seats).patch(edit_unavailable_seats),
        )
}

#[derive(Debug, Serialize)]
struct TheaterResponse {
    #[serde(flatten)]
    theater: Theater,
    capacity: i64,
}

impl From<Theater> for TheaterResponse {
    fn from(theater: Theater) -> Self {
        let capacity = theater.capacity();
        Self { theater, capacity }
    }
}

// GET /api/theaters
async fn list_theaters(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Json<Vec<TheaterResponse>> {
    let theaters = state.store.theaters().await;
    Json(theaters.into_iter().map(TheaterResponse::from).collect())
}

// POST /api/theaters
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
struct CreateTheaterRequest {
    #[validate(custom(function = "crate::controllers::not_blank"))]
    name: String,
    // Same bounds as models::MAX_ROWS and models::MAX_SEATS_PER_ROW.
    #[validate(range(min = 1, max = 200, message = "must be between 1 and 200"))]
    rows: i32,
    #[validate(range(min = 1, max = 200, message = "must be between 1 and 200"))]
    seats_per_row: i32,
}

async fn create_theater(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateTheaterRequest>,
) -> Result<impl IntoResponse, AppError> {
    user.require(&state, &[Role::Admin])?;
    let req = validated(req)?;

    let theater = state
        .store
        .create_theater(NewTheater {
            name: req.name.trim().to_string(),
            rows: req.rows,
            seats_per_row: req.seats_per_row,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(TheaterResponse::from(theater))))
}

async fn current_blocks(state: &AppState, theater_id: Uuid) -> Result<(Theater, UnavailableSeats), AppError> {
    let theater = state
        .store
        .theater(theater_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("theater {theater_id} not found")))?;
    let blocks = UnavailableSeats::from_stored(&theater.unavailable_seats);
    Ok((theater, blocks))
}

// PUT /api/theaters/{id}/unavailable-seats
#[derive(Debug, Deserialize)]
struct ReplaceSeatsRequest {
    unavailable_seats: Vec<String>,
}

/// Overwrites the whole blocked-seat list. Duplicates collapse.
async fn replace_unavailable_seats(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(theater_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<ReplaceSeatsRequest>,
) -> Result<Json<TheaterResponse>, AppError> {
    user.require(&state, &[Role::Admin])?;
    let (theater, _) = current_blocks(&state, theater_id).await?;

    let seats = UnavailableSeats::parse_within(
        &req.unavailable_seats,
        theater.rows,
        theater.seats_per_row,
    )
    .map_err(AppError::Validation)?;

    let saved = state
        .store
        .update_theater_unavailable_seats(theater_id, seats.to_stored())
        .await?;
    Ok(Json(saved.into()))
}

// PATCH /api/theaters/{id}/unavailable-seats
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EditSeatsRequest {
    block: Vec<String>,
    unblock: Vec<String>,
    toggle: Vec<String>,
}

/// Applies seat-by-seat edits to the stored list, then saves the full list.
async fn edit_unavailable_seats(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(theater_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<EditSeatsRequest>,
) -> Result<Json<TheaterResponse>, AppError> {
    user.require(&state, &[Role::Admin])?;
    let (theater, mut seats) = current_blocks(&state, theater_id).await?;

    let parse = |raw: &String| -> Result<SeatCoord, AppError> {
        let coord = raw
            .parse::<SeatCoord>()
            .map_err(|e| AppError::validation(e.to_string()))?;
        if !coord.is_within(theater.rows, theater.seats_per_row) {
            return Err(AppError::validation(format!(
                "seat {coord} is outside the theater"
            )));
        }
        Ok(coord)
    };

    for raw in &req.block {
        seats.block(parse(raw)?);
    }
    for raw in &req.unblock {
        seats.unblock(parse(raw)?);
    }
    for raw in &req.toggle {
        seats.toggle(parse(raw)?);
    }

    let saved = state
        .store
        .update_theater_unavailable_seats(theater_id, seats.to_stored())
        .await?;
    Ok(Json(saved.into()))
}
