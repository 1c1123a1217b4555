pub mod auth;
pub mod bookings;
pub mod changes;
pub mod checkin;
pub mod events;
pub mod theaters;
pub mod users;

use axum::{
    extract::{FromRequest, FromRequestParts},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use validator::{Validate, ValidationError};

use crate::error::AppError;
use crate::AppState;

/// Every `/api` route group: one per screen, plus auth and the change feed.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(auth::routes())
        .merge(theaters::routes())
        .merge(events::routes())
        .merge(bookings::routes())
        .merge(checkin::routes())
        .merge(users::routes())
        .merge(changes::routes())
}

/// The full HTTP application.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Theater Booking API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", routes())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// JSON body whose rejections answer with the usual error body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub(crate) struct ApiJson<T>(pub T);

/// Path parameters whose rejections answer with the usual error body.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub(crate) struct ApiPath<T>(pub T);

/// Runs request validation before anything reaches the store.
pub(crate) fn validated<T: Validate>(input: T) -> Result<T, AppError> {
    input.validate()?;
    Ok(input)
}

pub(crate) fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("is required".into());
        return Err(err);
    }
    Ok(())
}
