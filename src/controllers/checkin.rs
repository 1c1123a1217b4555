use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::{get, post},
    Json, Router,
};
use futures::{stream::BoxStream, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use validator::Validate;

use super::{ApiJson, validated};
use crate::checkin::{CheckInAck, CheckInFlow, FacingMode, ScanAttempt, ScanError, ScanSource};
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::Role;
use crate::AppState;

const STAFF: &[Role] = &[Role::Admin, Role::CheckinStaff];

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/checkin", get(current))
        .route("/checkin/start", post(start))
        .route("/checkin/scan", post(scan))
        .route("/checkin/confirm", post(confirm))
        .route("/checkin/reject", post(reject))
        .route("/checkin/dismiss", post(dismiss))
        .route("/checkin/stop", post(stop))
        .route("/checkin/camera", get(camera))
}

/// The operator's check-in screen plus the camera hint.
#[derive(Debug, Serialize)]
pub struct CheckInView {
    #[serde(flatten)]
    flow: CheckInFlow,
    facing_mode: FacingMode,
}

impl CheckInView {
    fn new(state: &AppState, flow: &CheckInFlow) -> Self {
        Self {
            flow: flow.clone(),
            facing_mode: state.config.checkin.facing_mode,
        }
    }
}

// GET /api/checkin
async fn current(State(state): State<Arc<AppState>>, user: AuthUser) -> Json<CheckInView> {
    let flow = state.checkin.flow_for(user.user_id);
    let flow = flow.lock().await;
    Json(CheckInView::new(&state, &flow))
}

// POST /api/checkin/start
async fn start(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<CheckInView>, AppError> {
    user.require(&state, STAFF)?;
    let flow = state.checkin.flow_for(user.user_id);
    let mut flow = flow.lock().await;
    flow.start()?;
    Ok(Json(CheckInView::new(&state, &flow)))
}

// POST /api/checkin/scan
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
struct ScanRequest {
    #[validate(custom(function = "crate::controllers::not_blank"))]
    ticket_code: String,
}

/// Manual entry of a decoded code. NOT_FOUND and ALREADY_CHECKED_IN come
/// back as states with 200.
async fn scan(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(req): ApiJson<ScanRequest>,
) -> Result<Json<CheckInView>, AppError> {
    user.require(&state, STAFF)?;
    let req = validated(req)?;
    let flow = state.checkin.flow_for(user.user_id);
    let mut flow = flow.lock().await;
    flow.submit_code(&state.store, &req.ticket_code).await?;
    Ok(Json(CheckInView::new(&state, &flow)))
}

#[derive(Debug, Serialize)]
struct ConfirmResponse {
    #[serde(flatten)]
    ack: CheckInAck,
    checkin: CheckInView,
}

// POST /api/checkin/confirm
async fn confirm(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<ConfirmResponse>, AppError> {
    user.require(&state, STAFF)?;
    let flow = state.checkin.flow_for(user.user_id);
    let mut flow = flow.lock().await;
    let ack = flow.confirm(&state.store).await?;
    Ok(Json(ConfirmResponse {
        ack,
        checkin: CheckInView::new(&state, &flow),
    }))
}

// POST /api/checkin/reject
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RejectRequest {
    reason: Option<String>,
}

async fn reject(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    body: Bytes,
) -> Result<Json<CheckInView>, AppError> {
    user.require(&state, STAFF)?;
    // The body is optional: an empty POST rejects without a reason.
    let req: RejectRequest = if body.is_empty() {
        RejectRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::validation(e.to_string()))?
    };
    let flow = state.checkin.flow_for(user.user_id);
    let mut flow = flow.lock().await;
    flow.reject(req.reason.as_deref())?;
    Ok(Json(CheckInView::new(&state, &flow)))
}

// POST /api/checkin/dismiss
async fn dismiss(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<CheckInView>, AppError> {
    user.require(&state, STAFF)?;
    let flow = state.checkin.flow_for(user.user_id);
    let mut flow = flow.lock().await;
    flow.dismiss();
    Ok(Json(CheckInView::new(&state, &flow)))
}

// POST /api/checkin/stop
async fn stop(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<CheckInView>, AppError> {
    user.require(&state, STAFF)?;
    let flow = state.checkin.flow_for(user.user_id);
    let mut flow = flow.lock().await;
    flow.stop();
    Ok(Json(CheckInView::new(&state, &flow)))
}

/// A frame sent by the browser's QR widget.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CameraFrame {
    Decoded { code: String },
    Failed { error: String },
}

fn parse_frame(text: &str) -> ScanAttempt {
    match serde_json::from_str::<CameraFrame>(text) {
        Ok(CameraFrame::Decoded { code }) => Ok(code.trim().to_string()),
        Ok(CameraFrame::Failed { error }) => Err(ScanError(error)),
        // Plain text frames carry the decoded code itself.
        Err(_) => Ok(text.trim().to_string()),
    }
}

/// Decode attempts arriving over the camera WebSocket.
struct WsCamera<S>(S);

impl<S> ScanSource for WsCamera<S>
where
    S: Stream<Item = Result<Message, axum::Error>> + Send + 'static,
{
    fn open(self, facing_mode: FacingMode) -> BoxStream<'static, ScanAttempt> {
        debug!(?facing_mode, "Camera stream opened");
        self.0
            .take_while(|msg| futures::future::ready(!matches!(msg, Ok(Message::Close(_)) | Err(_))))
            .filter_map(|msg| async move {
                match msg {
                    Ok(Message::Text(text)) => Some(parse_frame(text.as_str())),
                    _ => None,
                }
            })
            .boxed()
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CameraEvent<'a> {
    Open { facing_mode: FacingMode },
    State { checkin: &'a CheckInView },
    Error { message: String },
}

// GET /api/checkin/camera (WebSocket)
async fn camera(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    user.require(&state, STAFF)?;
    Ok(ws.on_upgrade(move |socket| run_camera(socket, state, user)))
}

async fn run_camera(socket: WebSocket, state: Arc<AppState>, user: AuthUser) {
    let (mut sender, receiver) = socket.split();
    let facing_mode = state.config.checkin.facing_mode;
    let flow = state.checkin.flow_for(user.user_id);
    info!(operator = %user.user_id, "Camera connected");

    let opened = {
        let mut flow = flow.lock().await;
        flow.start().map_err(|e| e.to_string())
    };
    let first = match opened {
        Ok(()) => CameraEvent::Open { facing_mode },
        Err(message) => CameraEvent::Error { message },
    };
    let failed = matches!(first, CameraEvent::Error { .. });
    if send_json(&mut sender, &first).await.is_err() || failed {
        return;
    }

    let mut attempts = WsCamera(receiver).open(facing_mode);
    while let Some(attempt) = attempts.next().await {
        let view = {
            let mut flow = flow.lock().await;
            flow.handle_attempt(&state.store, attempt).await;
            CheckInView::new(&state, &flow)
        };
        if send_json(&mut sender, &CameraEvent::State { checkin: &view })
            .await
            .is_err()
        {
            break;
        }
    }
    info!(operator = %user.user_id, "Camera disconnected");
}

async fn send_json<S>(sender: &mut S, event: &CameraEvent<'_>) -> Result<(), S::Error>
where
    S: futures::Sink<Message> + Unpin,
{
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize camera event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(json.into())).await
}
