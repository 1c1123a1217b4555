use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::middleware::AuthUser;
use crate::store::StoreUpdate;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/changes", get(changes))
}

// GET /api/changes (WebSocket)
async fn changes(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ws: WebSocketUpgrade,
) -> Response {
    debug!(user_id = %user.user_id, "Change feed requested");
    ws.on_upgrade(move |socket| forward_updates(socket, state))
}

/// Pushes a `{"type": ...}` frame each time a cached list is replaced.
async fn forward_updates(socket: WebSocket, state: Arc<AppState>) {
    let (sender, receiver) = socket.split();
    info!("Change feed connected");
    pump_updates(sender, receiver, state.store.subscribe()).await;
    info!("Change feed disconnected");
}

/// Runs until the client closes or the store goes away.
async fn pump_updates<S, R, E>(
    mut sender: S,
    mut receiver: R,
    mut updates: broadcast::Receiver<StoreUpdate>,
) where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
{
    loop {
        tokio::select! {
            update = updates.recv() => {
                let update = match update {
                    Ok(update) => update,
                    // A lagging client only needs to know both lists moved.
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Change feed client lagged");
                        if send(&mut sender, StoreUpdate::Theaters).await.is_err() {
                            break;
                        }
                        StoreUpdate::Events
                    }
                    Err(RecvError::Closed) => break,
                };
                if send(&mut sender, update).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

async fn send<S>(sender: &mut S, update: StoreUpdate) -> Result<(), S::Error>
where
    S: Sink<Message> + Unpin,
{
    match serde_json::to_string(&update) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!("Failed to serialize store update: {}", e);
            Ok(())
        }
    }
}
