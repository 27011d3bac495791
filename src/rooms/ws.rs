use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};

use crate::{AppResult, SharedChallenge, challenge::Subscription, config::Config};

#[debug_handler(state = crate::AppState)]
pub async fn group_ws(
    Path(username): Path<String>,
    State(challenge): State<SharedChallenge>,
    State(config): State<Arc<Config>>,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let subscription = challenge.join_room(&username, config.room_buffer).await?;
    tracing::info!(%username, group_id = %subscription.group_id, "joined room");

    Ok(ws
        .on_upgrade(async move |stream| serve(stream, challenge, subscription, username).await)
        .into_response())
}

/// Pumps the room's events into the socket until either side goes away.
/// Clients only listen; anything they send is ignored.
async fn serve(stream: WebSocket, challenge: SharedChallenge, subscription: Subscription, username: String) {
    let Subscription {
        group_id,
        connection_id,
        mut rx,
    } = subscription;
    let (mut sender, mut receiver) = stream.split();

    let mut pump = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::text(&*msg)).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut pump => break,
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
        }
    }

    pump.abort();
    challenge.rooms().leave(group_id, connection_id);
    tracing::info!(%username, %group_id, "left room");
}
