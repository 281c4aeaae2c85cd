use std::{convert::Infallible, time::Duration as StdDuration};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse,
    },
};
use futures_util::stream::Stream;
use tokio::time::{interval, Duration as TokioDuration};

use crate::{models::Event, services::broadcast::Subscription, AppState};

// GET /events  (SSE)
pub async fn sse_events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let sub = state.events.subscribe();

    let stream = futures_util::stream::unfold(sub, |mut sub| async move {
        let evt = sub.recv().await?;
        let sse = SseEvent::default().event(evt.topic()).data(evt.payload_json());
        Some((Ok(sse), sub))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(StdDuration::from_secs(20))
            .text("keep-alive"),
    )
}

// GET /ws
pub async fn ws_events(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        let sub = state.events.subscribe();
        handle_events_socket(socket, sub)
    })
}

/// Text frame for WebSocket clients: `{"event": topic, "data": payload}`.
pub fn ws_frame(evt: &Event) -> Option<String> {
    match serde_json::to_string(evt) {
        Ok(t) => Some(t),
        Err(e) => {
            tracing::error!("could not encode {} event: {}", evt.topic(), e);
            None
        }
    }
}

async fn handle_events_socket(mut client_ws: WebSocket, mut sub: Subscription) {
    tracing::info!("event client connected");

    // Ping browser to keep alive
    let mut ping = interval(TokioDuration::from_secs(25));

    loop {
        tokio::select! {
            _ = ping.tick() => {
                if client_ws.send(Message::Ping(b"ping".to_vec())).await.is_err() {
                    break;
                }
            }

            evt = sub.recv() => {
                let Some(evt) = evt else { break };
                let Some(txt) = ws_frame(&evt) else { continue };
                if client_ws.send(Message::Text(txt)).await.is_err() {
                    break;
                }
            }

            client_msg = client_ws.recv() => {
                match client_msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    sub.unsubscribe();
    let _ = client_ws.close().await;
    tracing::info!("event client disconnected");
}
