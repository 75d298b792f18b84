//! WebSocket plumbing around the session state machine.
//!
//! The socket loop owns one `Session` and two clocks: inbound control
//! messages and the push timer. The timer only matters while the session is
//! streaming, so an idle connection parks on the inbound stream alone. All
//! protocol decisions live in `Session`; this module just moves JSON.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};

use crate::artifacts::ArtifactStore;
use crate::session::{ControlMessage, ServerMessage, Session};

pub async fn handle_ws(socket: WebSocket, store: ArtifactStore, push_interval: Duration) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut session = Session::new(store);
    let mut ticker = tokio::time::interval(push_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        let outbound = if session.is_streaming() {
            tokio::select! {
                msg = ws_rx.next() => {
                    match handle_inbound(msg, &mut session, &mut ws_tx).await {
                        Inbound::Messages(out) => {
                            // The control message may have pushed a frame
                            // itself; hold the timer back a full period.
                            ticker.reset();
                            out
                        }
                        Inbound::Ignored => continue,
                        Inbound::Closed => break,
                    }
                }
                _ = ticker.tick() => session.on_tick(),
            }
        } else {
            match handle_inbound(ws_rx.next().await, &mut session, &mut ws_tx).await {
                Inbound::Messages(out) => {
                    ticker.reset();
                    out
                }
                Inbound::Ignored => continue,
                Inbound::Closed => break,
            }
        };

        for msg in outbound {
            if send(&mut ws_tx, &msg).await.is_err() {
                log::debug!("client send failed, dropping session");
                return;
            }
        }
    }

    log::debug!("session closed");
}

enum Inbound {
    Messages(Vec<ServerMessage>),
    Ignored,
    Closed,
}

async fn handle_inbound<S>(
    msg: Option<Result<Message, axum::Error>>,
    session: &mut Session,
    ws_tx: &mut S,
) -> Inbound
where
    S: SinkExt<Message> + Unpin,
{
    match msg {
        Some(Ok(Message::Text(text))) => match serde_json::from_str::<ControlMessage>(text.as_str()) {
            Ok(control) => Inbound::Messages(session.handle_control(control)),
            Err(e) => {
                log::warn!("unparseable control message, closing session: {}", e);
                Inbound::Closed
            }
        },
        Some(Ok(Message::Ping(data))) => {
            let _ = ws_tx.send(Message::Pong(data)).await;
            Inbound::Ignored
        }
        Some(Ok(Message::Close(_))) | None => Inbound::Closed,
        Some(Ok(_)) => Inbound::Ignored,
        Some(Err(e)) => {
            log::debug!("socket error: {}", e);
            Inbound::Closed
        }
    }
}

async fn send<S>(ws_tx: &mut S, msg: &ServerMessage) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let json = serde_json::to_string(msg).map_err(|_| ())?;
    ws_tx.send(Message::Text(json.into())).await.map_err(|_| ())
}
