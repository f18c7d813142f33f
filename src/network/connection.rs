//! Per-connection event loop, grounded on the teacher's
//! `run_event_loop` skeleton: a `tokio::select!` over the inbound
//! transport, the outbound channel, a periodic ping, and a shutdown
//! signal, dispatched through a small result enum instead of inline
//! branching.

use crate::dispatcher::Dispatcher;
use crate::protocol::{InboundEvent, OutboundEvent};
use crate::state::TransportId;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

const OUTBOUND_BUFFER: usize = 64;
const PING_INTERVAL: Duration = Duration::from_secs(15);

enum Event {
    Inbound(InboundEvent),
    Outbound(OutboundEvent),
    Ping,
    Noop,
    ClientGone,
    Shutdown,
}

pub async fn run(
    socket: WebSocket,
    transport_id: TransportId,
    dispatcher: Arc<Dispatcher>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundEvent>(OUTBOUND_BUFFER);
    let mut ping_timer = tokio::time::interval(PING_INTERVAL);
    let mut user_id: Option<crate::protocol::UserId> = None;

    loop {
        let event = tokio::select! {
            frame = stream.next() => classify_frame(frame),
            Some(outbound) = outbound_rx.recv() => Event::Outbound(outbound),
            _ = ping_timer.tick() => Event::Ping,
            _ = shutdown_rx.recv() => Event::Shutdown,
        };

        match event {
            Event::Inbound(inbound) => {
                if let Some(reply) = dispatcher.handle(transport_id, inbound) {
                    if let OutboundEvent::Registered { user_id: uid, .. } = &reply {
                        user_id = Some(*uid);
                        dispatcher.core().register_sender(*uid, outbound_tx.clone());
                    }
                    if send_event(&mut sink, &reply).await.is_err() {
                        break;
                    }
                }
            }
            Event::Outbound(outbound) => {
                if send_event(&mut sink, &outbound).await.is_err() {
                    break;
                }
            }
            Event::Ping => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            Event::Noop => {}
            Event::ClientGone => break,
            Event::Shutdown => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    if let Some(user_id) = user_id {
        dispatcher.core().remove_sender(user_id);
    }
    dispatcher.handle_disconnect(transport_id);
}

fn classify_frame(
    frame: Option<Result<Message, axum::Error>>,
) -> Event {
    match frame {
        Some(Ok(Message::Text(text))) => match serde_json::from_str::<InboundEvent>(&text) {
            Ok(inbound) => Event::Inbound(inbound),
            Err(e) => {
                debug!(error = %e, "dropped malformed frame");
                Event::Noop
            }
        },
        Some(Ok(Message::Close(_))) | None => Event::ClientGone,
        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Binary(_))) => {
            Event::Noop
        }
        Some(Err(e)) => {
            warn!(error = %e, "transport read error");
            Event::ClientGone
        }
    }
}

async fn send_event(
    sink: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &OutboundEvent,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).unwrap_or_default();
    sink.send(Message::Text(text)).await
}
