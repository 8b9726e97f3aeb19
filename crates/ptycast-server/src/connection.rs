//! Per-connection handler: register, answer client frames, relay broadcasts.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use ptycast_common::ClientId;
use ptycast_pty::CommandQueue;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;

use crate::context::RelayContext;
use crate::protocol::{parse_client_frame, ClientFrame, ServerFrame};
use crate::registry::ClientHandle;

/// Lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

type WsSink<S> = SplitSink<WebSocketStream<S>, Message>;

const BINARY_UNSUPPORTED: &str = "Binary frames are not supported; send JSON text.";

/// Drive one WebSocket connection from handshake to close.
///
/// This task is the only writer on the socket: broadcast frames arrive on
/// the client's outbound queue and are sent between direct replies.
///
/// With keepalive enabled, a peer that sends nothing (not even a Pong) for
/// the keepalive timeout is closed.
pub async fn handle_connection<S>(
    ws: WebSocketStream<S>,
    addr: SocketAddr,
    ctx: Arc<RelayContext>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let id = ClientId::new();
    let mut state = SessionState::Connecting;
    let (mut sink, mut stream) = ws.split();

    // CONNECTING → ACTIVE
    let (tx, mut outbound) = mpsc::channel(ctx.server.outbound_capacity.max(1));
    let clients = ctx.registry.add(ClientHandle::new(id.clone(), addr, tx)).await;
    tracing::info!(
        client = id.short(),
        peer = %addr,
        clients,
        "WebSocket connection established"
    );

    state = transition(&id, state, SessionState::Active);
    let welcome = ServerFrame::Output(ctx.server.welcome_message.clone());
    if send_frame(&mut sink, &welcome).await.is_err() {
        state = transition(&id, state, SessionState::Closing);
    }

    let mut keepalive = ctx.keepalive().map(|period| {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });
    let keepalive_timeout = ctx.keepalive_timeout();
    let mut last_seen = Instant::now();

    while state == SessionState::Active {
        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                tracing::debug!(client = id.short(), "Shutdown requested");
                state = transition(&id, state, SessionState::Closing);
            }

            // Broadcast frames queued for this client.
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if send_frame(&mut sink, &frame).await.is_err() {
                        state = transition(&id, state, SessionState::Closing);
                    }
                }
                // Pruned by the broadcast loop.
                None => state = transition(&id, state, SessionState::Closing),
            },

            _ = expire(keepalive_timeout.map(|timeout| last_seen + timeout)) => {
                tracing::warn!(client = id.short(), peer = %addr, "Keepalive timed out");
                state = transition(&id, state, SessionState::Closing);
            }

            _ = next_keepalive(&mut keepalive) => {
                if sink.send(Message::Ping(Default::default())).await.is_err() {
                    state = transition(&id, state, SessionState::Closing);
                }
            }

            frame = stream.next() => {
                if let Some(Ok(_)) = &frame {
                    last_seen = Instant::now();
                }
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        for reply in respond(&text, &ctx.commands, ctx.acknowledge) {
                            if let Err(e) = send_frame(&mut sink, &reply).await {
                                tracing::warn!(
                                    client = id.short(),
                                    error = %e,
                                    "Failed to reply to client"
                                );
                                state = transition(&id, state, SessionState::Closing);
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        let reply = ServerFrame::Error(BINARY_UNSUPPORTED.into());
                        if send_frame(&mut sink, &reply).await.is_err() {
                            state = transition(&id, state, SessionState::Closing);
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            state = transition(&id, state, SessionState::Closing);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        state = transition(&id, state, SessionState::Closing);
                    }
                    Some(Err(e)) => {
                        tracing::debug!(client = id.short(), peer = %addr, error = %e, "WS error");
                        state = transition(&id, state, SessionState::Closing);
                    }
                    _ => {}
                }
            }
        }
    }

    // CLOSING → CLOSED
    ctx.registry.remove(&id).await;
    let close = Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "Client disconnected".into(),
    }));
    if let Err(e) = sink.send(close).await {
        tracing::trace!(client = id.short(), error = %e, "Close frame not sent");
    }
    let _ = sink.close().await;
    transition(&id, state, SessionState::Closed);
    let clients = ctx.registry.len().await;
    tracing::info!(client = id.short(), peer = %addr, clients, "WebSocket connection closed");
}

/// Replies owed to the sender of one text frame.
///
/// `input` frames are echoed and queued for the writer; a full queue is
/// reported as an error frame regardless of the acknowledgment setting.
pub fn respond(text: &str, commands: &CommandQueue, acknowledge: bool) -> Vec<ServerFrame> {
    match parse_client_frame(text) {
        Ok(ClientFrame::Input { data }) => {
            let mut replies = vec![ServerFrame::Echo(format!("> {data}\n"))];
            match commands.queue_command(data.as_str()) {
                Ok(()) => {
                    tracing::info!(command = %data, "Command queued");
                    if acknowledge {
                        replies.push(ServerFrame::Output(format!(
                            "Command '{data}' queued for process.\n"
                        )));
                    }
                }
                Err(e) => {
                    tracing::warn!(command = %data, error = %e, "Command rejected");
                    replies.push(ServerFrame::Error(format!("Command '{data}' not queued: {e}\n")));
                }
            }
            replies
        }
        Ok(ClientFrame::Ping) => vec![ServerFrame::pong()],
        Err(e) => {
            tracing::warn!(error = %e, "Bad frame from client");
            vec![ServerFrame::from(e)]
        }
    }
}

async fn send_frame<S>(
    sink: &mut WsSink<S>,
    frame: &ServerFrame,
) -> Result<(), tungstenite::Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    sink.send(Message::Text(frame.to_json().into())).await
}

async fn next_keepalive(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn transition(id: &ClientId, from: SessionState, to: SessionState) -> SessionState {
    tracing::trace!(client = id.short(), ?from, ?to, "Session state change");
    to
}
