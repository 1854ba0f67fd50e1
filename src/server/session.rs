//! Per-connection protocol state machine.
//!
//! A session reads control frames until the connection closes or a frame
//! fails to parse. Launches run in their own task so the loop keeps
//! reading; a `kill` read mid-run stops the active runner through its
//! handle. Output lines travel from the streamers to a single writer task
//! over an unbounded channel, so frame sends never race on the socket.

use std::io;
use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::CommandSpec;
use crate::messages::{ControlFrame, ControlKind, OutputFrame};
use crate::runner::{Runner, RunnerHandle};
use crate::streamer::{ConsoleSink, LineSink, LineStreamer};

use super::AppState;

/// Items queued for the session's writer task.
pub enum Outbound {
    Frame(OutputFrame),
    Close,
}

/// Serializes each completed line as a log frame and queues it on the
/// session's outbound channel.
pub struct FrameSink {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl FrameSink {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { tx }
    }
}

impl LineSink for FrameSink {
    fn send_line(&self, prefix: &str, line: &str) -> io::Result<()> {
        self.tx
            .send(Outbound::Frame(OutputFrame::log(prefix, line)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "session writer closed"))
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_session(socket, state))
}

async fn run_session(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    let writer = tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            match item {
                Outbound::Frame(frame) => {
                    let text = match serde_json::to_string(&frame) {
                        Ok(text) => text,
                        Err(err) => {
                            error!(error = %err, "failed to serialize frame");
                            continue;
                        }
                    };
                    if let Err(err) = ws_tx.send(Message::Text(text.into())).await {
                        warn!(error = %err, "failed to send frame");
                        break;
                    }
                }
                Outbound::Close => {
                    if let Err(err) = ws_tx
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::NORMAL,
                            reason: "".into(),
                        })))
                        .await
                    {
                        warn!(error = %err, "error closing socket");
                    }
                    break;
                }
            }
        }
    });

    let mut active: Option<RunnerHandle> = None;
    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                debug!("socket closed");
                break;
            }
            Ok(_) => continue,
            Err(err) => {
                info!(error = %err, "socket closed");
                break;
            }
        };
        let frame: ControlFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(err) => {
                error!(error = %err, "error reading control frame");
                break;
            }
        };
        match frame.kind {
            ControlKind::Exec | ControlKind::Command => {
                let spec = state.registry.resolve_remote(&frame.content).clone();
                info!(command = %spec.short_name, args = ?frame.args, "launching command");
                active = Some(launch(spec, frame.args, tx.clone()));
            }
            ControlKind::Kill => {
                info!(command = %frame.content, "killing command");
                match &active {
                    Some(handle) => handle.stop(),
                    None => debug!("kill with no active runner"),
                }
            }
            ControlKind::Args => {
                let spec = state.registry.resolve_local(&frame.content);
                debug!(command = %spec.short_name, args = %spec.args, "answering args query");
                let _ = tx.send(Outbound::Frame(OutputFrame::args(&spec.args)));
                let _ = tx.send(Outbound::Close);
            }
            ControlKind::Unknown => {
                warn!("ignoring control frame with unknown type");
            }
        }
    }

    drop(tx);
    let _ = writer.await;
}

/// Start the resolved command in its own task so the session loop keeps
/// reading control frames, in particular `kill`, while it runs. The close
/// handshake is queued once the process has exited and its streamers are
/// flushed.
fn launch(
    spec: CommandSpec,
    args: Vec<String>,
    tx: mpsc::UnboundedSender<Outbound>,
) -> RunnerHandle {
    let name = spec.path.clone();
    let frame_tx = tx.clone();
    let mut runner = Runner::new(spec)
        .with_args(args)
        .with_streamer_factory(Box::new(move |prefix| {
            LineStreamer::new(prefix, true)
                .with_sink(Box::new(FrameSink::new(frame_tx.clone())))
                .with_sink(Box::new(ConsoleSink::new(&name)))
        }));
    runner.prepare();
    let handle = runner.handle();
    tokio::spawn(async move {
        runner.start().await;
        let _ = tx.send(Outbound::Close);
    });
    handle
}
