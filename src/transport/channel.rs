//! Live WebSocket channel for one room entry.
//!
//! [`LiveChannel`] is a thin handle to a background task that owns the socket.
//! The task multiplexes outbound commands, inbound frames and the room's
//! teardown signal with `tokio::select!`, and forwards decoded events on a
//! bounded mpsc channel consumed by a single dispatcher.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use super::http::endpoint_url;
use crate::error::{Result, SantaError};
use crate::event::{LiveEvent, OutboundMessage};
use crate::lifecycle::ShutdownListener;

/// Capacity of the inbound event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long `close` waits for the close handshake before aborting the task.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// What the channel delivers to its consumer.
///
/// `Closed` is always the last item. An `Error` is followed by `Closed`.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Message(LiveEvent),
    Error(String),
    Closed,
}

enum Command {
    Send(String),
    Close,
}

/// Handle to an open live channel.
pub struct LiveChannel {
    cmd_tx: mpsc::UnboundedSender<Command>,
    task: Option<JoinHandle<()>>,
}

impl LiveChannel {
    /// Connect to `{ws_base}/ws/{code}/{name}`.
    ///
    /// The socket closes when [`close`](Self::close) is called, the handle is
    /// dropped, or `shutdown` fires.
    pub async fn open(
        ws_base: &str,
        code: &str,
        name: &str,
        shutdown: ShutdownListener,
    ) -> Result<(Self, mpsc::Receiver<ChannelEvent>)> {
        let url = endpoint_url(ws_base, &["ws", code, name])?;
        let (ws_stream, _resp) = tokio_tungstenite::connect_async(url.as_str()).await?;
        info!(room = code, "live channel connected");

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let task = tokio::spawn(channel_loop(ws_stream, cmd_rx, event_tx, shutdown));

        Ok((
            Self {
                cmd_tx,
                task: Some(task),
            },
            event_rx,
        ))
    }

    /// Queue a chat line.
    pub fn send(&self, text: &str) -> Result<()> {
        let json = OutboundMessage::new(text).to_json()?;
        self.cmd_tx
            .send(Command::Send(json))
            .map_err(|_| SantaError::Channel("channel is closed".into()))
    }

    pub fn is_open(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Close the socket and wait briefly for the task to finish.
    pub async fn close(mut self) {
        let _ = self.cmd_tx.send(Command::Close);
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut task).await.is_err() {
                warn!("live channel did not close in time, aborting");
                task.abort();
            }
        }
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for LiveChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveChannel")
            .field("open", &self.is_open())
            .finish()
    }
}

async fn channel_loop<S>(
    ws_stream: tokio_tungstenite::WebSocketStream<S>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::Sender<ChannelEvent>,
    mut shutdown: ShutdownListener,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    loop {
        tokio::select! {
            _ = shutdown.wait() => {
                debug!("teardown requested, closing live channel");
                let _ = ws_sink.send(WsMessage::Close(None)).await;
                break;
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Send(text)) => {
                        if let Err(e) = ws_sink.send(WsMessage::Text(text)).await {
                            warn!(error = %e, "live channel send failed");
                            let _ = event_tx.send(ChannelEvent::Error(e.to_string())).await;
                            break;
                        }
                    }
                    Some(Command::Close) | None => {
                        let _ = ws_sink.send(WsMessage::Close(None)).await;
                        break;
                    }
                }
            }

            frame = ws_stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => match LiveEvent::parse(&text) {
                        Ok(event) => {
                            if event_tx.send(ChannelEvent::Message(event)).await.is_err() {
                                // Nobody is listening any more.
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "skipping malformed live frame"),
                    },
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary / ping / pong
                    Some(Err(e)) => {
                        warn!(error = %e, "live channel error");
                        let _ = event_tx.send(ChannelEvent::Error(e.to_string())).await;
                        break;
                    }
                }
            }
        }
    }

    info!("live channel closed");
    let _ = event_tx.send(ChannelEvent::Closed).await;
}
