//! Push channel: one WebSocket per session at `/ws/{user_id}`.
//!
//! Lifecycle is `Connecting → Open → Closed`. Closed is terminal; there is
//! no reconnect. A fresh [`PushConnection`] is made for every mount.

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tracing::{debug, info, warn};

use chitchat_core::{ClientFrame, ServerEvent, parse_server_event};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

impl ChannelState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "online",
            Self::Closed => "offline",
        }
    }
}

/// What the channel delivers to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Opened,
    Event(ServerEvent),
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("push channel is not open")]
    NotOpen,

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Anything that can carry a client frame to the server.
pub trait FrameSink {
    fn is_open(&self) -> bool;
    fn transmit(&self, frame: ClientFrame) -> Result<(), PushError>;
}

/// Handle to a live push channel. Dropping it closes the socket.
pub struct PushConnection {
    outbound: mpsc::UnboundedSender<ClientFrame>,
    state: watch::Receiver<ChannelState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PushConnection {
    /// Start connecting to `url`. Returns at once in `Connecting`; inbound
    /// events arrive on the returned receiver.
    pub fn connect(url: String) -> (Self, mpsc::UnboundedReceiver<PushEvent>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ChannelState::Connecting);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run_channel(
            url,
            state_tx,
            events_tx,
            outbound_rx,
            shutdown_rx,
        ));

        let conn = Self {
            outbound: outbound_tx,
            state: state_rx,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        };
        (conn, events_rx)
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Wait until the connection attempt resolves. True if it opened.
    pub async fn wait_open(&self) -> bool {
        let mut rx = self.state.clone();
        match rx.wait_for(|s| *s != ChannelState::Connecting).await {
            Ok(state) => *state == ChannelState::Open,
            Err(_) => false,
        }
    }

    /// Ask the channel to close. Only the first call has an effect.
    pub fn close(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            debug!("closing push channel");
            let _ = tx.send(());
        }
    }

    /// Close and wait for the socket task to finish (flushes queued frames).
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl FrameSink for PushConnection {
    fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    fn transmit(&self, frame: ClientFrame) -> Result<(), PushError> {
        if !self.is_open() {
            return Err(PushError::NotOpen);
        }
        self.outbound.send(frame).map_err(|_| PushError::NotOpen)
    }
}

impl Drop for PushConnection {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_channel(
    url: String,
    state_tx: watch::Sender<ChannelState>,
    events_tx: mpsc::UnboundedSender<PushEvent>,
    mut outbound_rx: mpsc::UnboundedReceiver<ClientFrame>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let connected = tokio::select! {
        res = tokio_tungstenite::connect_async(url.as_str()) => res,
        _ = &mut shutdown_rx => {
            debug!("push channel closed before it opened");
            finish(&state_tx, &events_tx);
            return;
        }
    };

    let ws = match connected {
        Ok((ws, _)) => ws,
        Err(e) => {
            warn!(url = %url, error = %e, "push channel failed to connect");
            finish(&state_tx, &events_tx);
            return;
        }
    };

    info!(url = %url, "push channel open");
    state_tx.send_replace(ChannelState::Open);
    let _ = events_tx.send(PushEvent::Opened);

    let (mut ws_write, mut ws_read) = ws.split();

    loop {
        tokio::select! {
            biased;

            frame = outbound_rx.recv() => {
                let Some(frame) = frame else {
                    break;
                };
                let json = match serde_json::to_string(&frame) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "failed to encode client frame");
                        continue;
                    }
                };
                if let Err(e) = ws_write.send(tungstenite::Message::Text(json.into())).await {
                    warn!(error = %e, "push channel write failed");
                    break;
                }
            }

            msg = ws_read.next() => {
                match msg {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        match parse_server_event(&text) {
                            Ok(ServerEvent::Unknown(kind)) => {
                                debug!(kind = %kind, "ignoring push event");
                            }
                            Ok(event) => {
                                if events_tx.send(PushEvent::Event(event)).is_err() {
                                    // consumer is gone
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "dropping malformed push frame");
                            }
                        }
                    }
                    Some(Ok(tungstenite::Message::Close(_))) | None => {
                        info!("push channel closed by server");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "push channel read failed");
                        break;
                    }
                    // Ping/pong handled by tungstenite; binary frames are not part of the protocol
                    Some(Ok(_)) => {}
                }
            }

            _ = &mut shutdown_rx => {
                let _ = ws_write.send(tungstenite::Message::Close(None)).await;
                let _ = ws_write.close().await;
                break;
            }
        }
    }

    finish(&state_tx, &events_tx);
}

fn finish(state_tx: &watch::Sender<ChannelState>, events_tx: &mpsc::UnboundedSender<PushEvent>) {
    state_tx.send_replace(ChannelState::Closed);
    let _ = events_tx.send(PushEvent::Closed);
    info!("push channel closed");
}
