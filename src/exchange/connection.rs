use crate::error::Result;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Lifecycle of one upstream socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Dialing,
    Connected,
    Closing,
}

/// Exponential reconnect delay
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait now; doubles the following one up to the cap
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Timers of the socket supervisor
#[derive(Debug, Clone)]
pub struct SocketTiming {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub dial_timeout: Duration,
    /// Pause after a connected socket fails
    pub reconnect_cooloff: Duration,
    pub ping_interval: Duration,
    pub write_timeout: Duration,
}

impl Default for SocketTiming {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            dial_timeout: Duration::from_secs(10),
            reconnect_cooloff: Duration::from_millis(500),
            ping_interval: Duration::from_secs(30),
            write_timeout: Duration::from_secs(5),
        }
    }
}

/// Protocol half of a socket: what to send on connect and how to read frames
#[async_trait]
pub trait SocketSession: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Frames sent right after the handshake, before any inbound frame is read
    async fn on_connect(&self) -> Result<Vec<String>>;

    fn on_text(&self, text: &str);
}

enum Exit {
    Cancelled,
    Lost,
}

/// Keeps one websocket connected for as long as its token lives
pub struct SocketSupervisor<S> {
    url: String,
    session: Arc<S>,
    timing: SocketTiming,
    state: watch::Sender<ConnectionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl<S: SocketSession> SocketSupervisor<S> {
    pub fn new(url: impl Into<String>, session: Arc<S>, timing: SocketTiming) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            url: url.into(),
            session,
            timing,
            state,
            outbound: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &Arc<S> {
        &self.session
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(socket = self.session.name(), ?previous, ?next, "socket state");
        }
    }

    fn set_outbound(&self, tx: Option<mpsc::UnboundedSender<String>>) {
        let mut outbound = self.outbound.lock().unwrap_or_else(|e| e.into_inner());
        *outbound = tx;
    }

    /// A socket is open and queued frames will be written
    pub fn accepts_frames(&self) -> bool {
        self.outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Queue a frame on the open socket; false when there is none
    ///
    /// The queue opens before [`SocketSession::on_connect`] runs, so a frame
    /// queued during the handshake is written right after the initial ones.
    pub fn send_text(&self, frame: String) -> bool {
        let outbound = self.outbound.lock().unwrap_or_else(|e| e.into_inner());
        match outbound.as_ref() {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }

    /// Dial, serve and redial until `cancel` fires
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let name = self.session.name();
        let mut backoff = Backoff::new(self.timing.initial_backoff, self.timing.max_backoff);

        while !cancel.is_cancelled() {
            self.set_state(ConnectionState::Dialing);

            let dialed = tokio::select! {
                _ = cancel.cancelled() => break,
                dialed = timeout(self.timing.dial_timeout, connect_async(self.url.as_str())) => dialed,
            };
            let stream = match dialed {
                Ok(Ok((stream, _))) => stream,
                Ok(Err(e)) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(socket = name, error = %e, "dial failed, retrying in {:?}", delay);
                    self.set_state(ConnectionState::Disconnected);
                    if !sleep_or_cancel(delay, &cancel).await {
                        break;
                    }
                    continue;
                }
                Err(_) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(socket = name, "dial timed out, retrying in {:?}", delay);
                    self.set_state(ConnectionState::Disconnected);
                    if !sleep_or_cancel(delay, &cancel).await {
                        break;
                    }
                    continue;
                }
            };

            let (mut write, mut read) = stream.split();
            let (tx, mut rx) = mpsc::unbounded_channel();
            self.set_outbound(Some(tx));

            let subscribed = match self.session.on_connect().await {
                Ok(frames) => {
                    let mut sent = Ok(());
                    for frame in frames {
                        sent = self.write_frame(&mut write, Message::Text(frame)).await;
                        if sent.is_err() {
                            break;
                        }
                    }
                    sent
                }
                Err(e) => Err(e),
            };
            if let Err(e) = subscribed {
                let delay = backoff.next_delay();
                tracing::warn!(socket = name, error = %e, "subscribe failed, retrying in {:?}", delay);
                self.set_outbound(None);
                let _ = write.close().await;
                self.set_state(ConnectionState::Disconnected);
                if !sleep_or_cancel(delay, &cancel).await {
                    break;
                }
                continue;
            }

            backoff.reset();
            self.set_state(ConnectionState::Connected);
            tracing::info!(socket = name, url = %self.url, "🔌 websocket connected");

            let start = Instant::now() + self.timing.ping_interval;
            let mut ping = tokio::time::interval_at(start, self.timing.ping_interval);

            let exit = loop {
                tokio::select! {
                    _ = cancel.cancelled() => break Exit::Cancelled,
                    _ = ping.tick() => {
                        if let Err(e) = self.write_frame(&mut write, Message::Ping(Vec::new())).await {
                            tracing::warn!(socket = name, error = %e, "ping failed");
                            break Exit::Lost;
                        }
                    }
                    Some(frame) = rx.recv() => {
                        if let Err(e) = self.write_frame(&mut write, Message::Text(frame)).await {
                            tracing::warn!(socket = name, error = %e, "write failed");
                            break Exit::Lost;
                        }
                    }
                    inbound = read.next() => match inbound {
                        Some(Ok(Message::Text(text))) => self.session.on_text(&text),
                        Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                            Ok(text) => self.session.on_text(text),
                            Err(_) => tracing::warn!(socket = name, "non-utf8 binary frame skipped"),
                        },
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(socket = name, ?frame, "server closed websocket");
                            break Exit::Lost;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(socket = name, error = %e, "read failed");
                            break Exit::Lost;
                        }
                        None => break Exit::Lost,
                    },
                }
            };
            self.set_outbound(None);

            match exit {
                Exit::Cancelled => {
                    self.set_state(ConnectionState::Closing);
                    let close = Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client shutdown".into(),
                    }));
                    let _ = self.write_frame(&mut write, close).await;
                    let _ = timeout(self.timing.write_timeout, write.close()).await;
                    break;
                }
                Exit::Lost => {
                    let delay = self.timing.reconnect_cooloff.max(backoff.next_delay());
                    tracing::warn!(socket = name, "websocket disconnected, reconnecting in {:?}", delay);
                    self.set_state(ConnectionState::Disconnected);
                    if !sleep_or_cancel(delay, &cancel).await {
                        break;
                    }
                }
            }
        }

        self.set_outbound(None);
        self.set_state(ConnectionState::Disconnected);
        tracing::info!(socket = name, "websocket supervisor stopped");
    }

    async fn write_frame<W>(&self, write: &mut W, message: Message) -> Result<()>
    where
        W: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        match timeout(self.timing.write_timeout, write.send(message)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(crate::error::OrchestratorError::Timeout(format!(
                "{} write",
                self.session.name()
            ))),
        }
    }
}

/// Sleep unless cancelled first; false means cancelled
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
