use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};
use url::Url;
use uuid::Uuid;

use huddle_types::events::{GatewayCommand, GatewayEvent, decode_frame};
use huddle_types::models::UserId;

use crate::bus::{EventBus, Subscription};
use crate::error::GatewayError;

/// Keep-alive: a ping command every 9 minutes keeps the gateway from
/// dropping an idle socket. No pong is expected.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(9 * 60);

/// How long a flushing close waits for queued frames to be written.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: Url,
    pub ping_interval: Duration,
}

impl GatewayConfig {
    pub fn new(url: &str) -> Result<Self, GatewayError> {
        Ok(Self {
            url: Url::parse(url)?,
            ping_interval: DEFAULT_PING_INTERVAL,
        })
    }

    pub fn with_ping_interval(mut self, every: Duration) -> Self {
        self.ping_interval = every;
        self
    }

    /// Gateway URL for one user: `<base>?user_id=<id>`.
    pub fn socket_url(&self, user_id: UserId) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("user_id", &user_id.to_string());
        url
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
}

/// Owns the single gateway socket of a session.
///
/// Inbound text frames are decoded and published on [`Self::events`];
/// outbound commands go through [`Self::send`], which is fire-and-forget.
/// Nothing else ever touches the socket.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: GatewayConfig,
    events: EventBus<GatewayEvent>,
    socket: Mutex<Option<LiveSocket>>,
}

/// Handles of one open socket. Dropping it detaches frame delivery and
/// stops the reader and the keep-alive; the writer drains what was queued
/// and then closes the sink.
struct LiveSocket {
    conn_id: Uuid,
    user_id: UserId,
    outbound: mpsc::UnboundedSender<Message>,
    gate: Arc<DeliveryGate>,
    reader: JoinHandle<()>,
    keepalive: JoinHandle<()>,
    writer: Option<JoinHandle<()>>,
}

impl Drop for LiveSocket {
    fn drop(&mut self) {
        self.gate.detach();
        self.reader.abort();
        self.keepalive.abort();
    }
}

thread_local! {
    /// Connection whose frame handlers are running on this thread.
    static DELIVERING: Cell<Option<Uuid>> = const { Cell::new(None) };
}

/// Orders frame delivery against detaching: once `detach` has returned, no
/// handler starts for this socket. Aborting the reader alone is not enough,
/// a running reader keeps draining buffered frames until it next yields.
struct DeliveryGate {
    conn_id: Uuid,
    detached: AtomicBool,
    delivering: Mutex<()>,
}

impl DeliveryGate {
    fn new(conn_id: Uuid) -> Self {
        Self {
            conn_id,
            detached: AtomicBool::new(false),
            delivering: Mutex::new(()),
        }
    }

    /// Publish `event` unless the socket was detached. Returns false once
    /// detached.
    fn deliver(&self, events: &EventBus<GatewayEvent>, event: GatewayEvent) -> bool {
        // Poisoned by a panicking handler; the reader is going down with it
        let Ok(_guard) = self.delivering.lock() else {
            return false;
        };
        if self.detached.load(Ordering::Acquire) {
            return false;
        }

        let outer = DELIVERING.with(|d| d.replace(Some(self.conn_id)));
        events.publish(event);
        DELIVERING.with(|d| d.set(outer));
        true
    }

    /// Stop delivery, waiting for handlers already running. A handler that
    /// closes its own socket does not wait for itself.
    fn detach(&self) {
        self.detached.store(true, Ordering::Release);
        if DELIVERING.with(|d| d.get()) == Some(self.conn_id) {
            return;
        }
        drop(self.delivering.lock());
    }
}

impl ConnectionManager {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                events: EventBus::new("gateway-messages"),
                socket: Mutex::new(None),
            }),
        }
    }

    /// Open the socket for `user_id`, replacing any socket already open.
    ///
    /// A failed open is returned to the caller and not retried.
    pub async fn open(&self, user_id: UserId) -> Result<(), GatewayError> {
        self.close();

        let url = self.inner.config.socket_url(user_id);
        info!("WS: OPEN user {}", user_id);

        let (ws, _) = connect_async(url.as_str()).await.map_err(|e| {
            warn!("Gateway connect for user {} failed: {}", user_id, e);
            e
        })?;

        let (sink, stream) = ws.split();
        let conn_id = Uuid::new_v4();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let gate = Arc::new(DeliveryGate::new(conn_id));

        let writer = tokio::spawn(write_loop(sink, outbound_rx));
        let reader = tokio::spawn(read_loop(
            stream,
            self.inner.events.clone(),
            gate.clone(),
            Arc::downgrade(&self.inner),
            conn_id,
        ));
        let keepalive = tokio::spawn(keepalive_loop(
            outbound.clone(),
            self.inner.config.ping_interval,
        ));

        let previous = self.inner.lock().replace(LiveSocket {
            conn_id,
            user_id,
            outbound,
            gate,
            reader,
            keepalive,
            writer: Some(writer),
        });
        // A concurrent open won the race to the slot; its socket goes away.
        drop(previous);

        debug!("Gateway connection {} open for user {}", conn_id, user_id);
        Ok(())
    }

    /// Close the socket if one is open. Safe to call repeatedly.
    ///
    /// Frame handling stops before this returns: handlers already running
    /// finish first, and no frame is published afterwards, including frames
    /// that were already buffered.
    pub fn close(&self) {
        let _ = self.begin_close();
    }

    /// Close, then wait (bounded) until frames queued before the close have
    /// been handed to the socket.
    pub async fn close_and_flush(&self) {
        let Some(writer) = self.begin_close() else {
            return;
        };
        if tokio::time::timeout(FLUSH_TIMEOUT, writer).await.is_err() {
            debug!("Gateway writer still busy after {:?}, leaving it behind", FLUSH_TIMEOUT);
        }
    }

    fn begin_close(&self) -> Option<JoinHandle<()>> {
        let mut socket = self.inner.lock().take()?;
        info!("WS: CLOSE user {}", socket.user_id);
        let _ = socket.outbound.send(Message::Close(None));
        socket.writer.take()
    }

    /// Queue a command on the socket. At most once, no acknowledgement.
    /// Silently dropped when no socket is open.
    pub fn send(&self, command: &GatewayCommand) {
        let guard = self.inner.lock();
        let Some(socket) = guard.as_ref() else {
            debug!("Gateway closed, dropping {} command", command.action());
            return;
        };

        match encode_command(command) {
            Some(frame) => {
                if socket.outbound.send(frame).is_err() {
                    debug!("Gateway writer gone, dropping {} command", command.action());
                }
            }
            None => warn!("Could not encode {} command", command.action()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self.inner.lock().as_ref() {
            Some(_) => ConnectionState::Open,
            None => ConnectionState::Closed,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    /// Bus carrying every accepted inbound frame.
    pub fn events(&self) -> &EventBus<GatewayEvent> {
        &self.inner.events
    }

    #[must_use = "dropping a Subscription unsubscribes it"]
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&GatewayEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(handler)
    }
}

impl ManagerInner {
    fn lock(&self) -> std::sync::MutexGuard<'_, Option<LiveSocket>> {
        self.socket.lock().expect("socket lock poisoned")
    }

    /// Forget the socket after its reader ended, unless a newer socket has
    /// already taken the slot.
    fn release(&self, conn_id: Uuid) {
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|s| s.conn_id == conn_id) {
            let socket = slot.take();
            drop(slot);
            if let Some(socket) = socket {
                info!("WS: CLOSE user {} (dropped by gateway)", socket.user_id);
            }
        }
    }
}

fn encode_command(command: &GatewayCommand) -> Option<Message> {
    let text = serde_json::to_string(command).ok()?;
    trace!("WS: SEND {}", text);
    Some(Message::text(text))
}

async fn write_loop(mut sink: SplitSink<Socket, Message>, mut outbound: mpsc::UnboundedReceiver<Message>) {
    while let Some(frame) = outbound.recv().await {
        let closing = matches!(frame, Message::Close(_));
        if let Err(e) = sink.send(frame).await {
            debug!("Gateway write failed: {}", e);
            break;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(
    mut stream: SplitStream<Socket>,
    events: EventBus<GatewayEvent>,
    gate: Arc<DeliveryGate>,
    manager: Weak<ManagerInner>,
    conn_id: Uuid,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                trace!("WS: {}", text.as_str());
                match decode_frame(text.as_str()) {
                    Ok(Some(event)) => {
                        if !gate.deliver(&events, event) {
                            debug!("Gateway connection {} detached, dropping frame", conn_id);
                            break;
                        }
                    }
                    Ok(None) => debug!("Dropping gateway error frame"),
                    Err(e) => warn!(
                        "Undecodable gateway frame: {} -- raw: {}",
                        e,
                        text.as_str().chars().take(200).collect::<String>()
                    ),
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Gateway read error: {}", e);
                break;
            }
        }
    }

    if let Some(manager) = manager.upgrade() {
        manager.release(conn_id);
    }
}

async fn keepalive_loop(outbound: mpsc::UnboundedSender<Message>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(frame) = encode_command(&GatewayCommand::ping()) else {
            continue;
        };
        if outbound.send(frame).is_err() {
            break;
        }
    }
}
