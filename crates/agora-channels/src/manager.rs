use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError, Weak,
};
use std::time::Duration;

use agora_core::{ConnId, RealtimeConfig};
use agora_protocol::{event_types, parse_frame, Envelope, Event};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::{
    runtime::Handle,
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Instant, Interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
    backoff::Backoff,
    error::ChannelError,
    registry::{HandlerRegistry, Subscription},
    transport::{Connection, Connector},
    types::{CloseInfo, ConnectionState, TransportFrame},
    ws::WsConnector,
};

/// Owns one logical realtime connection: dispatches inbound envelopes by
/// `type` and re-establishes the connection after unexpected loss.
///
/// Cloning is cheap and every clone drives the same connection, so a session
/// creates one manager and hands clones to its consumers. When the last clone
/// is dropped the connection is closed normally.
#[derive(Clone)]
pub struct ChannelManager {
    inner: Arc<Inner>,
}

enum Command {
    Send(String),
    Close,
}

/// The physical connection currently owned by the manager.
struct Link {
    id: u64,
    conn_id: ConnId,
    /// Cleared before the link is closed; a detached link never dispatches.
    attached: Arc<AtomicBool>,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

struct PendingReconnect {
    id: u64,
    task: JoinHandle<()>,
}

struct Shared {
    link: Option<Link>,
    /// At most one timer is ever pending.
    reconnect: Option<PendingReconnect>,
    /// Link id whose normal closure is still being flushed.
    closing: Option<u64>,
    /// Set by `close()`; suppresses reconnects until the next explicit `connect()`.
    shutdown: bool,
    backoff: Backoff,
    next_id: u64,
}

struct Inner {
    config: RealtimeConfig,
    connector: Arc<dyn Connector>,
    registry: Arc<HandlerRegistry>,
    runtime: Handle,
    shared: Mutex<Shared>,
    state_tx: watch::Sender<ConnectionState>,
    attempts: AtomicU64,
}

impl ChannelManager {
    /// Create a manager bound to the current Tokio runtime. Does not connect.
    pub fn new(config: RealtimeConfig, connector: Arc<dyn Connector>) -> Result<Self, ChannelError> {
        let runtime = Handle::try_current().map_err(|_| ChannelError::NoRuntime)?;
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let backoff = Backoff::new(config.reconnect.clone());

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                connector,
                registry: Arc::new(HandlerRegistry::new()),
                runtime,
                shared: Mutex::new(Shared {
                    link: None,
                    reconnect: None,
                    closing: None,
                    shutdown: false,
                    backoff,
                    next_id: 1,
                }),
                state_tx,
                attempts: AtomicU64::new(0),
            }),
        })
    }

    /// Manager over the WebSocket transport, authenticated with `config.cookie`.
    pub fn websocket(config: RealtimeConfig) -> Result<Self, ChannelError> {
        let connector = Arc::new(WsConnector::from_config(&config));
        Self::new(config, connector)
    }

    /// Open a connection unless one is already open or being opened.
    ///
    /// Returns immediately; the outcome is observable through [`state`](Self::state).
    pub fn connect(&self) {
        let mut shared = self.inner.lock();
        self.inner.connect_locked(&mut shared);
    }

    /// Detach the current connection, then close it with the normal-closure code.
    ///
    /// Cancels any pending reconnect. Once this returns no handler is invoked
    /// for frames of the closed connection, and nothing reconnects until
    /// [`connect`](Self::connect) is called again.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Queue `envelope` on the open connection.
    ///
    /// Delivery is best-effort: when the channel is not open the frame is
    /// dropped, a reconnect is triggered and `NotConnected` is returned.
    pub fn send(&self, envelope: &Envelope) -> Result<(), ChannelError> {
        let text = envelope.to_json().map_err(|e| {
            warn!(event_type = %envelope.event_type, error = %e, "failed to encode outbound envelope");
            ChannelError::from(e)
        })?;

        let mut shared = self.inner.lock();
        let state = self.inner.state();
        if state == ConnectionState::Open {
            if let Some(link) = &shared.link {
                if link.commands.send(Command::Send(text)).is_ok() {
                    return Ok(());
                }
            }
        }

        warn!(
            event_type = %envelope.event_type,
            state = %state,
            "channel not open, outbound frame dropped"
        );
        if !shared.shutdown {
            self.inner.connect_locked(&mut shared);
        }
        Err(ChannelError::NotConnected)
    }

    pub fn send_event<E: Event>(&self, event: &E) -> Result<(), ChannelError> {
        let envelope = Envelope::new(E::TYPE, event).map_err(|e| {
            warn!(event_type = E::TYPE, error = %e, "failed to encode outbound event");
            ChannelError::from(e)
        })?;
        self.send(&envelope)
    }

    /// Install the primary handler for `event_type`, replacing any previous one.
    pub fn on_event<F>(&self, event_type: &str, handler: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        if self.inner.registry.set_primary(event_type, Arc::new(handler)) {
            debug!(event_type, "primary handler replaced");
        }
    }

    /// Typed form of [`on_event`](Self::on_event).
    pub fn on<E, F>(&self, handler: F)
    where
        E: Event,
        F: Fn(E) + Send + Sync + 'static,
    {
        self.on_event(E::TYPE, typed::<E, F>(E::TYPE, handler));
    }

    /// Remove the primary handler for `event_type`. Subscriptions stay.
    pub fn off(&self, event_type: &str) -> bool {
        self.inner.registry.remove_primary(event_type)
    }

    /// Add a handler for `event_type` next to any others. It stays registered
    /// for as long as the returned [`Subscription`] lives.
    pub fn subscribe<F>(&self, event_type: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.inner.registry.add(event_type, Arc::new(handler));
        Subscription::new(&self.inner.registry, event_type, id)
    }

    pub fn subscribe_to<E, F>(&self, handler: F) -> Subscription
    where
        E: Event,
        F: Fn(E) + Send + Sync + 'static,
    {
        self.subscribe_typed::<E, F>(E::TYPE, handler)
    }

    /// Subscribe to `event_type`, decoding payloads as `E`. Used where the
    /// server sends one shape under more than one name.
    pub fn subscribe_typed<E, F>(&self, event_type: &str, handler: F) -> Subscription
    where
        E: Event,
        F: Fn(E) + Send + Sync + 'static,
    {
        self.subscribe(event_type, typed::<E, F>(event_type, handler))
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Wait until the channel is `Open`, for at most `timeout`.
    pub async fn wait_until_open(&self, timeout: Duration) -> Result<(), ChannelError> {
        let mut rx = self.watch_state();
        // the watch::Ref borrows rx, release it before matching
        let waited = tokio::time::timeout(timeout, rx.wait_for(|s| *s == ConnectionState::Open))
            .await
            .map(|r| r.map(|_| ()));
        match waited {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ChannelError::NotConnected),
            Err(_) => Err(ChannelError::Timeout {
                ms: timeout.as_millis() as u64,
            }),
        }
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.inner.lock().reconnect.is_some()
    }

    /// Physical connections opened (or attempted) since construction.
    pub fn connection_attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    pub fn url(&self) -> &str {
        &self.inner.config.url
    }
}

impl std::fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelManager")
            .field("url", &self.inner.config.url)
            .field("connector", &self.inner.connector.name())
            .field("state", &self.inner.state())
            .finish()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    fn connect_locked(self: &Arc<Self>, shared: &mut Shared) {
        match self.state() {
            ConnectionState::Connecting | ConnectionState::Open => {
                debug!(state = %self.state(), "connect ignored, connection already live");
            }
            _ => self.open_link(shared),
        }
    }

    fn open_link(self: &Arc<Self>, shared: &mut Shared) {
        if let Some(pending) = shared.reconnect.take() {
            pending.task.abort();
        }
        if let Some(stale) = shared.link.take() {
            stale.attached.store(false, Ordering::Release);
        }
        shared.shutdown = false;
        shared.closing = None;

        let id = shared.next_id;
        shared.next_id += 1;
        let conn_id = ConnId::new();
        let attached = Arc::new(AtomicBool::new(true));
        let (commands, commands_rx) = mpsc::unbounded_channel();

        self.set_state(ConnectionState::Connecting);
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            conn_id = %conn_id,
            url = %self.config.url,
            transport = self.connector.name(),
            attempt,
            "opening realtime connection"
        );

        let driver = Driver {
            inner: Arc::downgrade(self),
            id,
            conn_id: conn_id.clone(),
            attached: Arc::clone(&attached),
            connector: Arc::clone(&self.connector),
            registry: Arc::clone(&self.registry),
            url: self.config.url.clone(),
            max_frame_bytes: self.config.max_frame_bytes,
            untagged_event_type: self.config.untagged_event_type.clone(),
            heartbeat: self
                .config
                .heartbeat_interval_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        };
        let task = self.runtime.spawn(driver.run(commands_rx));

        shared.link = Some(Link {
            id,
            conn_id,
            attached,
            commands,
            task,
        });
    }

    fn close(&self) {
        let mut shared = self.lock();
        shared.shutdown = true;
        if let Some(pending) = shared.reconnect.take() {
            pending.task.abort();
            debug!("pending reconnect cancelled");
        }

        let state = self.state();
        let Some(link) = shared.link.take() else {
            if !matches!(state, ConnectionState::Idle | ConnectionState::Closing) {
                self.set_state(ConnectionState::Closed);
            }
            return;
        };

        // detach first: nothing from this link may dispatch or reconnect from here on
        link.attached.store(false, Ordering::Release);

        if state == ConnectionState::Open && link.commands.send(Command::Close).is_ok() {
            shared.closing = Some(link.id);
            self.set_state(ConnectionState::Closing);
        } else {
            link.task.abort();
            self.set_state(ConnectionState::Closed);
        }
        info!(conn_id = %link.conn_id, "realtime channel closed by client");
    }

    /// Called by a driver once its handshake completed. Returns `false` when
    /// the link was detached or replaced in the meantime.
    fn link_opened(&self, id: u64) -> bool {
        let mut shared = self.lock();
        let current = shared
            .link
            .as_ref()
            .is_some_and(|link| link.id == id && link.attached.load(Ordering::Acquire));
        if current {
            shared.backoff.reset();
            self.set_state(ConnectionState::Open);
        }
        current
    }

    /// Called by a driver when its connection is gone, for whatever reason.
    fn link_closed(self: &Arc<Self>, id: u64, close: Option<CloseInfo>) {
        let mut shared = self.lock();

        if shared.closing == Some(id) {
            shared.closing = None;
            self.set_state(ConnectionState::Closed);
            return;
        }

        let current = shared.link.as_ref().is_some_and(|link| link.id == id);
        if !current {
            // detached by close() or replaced; its closure must not reconnect
            return;
        }
        if let Some(link) = shared.link.take() {
            match &close {
                Some(info) => info!(
                    conn_id = %link.conn_id,
                    code = info.code,
                    reason = %info.reason,
                    "realtime connection closed by server"
                ),
                None => warn!(conn_id = %link.conn_id, "realtime connection lost"),
            }
        }
        self.set_state(ConnectionState::Closed);
        self.schedule_reconnect(&mut shared);
    }

    fn schedule_reconnect(self: &Arc<Self>, shared: &mut Shared) {
        if let Some(stale) = shared.reconnect.take() {
            stale.task.abort();
        }

        let Some(delay) = shared.backoff.next_delay() else {
            warn!(
                attempts = shared.backoff.attempts(),
                "reconnect disabled or attempts exhausted, channel stays closed"
            );
            return;
        };

        let id = shared.next_id;
        shared.next_id += 1;
        let weak = Arc::downgrade(self);
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.fire_reconnect(id);
            }
        });
        shared.reconnect = Some(PendingReconnect { id, task });

        info!(
            delay_ms = delay.as_millis() as u64,
            attempt = shared.backoff.attempts(),
            "reconnect scheduled"
        );
    }

    fn fire_reconnect(self: &Arc<Self>, id: u64) {
        let mut shared = self.lock();
        if shared.reconnect.as_ref().map(|p| p.id) != Some(id) {
            return;
        }
        shared.reconnect = None;
        debug!("reconnect timer fired");
        self.connect_locked(&mut shared);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let shared = self.shared.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(pending) = shared.reconnect.take() {
            pending.task.abort();
        }
        // dropping the command sender makes the driver close normally
        if let Some(link) = shared.link.take() {
            link.attached.store(false, Ordering::Release);
            debug!(conn_id = %link.conn_id, "channel manager dropped, closing connection");
        }
    }
}

/// Task owning one physical connection from handshake to closure.
struct Driver {
    inner: Weak<Inner>,
    id: u64,
    conn_id: ConnId,
    attached: Arc<AtomicBool>,
    connector: Arc<dyn Connector>,
    registry: Arc<HandlerRegistry>,
    url: String,
    max_frame_bytes: usize,
    untagged_event_type: Option<String>,
    heartbeat: Option<Duration>,
}

impl Driver {
    async fn run(self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let Connection {
            mut sink,
            mut stream,
        } = match self.connector.connect(&self.url).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!(conn_id = %self.conn_id, error = %e, "realtime connection attempt failed");
                self.closed(None);
                return;
            }
        };

        let opened = self
            .inner
            .upgrade()
            .is_some_and(|inner| inner.link_opened(self.id));
        if !opened {
            debug!(conn_id = %self.conn_id, "connection no longer wanted, closing");
            let _ = sink.send(TransportFrame::Close(Some(CloseInfo::normal()))).await;
            let _ = sink.close().await;
            return;
        }
        info!(conn_id = %self.conn_id, "realtime channel open");

        let mut heartbeat = self.heartbeat.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        let close = loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(TransportFrame::Text(text))) => self.dispatch(&text),
                    Some(Ok(TransportFrame::Close(info))) => break info,
                    // errors are usually followed by the stream ending; closure is decided there
                    Some(Err(e)) => warn!(conn_id = %self.conn_id, error = %e, "transport error"),
                    None => break None,
                },
                command = commands.recv() => match command {
                    Some(Command::Send(text)) => {
                        if let Err(e) = sink.send(TransportFrame::Text(text)).await {
                            warn!(conn_id = %self.conn_id, error = %e, "outbound frame dropped");
                        }
                    }
                    Some(Command::Close) | None => {
                        let _ = sink.send(TransportFrame::Close(Some(CloseInfo::normal()))).await;
                        let _ = sink.close().await;
                        self.closed(Some(CloseInfo::normal()));
                        return;
                    }
                },
                _ = tick(&mut heartbeat) => {
                    if let Ok(ping) = Envelope::bare(event_types::PING).to_json() {
                        if let Err(e) = sink.send(TransportFrame::Text(ping)).await {
                            debug!(conn_id = %self.conn_id, error = %e, "heartbeat not sent");
                        }
                    }
                }
            }
        };

        self.closed(close);
    }

    fn closed(&self, close: Option<CloseInfo>) {
        if let Some(inner) = self.inner.upgrade() {
            inner.link_closed(self.id, close);
        }
    }

    fn dispatch(&self, text: &str) {
        if text.len() > self.max_frame_bytes {
            warn!(
                conn_id = %self.conn_id,
                size = text.len(),
                max = self.max_frame_bytes,
                "inbound frame too large, dropped"
            );
            return;
        }

        let envelope = match parse_frame(text, self.untagged_event_type.as_deref()) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(conn_id = %self.conn_id, error = %e, "malformed frame dropped");
                return;
            }
        };

        let handlers = self.registry.handlers_for(&envelope.event_type);
        if handlers.is_empty() {
            debug!(event_type = %envelope.event_type, "no handler registered, frame dropped");
            return;
        }

        let payload = envelope.payload();
        for handler in handlers {
            if !self.attached.load(Ordering::Acquire) {
                debug!(conn_id = %self.conn_id, "link detached, dispatch stopped");
                return;
            }
            if catch_unwind(AssertUnwindSafe(|| handler(&payload))).is_err() {
                error!(event_type = %envelope.event_type, "event handler panicked");
            }
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Wrap a typed handler into a raw one. Payloads of the wrong shape are dropped.
fn typed<E, F>(event_type: &str, handler: F) -> impl Fn(&Value) + Send + Sync + 'static
where
    E: Event,
    F: Fn(E) + Send + Sync + 'static,
{
    let event_type = event_type.to_string();
    move |payload: &Value| match E::deserialize(payload) {
        Ok(event) => handler(event),
        Err(e) => warn!(event_type = %event_type, error = %e, "payload does not match event shape, dropped"),
    }
}
