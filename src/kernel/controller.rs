use serde::Serialize;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::{ConnectStage, SessionError};
use super::event::{Command, Envelope, EventSink, TransportEvent};
use super::ledger::{ConversationLedger, ConversationTurn, Speaker};
use super::log::{BoundedLog, LogEntry, LOG_CAPACITY};
use super::status::{SessionStatus, StatusGraph, StatusRequest};
use super::telemetry::{
    AggregatedRawView, KindRegistry, MetricsAggregator, TimelineView, RAW_WINDOW_CAPACITY,
};
use crate::config::EndpointConfig;
use crate::services::transport::{Transport, TransportError, TransportFactory};

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub endpoint: EndpointConfig,
    pub log_capacity: usize,
    pub metrics_window: usize,
    pub kinds: KindRegistry,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            log_capacity: LOG_CAPACITY,
            metrics_window: RAW_WINDOW_CAPACITY,
            kinds: KindRegistry::default(),
        }
    }
}

/// Everything the presentation layer may read, published after each change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub listening: bool,
    pub logs: Vec<LogEntry>,
    pub turns: Vec<ConversationTurn>,
    pub raw_view: AggregatedRawView,
    pub timeline: TimelineView,
}

/// Owns the single transport handle and routes its events.
///
/// # HANDLE INVARIANT
/// `handle` is `None` whenever the status is terminal. Each handle is created
/// with a fresh generation; events carrying any other generation are stale
/// and dropped before they can touch state.
///
/// # SCOPING
/// Every terminal transition clears the conversation ledger and the metrics
/// window. Neither outlives one session.
pub struct SessionController<F: TransportFactory> {
    config: ControllerConfig,
    factory: F,
    events_tx: mpsc::UnboundedSender<Envelope>,
    status: SessionStatus,
    handle: Option<F::Transport>,
    active_generation: Option<u64>,
    next_generation: u64,
    connect_in_flight: bool,
    log: BoundedLog,
    ledger: ConversationLedger,
    metrics: MetricsAggregator,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl<F: TransportFactory> SessionController<F> {
    /// `events_tx` is the write end of the queue later passed to `run` (or
    /// drained by hand into `dispatch`).
    pub fn new(config: ControllerConfig, factory: F, events_tx: mpsc::UnboundedSender<Envelope>) -> Self {
        let log = BoundedLog::with_capacity(config.log_capacity);
        let metrics = MetricsAggregator::with_capacity(config.kinds.clone(), config.metrics_window);
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
        Self {
            config,
            factory,
            events_tx,
            status: SessionStatus::Disconnected,
            handle: None,
            active_generation: None,
            next_generation: 1,
            connect_in_flight: false,
            log,
            ledger: ConversationLedger::new(),
            metrics,
            snapshot_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        let rx = self.snapshot_tx.subscribe();
        self.snapshot_tx.send_replace(self.snapshot());
        rx
    }

    /// Opens a session. A no-op while an attempt is in flight or a session
    /// is already up. Failures end in `Error`, never in a returned fault.
    pub async fn connect(&mut self) {
        if self.connect_in_flight || !self.status.can_connect() {
            debug!(status = %self.status, "connect ignored");
            return;
        }
        self.connect_in_flight = true;
        self.push_log("Attempting to connect...");
        self.apply(StatusRequest::ConnectRequested, "Connect requested");

        if self.handle.is_none() {
            let generation = self.next_generation;
            self.next_generation += 1;
            let sink = EventSink::new(generation, self.events_tx.clone());
            self.handle = Some(self.factory.create(sink));
            self.active_generation = Some(generation);
            debug!(generation, "transport handle created");
        }
        self.publish();

        let started = Instant::now();
        let outcome = self.open_session().await;
        self.connect_in_flight = false;

        match outcome {
            Ok(()) => {
                let elapsed = started.elapsed().as_millis();
                info!(elapsed_ms = elapsed as u64, "transport open");
                self.push_log(format!("Connection complete, timeTaken: {elapsed}ms"));
            }
            Err(err) => {
                error!("{err}");
                self.push_log(err.to_string());
                self.release_handle();
                self.apply(StatusRequest::ConnectFailed, "Connect failed");
                self.reset_session();
            }
        }
        self.publish();
    }

    async fn open_session(&mut self) -> Result<(), SessionError> {
        self.push_log("Initializing devices...");
        let handle = self.handle.as_mut().ok_or(SessionError::ConnectFailure {
            stage: ConnectStage::DeviceInit,
            source: TransportError::NotConnected,
        })?;
        handle
            .initialize_devices()
            .await
            .map_err(|source| SessionError::ConnectFailure {
                stage: ConnectStage::DeviceInit,
                source,
            })?;

        let endpoint = self.config.endpoint.clone();
        self.push_log(format!("Connecting to {endpoint}..."));
        let handle = self.handle.as_mut().ok_or(SessionError::ConnectFailure {
            stage: ConnectStage::Open,
            source: TransportError::NotConnected,
        })?;
        handle
            .connect(&endpoint)
            .await
            .map_err(|source| SessionError::ConnectFailure {
                stage: ConnectStage::Open,
                source,
            })
    }

    /// Closes the live session. The outcome of the close never blocks the
    /// local reset. Without a live handle this does nothing.
    pub async fn disconnect(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            if !self.status.is_terminal() {
                // A previous disconnect was dropped after taking the handle.
                self.connect_in_flight = false;
                self.apply(StatusRequest::DisconnectRequested, "Disconnect requested");
                self.reset_session();
                self.publish();
            } else {
                debug!(status = %self.status, "disconnect ignored: no live session");
            }
            return;
        };
        // The handle's own Disconnected callback is now stale.
        self.active_generation = None;
        // A connect dropped before it settled leaves nothing in flight.
        self.connect_in_flight = false;
        self.push_log("Disconnecting...");

        match handle.disconnect().await {
            Ok(()) => self.push_log("Disconnected successfully"),
            Err(source) => {
                let err = SessionError::DisconnectFailure(source);
                warn!("{err}");
                self.push_log(err.to_string());
            }
        }
        drop(handle);

        self.apply(StatusRequest::DisconnectRequested, "Disconnect requested");
        self.reset_session();
        self.publish();
    }

    /// Applies one queued transport event, unless it came from a handle that
    /// has since been released.
    pub fn dispatch(&mut self, envelope: Envelope) {
        if self.active_generation != Some(envelope.generation) {
            debug!(
                generation = envelope.generation,
                active = ?self.active_generation,
                "discarded stale transport event"
            );
            return;
        }
        self.handle_event(envelope.event);
        self.publish();
    }

    fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                self.apply(StatusRequest::TransportConnected, "Transport connected");
            }
            TransportEvent::Disconnected => {
                self.release_handle();
                self.apply(StatusRequest::TransportDisconnected, "Transport disconnected");
                self.reset_session();
            }
            TransportEvent::BotReady(info) => {
                info!("bot ready");
                self.push_log(format!("Bot ready: {info}"));
            }
            TransportEvent::Transcript { speaker: Speaker::User, text, is_final } => {
                if self.ledger.on_user_utterance(&text, is_final).is_some() {
                    self.push_log(format!("User: {text}"));
                } else {
                    debug!(partial = %text, "user speaking");
                }
            }
            TransportEvent::Transcript { speaker: Speaker::Agent, text, .. } => {
                self.ledger.on_agent_utterance(&text);
                self.push_log(format!("Bot: {text}"));
            }
            TransportEvent::Metrics(bag) => self.metrics.ingest(&bag),
            TransportEvent::MessageError(message) => self.fail(SessionError::ProtocolMessage(message)),
            TransportEvent::Error(message) => self.fail(SessionError::Transport(message)),
        }
    }

    fn fail(&mut self, err: SessionError) {
        error!("{err}");
        self.push_log(err.to_string());
        self.release_handle();
        self.apply(StatusRequest::TransportError, "Transport failure");
        self.reset_session();
    }

    /// Process teardown. A live handle gets a close request that nobody
    /// waits for. Also settles a connect or disconnect that was dropped
    /// mid-flight.
    pub fn shutdown(&mut self) {
        self.connect_in_flight = false;
        self.active_generation = None;

        match self.handle.take() {
            Some(mut handle) => match Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        if let Err(err) = handle.disconnect().await {
                            warn!("close on shutdown failed: {err}");
                        }
                    });
                }
                Err(_) => warn!("no runtime at shutdown; transport dropped without close"),
            },
            None if self.status.is_terminal() => return,
            None => {}
        }

        self.apply(StatusRequest::Shutdown, "Shutdown");
        self.reset_session();
        self.publish();
    }

    /// Serves commands and transport events until cancelled or until every
    /// command sender is gone. Events are handled one at a time, in delivery
    /// order; a connect or disconnect runs to completion before the next
    /// message is looked at, unless cancellation arrives first. Cancelling
    /// drops the pending transport call and falls through to `shutdown`.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<Envelope>,
        shutdown: CancellationToken,
    ) {
        info!(endpoint = %self.config.endpoint, "session loop started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(envelope) = events.recv() => self.dispatch(envelope),
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    let cancelled = tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => true,
                        _ = self.execute(command) => false,
                    };
                    if cancelled {
                        warn!(?command, "cancelled while the transport call was pending");
                        break;
                    }
                }
            }
        }
        self.shutdown();
        info!("session loop stopped");
    }

    async fn execute(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect().await,
            Command::Disconnect => self.disconnect().await,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn has_handle(&self) -> bool {
        self.handle.is_some()
    }

    pub fn is_listening(&self) -> bool {
        self.ledger.is_listening()
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.log.snapshot()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        self.ledger.turns()
    }

    pub fn metrics(&self) -> &MetricsAggregator {
        &self.metrics
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.config.endpoint
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            listening: self.ledger.is_listening(),
            logs: self.log.snapshot(),
            turns: self.ledger.turns().to_vec(),
            raw_view: self.metrics.raw_view(),
            timeline: self.metrics.timeline_view(),
        }
    }

    fn apply(&mut self, request: StatusRequest, reason: &str) -> bool {
        let prev = self.status;
        match StatusGraph::transition(prev, request) {
            Some(next) => {
                self.status = next;
                info!(from = %prev, to = %next, "{reason}");
                self.push_log(format!("{reason} [{prev} -> {next}]"));
                true
            }
            None => {
                debug!(?request, status = %prev, "transition not applicable");
                false
            }
        }
    }

    fn release_handle(&mut self) {
        if self.handle.take().is_some() {
            debug!(generation = ?self.active_generation, "transport handle released");
        }
        self.active_generation = None;
        self.connect_in_flight = false;
    }

    fn reset_session(&mut self) {
        self.ledger.reset();
        self.metrics.reset();
    }

    fn push_log(&mut self, message: impl Into<String>) {
        self.log.append(message);
    }

    fn publish(&self) {
        if self.snapshot_tx.receiver_count() == 0 {
            return;
        }
        self.snapshot_tx.send_replace(self.snapshot());
    }
}

impl<F: TransportFactory> Drop for SessionController<F> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
