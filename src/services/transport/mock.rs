use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;

use super::{Transport, TransportError};
use crate::config::EndpointConfig;
use crate::kernel::event::{EventSink, TransportEvent};

/// Shared view into every `MockTransport` a factory has produced.
#[derive(Debug, Default)]
pub struct MockRemote {
    created: AtomicUsize,
    device_inits: AtomicUsize,
    opens: AtomicUsize,
    closes: AtomicUsize,
    fail_device_init: AtomicBool,
    fail_open: AtomicBool,
    fail_close: AtomicBool,
    /// When set, a successful open does not emit `Connected`.
    silent_open: AtomicBool,
    /// When set, `connect` parks until `release_open`.
    hold_open: AtomicBool,
    open_gate: Notify,
    sinks: Mutex<Vec<EventSink>>,
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_device_init(&self, fail: bool) {
        self.fail_device_init.store(fail, Ordering::SeqCst);
    }

    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn silent_open(&self, silent: bool) {
        self.silent_open.store(silent, Ordering::SeqCst);
    }

    pub fn hold_open(&self, hold: bool) {
        self.hold_open.store(hold, Ordering::SeqCst);
    }

    /// Lets one parked `connect` continue.
    pub fn release_open(&self) {
        self.hold_open.store(false, Ordering::SeqCst);
        self.open_gate.notify_one();
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn device_inits(&self) -> usize {
        self.device_inits.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Sink of the most recently created handle.
    pub fn latest_sink(&self) -> Option<EventSink> {
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Emits as if the most recent handle had delivered the callback.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.latest_sink().map(|sink| sink.emit(event)).unwrap_or(false)
    }

    fn register(&self, sink: &EventSink) {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink.clone());
    }
}

/// In-process transport driven entirely by its `MockRemote`.
#[derive(Debug)]
pub struct MockTransport {
    remote: Arc<MockRemote>,
    sink: EventSink,
    open: bool,
}

impl MockTransport {
    pub fn new(remote: Arc<MockRemote>, sink: EventSink) -> Self {
        remote.register(&sink);
        Self {
            remote,
            sink,
            open: false,
        }
    }

    pub fn factory(remote: Arc<MockRemote>) -> impl FnMut(EventSink) -> MockTransport + Send + 'static {
        move |sink| MockTransport::new(remote.clone(), sink)
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn initialize_devices(&mut self) -> Result<(), TransportError> {
        self.remote.device_inits.fetch_add(1, Ordering::SeqCst);
        if self.remote.fail_device_init.load(Ordering::SeqCst) {
            return Err(TransportError::DeviceInit("microphone unavailable".into()));
        }
        Ok(())
    }

    async fn connect(&mut self, endpoint: &EndpointConfig) -> Result<(), TransportError> {
        self.remote.opens.fetch_add(1, Ordering::SeqCst);
        if self.remote.hold_open.load(Ordering::SeqCst) {
            self.remote.open_gate.notified().await;
        }
        if self.remote.fail_open.load(Ordering::SeqCst) {
            return Err(TransportError::Open(format!("{endpoint} refused the connection")));
        }
        self.open = true;
        if !self.remote.silent_open.load(Ordering::SeqCst) {
            self.sink.emit(TransportEvent::Connected);
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.remote.closes.fetch_add(1, Ordering::SeqCst);
        if self.remote.fail_close.load(Ordering::SeqCst) {
            return Err(TransportError::Close("peer did not acknowledge close".into()));
        }
        self.open = false;
        self.sink.emit(TransportEvent::Disconnected);
        Ok(())
    }
}
