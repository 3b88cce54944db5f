//! Boundary to the real-time transport capability.
//!
//! A transport handle only ever talks back through the `EventSink` it was
//! created with; the session controller is its sole owner.

pub mod discovery;
pub mod mock;
pub mod rtvi;
pub mod websocket;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::EndpointConfig;
use crate::kernel::event::EventSink;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("device initialization failed: {0}")]
    DeviceInit(String),

    #[error("session open failed: {0}")]
    Open(String),

    #[error("session close failed: {0}")]
    Close(String),

    #[error("transport is not connected")]
    NotConnected,

    #[error("protocol error: {0}")]
    Protocol(String),
}

#[async_trait]
pub trait Transport: Send + 'static {
    async fn initialize_devices(&mut self) -> Result<(), TransportError>;

    async fn connect(&mut self, endpoint: &EndpointConfig) -> Result<(), TransportError>;

    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

/// Builds a fresh transport handle bound to one event sink.
pub trait TransportFactory: Send + 'static {
    type Transport: Transport;

    fn create(&mut self, sink: EventSink) -> Self::Transport;
}

impl<F, T> TransportFactory for F
where
    F: FnMut(EventSink) -> T + Send + 'static,
    T: Transport,
{
    type Transport = T;

    fn create(&mut self, sink: EventSink) -> T {
        self(sink)
    }
}
