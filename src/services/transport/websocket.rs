use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{rtvi, Transport, TransportError};
use crate::config::EndpointConfig;
use crate::kernel::event::{EventSink, TransportEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// RTVI-over-WebSocket transport.
///
/// Audio capture and playback belong to the media layer outside this crate;
/// binary frames are ignored here.
pub struct WebSocketTransport {
    sink: EventSink,
    writer: Option<SplitSink<WsStream, Message>>,
    reader: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    pub fn new(sink: EventSink) -> Self {
        Self {
            sink,
            writer: None,
            reader: None,
        }
    }

    async fn read_loop(mut read: SplitStream<WsStream>, sink: EventSink) {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if let Some(event) = rtvi::decode(&text) {
                        if !sink.emit(event) {
                            return;
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    sink.emit(TransportEvent::Disconnected);
                    return;
                }
                Ok(_) => {} // binary audio, ping/pong
                Err(err) => {
                    warn!("WebSocket receive error: {err}");
                    sink.emit(TransportEvent::Error(err.to_string()));
                    return;
                }
            }
        }
        debug!("WebSocket stream ended");
        sink.emit(TransportEvent::Disconnected);
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn initialize_devices(&mut self) -> Result<(), TransportError> {
        // Nothing local to acquire: media devices are owned by the media layer.
        debug!(generation = self.sink.generation(), "no local capture devices to initialize");
        Ok(())
    }

    async fn connect(&mut self, endpoint: &EndpointConfig) -> Result<(), TransportError> {
        let url = endpoint.url();
        info!("WebSocket connect: {url}");

        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Open(e.to_string()))?;
        let (mut write, read) = stream.split();

        write
            .send(Message::Text(rtvi::client_ready()))
            .await
            .map_err(|e| TransportError::Open(format!("client-ready not delivered: {e}")))?;

        self.reader = Some(tokio::spawn(Self::read_loop(read, self.sink.clone())));
        self.writer = Some(write);
        self.sink.emit(TransportEvent::Connected);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let mut writer = self.writer.take().ok_or(TransportError::NotConnected)?;
        let result = writer
            .send(Message::Close(None))
            .await
            .map_err(|e| TransportError::Close(e.to_string()));
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        result
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
