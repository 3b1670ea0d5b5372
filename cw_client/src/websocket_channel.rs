//! WebSocket transport for the realtime channel.

use async_trait::async_trait;
use chess_wager::channel::{
    ChannelError, ChannelEvent, ChannelResult, ClientCommand, ConnectionState, EventHub,
    RealtimeChannel, Subscription,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Realtime channel speaking JSON text frames over a websocket.
///
/// Inbound frames are decoded on a reader task and fanned out to every
/// subscription; outbound commands are queued to a writer task so `send`
/// never waits on the socket.
pub struct WebSocketChannel {
    url: String,
    hub: EventHub,
    state: Arc<Mutex<ConnectionState>>,
    link: Mutex<Option<Link>>,
}

/// Tasks and queue of one open connection
struct Link {
    outbound: mpsc::UnboundedSender<String>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl WebSocketChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            hub: EventHub::new(),
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            link: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn set_state(&self, state: ConnectionState) {
        set_state(&self.state, state);
    }

    fn take_link(&self) -> Option<Link> {
        self.link.lock().ok().and_then(|mut link| link.take())
    }
}

fn set_state(shared: &Mutex<ConnectionState>, state: ConnectionState) {
    if let Ok(mut current) = shared.lock() {
        *current = state;
    }
}

#[async_trait]
impl RealtimeChannel for WebSocketChannel {
    async fn connect(&self) -> ChannelResult<()> {
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }
        // Tasks of a connection the server dropped
        if let Some(stale) = self.take_link() {
            stale.reader.abort();
            stale.writer.abort();
        }

        self.set_state(ConnectionState::Connecting);
        let (stream, _) = match connect_async(self.url.as_str()).await {
            Ok(connected) => connected,
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(ChannelError::Connect(e.to_string()));
            }
        };
        log::info!("Connected to {}", self.url);

        let (mut write, mut read) = stream.split();
        let (outbound, mut queue) = mpsc::unbounded_channel::<String>();

        let writer = tokio::spawn(async move {
            while let Some(frame) = queue.recv().await {
                if let Err(e) = write.send(Message::Text(frame.into())).await {
                    log::warn!("WebSocket write failed: {}", e);
                    break;
                }
            }
            let _ = write.close().await;
        });

        let hub = self.hub.clone();
        let state = self.state.clone();
        let reader = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => match ChannelEvent::decode(text.as_str()) {
                        Ok(event) => hub.publish(event),
                        Err(e) => log::warn!("Dropping undecodable frame: {}", e),
                    },
                    Ok(Message::Close(_)) => {
                        log::info!("Server closed connection");
                        break;
                    }
                    Err(e) => {
                        log::warn!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            set_state(&state, ConnectionState::Disconnected);
        });

        if let Ok(mut link) = self.link.lock() {
            *link = Some(Link {
                outbound,
                reader,
                writer,
            });
        }
        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> ChannelResult<()> {
        if let Some(link) = self.take_link() {
            // Closing the queue lets the writer flush and send a close frame
            drop(link.outbound);
            let _ = link.writer.await;
            link.reader.abort();
            log::info!("Disconnected from {}", self.url);
        }
        self.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    async fn send(&self, command: ClientCommand) -> ChannelResult<()> {
        if self.state() != ConnectionState::Connected {
            return Err(ChannelError::NotConnected);
        }
        let frame = command.encode()?;
        let outbound = self
            .link
            .lock()
            .ok()
            .and_then(|link| link.as_ref().map(|link| link.outbound.clone()))
            .ok_or(ChannelError::NotConnected)?;

        log::debug!("Sending {}", command);
        outbound
            .send(frame)
            .map_err(|_| ChannelError::Send("connection writer stopped".to_string()))
    }

    fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    fn state(&self) -> ConnectionState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(ConnectionState::Disconnected)
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        if let Some(link) = self.take_link() {
            link.reader.abort();
            link.writer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let channel = WebSocketChannel::new("ws://127.0.0.1:9");
        let result = channel.send(ClientCommand::Resign).await;
        assert_eq!(result, Err(ChannelError::NotConnected));
    }

    #[tokio::test]
    async fn test_disconnect_when_never_connected_is_ok() {
        let channel = WebSocketChannel::new("ws://127.0.0.1:9");
        assert!(channel.disconnect().await.is_ok());
        assert_eq!(channel.state(), ConnectionState::Disconnected);
    }
}
