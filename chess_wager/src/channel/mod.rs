//! Realtime channel to the matchmaking server.
//!
//! The channel is the only transport for session-control signals and the
//! only source of truth for whether a match has started. Transports are
//! injected into a session as `Arc<dyn RealtimeChannel>`; each consumer
//! takes its own [`Subscription`], which is released when dropped.
//!
//! ## Example
//!
//! ```
//! use chess_wager::channel::{LoopbackChannel, RealtimeChannel, ServerEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let channel = LoopbackChannel::new();
//! let mut subscription = channel.subscribe();
//! channel.connect().await.unwrap();
//!
//! channel.deliver(ServerEvent::DrawOffer);
//! let event = subscription.recv().await.unwrap();
//! assert_eq!(event.event, ServerEvent::DrawOffer);
//! # }
//! ```

pub mod errors;
pub mod loopback;
pub mod messages;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::constants::CHANNEL_EVENT_CAPACITY;

pub use errors::{ChannelError, ChannelResult};
pub use loopback::LoopbackChannel;
pub use messages::{
    ChannelEvent, ClientCommand, CreateRequest, GameInfo, MatchResult, MoveUpdate, RoundOutcome,
    ServerEvent, StartInfo,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Bidirectional event connection to the matchmaking server.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Open the connection. Connecting an open channel is a no-op.
    async fn connect(&self) -> ChannelResult<()>;

    /// Close the connection. Existing subscriptions stay valid and receive
    /// events again after a reconnect.
    async fn disconnect(&self) -> ChannelResult<()>;

    /// Send a command to the server.
    async fn send(&self, command: ClientCommand) -> ChannelResult<()>;

    /// Register for inbound events, in server order.
    fn subscribe(&self) -> Subscription;

    fn state(&self) -> ConnectionState;
}

/// Handle on the inbound event stream of a channel.
pub struct Subscription {
    receiver: broadcast::Receiver<ChannelEvent>,
}

impl Subscription {
    /// Next inbound event, or `None` once the channel is gone for good.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::error!("Subscriber lagged, {} channel events dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Fan-out of inbound events to subscribers, shared by transports.
#[derive(Clone)]
pub struct EventHub {
    sender: broadcast::Sender<ChannelEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_EVENT_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: ChannelEvent) {
        log::debug!("Channel event {} (game {:?})", event.event.name(), event.game_id);
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
