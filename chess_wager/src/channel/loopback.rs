//! In-process channel used for offline play and tests.

use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::Notify;

use super::{
    ChannelEvent, ClientCommand, ConnectionState, EventHub, RealtimeChannel, ServerEvent,
    Subscription,
    errors::{ChannelError, ChannelResult},
};
use crate::types::GameId;

/// Channel whose "server" is the caller: inbound events are injected with
/// [`deliver`](Self::deliver) and outbound commands are recorded.
pub struct LoopbackChannel {
    hub: EventHub,
    state: Mutex<ConnectionState>,
    sent: Mutex<Vec<ClientCommand>>,
    sent_notify: Notify,
}

impl LoopbackChannel {
    pub fn new() -> Self {
        Self {
            hub: EventHub::new(),
            state: Mutex::new(ConnectionState::Disconnected),
            sent: Mutex::new(Vec::new()),
            sent_notify: Notify::new(),
        }
    }

    /// Inject an untagged server event.
    pub fn deliver(&self, event: ServerEvent) {
        self.hub.publish(ChannelEvent::untagged(event));
    }

    /// Inject a server event tagged for `game_id`.
    pub fn deliver_for(&self, game_id: &GameId, event: ServerEvent) {
        self.hub.publish(ChannelEvent::tagged(game_id.clone(), event));
    }

    /// Commands sent so far, oldest first.
    pub fn sent(&self) -> Vec<ClientCommand> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Wait until at least `count` commands have been sent.
    pub async fn wait_for_sent(&self, count: usize) -> Vec<ClientCommand> {
        loop {
            let notified = self.sent_notify.notified();
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            notified.await;
        }
    }

    /// Simulate the connection dropping.
    pub fn drop_connection(&self) {
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&self, state: ConnectionState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }
}

impl Default for LoopbackChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeChannel for LoopbackChannel {
    async fn connect(&self) -> ChannelResult<()> {
        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> ChannelResult<()> {
        self.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    async fn send(&self, command: ClientCommand) -> ChannelResult<()> {
        if self.state() != ConnectionState::Connected {
            return Err(ChannelError::NotConnected);
        }
        self.sent
            .lock()
            .map_err(|_| ChannelError::Send("loopback poisoned".to_string()))?
            .push(command);
        self.sent_notify.notify_waiters();
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    fn state(&self) -> ConnectionState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(ConnectionState::Disconnected)
    }
}
