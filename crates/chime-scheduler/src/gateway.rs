//! Outbound delivery seam. Implemented by `chime-discord`.

use async_trait::async_trait;

use crate::error::DispatchError;

/// A resolved delivery channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryChannel {
    pub id: String,
    pub name: String,
}

/// Identifies a message the gateway sent, so reactions can be attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    pub channel_id: String,
    pub message_id: String,
}

#[async_trait]
pub trait DispatchGateway: Send + Sync {
    /// Resolve a channel by ID. `ChannelNotFound` when it no longer exists
    /// or the bot cannot see it.
    async fn fetch_channel(&self, channel_id: &str) -> Result<DeliveryChannel, DispatchError>;

    async fn send_message(
        &self,
        channel: &DeliveryChannel,
        text: &str,
    ) -> Result<MessageHandle, DispatchError>;

    /// Attach one reaction. Failure is logged per emoji by the caller.
    async fn add_reaction(&self, message: &MessageHandle, emoji: &str)
        -> Result<(), DispatchError>;
}
