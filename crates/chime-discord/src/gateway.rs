//! [`DispatchGateway`] over Discord's REST API.

use std::sync::Arc;

use async_trait::async_trait;
use serenity::http::Http;
use serenity::model::channel::Channel;
use serenity::model::id::{ChannelId, MessageId};
use tracing::debug;

use chime_core::config::DiscordConfig;
use chime_scheduler::{DeliveryChannel, DispatchError, DispatchGateway, MessageHandle};

use crate::error::DiscordError;
use crate::reaction::parse_reaction;
use crate::send::send_chunked;

/// Sends reminders with a REST-only serenity client; no gateway session is
/// needed to post messages or add reactions.
pub struct DiscordGateway {
    http: Arc<Http>,
}

impl DiscordGateway {
    pub fn new(bot_token: &str) -> Self {
        Self {
            http: Arc::new(Http::new(bot_token)),
        }
    }

    pub fn from_config(config: &DiscordConfig) -> Result<Self, DiscordError> {
        match config.bot_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Ok(Self::new(token)),
            _ => Err(DiscordError::NoToken),
        }
    }
}

/// Parse a stored snowflake. Discord IDs are non-zero u64s.
pub fn parse_snowflake(raw: &str) -> Result<u64, DiscordError> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|&id| id != 0)
        .ok_or_else(|| DiscordError::InvalidId(raw.to_string()))
}

fn channel_id(raw: &str) -> Result<ChannelId, DispatchError> {
    parse_snowflake(raw)
        .map(ChannelId::new)
        .map_err(|_| DispatchError::ChannelNotFound {
            channel_id: raw.to_string(),
        })
}

#[async_trait]
impl DispatchGateway for DiscordGateway {
    async fn fetch_channel(&self, raw_id: &str) -> Result<DeliveryChannel, DispatchError> {
        let id = channel_id(raw_id)?;
        let channel = id.to_channel(&self.http).await.map_err(|e| {
            debug!(channel_id = %raw_id, error = %e, "discord: channel lookup failed");
            DispatchError::ChannelNotFound {
                channel_id: raw_id.to_string(),
            }
        })?;
        let name = match channel {
            Channel::Guild(guild_channel) => guild_channel.name,
            other => other.id().to_string(),
        };
        Ok(DeliveryChannel {
            id: raw_id.to_string(),
            name,
        })
    }

    async fn send_message(
        &self,
        channel: &DeliveryChannel,
        text: &str,
    ) -> Result<MessageHandle, DispatchError> {
        let id = channel_id(&channel.id)?;
        let message = send_chunked(&self.http, id, text)
            .await
            .map_err(|e| DispatchError::Send(e.to_string()))?;
        debug!(channel_id = %channel.id, message_id = %message.id, "discord: reminder sent");
        Ok(MessageHandle {
            channel_id: channel.id.clone(),
            message_id: message.id.get().to_string(),
        })
    }

    async fn add_reaction(&self, message: &MessageHandle, emoji: &str) -> Result<(), DispatchError> {
        let reaction = parse_reaction(emoji)
            .ok_or_else(|| DispatchError::Reaction(format!("unrecognised emoji {emoji:?}")))?;
        let channel = channel_id(&message.channel_id)?;
        let message_id = parse_snowflake(&message.message_id)
            .map(MessageId::new)
            .map_err(|e| DispatchError::Reaction(e.to_string()))?;
        self.http
            .create_reaction(channel, message_id, &reaction)
            .await
            .map_err(|e| DispatchError::Reaction(e.to_string()))
    }
}
