//! Per-invocation command context.

use std::sync::Arc;

use crate::error::HttpError;
use crate::types::*;

use super::{ChatApi, Framework};

/// Everything a command knows about the message that invoked it.
#[derive(Clone)]
pub struct Context {
    pub framework: Arc<Framework>,
    pub message: Message,
    /// The prefix the message used.
    pub prefix: String,
    /// The name or alias the message used.
    pub invoked_with: String,
    /// Canonical name of the routed command.
    pub command: &'static str,
    /// The bot's own user.
    pub me: User,
}

impl Context {
    pub fn api(&self) -> &dyn ChatApi {
        self.framework.api.as_ref()
    }

    pub fn author(&self) -> &User {
        &self.message.author
    }

    pub fn member(&self) -> Option<&GuildMember> {
        self.message.member.as_ref()
    }

    pub fn channel_id(&self) -> &str {
        &self.message.channel_id
    }

    pub fn guild_id(&self) -> Option<&str> {
        self.message.guild_id.as_deref()
    }

    pub fn is_dm(&self) -> bool {
        self.message.guild_id.is_none()
    }

    /// Send `body` to the invoking channel.
    pub async fn send(&self, body: &MessagePayload) -> Result<Message, HttpError> {
        self.api().create_message(self.channel_id(), body).await
    }

    /// Reply to the invoking message with plain text.
    pub async fn reply(&self, content: impl Into<String>) -> Result<Message, HttpError> {
        let body = MessagePayload::new()
            .content(content)
            .reply_to(self.message.id.clone());
        self.send(&body).await
    }

    /// Replace the text of one of our messages.
    pub async fn edit(&self, message: &Message, content: impl Into<String>) -> Result<Message, HttpError> {
        let body = MessagePayload::new().content(content);
        self.api()
            .edit_message(&message.channel_id, &message.id, &body)
            .await
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("message", &self.message.id)
            .field("invoked_with", &self.invoked_with)
            .field("command", &self.command)
            .finish()
    }
}
