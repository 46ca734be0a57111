//! In-memory [`ChatApi`] and fixtures shared by the crate's tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_lock::Mutex;
use async_trait::async_trait;

use crate::error::HttpError;
use crate::types::*;

use super::{ChatApi, Context, Framework, FrameworkOptions, MessageQuery};

pub const BOT_ID: &str = "900";
pub const OWNER_ID: &str = "100";
pub const STRANGER_ID: &str = "200";
pub const CHANNEL_ID: &str = "300";
pub const GUILD_ID: &str = "500";
pub const TOKEN: &str = "fake.bot.token";

pub fn user(id: &str, bot: bool) -> User {
    User {
        id: id.to_string(),
        username: format!("user{id}"),
        discriminator: Some("0".to_string()),
        avatar: Some(format!("avatar{id}")),
        bot,
        global_name: None,
    }
}

pub fn bot_user() -> User {
    user(BOT_ID, true)
}

/// A message in [`CHANNEL_ID`].
pub fn message(id: &str, author_id: &str, guild_id: Option<&str>, content: &str) -> Message {
    Message {
        id: id.to_string(),
        channel_id: CHANNEL_ID.to_string(),
        guild_id: guild_id.map(str::to_string),
        author: user(author_id, author_id == BOT_ID),
        member: None,
        content: content.to_string(),
        timestamp: "2024-01-01T00:00:00+00:00".to_string(),
        edited_timestamp: None,
        embeds: Vec::new(),
        message_reference: None,
    }
}

fn api_error(status: u16, route: &str) -> HttpError {
    HttpError::Api {
        status,
        body: String::new(),
        route: route.to_string(),
    }
}

/// Records every call and serves history from a message list.
#[derive(Default)]
pub struct FakeApi {
    messages: Mutex<Vec<Message>>,
    created: Mutex<Vec<(Snowflake, MessagePayload)>>,
    edits: Mutex<Vec<(Snowflake, MessagePayload)>>,
    deleted: Mutex<Vec<Snowflake>>,
    interactions: Mutex<Vec<InteractionResponse>>,
    channels: Mutex<HashMap<Snowflake, Channel>>,
    guilds: Mutex<HashMap<Snowflake, Guild>>,
    delete_error: Mutex<Option<u16>>,
    bulk_deletes: AtomicUsize,
    history_requests: AtomicUsize,
    next_id: AtomicU64,
}

impl FakeApi {
    pub async fn push_message(&self, message: Message) {
        self.messages.lock().await.push(message);
    }

    pub async fn add_channel(&self, channel: Channel) {
        self.channels.lock().await.insert(channel.id.clone(), channel);
    }

    pub async fn add_guild(&self, guild: Guild) {
        self.guilds.lock().await.insert(guild.id.clone(), guild);
    }

    /// Make every delete fail with `status`.
    pub async fn fail_deletes_with(&self, status: u16) {
        *self.delete_error.lock().await = Some(status);
    }

    /// Replace the content of a stored message, as a user edit would.
    pub async fn set_content(&self, message_id: &str, content: &str) {
        let mut messages = self.messages.lock().await;
        if let Some(m) = messages.iter_mut().find(|m| m.id == message_id) {
            m.content = content.to_string();
        }
    }

    pub async fn created(&self) -> Vec<(Snowflake, MessagePayload)> {
        self.created.lock().await.clone()
    }

    pub async fn edits(&self) -> Vec<(Snowflake, MessagePayload)> {
        self.edits.lock().await.clone()
    }

    pub async fn deleted(&self) -> Vec<Snowflake> {
        self.deleted.lock().await.clone()
    }

    pub async fn interaction_responses(&self) -> Vec<InteractionResponse> {
        self.interactions.lock().await.clone()
    }

    pub async fn bulk_deletes(&self) -> usize {
        self.bulk_deletes.load(Ordering::SeqCst)
    }

    pub async fn history_requests(&self) -> usize {
        self.history_requests.load(Ordering::SeqCst)
    }

    pub async fn stored(&self, message_id: &str) -> Option<Message> {
        self.messages
            .lock()
            .await
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
    }

    async fn check_delete(&self, route: &str) -> Result<(), HttpError> {
        match *self.delete_error.lock().await {
            Some(status) => Err(api_error(status, route)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn create_message(
        &self,
        channel_id: &str,
        body: &MessagePayload,
    ) -> Result<Message, HttpError> {
        let id = 10_000 + self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut message = message(&id.to_string(), BOT_ID, None, body.content.as_deref().unwrap_or_default());
        message.channel_id = channel_id.to_string();
        message.embeds = body.embeds.clone().unwrap_or_default();

        self.messages.lock().await.push(message.clone());
        self.created
            .lock()
            .await
            .push((channel_id.to_string(), body.clone()));
        Ok(message)
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        body: &MessagePayload,
    ) -> Result<Message, HttpError> {
        let mut messages = self.messages.lock().await;
        let stored = messages
            .iter_mut()
            .find(|m| m.id == message_id && m.channel_id == channel_id)
            .ok_or_else(|| api_error(404, "PATCH message"))?;
        if let Some(content) = &body.content {
            stored.content = content.clone();
        }
        if let Some(embeds) = &body.embeds {
            stored.embeds = embeds.clone();
        }
        let updated = stored.clone();
        drop(messages);

        self.edits
            .lock()
            .await
            .push((message_id.to_string(), body.clone()));
        Ok(updated)
    }

    async fn delete_message(&self, _channel_id: &str, message_id: &str) -> Result<(), HttpError> {
        self.check_delete("DELETE message").await?;
        self.messages.lock().await.retain(|m| m.id != message_id);
        self.deleted.lock().await.push(message_id.to_string());
        Ok(())
    }

    async fn bulk_delete_messages(
        &self,
        _channel_id: &str,
        message_ids: &[Snowflake],
    ) -> Result<(), HttpError> {
        self.check_delete("POST bulk-delete").await?;
        self.bulk_deletes.fetch_add(1, Ordering::SeqCst);
        self.messages
            .lock()
            .await
            .retain(|m| !message_ids.contains(&m.id));
        self.deleted.lock().await.extend(message_ids.iter().cloned());
        Ok(())
    }

    async fn get_message(&self, channel_id: &str, message_id: &str) -> Result<Message, HttpError> {
        self.messages
            .lock()
            .await
            .iter()
            .find(|m| m.id == message_id && m.channel_id == channel_id)
            .cloned()
            .ok_or_else(|| api_error(404, "GET message"))
    }

    async fn get_messages(
        &self,
        channel_id: &str,
        query: &MessageQuery,
    ) -> Result<Vec<Message>, HttpError> {
        self.history_requests.fetch_add(1, Ordering::SeqCst);
        let limit = usize::from(query.limit.clamp(1, 100));
        let mut found: Vec<Message> = self
            .messages
            .lock()
            .await
            .iter()
            .filter(|m| m.channel_id == channel_id)
            .cloned()
            .collect();

        if let Some(before) = &query.before {
            let before = snowflake_value(before);
            found.retain(|m| m.id_value() < before);
            found.sort_by_key(|m| std::cmp::Reverse(m.id_value()));
        } else if let Some(after) = &query.after {
            let after = snowflake_value(after);
            found.retain(|m| m.id_value() > after);
            found.sort_by_key(Message::id_value);
        } else {
            found.sort_by_key(|m| std::cmp::Reverse(m.id_value()));
        }
        found.truncate(limit);
        Ok(found)
    }

    async fn get_channel(&self, channel_id: &str) -> Result<Channel, HttpError> {
        self.channels
            .lock()
            .await
            .get(channel_id)
            .cloned()
            .ok_or_else(|| api_error(404, "GET channel"))
    }

    async fn get_guild(&self, guild_id: &str) -> Result<Guild, HttpError> {
        self.guilds
            .lock()
            .await
            .get(guild_id)
            .cloned()
            .ok_or_else(|| api_error(404, "GET guild"))
    }

    async fn create_interaction_response(
        &self,
        _interaction_id: &str,
        _interaction_token: &str,
        response: &InteractionResponse,
    ) -> Result<(), HttpError> {
        self.interactions.lock().await.push(response.clone());
        Ok(())
    }
}

/// Options with a short edit window so evaluation commands return quickly.
pub fn test_options() -> FrameworkOptions {
    FrameworkOptions {
        token: TOKEN.to_string(),
        edit_timeout: Duration::from_millis(50),
        ..Default::default()
    }
}

/// A framework over a [`FakeApi`] with the bot identity set, [`OWNER_ID`]
/// registered as owner and every manifest plugin loaded.
pub async fn framework_with_fake() -> (Arc<Framework>, Arc<FakeApi>) {
    framework_with_options(test_options()).await
}

pub async fn framework_with_options(options: FrameworkOptions) -> (Arc<Framework>, Arc<FakeApi>) {
    let api = Arc::new(FakeApi::default());
    let framework = Framework::new(api.clone(), options);
    framework.set_identity(bot_user()).await;
    framework.add_owners([OWNER_ID.to_string()]).await;
    framework
        .plugins
        .load_and_reload_extensions(crate::plugins::MANIFEST, None)
        .await;
    (framework, api)
}

/// A context for `message` routed to `command` with the text prefix.
pub fn context(framework: &Arc<Framework>, message: Message, command: &'static str) -> Context {
    Context {
        framework: Arc::clone(framework),
        message,
        prefix: "yr.".to_string(),
        invoked_with: command.to_string(),
        command,
        me: bot_user(),
    }
}
