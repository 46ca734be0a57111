//! The command framework the plugins run on.
//!
//! [`ChatApi`] is the REST surface plugins need; the `http` module provides
//! the Discord implementation and tests use an in-memory fake. Everything
//! else here (routing, owner checks, waiters, history queries, page
//! navigation) is transport-agnostic.

pub mod commands;
pub mod context;
pub mod history;
pub mod navigator;
pub mod waiter;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_lock::RwLock;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{CommandError, HttpError};
use crate::plugin::PluginRegistry;
use crate::types::*;

pub use commands::{CommandSpec, Invocation};
pub use context::Context;
pub use history::History;
pub use navigator::Navigator;
pub use waiter::EventWaiter;

// ---------------------------------------------------------------------------
// REST surface
// ---------------------------------------------------------------------------

/// Cursor for one page of channel history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageQuery {
    pub before: Option<Snowflake>,
    pub after: Option<Snowflake>,
    /// 1..=100
    pub limit: u8,
}

impl MessageQuery {
    pub fn to_query_string(&self) -> String {
        let mut parts = vec![format!("limit={}", self.limit.clamp(1, 100))];
        if let Some(before) = &self.before {
            parts.push(format!("before={before}"));
        }
        if let Some(after) = &self.after {
            parts.push(format!("after={after}"));
        }
        parts.join("&")
    }
}

/// The chat-platform operations plugins depend on.
#[async_trait]
pub trait ChatApi: Send + Sync + 'static {
    async fn create_message(
        &self,
        channel_id: &str,
        body: &MessagePayload,
    ) -> Result<Message, HttpError>;

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        body: &MessagePayload,
    ) -> Result<Message, HttpError>;

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), HttpError>;

    /// Delete 2..=100 messages at once.
    async fn bulk_delete_messages(
        &self,
        channel_id: &str,
        message_ids: &[Snowflake],
    ) -> Result<(), HttpError>;

    async fn get_message(&self, channel_id: &str, message_id: &str) -> Result<Message, HttpError>;

    async fn get_messages(
        &self,
        channel_id: &str,
        query: &MessageQuery,
    ) -> Result<Vec<Message>, HttpError>;

    async fn get_channel(&self, channel_id: &str) -> Result<Channel, HttpError>;

    async fn get_guild(&self, guild_id: &str) -> Result<Guild, HttpError>;

    async fn create_interaction_response(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        response: &InteractionResponse,
    ) -> Result<(), HttpError>;
}

// ---------------------------------------------------------------------------
// Options & shutdown
// ---------------------------------------------------------------------------

/// Tunables shared by every command.
#[derive(Debug, Clone)]
pub struct FrameworkOptions {
    /// Live token, redacted from anything shown to users.
    pub token: String,
    /// Text prefix accepted in direct messages.
    pub dm_prefix: String,
    /// How long a finished evaluation listens for an edit of its source.
    pub edit_timeout: Duration,
    /// How long page navigation buttons stay active.
    pub navigation_timeout: Duration,
}

impl Default for FrameworkOptions {
    fn default() -> Self {
        Self {
            token: String::new(),
            dm_prefix: "yr.".to_string(),
            edit_timeout: Duration::from_secs(60),
            navigation_timeout: Duration::from_secs(120),
        }
    }
}

/// How the process should end once the event loop stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    Close,
    /// Re-execute the binary after closing.
    Restart,
}

// ---------------------------------------------------------------------------
// Framework
// ---------------------------------------------------------------------------

/// Shared services for the bot runtime and every command invocation.
pub struct Framework {
    pub api: Arc<dyn ChatApi>,
    pub waiter: EventWaiter,
    pub plugins: PluginRegistry,
    pub options: FrameworkOptions,
    identity: RwLock<Option<User>>,
    owners: RwLock<HashSet<Snowflake>>,
    shutdown_tx: async_channel::Sender<Shutdown>,
    shutdown_rx: async_channel::Receiver<Shutdown>,
    warned_guild_prefix: AtomicBool,
}

impl Framework {
    pub fn new(api: Arc<dyn ChatApi>, options: FrameworkOptions) -> Arc<Self> {
        let (shutdown_tx, shutdown_rx) = async_channel::bounded(1);
        Arc::new(Self {
            api,
            waiter: EventWaiter::default(),
            plugins: PluginRegistry::default(),
            options,
            identity: RwLock::new(None),
            owners: RwLock::new(HashSet::new()),
            shutdown_tx,
            shutdown_rx,
            warned_guild_prefix: AtomicBool::new(false),
        })
    }

    /// Record the bot's own user (from READY or `GET /users/@me`).
    pub async fn set_identity(&self, user: User) {
        *self.identity.write().await = Some(user);
    }

    pub async fn identity(&self) -> Option<User> {
        self.identity.read().await.clone()
    }

    pub async fn add_owners(&self, ids: impl IntoIterator<Item = Snowflake>) {
        self.owners.write().await.extend(ids);
    }

    pub async fn is_owner(&self, user_id: &str) -> bool {
        self.owners.read().await.contains(user_id)
    }

    /// Ask the runtime to stop. Only the first request counts.
    pub fn request_shutdown(&self, kind: Shutdown) {
        let _ = self.shutdown_tx.try_send(kind);
    }

    /// Resolves once shutdown has been requested.
    pub async fn shutdown_requested(&self) -> Shutdown {
        self.shutdown_rx.recv().await.unwrap_or(Shutdown::Close)
    }

    /// Prefixes accepted for a message: mentions always, the text prefix
    /// only in direct messages.
    pub fn prefixes(&self, me: &User, is_dm: bool) -> Vec<String> {
        let mention = me.mention();
        let nick_mention = format!("<@!{}>", me.id);
        let mut prefixes = vec![
            format!("{mention} "),
            mention,
            format!("{nick_mention} "),
            nick_mention,
        ];
        if is_dm {
            prefixes.push(self.options.dm_prefix.clone());
        } else if !self.warned_guild_prefix.swap(true, Ordering::Relaxed) {
            warn!("per-guild prefixes are not implemented yet.");
        }
        prefixes
    }

    /// Parse `content` as a command invocation for a message in a DM
    /// (`is_dm`) or guild channel.
    pub fn parse<'a>(&self, me: &User, content: &'a str, is_dm: bool) -> Option<Invocation<'a>> {
        commands::parse_invocation(content, &self.prefixes(me, is_dm))
    }

    /// Route a freshly created message to its command, if it is one.
    ///
    /// Returns `Ok(false)` when the message is not a known command.
    pub async fn dispatch(self: &Arc<Self>, message: Message) -> Result<bool, CommandError> {
        let Some(me) = self.identity().await else {
            debug!("message before READY, ignoring");
            return Ok(false);
        };
        if message.author.bot {
            return Ok(false);
        }

        let is_dm = message.guild_id.is_none();
        let Some(invocation) = self.parse(&me, &message.content, is_dm) else {
            return Ok(false);
        };
        let Some((plugin, spec)) = self.plugins.get_command(invocation.invoked_with).await else {
            return Ok(false);
        };

        let args = invocation.args.to_string();
        let ctx = Context {
            framework: Arc::clone(self),
            prefix: invocation.prefix.to_string(),
            invoked_with: invocation.invoked_with.to_string(),
            command: spec.name,
            me,
            message,
        };

        let owner = self.is_owner(&ctx.author().id).await;
        if (spec.owner_only && !owner) || !plugin.check(&ctx).await {
            return Err(CommandError::NotOwner {
                user: ctx.author().tag(),
            });
        }

        debug!(command = spec.name, invoked_with = %ctx.invoked_with, "invoking command");
        plugin.invoke(spec.name, ctx, &args).await?;
        Ok(true)
    }
}

impl std::fmt::Debug for Framework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framework")
            .field("options", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing;
