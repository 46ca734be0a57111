//! Lazy channel-history queries and message deletion helpers.

use tracing::debug;

use crate::error::HttpError;
use crate::types::*;

use super::{ChatApi, MessageQuery};

type MessagePredicate = Box<dyn Fn(&Message) -> bool + Send + Sync>;

/// Discord's page size for history requests and bulk deletes.
const PAGE_SIZE: usize = 100;
/// Hard stop so a runaway query cannot walk an entire channel.
const MAX_PAGES: usize = 50;

#[derive(Debug, Clone)]
enum Cursor {
    /// Walk backwards from (excluding) this message, newest first.
    Before(Snowflake),
    /// Walk forwards from (excluding) this message, oldest first.
    After(Snowflake),
}

/// A history query built from combinators and run with [`History::collect`].
///
/// Combinators apply in a fixed order: `filter`, then `take_until`, then
/// `limit`.
pub struct History {
    channel_id: Snowflake,
    cursor: Cursor,
    filter: Option<MessagePredicate>,
    take_until: Option<MessagePredicate>,
    limit: Option<usize>,
}

impl History {
    pub fn before(channel_id: impl Into<Snowflake>, message_id: impl Into<Snowflake>) -> Self {
        Self::new(channel_id.into(), Cursor::Before(message_id.into()))
    }

    pub fn after(channel_id: impl Into<Snowflake>, message_id: impl Into<Snowflake>) -> Self {
        Self::new(channel_id.into(), Cursor::After(message_id.into()))
    }

    fn new(channel_id: Snowflake, cursor: Cursor) -> Self {
        Self {
            channel_id,
            cursor,
            filter: None,
            take_until: None,
            limit: None,
        }
    }

    /// Keep only messages matching `predicate`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Stop (exclusively) at the first kept message matching `predicate`.
    pub fn take_until<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.take_until = Some(Box::new(predicate));
        self
    }

    /// Yield at most `n` messages.
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Run the query, paging through the channel as needed.
    pub async fn collect(self, api: &dyn ChatApi) -> Result<Vec<Message>, HttpError> {
        let mut out = Vec::new();
        if self.limit == Some(0) {
            return Ok(out);
        }

        let mut cursor = self.cursor.clone();
        for _ in 0..MAX_PAGES {
            let query = match &cursor {
                Cursor::Before(id) => MessageQuery {
                    before: Some(id.clone()),
                    after: None,
                    limit: PAGE_SIZE as u8,
                },
                Cursor::After(id) => MessageQuery {
                    before: None,
                    after: Some(id.clone()),
                    limit: PAGE_SIZE as u8,
                },
            };

            let mut batch = api.get_messages(&self.channel_id, &query).await?;
            let exhausted = batch.len() < PAGE_SIZE;
            match cursor {
                Cursor::Before(_) => batch.sort_by_key(|m| std::cmp::Reverse(m.id_value())),
                Cursor::After(_) => batch.sort_by_key(Message::id_value),
            }

            let Some(last) = batch.last() else {
                break;
            };
            cursor = match cursor {
                Cursor::Before(_) => Cursor::Before(last.id.clone()),
                Cursor::After(_) => Cursor::After(last.id.clone()),
            };

            for message in batch {
                if self.filter.as_ref().is_some_and(|f| !f(&message)) {
                    continue;
                }
                if self.take_until.as_ref().is_some_and(|f| f(&message)) {
                    return Ok(out);
                }
                out.push(message);
                if self.limit.is_some_and(|n| out.len() >= n) {
                    return Ok(out);
                }
            }

            if exhausted {
                break;
            }
        }

        debug!(channel = %self.channel_id, found = out.len(), "history query finished");
        Ok(out)
    }
}

/// Delete `ids` from a guild channel, bulk where possible.
pub async fn delete_messages(
    api: &dyn ChatApi,
    channel_id: &str,
    ids: &[Snowflake],
) -> Result<(), HttpError> {
    for chunk in ids.chunks(PAGE_SIZE) {
        match chunk {
            [] => {}
            [single] => api.delete_message(channel_id, single).await?,
            many => api.bulk_delete_messages(channel_id, many).await?,
        }
    }
    Ok(())
}

/// Delete `ids` one at a time (direct-message channels).
pub async fn delete_each(
    api: &dyn ChatApi,
    channel_id: &str,
    ids: &[Snowflake],
) -> Result<(), HttpError> {
    for id in ids {
        api.delete_message(channel_id, id).await?;
    }
    Ok(())
}
