//! Multi-page embed messages with navigation buttons.
//!
//! A single page is sent as a plain embed. Several pages get a row of
//! buttons; a background task listens for presses by the invoking user
//! until the navigation timeout passes without one, then strips the
//! buttons.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::HttpError;
use crate::events::GatewayEvent;
use crate::types::*;

use super::Context;

const BUTTON_SECONDARY: u8 = 2;
const BUTTON_DANGER: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavAction {
    First,
    Previous,
    Next,
    Last,
    Stop,
}

impl NavAction {
    const ALL: [NavAction; 5] = [
        NavAction::First,
        NavAction::Previous,
        NavAction::Next,
        NavAction::Last,
        NavAction::Stop,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NavAction::First => "first",
            NavAction::Previous => "prev",
            NavAction::Next => "next",
            NavAction::Last => "last",
            NavAction::Stop => "stop",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == s)
    }

    fn label(self) -> &'static str {
        match self {
            NavAction::First => "⏮",
            NavAction::Previous => "◀",
            NavAction::Next => "▶",
            NavAction::Last => "⏭",
            NavAction::Stop => "⏹",
        }
    }

    /// New 0-based page index after pressing this button on page `index`
    /// of `total`. Previous/next wrap around.
    pub fn apply(self, index: usize, total: usize) -> usize {
        if total == 0 {
            return 0;
        }
        match self {
            NavAction::First => 0,
            NavAction::Previous => (index + total - 1) % total,
            NavAction::Next => (index + 1) % total,
            NavAction::Last => total - 1,
            NavAction::Stop => index,
        }
    }
}

/// `nav:{key}:{action}`
pub fn custom_id(key: &str, action: NavAction) -> String {
    format!("nav:{key}:{}", action.as_str())
}

/// Split a navigation custom id into its key and action.
pub fn parse_custom_id(id: &str) -> Option<(&str, NavAction)> {
    let rest = id.strip_prefix("nav:")?;
    let (key, action) = rest.rsplit_once(':')?;
    Some((key, NavAction::parse(action)?))
}

fn buttons(key: &str) -> Component {
    action_row(
        NavAction::ALL
            .into_iter()
            .map(|action| {
                let style = if action == NavAction::Stop {
                    BUTTON_DANGER
                } else {
                    BUTTON_SECONDARY
                };
                button(style, action.label(), custom_id(key, action))
            })
            .collect(),
    )
}

/// The message a navigator sent, plus its listener when it has one.
#[derive(Debug)]
pub struct Navigation {
    pub message: Message,
    pub listener: Option<JoinHandle<()>>,
}

/// Pages of embeds to show to the invoking user.
#[derive(Debug, Clone)]
pub struct Navigator {
    pages: Vec<Embed>,
    timeout: Option<Duration>,
}

impl Navigator {
    /// An empty page list is shown as one empty embed.
    pub fn new(mut pages: Vec<Embed>) -> Self {
        if pages.is_empty() {
            pages.push(Embed::new());
        }
        Self {
            pages,
            timeout: None,
        }
    }

    /// Override the framework's navigation timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Send the first page and, for several pages, start listening for
    /// button presses.
    pub async fn send(self, ctx: &Context) -> Result<Navigation, HttpError> {
        let first = self.pages[0].clone();
        if self.pages.len() == 1 {
            let message = ctx.send(&MessagePayload::new().embed(first)).await?;
            return Ok(Navigation {
                message,
                listener: None,
            });
        }

        let key = format!("{:x}", rand::random::<u64>());
        let prefix = format!("nav:{key}:");
        let presses = ctx
            .framework
            .waiter
            .subscribe(move |event| match event {
                GatewayEvent::InteractionCreate(i) => {
                    i.custom_id().is_some_and(|id| id.starts_with(&prefix))
                }
                _ => false,
            })
            .await;

        let body = MessagePayload::new()
            .embed(first)
            .component_row(buttons(&key));
        let message = ctx.send(&body).await?;

        let timeout = self.timeout.unwrap_or(ctx.framework.options.navigation_timeout);
        let session = Session {
            ctx: ctx.clone(),
            pages: self.pages,
            key,
            message: message.clone(),
            index: 0,
        };
        let listener = tokio::spawn(session.listen(presses, timeout));

        Ok(Navigation {
            message,
            listener: Some(listener),
        })
    }
}

struct Session {
    ctx: Context,
    pages: Vec<Embed>,
    key: String,
    message: Message,
    index: usize,
}

impl Session {
    async fn listen(mut self, presses: async_channel::Receiver<GatewayEvent>, timeout: Duration) {
        loop {
            let event = match tokio::time::timeout(timeout, presses.recv()).await {
                Ok(Ok(event)) => event,
                _ => break,
            };
            let GatewayEvent::InteractionCreate(interaction) = event else {
                continue;
            };
            match self.press(&interaction).await {
                Ok(true) => {}
                Ok(false) => return,
                Err(e) => warn!(error = %e, "navigation update failed"),
            }
        }

        let body = MessagePayload::new().clear_components();
        if let Err(e) = self
            .ctx
            .api()
            .edit_message(&self.message.channel_id, &self.message.id, &body)
            .await
        {
            debug!(error = %e, "could not remove navigation buttons");
        }
    }

    /// Handle one press. Returns `false` once navigation is over.
    async fn press(&mut self, interaction: &Interaction) -> Result<bool, HttpError> {
        let api = self.ctx.api();
        let action = interaction
            .custom_id()
            .and_then(parse_custom_id)
            .map(|(_, action)| action);
        let from_author = interaction
            .author()
            .is_some_and(|u| u.id == self.ctx.author().id);

        let (Some(action), true) = (action, from_author) else {
            let deferred = InteractionResponse {
                kind: InteractionCallbackType::DeferredUpdateMessage,
                data: None,
            };
            api.create_interaction_response(&interaction.id, &interaction.token, &deferred)
                .await?;
            return Ok(true);
        };

        if action == NavAction::Stop {
            let deferred = InteractionResponse {
                kind: InteractionCallbackType::DeferredUpdateMessage,
                data: None,
            };
            api.create_interaction_response(&interaction.id, &interaction.token, &deferred)
                .await?;
            match api
                .delete_message(&self.message.channel_id, &self.message.id)
                .await
            {
                Err(e) if !e.is_ignorable() => return Err(e),
                _ => return Ok(false),
            }
        }

        self.index = action.apply(self.index, self.pages.len());
        let update = InteractionResponse {
            kind: InteractionCallbackType::UpdateMessage,
            data: Some(
                MessagePayload::new()
                    .embed(self.pages[self.index].clone())
                    .component_row(buttons(&self.key)),
            ),
        };
        api.create_interaction_response(&interaction.id, &interaction.token, &update)
            .await?;
        Ok(true)
    }
}
