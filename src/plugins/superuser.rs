//! Owner-only tooling: code evaluation, shell access and bot lifecycle.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::converters::{self, Pluginish};
use crate::error::{CommandError, HttpError, PluginError};
use crate::eval::{
    render_cards, Evaluator, ExecutionEnvironment, ExecutionKind, Paginator, DEFAULT_MAX_CHARS,
    DEFAULT_MAX_LINES,
};
use crate::events::GatewayEvent;
use crate::framework::history::{delete_each, delete_messages};
use crate::framework::{CommandSpec, Context, History, Navigator, Shutdown};
use crate::plugin::{Extension, Plugin};
use crate::types::*;

pub const EXTENSION_NAME: &str = "yami.plugins.superuser";

pub const EXTENSION: Extension = Extension {
    name: EXTENSION_NAME,
    load,
};

fn load() -> Result<Arc<dyn Plugin>, PluginError> {
    Ok(Arc::new(SuperUser::default()))
}

const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "execute",
        aliases: &["exec", "evaluate", "eval"],
        owner_only: true,
        handler: "execute",
        help: "Evaluate a code block.",
    },
    CommandSpec {
        name: "shell",
        aliases: &["sh"],
        owner_only: true,
        handler: "execute",
        help: "Run a shell command line.",
    },
    CommandSpec {
        name: "panic",
        aliases: &["p"],
        owner_only: true,
        handler: "panic",
        help: "Unload this plugin.",
    },
    CommandSpec {
        name: "restart",
        aliases: &["rst"],
        owner_only: true,
        handler: "restart",
        help: "Restart the bot.",
    },
    CommandSpec {
        name: "getcode",
        aliases: &["showcode", "codefor", "code", "source"],
        owner_only: true,
        handler: "getcode",
        help: "Show the source of a plugin or command.",
    },
    CommandSpec {
        name: "selfclean",
        aliases: &["sclean", "sclear"],
        owner_only: true,
        handler: "selfclean",
        help: "Delete the bot's recent messages.",
    },
];

/// Lines per page of `getcode` output.
const CODE_PAGE_LINES: usize = 20;
/// Leaves room for the fence inside an embed description.
const CODE_PAGE_CHARS: usize = 3900;
/// Stand-in for backticks in shown source.
const CODE_BACKTICK: &str = "ˋ";

fn kind_for(command: &str) -> Option<ExecutionKind> {
    match command {
        "execute" => Some(ExecutionKind::InProcess),
        "shell" => Some(ExecutionKind::ExternalProcess),
        _ => None,
    }
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_default()
}

/// Cut the method named `handler` out of `source`: from its signature line
/// to the closing brace at the same indentation.
pub fn handler_source<'a>(source: &'a str, handler: &str) -> Option<&'a str> {
    let needle = format!("fn {handler}(");
    let mut offset = 0;
    let mut start: Option<(usize, &str)> = None;

    for line in source.split_inclusive('\n') {
        let trimmed = line.trim_start();
        match start {
            None => {
                let is_item = trimmed.starts_with("async fn")
                    || trimmed.starts_with("fn")
                    || trimmed.starts_with("pub");
                if is_item && trimmed.contains(&needle) {
                    start = Some((offset, &line[..line.len() - trimmed.len()]));
                }
            }
            Some((begin, indent)) => {
                let body = line.trim_end();
                if body.strip_prefix(indent) == Some("}") {
                    return Some(&source[begin..offset + line.len()]);
                }
            }
        }
        offset += line.len();
    }
    None
}

#[derive(Debug, Default)]
pub struct SuperUser {
    evaluator: Evaluator,
}

#[async_trait]
impl Plugin for SuperUser {
    fn name(&self) -> &'static str {
        "SuperUser"
    }

    fn commands(&self) -> &'static [CommandSpec] {
        COMMANDS
    }

    fn source(&self) -> &'static str {
        include_str!("superuser.rs")
    }

    async fn check(&self, ctx: &Context) -> bool {
        ctx.framework.is_owner(&ctx.author().id).await
    }

    async fn invoke(
        &self,
        command: &'static str,
        ctx: Context,
        args: &str,
    ) -> Result<(), CommandError> {
        let result = match command {
            "execute" => self.execute(ctx.clone(), args, ExecutionKind::InProcess).await,
            "shell" => self.execute(ctx.clone(), args, ExecutionKind::ExternalProcess).await,
            "panic" => self.panic(&ctx).await,
            "restart" => self.restart(&ctx).await,
            "getcode" => self.getcode(&ctx, args).await,
            "selfclean" => self.selfclean(&ctx, args).await,
            other => {
                warn!(command = other, "no handler for command");
                Ok(())
            }
        };

        match result {
            Err(CommandError::Converter(reason)) => {
                let reply = match COMMANDS.iter().find(|spec| spec.name == command) {
                    Some(spec) => format!("{reason}\nUsage: {}", spec.usage()),
                    None => reason,
                };
                ctx.reply(reply).await?;
                Ok(())
            }
            other => other,
        }
    }
}

impl SuperUser {
    /// Run the unit, show it, then re-run on every edit of the invoking
    /// message until the edit window closes.
    async fn execute(&self, mut ctx: Context, args: &str, kind: ExecutionKind) -> Result<(), CommandError> {
        self.run_and_show(&ctx, args, kind).await?;

        loop {
            let Some(edited) = self.wait_for_edit(&ctx).await else {
                debug!(message = %ctx.message.id, "edit window closed");
                return Ok(());
            };

            ctx.message = edited;
            let is_dm = ctx.is_dm();
            let Some(invocation) = ctx.framework.parse(&ctx.me, &ctx.message.content, is_dm) else {
                return Ok(());
            };
            let Some((_, spec)) = ctx.framework.plugins.get_command(invocation.invoked_with).await else {
                return Ok(());
            };
            let Some(kind) = kind_for(spec.name) else {
                return Ok(());
            };
            let args = invocation.args.to_string();

            info!(message = %ctx.message.id, "source edited, running again");
            let newest = self.run_and_show(&ctx, &args, kind).await?;
            if let Err(e) = clean_between(&ctx, &ctx.message.id, &newest.id).await {
                warn!(error = %e, "failed to delete earlier results");
            }
        }
    }

    async fn run_and_show(&self, ctx: &Context, args: &str, kind: ExecutionKind) -> Result<Message, HttpError> {
        let unit = converters::code(args, kind);
        let env = build_environment(ctx).await;
        let evaluation = self
            .evaluator
            .run(unit, env, &ctx.framework.options.token)
            .await;
        info!(
            command = ctx.command,
            author = %ctx.author().tag(),
            succeeded = evaluation.unit.succeeded,
            elapsed_ms = evaluation.output.elapsed_ms(),
            "executed code"
        );

        let cards = render_cards(
            &evaluation.output,
            ctx.author().avatar_url(),
            DEFAULT_MAX_LINES,
            DEFAULT_MAX_CHARS,
        );
        let navigation = Navigator::new(cards).send(ctx).await?;
        Ok(navigation.message)
    }

    /// The invoking message, once its content changes within the edit
    /// window.
    async fn wait_for_edit(&self, ctx: &Context) -> Option<Message> {
        let id = ctx.message.id.clone();
        let current = ctx.message.content.clone();
        let event = ctx
            .framework
            .waiter
            .wait_for(
                move |event| match event {
                    GatewayEvent::MessageUpdate(update) => {
                        update.id == id
                            && update.content.as_deref().is_some_and(|c| c != current)
                    }
                    _ => false,
                },
                ctx.framework.options.edit_timeout,
            )
            .await?;
        let GatewayEvent::MessageUpdate(update) = event else {
            return None;
        };

        match ctx.api().get_message(&update.channel_id, &update.id).await {
            Ok(message) => Some(message),
            Err(e) => {
                debug!(error = %e, "could not fetch edited message, using update");
                let mut message = ctx.message.clone();
                message.content = update.content.unwrap_or_default();
                Some(message)
            }
        }
    }

    async fn panic(&self, ctx: &Context) -> Result<(), CommandError> {
        let reply = ctx.reply("Panicking...").await?;
        ctx.framework.plugins.unload_extension(EXTENSION_NAME).await?;
        info!("Panicked, unloaded.");
        ctx.edit(&reply, "Panicked").await?;
        Ok(())
    }

    async fn restart(&self, ctx: &Context) -> Result<(), CommandError> {
        ctx.reply("Ja, matane").await?;
        info!(author = %ctx.author().tag(), "restart requested");
        ctx.framework.request_shutdown(Shutdown::Restart);
        Ok(())
    }

    async fn getcode(&self, ctx: &Context, args: &str) -> Result<(), CommandError> {
        let target = converters::pluginish_in(ctx, args).await?;
        let source = match &target {
            Pluginish::Plugin(plugin) => plugin.source(),
            Pluginish::Command(plugin, spec) => {
                handler_source(plugin.source(), spec.handler).unwrap_or(plugin.source())
            }
        };
        let source = source.replace('`', CODE_BACKTICK);

        let pages = Paginator::new(source, CODE_PAGE_LINES, CODE_PAGE_CHARS).build_pages();
        let total = pages.len();
        let color = rand::thread_rng().gen_range(0..0xFFF);
        let icon_url = ctx.author().avatar_url();
        let timestamp = Utc::now().to_rfc3339();
        let embeds = pages
            .iter()
            .map(|page| {
                Embed::new()
                    .title(format!("Code for {}", target.name()))
                    .description(page.fenced("rs"))
                    .color(color)
                    .timestamp(timestamp.clone())
                    .footer(format!("{}/{}", page.index, total), icon_url.clone())
            })
            .collect();

        Navigator::new(embeds).send(ctx).await?;
        Ok(())
    }

    async fn selfclean(&self, ctx: &Context, args: &str) -> Result<(), CommandError> {
        let amount = converters::amount(args)?;
        let me = ctx.me.id.clone();
        let mine = History::before(ctx.channel_id(), ctx.message.id.as_str())
            .filter(move |m| m.is_from(&me))
            .limit(amount)
            .collect(ctx.api())
            .await?;
        let ids: Vec<Snowflake> = mine.into_iter().map(|m| m.id).collect();

        let deleted = if ctx.is_dm() {
            delete_each(ctx.api(), ctx.channel_id(), &ids).await
        } else {
            delete_messages(ctx.api(), ctx.channel_id(), &ids).await
        };
        match deleted {
            Err(e) if !e.is_ignorable() => Err(e.into()),
            _ => {
                info!(count = ids.len(), channel = %ctx.channel_id(), "cleaned own messages");
                Ok(())
            }
        }
    }
}

/// Delete our messages strictly between `first` and `last`.
///
/// Messages that are already gone or that we may not delete are skipped.
pub async fn clean_between(ctx: &Context, first: &str, last: &str) -> Result<(), HttpError> {
    let me = ctx.me.id.clone();
    let last_value = snowflake_value(last);
    let between = History::after(ctx.channel_id(), first)
        .filter(move |m| m.is_from(&me))
        .take_until(move |m| m.id_value() >= last_value)
        .collect(ctx.api())
        .await?;
    let ids: Vec<Snowflake> = between.into_iter().map(|m| m.id).collect();

    let result = if ctx.is_dm() {
        delete_each(ctx.api(), ctx.channel_id(), &ids).await
    } else {
        delete_messages(ctx.api(), ctx.channel_id(), &ids).await
    };
    match result {
        Err(e) if e.is_ignorable() => {
            debug!(error = %e, "ignored cleanup failure");
            Ok(())
        }
        other => other,
    }
}

/// Bindings for one run. Channel and guild are fetched best-effort.
async fn build_environment(ctx: &Context) -> ExecutionEnvironment {
    let mut actor = to_json(ctx.author());
    if let (Some(member), Value::Object(map)) = (ctx.member(), &mut actor) {
        map.insert("member".to_string(), to_json(member));
    }

    let channel = match ctx.api().get_channel(ctx.channel_id()).await {
        Ok(channel) => to_json(&channel),
        Err(e) => {
            debug!(error = %e, "channel unavailable for bindings");
            Value::Null
        }
    };
    let guild = match ctx.guild_id() {
        Some(guild_id) => match ctx.api().get_guild(guild_id).await {
            Ok(guild) => to_json(&guild),
            Err(e) => {
                debug!(error = %e, "guild unavailable for bindings");
                Value::Null
            }
        },
        None => Value::Null,
    };

    let bot = json!({
        "user": to_json(&ctx.me),
        "prefix": ctx.framework.options.dm_prefix,
        "plugins": ctx.framework.plugins.plugin_names().await,
        "version": env!("CARGO_PKG_VERSION"),
    });

    ExecutionEnvironment {
        actor,
        channel,
        channel_id: Value::String(ctx.channel_id().to_string()),
        guild,
        guild_id: ctx.guild_id().map_or(Value::Null, |id| Value::String(id.to_string())),
        message: to_json(&ctx.message),
        previous_result: Default::default(),
        bot,
    }
}
