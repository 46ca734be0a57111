//! Argument converters used by the command handlers.

use std::sync::Arc;

use crate::error::CommandError;
use crate::eval::{CodeUnit, ExecutionKind};
use crate::framework::{CommandSpec, Context};
use crate::plugin::{Plugin, PluginRegistry};

/// Default number of messages `selfclean` looks at.
pub const DEFAULT_AMOUNT: usize = 30;

/// Build a [`CodeUnit`] from raw command input.
pub fn code(args: &str, kind: ExecutionKind) -> CodeUnit {
    CodeUnit::new(args, kind)
}

/// A plugin, or one command of a plugin.
pub enum Pluginish {
    Plugin(Arc<dyn Plugin>),
    Command(Arc<dyn Plugin>, CommandSpec),
}

impl Pluginish {
    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        match self {
            Pluginish::Plugin(plugin) | Pluginish::Command(plugin, _) => plugin,
        }
    }

    /// Plugin display name or command name.
    pub fn name(&self) -> &'static str {
        match self {
            Pluginish::Plugin(plugin) => plugin.name(),
            Pluginish::Command(_, spec) => spec.name,
        }
    }
}

impl std::fmt::Debug for Pluginish {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pluginish::Plugin(plugin) => f.debug_tuple("Plugin").field(&plugin.name()).finish(),
            Pluginish::Command(_, spec) => f.debug_tuple("Command").field(&spec.name).finish(),
        }
    }
}

/// Resolve `arg` as a plugin name first, then as a command name or alias.
pub async fn pluginish(registry: &PluginRegistry, arg: &str) -> Result<Pluginish, CommandError> {
    let arg = arg.trim();
    if let Some(plugin) = registry.get_plugin(arg).await {
        return Ok(Pluginish::Plugin(plugin));
    }
    if let Some((plugin, spec)) = registry.get_command(arg).await {
        return Ok(Pluginish::Command(plugin, spec));
    }
    Err(CommandError::Converter(format!(
        "Failed to get plugin or command with arg {arg}"
    )))
}

/// Context-aware form of [`pluginish`].
pub async fn pluginish_in(ctx: &Context, arg: &str) -> Result<Pluginish, CommandError> {
    pluginish(&ctx.framework.plugins, arg).await
}

/// Parse an optional positive count, falling back to [`DEFAULT_AMOUNT`].
pub fn amount(args: &str) -> Result<usize, CommandError> {
    let arg = args.split_whitespace().next().unwrap_or_default();
    if arg.is_empty() {
        return Ok(DEFAULT_AMOUNT);
    }
    arg.parse::<usize>()
        .map_err(|_| CommandError::Converter(format!("Failed to convert {arg} to an amount")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::testing::*;

    #[test]
    fn code_extracts_fenced_body() {
        let unit = code("```rhai\nreturn 1;\n```", ExecutionKind::InProcess);
        assert_eq!(unit.language(), Some("rhai"));
        assert_eq!(unit.body(), "return 1;\n");
    }

    #[test]
    fn amount_defaults_and_parses() {
        assert_eq!(amount("").unwrap(), DEFAULT_AMOUNT);
        assert_eq!(amount("  5 ").unwrap(), 5);
        assert!(matches!(amount("lots"), Err(CommandError::Converter(_))));
        assert!(amount("-3").is_err());
    }

    #[tokio::test]
    async fn pluginish_prefers_plugins() {
        let (framework, _api) = framework_with_fake().await;
        let found = pluginish(&framework.plugins, "superuser").await.unwrap();
        assert!(matches!(found, Pluginish::Plugin(_)));
        assert_eq!(found.name(), "SuperUser");
    }

    #[tokio::test]
    async fn pluginish_resolves_command_aliases() {
        let (framework, _api) = framework_with_fake().await;
        let found = pluginish(&framework.plugins, "EVAL").await.unwrap();
        match found {
            Pluginish::Command(plugin, spec) => {
                assert_eq!(spec.name, "execute");
                assert_eq!(plugin.name(), "SuperUser");
            }
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pluginish_reports_unknown_arg() {
        let (framework, _api) = framework_with_fake().await;
        let err = pluginish(&framework.plugins, "nothing").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to get plugin or command with arg nothing"
        );
    }
}
