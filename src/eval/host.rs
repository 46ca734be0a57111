//! Scripting host: runs a wrapped unit with injected bindings.

use rhai::{Dynamic, Engine, Scope};
use serde_json::Value;
use tracing::info;

use super::capture::CaptureSink;

/// Bindings injected into a unit's scope. Built fresh per invocation.
///
/// JSON values are converted to host values when the scope is built; a
/// `null` becomes the unit value.
#[derive(Debug, Clone, Default)]
pub struct ExecutionEnvironment {
    /// The invoking user (or guild member).
    pub actor: Value,
    pub channel: Value,
    pub channel_id: Value,
    pub guild: Value,
    pub guild_id: Value,
    pub message: Value,
    /// Result of the owning plugin's last in-process run.
    pub previous_result: Dynamic,
    /// The unit's single parameter: the running bot's identity.
    pub bot: Value,
}

impl ExecutionEnvironment {
    /// Name/value pairs in the order they are pushed into the scope.
    pub fn bindings(&self) -> Result<Vec<(&'static str, Dynamic)>, ScriptError> {
        let json = [
            ("actor", &self.actor),
            ("channel", &self.channel),
            ("channelId", &self.channel_id),
            ("guild", &self.guild),
            ("guildId", &self.guild_id),
            ("message", &self.message),
            ("bot", &self.bot),
        ];

        let mut bindings = Vec::with_capacity(json.len() + 1);
        for (name, value) in json {
            let value = rhai::serde::to_dynamic(value).map_err(|e| ScriptError::Runtime {
                message: format!("cannot bind `{name}`: {e}"),
            })?;
            bindings.push((name, value));
        }
        bindings.push(("previousResult", self.previous_result.clone()));
        Ok(bindings)
    }
}

/// Why a unit did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    /// The source did not parse. Positions are 1-based and refer to the
    /// wrapped source.
    #[error("ParseError: {message}")]
    Parse {
        message: String,
        line: Option<usize>,
        column: Option<usize>,
    },
    #[error("RuntimeError: {message}")]
    Runtime { message: String },
}

impl ScriptError {
    /// Human-readable report; parse errors point at the offending column of
    /// `source` when the position is known.
    pub fn render(&self, source: &str) -> String {
        match self {
            ScriptError::Parse {
                message,
                line: Some(line),
                column,
            } => {
                let text = line
                    .checked_sub(1)
                    .and_then(|i| source.lines().nth(i))
                    .unwrap_or_default();
                match column {
                    Some(column) => format!(
                        "{text}\n{caret:>width$}\nParseError: {message}",
                        caret = "^",
                        width = *column
                    ),
                    None => format!("{text}\nParseError: {message}"),
                }
            }
            other => other.to_string(),
        }
    }
}

/// Something that can evaluate a wrapped unit.
///
/// Implementations write whatever the unit prints into the given sink and
/// must not touch the process's own output streams.
pub trait ScriptHost: Send + Sync + 'static {
    fn evaluate(
        &self,
        source: &str,
        env: &ExecutionEnvironment,
        sink: CaptureSink,
    ) -> Result<Dynamic, ScriptError>;
}

/// The embedded Rhai interpreter.
#[derive(Debug, Clone, Default)]
pub struct RhaiHost {
    /// Upper bound on interpreter operations; `None` means unbounded.
    pub max_operations: Option<u64>,
}

impl RhaiHost {
    fn engine(&self, sink: CaptureSink) -> Engine {
        let mut engine = Engine::new();
        if let Some(max) = self.max_operations {
            engine.set_max_operations(max);
        }

        let out = sink.clone();
        engine.on_print(move |text| out.write_line(text));
        let logged = sink.clone();
        engine.register_fn("log", move |text: &str| {
            info!(target: "yami::eval", "{text}");
            logged.write_line(&format!("[log] {text}"));
        });
        engine.on_debug(move |text, _source, pos| {
            if pos.is_none() {
                sink.write_line(text);
            } else {
                sink.write_line(&format!("{pos} | {text}"));
            }
        });
        engine
    }
}

impl ScriptHost for RhaiHost {
    fn evaluate(
        &self,
        source: &str,
        env: &ExecutionEnvironment,
        sink: CaptureSink,
    ) -> Result<Dynamic, ScriptError> {
        let engine = self.engine(sink);

        let mut scope = Scope::new();
        for (name, value) in env.bindings()? {
            scope.push_dynamic(name, value);
        }

        let ast = engine
            .compile_with_scope(&scope, source)
            .map_err(|e| ScriptError::Parse {
                message: e.err_type().to_string(),
                line: e.position().line(),
                column: e.position().position(),
            })?;

        engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
            .map_err(|e| ScriptError::Runtime {
                message: e.to_string(),
            })
    }
}

/// Display form of a returned value; the unit value shows as `()`.
pub fn describe_value(value: &Dynamic) -> String {
    if value.is_unit() {
        "()".to_string()
    } else {
        value.to_string()
    }
}
