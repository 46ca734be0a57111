//! Process configuration read from the environment.
//!
//! | variable       | meaning                                        | default          |
//! |----------------|------------------------------------------------|------------------|
//! | `YAMI_TOKEN`   | bot token; prompted for on stdin when unset    |                  |
//! | `YAMI_PREFIX`  | text prefix accepted in direct messages        | `yr.`            |
//! | `YAMI_OWNERS`  | extra owner ids, comma separated               |                  |
//! | `YAMI_LOG`     | tracing filter (falls back to `RUST_LOG`)      | `warn,yami=info` |
//! | `YAMI_PLUGINS` | subset of plugins to load, comma separated     | all              |

use std::io::{self, BufRead, Write};
use std::time::Duration;

use crate::error::BotError;
use crate::framework::FrameworkOptions;
use crate::types::Snowflake;

pub const DEFAULT_PREFIX: &str = "yr.";
pub const DEFAULT_LOG_FILTER: &str = "warn,yami=info";
const TOKEN_PROMPT: &str = "Please input a token. ";

#[derive(Clone)]
pub struct BotConfig {
    pub token: String,
    pub prefix: String,
    pub owners: Vec<Snowflake>,
    pub log_filter: String,
    /// `None` loads every plugin in the manifest.
    pub plugins: Option<Vec<String>>,
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"<redacted>")
            .field("prefix", &self.prefix)
            .field("owners", &self.owners)
            .field("log_filter", &self.log_filter)
            .field("plugins", &self.plugins)
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn list(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// The token from `YAMI_TOKEN`, or from `prompt` when unset.
pub fn resolve_token<L, P>(lookup: &L, prompt: P) -> Result<String, BotError>
where
    L: Fn(&str) -> Option<String>,
    P: FnOnce() -> io::Result<String>,
{
    if let Some(token) = non_empty(lookup("YAMI_TOKEN")) {
        return Ok(token);
    }
    non_empty(Some(prompt()?)).ok_or(BotError::MissingToken)
}

/// Ask for a token on the terminal.
pub fn prompt_stdin() -> io::Result<String> {
    let mut stdout = io::stdout();
    stdout.write_all(TOKEN_PROMPT.as_bytes())?;
    stdout.flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

impl BotConfig {
    pub fn from_env() -> Result<Self, BotError> {
        Self::from_lookup(|key| std::env::var(key).ok(), prompt_stdin)
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<L, P>(lookup: L, prompt: P) -> Result<Self, BotError>
    where
        L: Fn(&str) -> Option<String>,
        P: FnOnce() -> io::Result<String>,
    {
        let token = resolve_token(&lookup, prompt)?;
        let plugins = list(lookup("YAMI_PLUGINS"));
        Ok(Self {
            token,
            prefix: non_empty(lookup("YAMI_PREFIX")).unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            owners: list(lookup("YAMI_OWNERS")),
            log_filter: non_empty(lookup("YAMI_LOG"))
                .or_else(|| non_empty(lookup("RUST_LOG")))
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            plugins: (!plugins.is_empty()).then_some(plugins),
        })
    }

    pub fn framework_options(&self) -> FrameworkOptions {
        FrameworkOptions {
            token: self.token.clone(),
            dm_prefix: self.prefix.clone(),
            edit_timeout: Duration::from_secs(60),
            navigation_timeout: Duration::from_secs(120),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn no_prompt() -> io::Result<String> {
        panic!("prompted although a token was set")
    }

    #[test]
    fn defaults() {
        let config = BotConfig::from_lookup(lookup(&[("YAMI_TOKEN", "abc")]), no_prompt).unwrap();
        assert_eq!(config.token, "abc");
        assert_eq!(config.prefix, "yr.");
        assert!(config.owners.is_empty());
        assert_eq!(config.log_filter, "warn,yami=info");
        assert!(config.plugins.is_none());
    }

    #[test]
    fn reads_every_variable() {
        let config = BotConfig::from_lookup(
            lookup(&[
                ("YAMI_TOKEN", " abc "),
                ("YAMI_PREFIX", "!"),
                ("YAMI_OWNERS", "1, 2,,3"),
                ("RUST_LOG", "debug"),
                ("YAMI_PLUGINS", "superuser"),
            ]),
            no_prompt,
        )
        .unwrap();
        assert_eq!(config.token, "abc");
        assert_eq!(config.prefix, "!");
        assert_eq!(config.owners, vec!["1", "2", "3"]);
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.plugins, Some(vec!["superuser".to_string()]));
    }

    #[test]
    fn yami_log_wins_over_rust_log() {
        let config = BotConfig::from_lookup(
            lookup(&[("YAMI_TOKEN", "t"), ("YAMI_LOG", "trace"), ("RUST_LOG", "debug")]),
            no_prompt,
        )
        .unwrap();
        assert_eq!(config.log_filter, "trace");
    }

    #[test]
    fn prompts_when_token_missing() {
        let token = resolve_token(&lookup(&[]), || Ok("typed.token\n".to_string())).unwrap();
        assert_eq!(token, "typed.token");
    }

    #[test]
    fn empty_prompt_is_missing_token() {
        let err = resolve_token(&lookup(&[("YAMI_TOKEN", "")]), || Ok("\n".to_string())).unwrap_err();
        assert!(matches!(err, BotError::MissingToken));
    }

    #[test]
    fn debug_hides_token() {
        let config = BotConfig::from_lookup(lookup(&[("YAMI_TOKEN", "secret")]), no_prompt).unwrap();
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn options_carry_prefix_and_token() {
        let config = BotConfig::from_lookup(lookup(&[("YAMI_TOKEN", "t"), ("YAMI_PREFIX", "!")]), no_prompt).unwrap();
        let options = config.framework_options();
        assert_eq!(options.token, "t");
        assert_eq!(options.dm_prefix, "!");
        assert_eq!(options.edit_timeout, Duration::from_secs(60));
    }
}
