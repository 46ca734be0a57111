//! Yami: an owner-only Discord bot for evaluating scripts and shell commands.
//!
//! The command framework, plugins and evaluation core are transport-agnostic
//! and always compiled. The `io` feature adds the Discord REST client, the
//! gateway connection and the runtime that ties them together.

pub mod config;
pub mod converters;
pub mod error;
pub mod eval;
pub mod events;
pub mod framework;
pub mod plugin;
pub mod plugins;
pub mod types;

#[cfg(feature = "io")]
pub mod bot;
#[cfg(feature = "io")]
pub mod gateway;
#[cfg(feature = "io")]
pub mod http;

pub use config::BotConfig;
pub use error::BotError;
pub use framework::{Framework, Shutdown};
