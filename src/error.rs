//! Error types, one enum per layer.

use thiserror::Error;

/// Failure of a REST call.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Non-success status from Discord.
    #[error("Discord API error {status} on {route}: {body}")]
    Api {
        status: u16,
        body: String,
        route: String,
    },
    /// Transport / network error.
    #[error("HTTP transport error: {0}")]
    Transport(String),
    #[error("Serialisation error: {0}")]
    Serde(String),
}

impl HttpError {
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Errors best-effort cleanup is allowed to swallow: the message is
    /// already gone, or we may not touch it.
    pub fn is_ignorable(&self) -> bool {
        self.is_not_found() || self.is_forbidden()
    }
}

/// Failure of a routed command, reported by the router.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Http(#[from] HttpError),
    /// An argument could not be converted.
    #[error("{0}")]
    Converter(String),
    #[error("{user} is not an owner of this bot")]
    NotOwner { user: String },
    #[error(transparent)]
    Plugin(#[from] PluginError),
}

/// Failure while loading or unloading an extension.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("extension `{0}` is already loaded")]
    AlreadyLoaded(String),
    #[error("extension `{0}` is not loaded")]
    NotLoaded(String),
    #[error("command `{command}` of `{extension}` clashes with a loaded command")]
    CommandClash { extension: String, command: String },
}

/// Fatal startup/runtime failure of the bot process.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("The provided token is invalid.")]
    InvalidToken,
    #[error("no token provided")]
    MissingToken,
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("gateway error: {0}")]
    Gateway(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
