//! Scrubbing of captured output before it leaves the capture boundary.

/// Placeholder shown in place of the bot token.
pub const TOKEN_PLACEHOLDER: &str = "~TOKEN~";

/// Look-alike used instead of a backtick so captured text cannot close the
/// surrounding code fence.
pub const BACKTICK_SUBSTITUTE: char = '´';

/// Replace every occurrence of `token` in `text` with [`TOKEN_PLACEHOLDER`].
///
/// An empty token redacts nothing.
pub fn redact_token(text: &str, token: &str) -> String {
    if token.is_empty() {
        return text.to_string();
    }
    text.replace(token, TOKEN_PLACEHOLDER)
}

/// Replace backticks with [`BACKTICK_SUBSTITUTE`].
pub fn escape_backticks(text: &str) -> String {
    text.replace('`', &BACKTICK_SUBSTITUTE.to_string())
}

/// Full scrub applied to captured output: token first, then backticks.
pub fn scrub(text: &str, token: &str) -> String {
    escape_backticks(&redact_token(text, token))
}
