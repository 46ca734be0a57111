//! Extraction of fenced code blocks from raw command input.

use std::sync::OnceLock;

use regex::Regex;

/// Opening fence with an optional tag on the same line, then a body free of
/// backticks, then the closing fence.
const FENCE_PATTERN: &str = r"```(?P<syntax>.*)\n(?P<body>[^`]+?)```";

fn fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(FENCE_PATTERN).expect("fence pattern is valid"))
}

/// Split `raw` into `(language_tag, body)`.
///
/// The first fenced block wins. The tag is `Some("")` when the fence has no
/// tag. Without a fence the whole input is returned verbatim with no tag.
pub fn extract(raw: &str) -> (Option<String>, String) {
    match fence().captures(raw) {
        Some(caps) => {
            let syntax = caps.name("syntax").map_or("", |m| m.as_str());
            let body = caps.name("body").map_or("", |m| m.as_str());
            (Some(syntax.trim_end_matches('\r').to_string()), body.to_string())
        }
        None => (None, raw.to_string()),
    }
}
