//! Command declarations and prefix parsing.

/// A command a plugin registers. Names and aliases match
/// case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub owner_only: bool,
    /// Name of the plugin method implementing the command, used for
    /// source inspection.
    pub handler: &'static str,
    /// One-line description shown when arguments fail to convert.
    pub help: &'static str,
}

impl CommandSpec {
    pub fn matches(&self, invoked: &str) -> bool {
        self.name.eq_ignore_ascii_case(invoked)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(invoked))
    }

    /// `name (alias, alias): help`, or less when parts are empty.
    pub fn usage(&self) -> String {
        let mut usage = self.name.to_string();
        if !self.aliases.is_empty() {
            usage.push_str(&format!(" ({})", self.aliases.join(", ")));
        }
        if !self.help.is_empty() {
            usage.push_str(": ");
            usage.push_str(self.help);
        }
        usage
    }

    /// The name followed by every alias.
    pub fn all_names(&self) -> impl Iterator<Item = &'static str> {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }
}

/// A message split into prefix, invoked name and argument text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation<'a> {
    pub prefix: &'a str,
    pub invoked_with: &'a str,
    /// Everything after the invoked name, leading whitespace removed and
    /// internal layout (newlines, fences) preserved.
    pub args: &'a str,
}

/// Match `content` against `prefixes` (first match wins) and split off the
/// invoked name.
pub fn parse_invocation<'a>(content: &'a str, prefixes: &[String]) -> Option<Invocation<'a>> {
    let prefix_len = prefixes
        .iter()
        .find(|p| !p.is_empty() && content.starts_with(p.as_str()))?
        .len();
    let prefix = &content[..prefix_len];
    let rest = content[prefix_len..].trim_start();

    let name_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let invoked_with = &rest[..name_end];
    if invoked_with.is_empty() {
        return None;
    }
    let args = rest[name_end..].trim_start();

    Some(Invocation {
        prefix,
        invoked_with,
        args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: CommandSpec = CommandSpec {
        name: "execute",
        aliases: &["exec", "eval"],
        owner_only: true,
        handler: "execute",
        help: "",
    };

    fn prefixes() -> Vec<String> {
        vec!["<@1> ".to_string(), "<@1>".to_string(), "yr.".to_string()]
    }

    #[test]
    fn aliases_match_case_insensitively() {
        assert!(SPEC.matches("EXEC"));
        assert!(SPEC.matches("Execute"));
        assert!(!SPEC.matches("shell"));
    }

    #[test]
    fn all_names_lists_name_first() {
        assert_eq!(SPEC.all_names().collect::<Vec<_>>(), vec!["execute", "exec", "eval"]);
    }

    #[test]
    fn usage_lists_aliases_and_help() {
        assert_eq!(SPEC.usage(), "execute (exec, eval)");
        let documented = CommandSpec {
            help: "Evaluate a code block.",
            aliases: &[],
            ..SPEC
        };
        assert_eq!(documented.usage(), "execute: Evaluate a code block.");
    }

    #[test]
    fn parses_text_prefix() {
        let inv = parse_invocation("yr.eval return 1", &prefixes()).unwrap();
        assert_eq!(inv.prefix, "yr.");
        assert_eq!(inv.invoked_with, "eval");
        assert_eq!(inv.args, "return 1");
    }

    #[test]
    fn parses_mention_prefix() {
        let inv = parse_invocation("<@1> sh ls", &prefixes()).unwrap();
        assert_eq!(inv.prefix, "<@1> ");
        assert_eq!(inv.invoked_with, "sh");
        assert_eq!(inv.args, "ls");
    }

    #[test]
    fn keeps_code_block_layout() {
        let inv = parse_invocation("yr.eval\n```rhai\nlet x = 1;\n```", &prefixes()).unwrap();
        assert_eq!(inv.invoked_with, "eval");
        assert_eq!(inv.args, "```rhai\nlet x = 1;\n```");
    }

    #[test]
    fn rejects_missing_prefix_or_name() {
        assert!(parse_invocation("eval 1", &prefixes()).is_none());
        assert!(parse_invocation("yr.", &prefixes()).is_none());
        assert!(parse_invocation("yr.   ", &prefixes()).is_none());
    }

    #[test]
    fn command_without_args() {
        let inv = parse_invocation("yr.panic", &prefixes()).unwrap();
        assert_eq!(inv.invoked_with, "panic");
        assert_eq!(inv.args, "");
    }
}
