//! The unit of code built from one command invocation.

use super::source;

/// How a [`CodeUnit`] is run. Chosen when the command is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionKind {
    /// Evaluated by the embedded scripting host.
    InProcess,
    /// Handed to the platform shell as a command line.
    ExternalProcess,
}

/// Indentation applied to the body inside the invoke block.
const INDENT: &str = "    ";

fn starts_item(line: &str) -> bool {
    line.starts_with("fn ") || line.starts_with("private fn ")
}

fn brace_delta(line: &str) -> i64 {
    line.chars().fold(0, |depth, c| match c {
        '{' => depth + 1,
        '}' => depth - 1,
        _ => depth,
    })
}

/// Wrap `body` into the invokable block evaluated by the scripting host.
///
/// The block is evaluated with the environment bindings (and `bot`, the
/// unit's parameter) in scope; its last expression, or the operand of a
/// `return`, is the unit's result. Functions defined at the top of the body
/// (`fn` at column zero) are moved in front of the block, where the host
/// accepts them, keeping their text unchanged.
///
/// Precondition: callers sit behind the owner-only check. Nothing here
/// validates or sanitizes the body.
pub fn wrap(body: &str) -> String {
    let mut items = String::new();
    let mut block = String::with_capacity(body.len() + 8);
    let mut item_depth: Option<i64> = None;

    for line in body.lines() {
        match item_depth {
            Some(depth) => {
                items.push_str(line);
                items.push('\n');
                let depth = depth + brace_delta(line);
                item_depth = (depth > 0).then_some(depth);
            }
            None if starts_item(line) => {
                items.push_str(line);
                items.push('\n');
                let depth = brace_delta(line);
                item_depth = (depth > 0 || !line.contains('{')).then_some(depth);
            }
            None => {
                if !line.is_empty() {
                    block.push_str(INDENT);
                }
                block.push_str(line);
                block.push('\n');
            }
        }
    }

    let mut wrapped = String::with_capacity(items.len() + block.len() + 4);
    wrapped.push_str(&items);
    wrapped.push_str("{\n");
    wrapped.push_str(&block);
    wrapped.push('}');
    wrapped
}

/// One invocation's code, as received and as it will be run.
#[derive(Debug, Clone)]
pub struct CodeUnit {
    original: String,
    language: Option<String>,
    body: String,
    wrapped: String,
    kind: ExecutionKind,
    /// Set once the in-process run completes without error.
    pub succeeded: bool,
}

impl CodeUnit {
    /// Build a unit from raw command input.
    pub fn new(raw: impl Into<String>, kind: ExecutionKind) -> Self {
        let original = raw.into();
        let (language, body) = source::extract(&original);
        let wrapped = match kind {
            ExecutionKind::InProcess => wrap(&body),
            ExecutionKind::ExternalProcess => body.clone(),
        };
        Self {
            original,
            language,
            body,
            wrapped,
            kind,
            succeeded: false,
        }
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// The source actually handed to the host or the shell.
    pub fn wrapped(&self) -> &str {
        &self.wrapped
    }

    pub fn kind(&self) -> ExecutionKind {
        self.kind
    }
}

impl std::fmt::Display for CodeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.wrapped)
    }
}
