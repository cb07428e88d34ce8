//! Walkthrough script parsing.
//!
//! A script is a sequence of lines: `#` comments and blank lines are
//! ignored, `@expect-<kind>` lines compile to assertions, and anything else
//! is a player command sent verbatim (trimmed). Parsing is one pass,
//! order-preserving, and total: a malformed script fails here, before any
//! command reaches a backend.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::core::assertions::{Assertion, Cmp};

static QUOTED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""([^"]*)""#).unwrap());

/// Syntax error in a walkthrough script, with its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("script line {line}: {message}")]
pub struct ScriptError {
    pub line: u32,
    pub message: String,
}

/// One node of a parsed script, in authored order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptNode {
    Command { line: u32, text: String },
    Expect { line: u32, assertion: Assertion },
}

/// A parsed walkthrough: ordered, read-only after parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub nodes: Vec<ScriptNode>,
}

impl Script {
    pub fn command_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, ScriptNode::Command { .. }))
            .count()
    }
}

/// Parse a walkthrough script.
pub fn parse_script(text: &str) -> Result<Script, ScriptError> {
    let mut nodes = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = u32::try_from(idx + 1).unwrap_or(u32::MAX);
        let trimmed = raw.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if trimmed.starts_with('@') {
            let assertion = parse_directive(line, trimmed)?;
            nodes.push(ScriptNode::Expect { line, assertion });
            continue;
        }

        nodes.push(ScriptNode::Command {
            line,
            text: trimmed.to_string(),
        });
    }

    Ok(Script { nodes })
}

fn parse_directive(line: u32, text: &str) -> Result<Assertion, ScriptError> {
    let err = |message: String| ScriptError { line, message };

    let (word, rest) = match text.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (text, ""),
    };
    let kind = word
        .strip_prefix("@expect-")
        .ok_or_else(|| err(format!("unknown directive '{word}' (expected @expect-<kind>)")))?;

    let quoted = |rest: &str| -> Result<String, ScriptError> {
        QUOTED_RE
            .captures(rest)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| err(format!("@expect-{kind} requires a quoted value")))
    };
    let integer = |rest: &str| -> Result<i64, ScriptError> {
        rest.trim_matches('"')
            .parse()
            .map_err(|_| err(format!("@expect-{kind} requires an integer value, got '{rest}'")))
    };
    let turn_count = |rest: &str| -> Result<u32, ScriptError> {
        u32::try_from(integer(rest)?)
            .map_err(|_| err(format!("@expect-{kind} requires a non-negative turn count")))
    };

    let assertion = match kind {
        "location" => Assertion::Location { expected: quoted(rest)? },
        "location-exact" => Assertion::LocationExact { expected: quoted(rest)? },
        "contains" => Assertion::Contains { expected: quoted(rest)? },
        "not-contains" => Assertion::NotContains { expected: quoted(rest)? },
        "inventory" => Assertion::Inventory { item: quoted(rest)? },
        "score" => Assertion::Score { expected: integer(rest)?, cmp: Cmp::Eq },
        "score-gt" => Assertion::Score { expected: integer(rest)?, cmp: Cmp::Gt },
        "score-gte" => Assertion::Score { expected: integer(rest)?, cmp: Cmp::Gte },
        "score-lt" => Assertion::Score { expected: integer(rest)?, cmp: Cmp::Lt },
        "score-lte" => Assertion::Score { expected: integer(rest)?, cmp: Cmp::Lte },
        "turns" => Assertion::Turns { expected: turn_count(rest)?, cmp: Cmp::Eq },
        "turns-lt" => Assertion::Turns { expected: turn_count(rest)?, cmp: Cmp::Lt },
        "turns-lte" => Assertion::Turns { expected: turn_count(rest)?, cmp: Cmp::Lte },
        "turns-gte" => Assertion::Turns { expected: turn_count(rest)?, cmp: Cmp::Gte },
        other => return Err(err(format!("unknown assertion kind '@expect-{other}'"))),
    };
    Ok(assertion)
}
