//! Best-effort extraction of structured state from raw game text.
//!
//! IF interpreters give no framing or schema for the text transports, so
//! everything here is heuristic. Every function degrades to "unknown"
//! (`None`/`false`) when a pattern does not match; none of them error.

use std::sync::LazyLock;

use regex::Regex;

static SCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:score[:\s]+|scored?\s+)(\d+)").unwrap());

static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").unwrap());

static FATAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\*\*\*\s*(?:You have died|The End|GAME OVER)\s*\*\*\*|(?:Would you like to|Do you want to)\s+(?:RESTART|RESTORE|QUIT)",
    )
    .unwrap()
});

const DISCONNECT_PHRASES: &[&str] = &["connection closed", "goodbye", "disconnected", "come back soon"];

/// Normalize line endings, collapse runs of blank lines, and trim.
pub fn clean_response(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut cleaned = Vec::new();
    let mut prev_blank = false;
    for line in text.split('\n') {
        let is_blank = line.trim().is_empty();
        if !(is_blank && prev_blank) {
            cleaned.push(line);
        }
        prev_blank = is_blank;
    }
    cleaned.join("\n").trim().to_string()
}

/// Remove a trailing input prompt (e.g. `>`) plus surrounding whitespace.
pub fn strip_prompt(text: &str, suffix: &str) -> String {
    let trimmed = text.trim_end();
    match trimmed.strip_suffix(suffix) {
        Some(rest) => rest.trim_end().to_string(),
        None => trimmed.to_string(),
    }
}

/// Remove the echoed command from the start of a response.
///
/// Interpreters echo the player's input back on the first line; the echo is
/// noise for matching assertions against the actual response.
pub fn strip_command_echo(text: &str, command: &str) -> String {
    let mut lines = text.splitn(2, '\n');
    let first = lines.next().unwrap_or("");
    if first.trim().eq_ignore_ascii_case(command.trim()) {
        return lines.next().unwrap_or("").trim_start_matches('\n').to_string();
    }
    text.to_string()
}

/// Strip ANSI escape sequences (colors, cursor movement).
pub fn strip_ansi(text: &str) -> String {
    ANSI_RE.replace_all(text, "").into_owned()
}

/// Guess the current room name from response text.
///
/// Room names are typically a short capitalized line near the top, free of
/// sentence punctuation. Returns `None` rather than guessing badly.
pub fn scrape_location(text: &str) -> Option<String> {
    for line in text.trim().lines().take(5) {
        let line = line.trim();
        if line.is_empty() || line.len() > 60 {
            continue;
        }
        if line.contains(['.', ',', '!', '?', ':']) {
            continue;
        }
        if line.chars().next().is_some_and(char::is_uppercase) && (3..=50).contains(&line.len()) {
            return Some(line.to_string());
        }
    }
    None
}

/// Pull a score out of "Score: 10" / "you have scored 10" phrasing.
pub fn scrape_score(text: &str) -> Option<i64> {
    SCORE_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Parse an inventory listing into item names.
///
/// Only fires when the response reads like an inventory ("You are carrying:"
/// or an `inventory` command's output); returns `None` otherwise so the
/// previous snapshot is kept.
pub fn scrape_inventory(text: &str) -> Option<Vec<String>> {
    let lower = text.to_lowercase();
    if !lower.contains("carrying") && !lower.contains("inventory") {
        return None;
    }

    let mut items = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let lowered = line.to_lowercase();
        if lowered.starts_with("you") || lowered.starts_with("carrying") || lowered.starts_with("inventory") {
            continue;
        }
        let item = line
            .trim_start_matches(['-', '*', '•'])
            .trim_start();
        let item = strip_article(item);
        if !item.is_empty() {
            items.push(item.to_string());
        }
    }

    if items.is_empty() { None } else { Some(items) }
}

fn strip_article(item: &str) -> &str {
    for article in ["a ", "an ", "the ", "A ", "An ", "The "] {
        if let Some(rest) = item.strip_prefix(article) {
            return rest.trim_start();
        }
    }
    item
}

/// Death / game-over phrasing from a subprocess interpreter.
pub fn looks_fatal(text: &str) -> bool {
    FATAL_RE.is_match(text)
}

/// Disconnect phrasing from a remote host.
pub fn looks_disconnected(text: &str) -> bool {
    let lower = text.to_lowercase();
    DISCONNECT_PHRASES.iter().any(|phrase| lower.contains(phrase))
}
