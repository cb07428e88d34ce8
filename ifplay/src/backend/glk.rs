//! JSON-framed subprocess backend for Glk interpreters.
//!
//! Drives an interpreter built against a remglk-style JSON I/O layer
//! (e.g. `glulxe -fm`). Each turn is one self-delimiting JSON update, so
//! this transport needs no idle-window heuristic: framing is a blank line
//! after the JSON object. Location and score come from the grid (status)
//! window fields instead of text scraping, which is strictly more reliable.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::backend::pipe::ChildPipe;
use crate::backend::{Backend, BackendError, Tuning};
use crate::core::extract;
use crate::core::types::TurnPayload;

static STATUS_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}|Score:|Turns:|Moves:").unwrap());

/// One update message from the interpreter. Fields the harness does not
/// consume are ignored on parse.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Update {
    #[serde(rename = "type")]
    kind: String,
    r#gen: u64,
    windows: Vec<Window>,
    content: Vec<WindowContent>,
    input: Vec<InputRequest>,
    exit: bool,
    message: String,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
struct Window {
    id: u64,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WindowContent {
    id: u64,
    text: Vec<TextRun>,
    lines: Vec<GridLine>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TextRun {
    content: Vec<Span>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GridLine {
    content: Vec<Span>,
}

/// remglk emits text either as a bare string or as a styled run.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Span {
    Plain(String),
    Styled {
        #[serde(default)]
        text: String,
    },
}

impl Span {
    fn text(&self) -> &str {
        match self {
            Span::Plain(text) => text,
            Span::Styled { text } => text,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InputRequest {
    id: u64,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug)]
pub struct GlkBackend {
    interpreter: PathBuf,
    game: PathBuf,
    tuning: Tuning,
    pipe: Option<ChildPipe>,
    /// Unconsumed stdout; a chunk may hold part of the next message.
    buffer: String,
    /// Generation counter echoed back on every input message.
    r#gen: u64,
    /// Window currently requesting line input.
    input_window: Option<u64>,
    /// Window kinds are only re-sent when windows change, so cache them.
    window_kinds: HashMap<u64, String>,
}

impl GlkBackend {
    pub fn new(interpreter: PathBuf, game: PathBuf, tuning: Tuning) -> Self {
        Self {
            interpreter,
            game,
            tuning,
            pipe: None,
            buffer: String::new(),
            r#gen: 0,
            input_window: None,
            window_kinds: HashMap::new(),
        }
    }

    fn read_update(&mut self, timeout: Duration) -> Result<Update, BackendError> {
        let pipe = self
            .pipe
            .as_mut()
            .ok_or_else(|| BackendError::Disconnected("backend not started".to_string()))?;

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(raw) = take_message(&mut self.buffer) {
                return parse_update(&raw);
            }
            match pipe.read_chunk(self.tuning.idle_window) {
                Ok(Some(chunk)) => self.buffer.push_str(&chunk),
                Ok(None) => {
                    // A complete object may have arrived without its
                    // blank-line terminator; a partial one is left alone.
                    let trimmed = self.buffer.trim();
                    if !trimmed.is_empty() && serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
                        let raw = trimmed.to_string();
                        self.buffer.clear();
                        return parse_update(&raw);
                    }
                    if Instant::now() >= deadline {
                        return Err(BackendError::Timeout(timeout));
                    }
                }
                Err(BackendError::Crash(reason)) => {
                    let trimmed = self.buffer.trim().to_string();
                    self.buffer.clear();
                    if trimmed.is_empty() {
                        return Err(BackendError::Crash(reason));
                    }
                    return parse_update(&trimmed);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn ingest(&mut self, update: &Update) {
        self.r#gen = update.r#gen;
        for window in &update.windows {
            self.window_kinds.insert(window.id, window.kind.clone());
        }
        self.input_window = update
            .input
            .iter()
            .find(|request| request.kind == "line")
            .map(|request| request.id);
    }

    fn kind_of(&self, window_id: u64) -> Option<&str> {
        self.window_kinds.get(&window_id).map(String::as_str)
    }

    /// Story text: every line of every buffer window, in message order.
    fn story_text(&self, update: &Update) -> String {
        let mut parts = Vec::new();
        for content in &update.content {
            if self.kind_of(content.id) != Some("buffer") {
                continue;
            }
            for run in &content.text {
                let line: String = run.content.iter().map(Span::text).collect();
                parts.push(line);
            }
        }
        extract::clean_response(&parts.join("\n"))
    }

    /// First grid-window line, typically "Location    Score: 5  Moves: 12".
    fn status_line(&self, update: &Update) -> Option<String> {
        for content in &update.content {
            if self.kind_of(content.id) != Some("grid") {
                continue;
            }
            if let Some(first) = content.lines.first() {
                let line: String = first.content.iter().map(Span::text).collect();
                let line = line.trim().to_string();
                if !line.is_empty() {
                    return Some(line);
                }
            }
        }
        None
    }

    fn payload_from(&self, update: &Update) -> TurnPayload {
        let text = self.story_text(update);
        let status = self.status_line(update);

        let location = status.as_deref().and_then(|line| {
            STATUS_SPLIT_RE
                .split(line)
                .next()
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
        });
        let score = status.as_deref().and_then(extract::scrape_score);

        let game_over = update.exit || update.input.is_empty() || extract::looks_fatal(&text);
        TurnPayload {
            location,
            score,
            game_over,
            text,
        }
    }

    fn send_message(&mut self, message: &serde_json::Value) -> Result<(), BackendError> {
        let pipe = self
            .pipe
            .as_mut()
            .ok_or_else(|| BackendError::Disconnected("backend not started".to_string()))?;
        // The interpreter expects each message followed by a blank line.
        pipe.write_raw(&format!("{message}\n\n"))
    }
}

impl Backend for GlkBackend {
    #[instrument(skip_all, fields(game = %self.game.display()))]
    fn start(&mut self) -> Result<TurnPayload, BackendError> {
        if !self.game.exists() {
            return Err(BackendError::Start(format!(
                "game file not found: {}",
                self.game.display()
            )));
        }

        // -fm: fixed metrics, skipping the init handshake.
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg("-fm")
            .arg("-width")
            .arg(self.tuning.screen_width.to_string())
            .arg("-height")
            .arg(self.tuning.screen_height.to_string())
            .arg(&self.game);

        self.pipe = Some(ChildPipe::spawn(cmd)?);
        let startup = self.tuning.startup_timeout;
        let update = self.read_update(startup).map_err(|err| match err {
            BackendError::Timeout(_) => {
                BackendError::Start(format!("no interpreter update within {startup:?}"))
            }
            other => other,
        })?;
        self.ingest(&update);
        Ok(self.payload_from(&update))
    }

    fn send(&mut self, command: &str) -> Result<(), BackendError> {
        let window = self.input_window.ok_or_else(|| {
            BackendError::Disconnected("interpreter is not awaiting line input".to_string())
        })?;
        let message = json!({
            "type": "line",
            "gen": self.r#gen,
            "window": window,
            "value": command,
        });
        self.send_message(&message)
    }

    fn receive(&mut self, timeout: Duration) -> Result<TurnPayload, BackendError> {
        let update = self.read_update(timeout)?;
        self.ingest(&update);
        debug!(r#gen = self.r#gen, awaiting_input = self.input_window.is_some(), "update ingested");
        Ok(self.payload_from(&update))
    }

    fn is_alive(&mut self) -> bool {
        self.pipe.as_mut().is_some_and(ChildPipe::is_alive)
    }

    fn stop(&mut self) {
        if let Some(window) = self.input_window {
            let message = json!({
                "type": "line",
                "gen": self.r#gen,
                "window": window,
                "value": "quit",
            });
            let _ = self.send_message(&message);
        }
        if let Some(pipe) = self.pipe.as_mut() {
            pipe.shutdown(self.tuning.stop_grace);
        }
    }
}

/// Take one blank-line-terminated message off the front of `buffer`.
fn take_message(buffer: &mut String) -> Option<String> {
    let start = buffer.len() - buffer.trim_start_matches('\n').len();
    if let Some(pos) = buffer[start..].find("\n\n") {
        let message = buffer[start..start + pos].to_string();
        buffer.drain(..start + pos + 2);
        return Some(message);
    }
    None
}

fn parse_update(raw: &str) -> Result<Update, BackendError> {
    let update: Update = serde_json::from_str(raw)
        .map_err(|err| BackendError::Protocol(format!("parse update: {err}")))?;
    if update.kind == "error" {
        return Err(BackendError::Protocol(format!(
            "interpreter error update: {}",
            update.message
        )));
    }
    Ok(update)
}
