//! Test-only scripted fakes: backends, command sources, and sinks that
//! return predetermined results without spawning processes or sockets.

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::Result;

use crate::backend::{Backend, BackendError};
use crate::core::types::{SessionState, TurnPayload};
use crate::io::source::CommandSource;
use crate::io::transcript::TranscriptSink;

/// Payload with just text; no structured fields.
pub fn payload(text: &str) -> TurnPayload {
    TurnPayload {
        text: text.to_string(),
        ..TurnPayload::default()
    }
}

/// Payload with text and a location.
pub fn payload_at(location: &str, text: &str) -> TurnPayload {
    TurnPayload {
        text: text.to_string(),
        location: Some(location.to_string()),
        ..TurnPayload::default()
    }
}

/// Backend that replays a queue of scripted turn results.
pub struct ScriptedBackend {
    intro: Option<Result<TurnPayload, BackendError>>,
    turns: VecDeque<Result<TurnPayload, BackendError>>,
    pub sent: Vec<String>,
    pub stop_count: u32,
    pub alive: bool,
}

impl ScriptedBackend {
    pub fn new(intro: TurnPayload, turns: Vec<Result<TurnPayload, BackendError>>) -> Self {
        Self {
            intro: Some(Ok(intro)),
            turns: turns.into(),
            sent: Vec::new(),
            stop_count: 0,
            alive: false,
        }
    }

    pub fn failing_start(err: BackendError) -> Self {
        Self {
            intro: Some(Err(err)),
            turns: VecDeque::new(),
            sent: Vec::new(),
            stop_count: 0,
            alive: false,
        }
    }
}

impl Backend for ScriptedBackend {
    fn start(&mut self) -> Result<TurnPayload, BackendError> {
        let intro = self
            .intro
            .take()
            .unwrap_or_else(|| Err(BackendError::Start("started twice".to_string())));
        if intro.is_ok() {
            self.alive = true;
        }
        intro
    }

    fn send(&mut self, command: &str) -> Result<(), BackendError> {
        self.sent.push(command.to_string());
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<TurnPayload, BackendError> {
        match self.turns.pop_front() {
            Some(result) => {
                if result.is_err() {
                    self.alive = false;
                }
                result
            }
            None => Err(BackendError::Timeout(timeout)),
        }
    }

    fn is_alive(&mut self) -> bool {
        self.alive
    }

    fn stop(&mut self) {
        self.stop_count += 1;
        self.alive = false;
    }
}

/// Command source that replays a fixed command list, then ends the session.
pub struct ScriptedSource {
    commands: VecDeque<String>,
}

impl ScriptedSource {
    pub fn new<I: IntoIterator<Item = S>, S: Into<String>>(commands: I) -> Self {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }
}

impl CommandSource for ScriptedSource {
    fn next_command(&mut self, _state: &SessionState) -> Result<Option<String>> {
        Ok(self.commands.pop_front())
    }
}

/// Command source that always fails, for the harness-error path.
pub struct FailingSource;

impl CommandSource for FailingSource {
    fn next_command(&mut self, _state: &SessionState) -> Result<Option<String>> {
        Err(anyhow::anyhow!("generator unavailable"))
    }
}

/// Sink that collects records in memory.
#[derive(Default)]
pub struct RecordingSink {
    pub records: Vec<(u32, String, String)>,
}

impl TranscriptSink for RecordingSink {
    fn record(&mut self, turn: u32, command: &str, response: &str) -> Result<()> {
        self.records.push((turn, command.to_string(), response.to_string()));
        Ok(())
    }
}

/// Sink that always fails; runs must shrug it off.
pub struct FailingSink;

impl TranscriptSink for FailingSink {
    fn record(&mut self, _turn: u32, _command: &str, _response: &str) -> Result<()> {
        Err(anyhow::anyhow!("disk full"))
    }
}
