//! Turn executor: drives one backend through sequential command exchanges
//! and owns the session state for the lifetime of a run.
//!
//! Turns are strictly sequential. Interpreters are stateful and offer no
//! idempotent replay for a half-delivered turn, so any transport error is
//! terminal for the session: no retry, backend stopped, error surfaced.

use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::backend::{Backend, BackendError};
use crate::core::extract;
use crate::core::types::{SessionState, TurnPayload};

/// Lifecycle of a session. `Finished` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    Running,
    Finished,
    Failed,
}

pub struct Session<B: Backend> {
    backend: B,
    state: SessionState,
    phase: Phase,
    command_timeout: Duration,
}

impl<B: Backend> Session<B> {
    pub fn new(backend: B, command_timeout: Duration) -> Self {
        Self {
            backend,
            state: SessionState::new(),
            phase: Phase::NotStarted,
            command_timeout,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Start the backend and fold the game's introduction into state.
    /// The intro is not a command exchange: the turn count stays 0.
    #[instrument(skip_all)]
    pub fn start(&mut self) -> Result<(), BackendError> {
        match self.backend.start() {
            Ok(intro) => {
                self.apply(&intro);
                self.phase = Phase::Running;
                debug!(location = ?self.state.location, "session started");
                Ok(())
            }
            Err(err) => {
                self.phase = Phase::Failed;
                self.state.alive = false;
                self.backend.stop();
                Err(err)
            }
        }
    }

    /// One command exchange: send, wait for the turn, update state.
    #[instrument(skip_all, fields(turn = self.state.turns + 1))]
    pub fn execute(&mut self, command: &str) -> Result<TurnPayload, BackendError> {
        let result = self
            .backend
            .send(command)
            .and_then(|()| self.backend.receive(self.command_timeout));

        match result {
            Ok(payload) => {
                self.state.turns += 1;
                self.apply(&payload);
                Ok(payload)
            }
            Err(err) => {
                warn!(%err, "backend error mid-turn, session failed");
                self.phase = Phase::Failed;
                self.state.alive = false;
                self.backend.stop();
                Err(err)
            }
        }
    }

    fn apply(&mut self, payload: &TurnPayload) {
        self.state.last_response = payload.text.clone();
        if !self.state.transcript.is_empty() {
            self.state.transcript.push('\n');
        }
        self.state.transcript.push_str(&payload.text);

        if let Some(location) = &payload.location {
            self.state.location = Some(location.clone());
        }
        if let Some(score) = payload.score {
            self.state.score = Some(score);
        }
        if let Some(items) = extract::scrape_inventory(&payload.text) {
            self.state.inventory = items;
        }
        if payload.game_over {
            // Soft signal: the run goes on, later commands are still sent.
            debug!("game reported a terminal condition");
            self.state.alive = false;
        }
    }

    /// Combined liveness: the game has not ended and the transport is up.
    pub fn is_alive(&mut self) -> bool {
        self.state.alive && self.backend.is_alive()
    }

    /// Release the backend. Safe on every exit path.
    pub fn finish(&mut self) {
        self.backend.stop();
        if self.phase != Phase::Failed {
            self.phase = Phase::Finished;
        }
    }
}
