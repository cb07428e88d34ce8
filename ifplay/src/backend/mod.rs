//! Backend abstraction over heterogeneous interpreter transports.
//!
//! The [`Backend`] trait decouples turn execution from the wire format of a
//! particular interpreter. Three implementations exist: line-oriented
//! subprocess ([`zmachine`]), JSON-framed subprocess ([`glk`]), and raw TCP
//! text stream ([`network`]). The turn executor depends only on this trait;
//! tests use scripted backends that return predetermined payloads without
//! spawning processes.

pub mod glk;
pub mod network;
pub mod pipe;
pub mod zmachine;

use std::time::Duration;

use thiserror::Error;

use crate::core::types::TurnPayload;

/// Transport-level failure talking to an interpreter.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The interpreter could not be spawned/connected, or produced no
    /// handshake within the startup timeout.
    #[error("failed to start interpreter: {0}")]
    Start(String),
    /// The input channel is gone (closed stdin pipe or socket).
    #[error("interpreter channel closed: {0}")]
    Disconnected(String),
    /// No complete turn arrived within the allowed wait.
    #[error("no response from interpreter within {0:?}")]
    Timeout(Duration),
    /// The process exited or the peer closed the connection while waiting.
    #[error("interpreter terminated: {0}")]
    Crash(String),
    /// The structured transport produced an unparseable message.
    #[error("malformed interpreter message: {0}")]
    Protocol(String),
}

/// One live interpreter connection.
///
/// Exactly one instance is live per run, driven strictly sequentially:
/// callers never overlap `send`/`receive` pairs.
pub trait Backend {
    /// Establish the connection and read the game's introduction, bounded
    /// by the startup timeout.
    fn start(&mut self) -> Result<TurnPayload, BackendError>;

    /// Write one line of player input.
    fn send(&mut self, command: &str) -> Result<(), BackendError>;

    /// Block until one complete turn of output is available or `timeout`
    /// elapses.
    fn receive(&mut self, timeout: Duration) -> Result<TurnPayload, BackendError>;

    /// Cheap, non-blocking liveness check.
    fn is_alive(&mut self) -> bool;

    /// Tear the connection down: graceful quit attempt, bounded grace
    /// period, then force-kill. Idempotent.
    fn stop(&mut self);
}

/// The closed set of transport variants behind one [`Backend`] surface.
///
/// The turn executor and runner only ever see this enum or the trait; no
/// caller depends on a variant's internals.
#[derive(Debug)]
pub enum AnyBackend {
    ZMachine(zmachine::ZMachineBackend),
    Glk(glk::GlkBackend),
    Network(network::NetworkBackend),
}

impl Backend for AnyBackend {
    fn start(&mut self) -> Result<TurnPayload, BackendError> {
        match self {
            AnyBackend::ZMachine(backend) => backend.start(),
            AnyBackend::Glk(backend) => backend.start(),
            AnyBackend::Network(backend) => backend.start(),
        }
    }

    fn send(&mut self, command: &str) -> Result<(), BackendError> {
        match self {
            AnyBackend::ZMachine(backend) => backend.send(command),
            AnyBackend::Glk(backend) => backend.send(command),
            AnyBackend::Network(backend) => backend.send(command),
        }
    }

    fn receive(&mut self, timeout: Duration) -> Result<TurnPayload, BackendError> {
        match self {
            AnyBackend::ZMachine(backend) => backend.receive(timeout),
            AnyBackend::Glk(backend) => backend.receive(timeout),
            AnyBackend::Network(backend) => backend.receive(timeout),
        }
    }

    fn is_alive(&mut self) -> bool {
        match self {
            AnyBackend::ZMachine(backend) => backend.is_alive(),
            AnyBackend::Glk(backend) => backend.is_alive(),
            AnyBackend::Network(backend) => backend.is_alive(),
        }
    }

    fn stop(&mut self) {
        match self {
            AnyBackend::ZMachine(backend) => backend.stop(),
            AnyBackend::Glk(backend) => backend.stop(),
            AnyBackend::Network(backend) => backend.stop(),
        }
    }
}

/// Timing and framing knobs threaded from [`crate::io::config::HarnessConfig`]
/// into every backend. No backend reads ambient/global configuration.
#[derive(Debug, Clone)]
pub struct Tuning {
    /// Bound on interpreter launch + first output.
    pub startup_timeout: Duration,
    /// Read-idle window used to declare quiescence on unframed transports.
    pub idle_window: Duration,
    /// Grace period before a stubborn process is force-killed.
    pub stop_grace: Duration,
    /// Prompt suffix that marks end-of-turn for the text transports.
    pub prompt_suffix: String,
    /// Virtual screen size handed to subprocess interpreters.
    pub screen_width: u32,
    pub screen_height: u32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(10),
            idle_window: Duration::from_millis(500),
            stop_grace: Duration::from_secs(5),
            prompt_suffix: ">".to_string(),
            screen_width: 80,
            screen_height: 50,
        }
    }
}
