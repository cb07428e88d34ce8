//! Shared deterministic types for the harness core.
//!
//! These types define stable contracts between components. They must not
//! depend on external state or I/O and must remain deterministic across runs.

use serde::Serialize;

/// One complete turn of interpreter output, as handed back by a backend.
///
/// `location` and `score` are best-effort for the text transports and
/// authoritative for the JSON-framed transport. Absent fields mean
/// "unknown", never "error".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TurnPayload {
    /// Cleaned response text for the turn.
    pub text: String,
    /// Room name, when the transport or scraping surfaced one.
    pub location: Option<String>,
    /// Score, when the transport surfaced one inline.
    pub score: Option<i64>,
    /// The response carried a fatal in-game condition (death, quit prompt,
    /// disconnect). A soft signal: the session stays usable.
    pub game_over: bool,
}

/// Mutable session state owned by the turn executor for one run.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Current room name; `None` until a response yields one.
    pub location: Option<String>,
    /// Raw text of the most recent response.
    pub last_response: String,
    /// All response text concatenated in turn order (intro included).
    pub transcript: String,
    /// Last known score, if any response surfaced one.
    pub score: Option<i64>,
    /// Completed command exchanges. Increments by exactly one per successful
    /// turn; the intro read at start does not count.
    pub turns: u32,
    /// Item names from the most recent inventory-shaped response.
    pub inventory: Vec<String>,
    /// False once the backend terminated or the game reported a fatal
    /// condition.
    pub alive: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            alive: true,
            ..Self::default()
        }
    }

    /// One-line digest for logs and the command-generator stdin.
    pub fn digest(&self) -> String {
        format!(
            "turn {} location {} score {}",
            self.turns,
            self.location.as_deref().unwrap_or("(unknown)"),
            self.score.map_or_else(|| "(unknown)".to_string(), |s| s.to_string()),
        )
    }
}

/// Result of evaluating one assertion against session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub passed: bool,
    /// Directive the verdict belongs to, e.g. `expect-location "Kitchen"`.
    pub directive: String,
    /// Human-readable explanation naming expected vs. observed values.
    pub message: String,
    /// 1-based script line the directive came from; 0 for CLI-supplied
    /// final assertions.
    pub line: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_alive_at_turn_zero() {
        let state = SessionState::new();
        assert!(state.alive);
        assert_eq!(state.turns, 0);
        assert_eq!(state.location, None);
    }

    #[test]
    fn digest_names_unknown_fields() {
        let state = SessionState::new();
        assert_eq!(state.digest(), "turn 0 location (unknown) score (unknown)");

        let state = SessionState {
            turns: 3,
            location: Some("Kitchen".to_string()),
            score: Some(10),
            ..SessionState::new()
        };
        assert_eq!(state.digest(), "turn 3 location Kitchen score 10");
    }
}
