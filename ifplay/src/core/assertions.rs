//! Assertion kinds and their evaluation against session state.
//!
//! Evaluation never stops a run: every assertion yields a [`Verdict`] and the
//! runner collects all failures for one complete diagnostic report.

use crate::core::types::{SessionState, Verdict};

/// Comparison operator for the numeric assertion kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Cmp {
    pub fn symbol(self) -> &'static str {
        match self {
            Cmp::Eq => "==",
            Cmp::Gt => ">",
            Cmp::Gte => ">=",
            Cmp::Lt => "<",
            Cmp::Lte => "<=",
        }
    }

    fn eval(self, actual: i64, expected: i64) -> bool {
        match self {
            Cmp::Eq => actual == expected,
            Cmp::Gt => actual > expected,
            Cmp::Gte => actual >= expected,
            Cmp::Lt => actual < expected,
            Cmp::Lte => actual <= expected,
        }
    }
}

/// A single `@expect-*` directive, immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assertion {
    /// Current location contains the expected text (case-sensitive).
    Location { expected: String },
    /// Current location equals the expected text (case-insensitive).
    LocationExact { expected: String },
    /// Last response contains the expected text (case-insensitive).
    Contains { expected: String },
    /// Cumulative output does not contain the text (case-insensitive).
    NotContains { expected: String },
    /// Inventory snapshot has an item containing the text (case-insensitive).
    Inventory { item: String },
    /// Score is known and compares true against the expected value.
    Score { expected: i64, cmp: Cmp },
    /// Turn count compares true against the expected value.
    Turns { expected: u32, cmp: Cmp },
}

impl Assertion {
    /// Directive form for verdicts, e.g. `expect-location "Kitchen"`.
    pub fn describe(&self) -> String {
        match self {
            Assertion::Location { expected } => format!("expect-location {expected:?}"),
            Assertion::LocationExact { expected } => format!("expect-location-exact {expected:?}"),
            Assertion::Contains { expected } => format!("expect-contains {expected:?}"),
            Assertion::NotContains { expected } => format!("expect-not-contains {expected:?}"),
            Assertion::Inventory { item } => format!("expect-inventory {item:?}"),
            Assertion::Score { expected, cmp } => format!("expect-score {} {expected}", cmp.symbol()),
            Assertion::Turns { expected, cmp } => format!("expect-turns {} {expected}", cmp.symbol()),
        }
    }

    /// Evaluate against the current session state.
    ///
    /// The returned verdict carries line 0; the caller fills in the script
    /// line it came from.
    pub fn check(&self, state: &SessionState) -> Verdict {
        let (passed, message) = match self {
            Assertion::Location { expected } => {
                let actual = state.location.as_deref().unwrap_or("");
                (
                    actual.contains(expected.as_str()),
                    format!("expected location containing {expected:?}, got {actual:?}"),
                )
            }
            Assertion::LocationExact { expected } => {
                let actual = state.location.as_deref().unwrap_or("");
                (
                    actual.eq_ignore_ascii_case(expected),
                    format!("expected location {expected:?}, got {actual:?}"),
                )
            }
            Assertion::Contains { expected } => {
                let passed = contains_ci(&state.last_response, expected);
                (
                    passed,
                    format!(
                        "expected last response to contain {expected:?}; response was {:?}",
                        preview(&state.last_response)
                    ),
                )
            }
            Assertion::NotContains { expected } => {
                let passed = !contains_ci(&state.transcript, expected);
                (
                    passed,
                    format!("expected output to never contain {expected:?}, but it did"),
                )
            }
            Assertion::Inventory { item } => {
                let passed = state.inventory.iter().any(|held| contains_ci(held, item));
                let held = if state.inventory.is_empty() {
                    "(empty)".to_string()
                } else {
                    state.inventory.join(", ")
                };
                (
                    passed,
                    format!("expected inventory to hold {item:?}, carrying: {held}"),
                )
            }
            Assertion::Score { expected, cmp } => match state.score {
                Some(actual) => (
                    cmp.eval(actual, *expected),
                    format!("expected score {} {expected}, got {actual}", cmp.symbol()),
                ),
                None => (
                    false,
                    format!("expected score {} {expected}, but score is unknown", cmp.symbol()),
                ),
            },
            Assertion::Turns { expected, cmp } => (
                cmp.eval(i64::from(state.turns), i64::from(*expected)),
                format!(
                    "expected turns {} {expected}, got {}",
                    cmp.symbol(),
                    state.turns
                ),
            ),
        };

        Verdict {
            passed,
            directive: self.describe(),
            message: if passed { "ok".to_string() } else { message },
            line: 0,
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 200;
    if text.len() <= LIMIT {
        return text.to_string();
    }
    let mut end = LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_in(location: &str) -> SessionState {
        SessionState {
            location: Some(location.to_string()),
            ..SessionState::new()
        }
    }

    #[test]
    fn location_passes_on_substring() {
        let verdict = Assertion::Location {
            expected: "Kitchen".to_string(),
        }
        .check(&state_in("Kitchen"));
        assert!(verdict.passed);
    }

    #[test]
    fn location_failure_names_both_values() {
        let verdict = Assertion::Location {
            expected: "Cellar".to_string(),
        }
        .check(&state_in("Kitchen"));
        assert!(!verdict.passed);
        assert!(verdict.message.contains("Cellar"));
        assert!(verdict.message.contains("Kitchen"));
    }

    #[test]
    fn location_is_case_sensitive() {
        let verdict = Assertion::Location {
            expected: "kitchen".to_string(),
        }
        .check(&state_in("Kitchen"));
        assert!(!verdict.passed);
    }

    #[test]
    fn location_exact_ignores_case_but_not_extra_text() {
        let assertion = Assertion::LocationExact {
            expected: "the kitchen".to_string(),
        };
        assert!(assertion.check(&state_in("The Kitchen")).passed);
        assert!(!assertion.check(&state_in("The Kitchen Pantry")).passed);
    }

    #[test]
    fn contains_checks_last_response_case_insensitively() {
        let state = SessionState {
            last_response: "You see a Brass Lantern here.".to_string(),
            ..SessionState::new()
        };
        let assertion = Assertion::Contains {
            expected: "brass lantern".to_string(),
        };
        assert!(assertion.check(&state).passed);
    }

    #[test]
    fn not_contains_checks_cumulative_output() {
        let state = SessionState {
            transcript: "Turn one.\nA grue ate you.\nTurn three.".to_string(),
            last_response: "Turn three.".to_string(),
            ..SessionState::new()
        };
        let assertion = Assertion::NotContains {
            expected: "grue".to_string(),
        };
        assert!(!assertion.check(&state).passed);
    }

    #[test]
    fn inventory_matches_item_substring() {
        let state = SessionState {
            inventory: vec!["brass lantern".to_string(), "rope".to_string()],
            ..SessionState::new()
        };
        assert!(
            Assertion::Inventory {
                item: "lantern".to_string()
            }
            .check(&state)
            .passed
        );
        let verdict = Assertion::Inventory {
            item: "sword".to_string(),
        }
        .check(&state);
        assert!(!verdict.passed);
        assert!(verdict.message.contains("brass lantern"));
    }

    #[test]
    fn unknown_score_always_fails_with_explanation() {
        let verdict = Assertion::Score {
            expected: 5,
            cmp: Cmp::Gte,
        }
        .check(&SessionState::new());
        assert!(!verdict.passed);
        assert!(verdict.message.contains("unknown"));
    }

    #[test]
    fn score_gte_compares() {
        let state = SessionState {
            score: Some(10),
            ..SessionState::new()
        };
        assert!(
            Assertion::Score {
                expected: 5,
                cmp: Cmp::Gte
            }
            .check(&state)
            .passed
        );
        assert!(
            !Assertion::Score {
                expected: 11,
                cmp: Cmp::Gte
            }
            .check(&state)
            .passed
        );
    }

    #[test]
    fn turns_lte_boundary() {
        let at = |turns| SessionState {
            turns,
            ..SessionState::new()
        };
        let assertion = Assertion::Turns {
            expected: 5,
            cmp: Cmp::Lte,
        };
        assert!(assertion.check(&at(5)).passed);
        assert!(!assertion.check(&at(6)).passed);
    }
}
