//! Run outcome aggregation and the exit-code contract.

use crate::core::types::{SessionState, Verdict};
use crate::exit_codes;

/// Terminal category of a run. Determines the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunCategory {
    /// Every check passed.
    Passed,
    /// The interpreter never started, or the smoke test got no response.
    StartFailed,
    /// At least one assertion failed; the backend itself behaved.
    AssertionsFailed,
    /// The interpreter crashed or hung mid-run.
    GameError,
    /// Malformed walkthrough script or CLI input.
    InvalidInput,
    /// Harness failure unrelated to the game (e.g. the command generator).
    HarnessError,
}

impl RunCategory {
    pub fn exit_code(self) -> i32 {
        match self {
            RunCategory::Passed => exit_codes::OK,
            RunCategory::StartFailed => exit_codes::START_FAILED,
            RunCategory::AssertionsFailed => exit_codes::ASSERTION_FAILED,
            RunCategory::GameError => exit_codes::GAME_ERROR,
            RunCategory::InvalidInput => exit_codes::INVALID_INPUT,
            RunCategory::HarnessError => exit_codes::HARNESS_ERROR,
        }
    }
}

/// Aggregate result of one run: all verdicts in evaluation order, the
/// terminal category, and a snapshot of final session state for diagnostics.
/// Immutable once the run ends; the sole artifact handed to the CLI layer.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub category: RunCategory,
    pub verdicts: Vec<Verdict>,
    pub turns: u32,
    pub final_location: Option<String>,
    pub final_score: Option<i64>,
    pub error: Option<String>,
}

impl RunReport {
    /// Report for a run that finished without backend errors: the category
    /// depends only on whether every verdict passed.
    pub fn from_verdicts(verdicts: Vec<Verdict>, state: &SessionState) -> Self {
        let category = if verdicts.iter().all(|v| v.passed) {
            RunCategory::Passed
        } else {
            RunCategory::AssertionsFailed
        };
        Self {
            category,
            verdicts,
            turns: state.turns,
            final_location: state.location.clone(),
            final_score: state.score,
            error: None,
        }
    }

    /// Report for a run cut short before (or while) exchanging turns.
    pub fn aborted(category: RunCategory, verdicts: Vec<Verdict>, state: &SessionState, error: String) -> Self {
        Self {
            category,
            verdicts,
            turns: state.turns,
            final_location: state.location.clone(),
            final_score: state.score,
            error: Some(error),
        }
    }

    pub fn passed(&self) -> bool {
        self.category == RunCategory::Passed
    }

    pub fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn failed_verdicts(&self) -> impl Iterator<Item = &Verdict> {
        self.verdicts.iter().filter(|v| !v.passed)
    }

    pub fn summary(&self) -> String {
        let checked = self.verdicts.len();
        let passed = self.verdicts.iter().filter(|v| v.passed).count();
        if self.passed() {
            format!("PASSED: {} turns, {passed}/{checked} assertions", self.turns)
        } else {
            format!(
                "FAILED: {} of {checked} assertions failed after {} turns ({})",
                checked - passed,
                self.turns,
                self.error.as_deref().unwrap_or("assertion failure"),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(passed: bool) -> Verdict {
        Verdict {
            passed,
            directive: "expect-location \"Kitchen\"".to_string(),
            message: if passed { "ok".into() } else { "nope".into() },
            line: 1,
        }
    }

    #[test]
    fn categories_map_to_contract_exit_codes() {
        assert_eq!(RunCategory::Passed.exit_code(), 0);
        assert_eq!(RunCategory::StartFailed.exit_code(), 1);
        assert_eq!(RunCategory::AssertionsFailed.exit_code(), 2);
        assert_eq!(RunCategory::GameError.exit_code(), 3);
        assert_eq!(RunCategory::InvalidInput.exit_code(), 4);
        assert_eq!(RunCategory::HarnessError.exit_code(), 5);
    }

    #[test]
    fn all_passing_verdicts_yield_passed() {
        let report = RunReport::from_verdicts(vec![verdict(true), verdict(true)], &SessionState::new());
        assert!(report.passed());
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn one_failure_yields_assertion_failed_and_keeps_all_verdicts() {
        let report = RunReport::from_verdicts(vec![verdict(true), verdict(false)], &SessionState::new());
        assert_eq!(report.category, RunCategory::AssertionsFailed);
        assert_eq!(report.verdicts.len(), 2);
        assert_eq!(report.failed_verdicts().count(), 1);
        assert_eq!(report.exit_code(), 2);
    }

    #[test]
    fn summary_counts_assertions() {
        let report = RunReport::from_verdicts(vec![verdict(true), verdict(false)], &SessionState::new());
        assert!(report.summary().starts_with("FAILED: 1 of 2"));
    }
}
