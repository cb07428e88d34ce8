//! Test runner: composes backend, session, script, and assertions into the
//! three run modes and produces the final [`RunReport`].
//!
//! Error policy: script syntax errors surface before any backend activity;
//! a mid-run backend error ends the run immediately (later game state is
//! unverifiable); assertion failures never stop the run early; the backend
//! is stopped on every exit path.

use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::backend::Backend;
use crate::core::assertions::Assertion;
use crate::core::report::{RunCategory, RunReport};
use crate::core::script::{Script, ScriptNode};
use crate::core::types::Verdict;
use crate::io::source::CommandSource;
use crate::io::transcript::TranscriptSink;
use crate::session::Session;

/// Neutral command used to verify the interpreter answers at all.
const SMOKE_COMMAND: &str = "look";

/// Minimal liveness check: the interpreter starts and answers one command.
#[instrument(skip_all)]
pub fn run_smoke<B: Backend>(backend: B, command_timeout: Duration) -> RunReport {
    let mut session = Session::new(backend, command_timeout);
    if let Err(err) = session.start() {
        return RunReport::aborted(
            RunCategory::StartFailed,
            Vec::new(),
            session.state(),
            format!("failed to start game: {err}"),
        );
    }

    match session.execute(SMOKE_COMMAND) {
        Ok(response) => {
            let responded = !response.text.trim().is_empty() && session.is_alive();
            session.finish();
            if responded {
                info!("smoke test passed");
                RunReport::from_verdicts(Vec::new(), session.state())
            } else {
                RunReport::aborted(
                    RunCategory::StartFailed,
                    Vec::new(),
                    session.state(),
                    "interpreter started but gave no usable response".to_string(),
                )
            }
        }
        Err(err) => RunReport::aborted(
            RunCategory::StartFailed,
            Vec::new(),
            session.state(),
            format!("smoke test failed: {err}"),
        ),
    }
}

/// Run a parsed walkthrough: commands execute in order, assertions evaluate
/// against state as of the most recent command, failures accumulate.
#[instrument(skip_all, fields(nodes = script.nodes.len()))]
pub fn run_walkthrough<B: Backend, S: TranscriptSink>(
    backend: B,
    script: &Script,
    sink: &mut S,
    command_timeout: Duration,
) -> RunReport {
    let mut session = Session::new(backend, command_timeout);
    if let Err(err) = session.start() {
        return RunReport::aborted(
            RunCategory::StartFailed,
            Vec::new(),
            session.state(),
            format!("failed to start game: {err}"),
        );
    }

    let mut verdicts = Vec::new();
    for node in &script.nodes {
        match node {
            ScriptNode::Command { line, text } => match session.execute(text) {
                Ok(response) => record(sink, session.state().turns, text, &response.text),
                Err(err) => {
                    // No verdicts are recorded past this point: state after a
                    // failed turn is unknown.
                    return RunReport::aborted(
                        RunCategory::GameError,
                        verdicts,
                        session.state(),
                        format!("script line {line}: {err}"),
                    );
                }
            },
            ScriptNode::Expect { line, assertion } => {
                let verdict = Verdict {
                    line: *line,
                    ..assertion.check(session.state())
                };
                if !verdict.passed {
                    info!(line, directive = %verdict.directive, "assertion failed");
                }
                verdicts.push(verdict);
            }
        }
    }

    session.finish();
    RunReport::from_verdicts(verdicts, session.state())
}

/// Autonomous play: commands come from an external source, bounded by
/// `max_turns`. Reaching the bound is not an error. Final assertions are
/// evaluated once, against the state the session ended in.
#[instrument(skip_all, fields(max_turns))]
pub fn run_autonomous<B: Backend, C: CommandSource, S: TranscriptSink>(
    backend: B,
    source: &mut C,
    final_assertions: &[Assertion],
    max_turns: u32,
    sink: &mut S,
    command_timeout: Duration,
) -> RunReport {
    let mut session = Session::new(backend, command_timeout);
    if let Err(err) = session.start() {
        return RunReport::aborted(
            RunCategory::StartFailed,
            Vec::new(),
            session.state(),
            format!("failed to start game: {err}"),
        );
    }

    while session.state().turns < max_turns && session.state().alive {
        let command = match source.next_command(session.state()) {
            Ok(Some(command)) => command,
            Ok(None) => {
                info!("command source ended the session");
                break;
            }
            Err(err) => {
                // The game did nothing wrong; stop it before reporting the
                // harness-side failure.
                session.finish();
                return RunReport::aborted(
                    RunCategory::HarnessError,
                    Vec::new(),
                    session.state(),
                    format!("command source failed: {err}"),
                );
            }
        };

        match session.execute(&command) {
            Ok(response) => record(sink, session.state().turns, &command, &response.text),
            Err(err) => {
                return RunReport::aborted(
                    RunCategory::GameError,
                    Vec::new(),
                    session.state(),
                    format!("turn {}: {err}", session.state().turns + 1),
                );
            }
        }
    }

    let verdicts: Vec<Verdict> = final_assertions
        .iter()
        .map(|assertion| assertion.check(session.state()))
        .collect();
    session.finish();
    RunReport::from_verdicts(verdicts, session.state())
}

fn record<S: TranscriptSink>(sink: &mut S, turn: u32, command: &str, response: &str) {
    // Sink failures never abort a run.
    if let Err(err) = sink.record(turn, command, response) {
        warn!(%err, turn, "transcript sink failed, continuing");
    }
}
