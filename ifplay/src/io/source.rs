//! Command sources for autonomous play.
//!
//! The harness treats the command generator as an external actor behind a
//! single `next_command` capability: no assumptions about its internals,
//! retries, or rate limits. Time spent here is outside the per-command
//! interpreter timeout.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, instrument};

use crate::core::types::SessionState;
use crate::io::process::run_captured;

/// Produces the next player command from the current session state.
pub trait CommandSource {
    /// `Ok(None)` ends the session cleanly.
    fn next_command(&mut self, state: &SessionState) -> Result<Option<String>>;
}

/// Spawns a configured program once per turn.
///
/// The program receives a plain-text state digest on stdin (summary line,
/// blank line, then the last response) and must print the next command as
/// its first non-empty stdout line. Empty output or `quit` ends the session.
#[derive(Debug)]
pub struct GeneratorProgram {
    argv: Vec<String>,
    timeout: Duration,
    output_limit: usize,
}

impl GeneratorProgram {
    pub fn new(argv: Vec<String>, timeout: Duration, output_limit: usize) -> Result<Self> {
        if argv.first().is_none_or(|arg| arg.trim().is_empty()) {
            return Err(anyhow!("command generator argv must not be empty"));
        }
        Ok(Self {
            argv,
            timeout,
            output_limit,
        })
    }

    fn digest(state: &SessionState) -> String {
        format!("{}\n\n{}\n", state.digest(), state.last_response)
    }
}

impl CommandSource for GeneratorProgram {
    #[instrument(skip_all, fields(turn = state.turns))]
    fn next_command(&mut self, state: &SessionState) -> Result<Option<String>> {
        let mut cmd = Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..]);

        let digest = Self::digest(state);
        let out = run_captured(cmd, Some(digest.as_bytes()), self.timeout, self.output_limit)
            .context("run command generator")?;

        if out.timed_out {
            bail!("command generator timed out after {:?}", self.timeout);
        }
        if !out.status.success() {
            bail!(
                "command generator exited with {:?}: {}",
                out.status.code(),
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }

        let stdout = String::from_utf8_lossy(&out.stdout);
        let command = stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string();

        if command.is_empty() || command.eq_ignore_ascii_case("quit") {
            debug!("generator ended the session");
            return Ok(None);
        }
        debug!(%command, "generator produced command");
        Ok(Some(command))
    }
}
