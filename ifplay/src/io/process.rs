//! One-shot child processes with a timeout and bounded output capture.
//!
//! Used for the per-turn command generator, not for interpreter sessions;
//! those stay alive across turns and live in [`crate::backend::pipe`].
//! Output is drained concurrently while the child runs so a chatty program
//! cannot deadlock on a full pipe.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Captured output of a finished (or killed) child.
#[derive(Debug)]
pub struct Captured {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

/// Run `cmd` to completion, feeding it `stdin` and killing it after
/// `timeout`. At most `limit` bytes of each stream are kept; the rest is
/// drained and discarded.
pub fn run_captured(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    limit: usize,
) -> Result<Captured> {
    cmd.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!(program = ?cmd.get_program(), timeout_secs = timeout.as_secs(), "running child");
    let mut child = cmd.spawn().context("spawn command")?;

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        child_stdin.write_all(input).context("write stdin")?;
        // Dropping closes the pipe so line-reading children see EOF.
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdout_handle = thread::spawn(move || drain_limited(stdout, limit));
    let stderr_handle = thread::spawn(move || drain_limited(stderr, limit));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let stdout = stdout_handle
        .join()
        .map_err(|_| anyhow!("stdout reader thread panicked"))??;
    let stderr = stderr_handle
        .join()
        .map_err(|_| anyhow!("stderr reader thread panicked"))??;

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(Captured {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

fn drain_limited<R: Read>(mut reader: R, limit: usize) -> Result<Vec<u8>> {
    let mut kept = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(kept.len());
        kept.extend_from_slice(&chunk[..n.min(remaining)]);
    }
    Ok(kept)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        cmd
    }

    #[test]
    fn captures_stdout_and_status() {
        let out = run_captured(sh("echo hi"), None, Duration::from_secs(5), 1024).expect("run");
        assert!(out.status.success());
        assert_eq!(out.stdout, b"hi\n");
        assert!(!out.timed_out);
    }

    #[test]
    fn feeds_stdin_and_sees_eof() {
        let out = run_captured(
            sh("cat"),
            Some(b"digest line\n"),
            Duration::from_secs(5),
            1024,
        )
        .expect("run");
        assert_eq!(out.stdout, b"digest line\n");
    }

    #[test]
    fn kills_after_timeout() {
        let out = run_captured(sh("sleep 30"), None, Duration::from_millis(100), 1024).expect("run");
        assert!(out.timed_out);
        assert!(!out.status.success());
    }

    #[test]
    fn output_beyond_limit_is_discarded() {
        let out = run_captured(sh("yes | head -c 100000"), None, Duration::from_secs(5), 64)
            .expect("run");
        assert_eq!(out.stdout.len(), 64);
    }
}
