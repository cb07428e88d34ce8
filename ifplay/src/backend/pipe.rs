//! Plumbing for long-lived interpreter subprocesses.
//!
//! A dedicated thread drains the child's stdout into a channel so callers
//! get bounded, timeout-aware reads without risking pipe deadlocks. Stderr
//! is discarded: interpreters write usage noise there that is not part of
//! any turn.

use std::io::{Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::backend::BackendError;

/// A spawned interpreter with piped stdin/stdout.
#[derive(Debug)]
pub struct ChildPipe {
    child: Child,
    stdin: Option<ChildStdin>,
    chunks: Receiver<Vec<u8>>,
    reader: Option<JoinHandle<()>>,
    stopped: bool,
}

impl ChildPipe {
    /// Spawn `cmd` with piped stdin/stdout and start the stdout drain.
    pub fn spawn(mut cmd: Command) -> Result<Self, BackendError> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        debug!(program = ?cmd.get_program(), "spawning interpreter");
        let mut child = cmd
            .spawn()
            .map_err(|err| BackendError::Start(format!("spawn {:?}: {err}", cmd.get_program())))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BackendError::Start("stdin was not piped".to_string()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::Start("stdout was not piped".to_string()))?;

        let (tx, rx) = mpsc::channel();
        let reader = thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(Self {
            child,
            stdin: Some(stdin),
            chunks: rx,
            reader: Some(reader),
            stopped: false,
        })
    }

    /// Write one line of input (newline appended).
    pub fn write_line(&mut self, line: &str) -> Result<(), BackendError> {
        self.write_raw(&format!("{line}\n"))
    }

    /// Write raw text to the interpreter's stdin and flush.
    pub fn write_raw(&mut self, text: &str) -> Result<(), BackendError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| BackendError::Disconnected("stdin already closed".to_string()))?;
        stdin
            .write_all(text.as_bytes())
            .and_then(|()| stdin.flush())
            .map_err(|err| BackendError::Disconnected(format!("write to interpreter: {err}")))
    }

    /// Wait up to `timeout` for the next chunk of stdout.
    ///
    /// `Ok(Some(text))`: bytes arrived. `Ok(None)`: the window elapsed with
    /// no new bytes (read-idle). `Err(Crash)`: the stream hit EOF.
    pub fn read_chunk(&mut self, timeout: Duration) -> Result<Option<String>, BackendError> {
        match self.chunks.recv_timeout(timeout) {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(BackendError::Crash(self.exit_description())),
        }
    }

    fn exit_description(&mut self) -> String {
        match self.child.try_wait() {
            Ok(Some(status)) => format!("interpreter exited with {status}"),
            Ok(None) => "interpreter closed its output stream".to_string(),
            Err(err) => format!("interpreter state unknown: {err}"),
        }
    }

    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Close stdin, give the child a grace period to exit, then force-kill.
    ///
    /// Safe to call more than once; never blocks past `grace`.
    pub fn shutdown(&mut self, grace: Duration) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        drop(self.stdin.take());
        match self.child.wait_timeout(grace) {
            Ok(Some(status)) => debug!(?status, "interpreter exited"),
            Ok(None) => {
                warn!(grace_ms = grace.as_millis() as u64, "interpreter ignored shutdown, killing");
                let _ = self.child.kill();
                let _ = self.child.wait();
            }
            Err(err) => warn!(%err, "wait for interpreter failed"),
        }
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ChildPipe {
    fn drop(&mut self) {
        if !self.stopped {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
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
    fn read_chunk_returns_output_then_crash_on_exit() {
        let mut pipe = ChildPipe::spawn(sh("echo hello")).expect("spawn");

        let chunk = pipe
            .read_chunk(Duration::from_secs(5))
            .expect("read")
            .expect("chunk");
        assert_eq!(chunk, "hello\n");

        // Child exits after the echo; the drained channel reports EOF.
        let err = loop {
            match pipe.read_chunk(Duration::from_secs(5)) {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("expected EOF, got idle"),
                Err(err) => break err,
            }
        };
        assert!(matches!(err, BackendError::Crash(_)));
        pipe.shutdown(Duration::from_millis(100));
    }

    #[test]
    fn read_chunk_reports_idle_when_child_is_silent() {
        let mut pipe = ChildPipe::spawn(sh("sleep 5")).expect("spawn");
        let got = pipe.read_chunk(Duration::from_millis(50)).expect("read");
        assert_eq!(got, None);
        pipe.shutdown(Duration::from_millis(50));
    }

    #[test]
    fn write_then_read_round_trip() {
        let mut pipe =
            ChildPipe::spawn(sh("while read line; do echo \"got $line\"; done")).expect("spawn");
        pipe.write_line("north").expect("write");
        let chunk = pipe
            .read_chunk(Duration::from_secs(5))
            .expect("read")
            .expect("chunk");
        assert_eq!(chunk, "got north\n");
        pipe.shutdown(Duration::from_millis(200));
    }

    #[test]
    fn shutdown_is_idempotent_and_bounded() {
        let mut pipe = ChildPipe::spawn(sh("trap '' TERM; sleep 30")).expect("spawn");
        let start = std::time::Instant::now();
        pipe.shutdown(Duration::from_millis(100));
        pipe.shutdown(Duration::from_millis(100));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(!pipe.is_alive());
    }

    #[test]
    fn spawn_missing_executable_is_a_start_error() {
        let err = ChildPipe::spawn(Command::new("/no/such/interpreter")).expect_err("spawn");
        assert!(matches!(err, BackendError::Start(_)));
    }
}
