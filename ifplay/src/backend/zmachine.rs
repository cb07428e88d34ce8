//! Line-oriented subprocess backend for Z-machine interpreters.
//!
//! Drives a "dumb terminal" interpreter such as dfrotz over stdin/stdout.
//! The transport has no framing: a turn ends when the interpreter re-displays
//! its input prompt, or (since prompts are only a convention) when the
//! stream goes idle for a configured window after producing output.

use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use tracing::{debug, instrument};

use crate::backend::pipe::ChildPipe;
use crate::backend::{Backend, BackendError, Tuning};
use crate::core::extract;
use crate::core::types::TurnPayload;

#[derive(Debug)]
pub struct ZMachineBackend {
    interpreter: PathBuf,
    game: PathBuf,
    tuning: Tuning,
    pipe: Option<ChildPipe>,
    last_sent: Option<String>,
}

impl ZMachineBackend {
    pub fn new(interpreter: PathBuf, game: PathBuf, tuning: Tuning) -> Self {
        Self {
            interpreter,
            game,
            tuning,
            pipe: None,
            last_sent: None,
        }
    }

    /// Read until the prompt reappears or the stream goes idle.
    fn read_turn(&mut self, timeout: Duration) -> Result<TurnPayload, BackendError> {
        let pipe = self
            .pipe
            .as_mut()
            .ok_or_else(|| BackendError::Disconnected("backend not started".to_string()))?;

        let deadline = Instant::now() + timeout;
        let mut buffer = String::new();
        let mut crashed = false;

        loop {
            match pipe.read_chunk(self.tuning.idle_window) {
                Ok(Some(chunk)) => {
                    buffer.push_str(&chunk);
                    if ends_at_prompt(&buffer, &self.tuning.prompt_suffix) {
                        break;
                    }
                }
                Ok(None) => {
                    // Idle window elapsed. Output followed by silence is the
                    // quiescence signal on this transport.
                    if !buffer.trim().is_empty() {
                        break;
                    }
                    if Instant::now() >= deadline {
                        return Err(BackendError::Timeout(timeout));
                    }
                }
                Err(err @ BackendError::Crash(_)) => {
                    // A quit turn produces final output and then EOF; only a
                    // silent EOF is a crash.
                    if buffer.trim().is_empty() {
                        return Err(err);
                    }
                    crashed = true;
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        let text = extract::strip_prompt(&buffer, &self.tuning.prompt_suffix);
        let text = extract::clean_response(&text);
        let text = match self.last_sent.take() {
            Some(command) => extract::strip_command_echo(&text, &command),
            None => text,
        };

        debug!(bytes = text.len(), crashed, "turn complete");
        Ok(TurnPayload {
            location: extract::scrape_location(&text),
            score: extract::scrape_score(&text),
            game_over: crashed || extract::looks_fatal(&text),
            text,
        })
    }
}

impl Backend for ZMachineBackend {
    #[instrument(skip_all, fields(game = %self.game.display()))]
    fn start(&mut self) -> Result<TurnPayload, BackendError> {
        if !self.game.exists() {
            return Err(BackendError::Start(format!(
                "game file not found: {}",
                self.game.display()
            )));
        }

        // -p: don't pause at end of page; -w: fixed screen width.
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg("-p")
            .arg("-w")
            .arg(self.tuning.screen_width.to_string())
            .arg(&self.game);

        self.pipe = Some(ChildPipe::spawn(cmd)?);
        let startup = self.tuning.startup_timeout;
        self.read_turn(startup).map_err(|err| match err {
            BackendError::Timeout(_) => {
                BackendError::Start(format!("no interpreter output within {startup:?}"))
            }
            other => other,
        })
    }

    fn send(&mut self, command: &str) -> Result<(), BackendError> {
        let pipe = self
            .pipe
            .as_mut()
            .ok_or_else(|| BackendError::Disconnected("backend not started".to_string()))?;
        pipe.write_line(command)?;
        self.last_sent = Some(command.to_string());
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<TurnPayload, BackendError> {
        self.read_turn(timeout)
    }

    fn is_alive(&mut self) -> bool {
        self.pipe.as_mut().is_some_and(ChildPipe::is_alive)
    }

    fn stop(&mut self) {
        if let Some(pipe) = self.pipe.as_mut() {
            // Best-effort in-game quit; the grace period and force-kill in
            // shutdown cover interpreters that ignore it.
            let _ = pipe.write_line("quit");
            let _ = pipe.write_line("y");
            pipe.shutdown(self.tuning.stop_grace);
        }
    }
}

fn ends_at_prompt(buffer: &str, suffix: &str) -> bool {
    buffer.trim_end().ends_with(suffix)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn tuning() -> Tuning {
        Tuning {
            startup_timeout: Duration::from_secs(5),
            idle_window: Duration::from_millis(100),
            stop_grace: Duration::from_millis(200),
            ..Tuning::default()
        }
    }

    /// Fake interpreter: banner with a prompt, then one canned room
    /// description per command.
    const FAKE_GAME: &str = r#"
echo "West of House"
echo "You are standing in an open field."
printf '> '
while read cmd; do
  echo "$cmd"
  echo "Kitchen"
  echo "Score: 5"
  printf '> '
done
"#;

    fn sh_backend(script: &str) -> ZMachineBackend {
        let game = std::env::temp_dir().join("ifplay-fake.z5");
        std::fs::write(&game, b"fake").expect("write game file");
        let mut backend = ZMachineBackend::new(PathBuf::from("sh"), game, tuning());
        // Replace the dfrotz invocation with a shell script for the test.
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        backend.pipe = Some(ChildPipe::spawn(cmd).expect("spawn"));
        backend
    }

    #[test]
    fn reads_intro_and_turn_with_prompt_quiescence() {
        let mut backend = sh_backend(FAKE_GAME);

        let intro = backend.read_turn(Duration::from_secs(5)).expect("intro");
        assert!(intro.text.contains("West of House"));
        assert_eq!(intro.location, Some("West of House".to_string()));
        assert!(!intro.game_over);

        backend.send("go east").expect("send");
        let turn = backend.receive(Duration::from_secs(5)).expect("receive");
        // The echoed command is stripped; the rest of the response stays.
        assert!(!turn.text.starts_with("go east"));
        assert!(turn.text.contains("Kitchen"));
        assert_eq!(turn.score, Some(5));

        backend.stop();
        backend.stop();
    }

    #[test]
    fn silent_interpreter_times_out() {
        let mut backend = sh_backend("sleep 30");
        let err = backend
            .read_turn(Duration::from_millis(300))
            .expect_err("should time out");
        assert!(matches!(err, BackendError::Timeout(_)));
        backend.stop();
    }

    #[test]
    fn eof_without_output_is_a_crash() {
        let mut backend = sh_backend("exit 0");
        let err = backend
            .read_turn(Duration::from_secs(5))
            .expect_err("should crash");
        assert!(matches!(err, BackendError::Crash(_)));
        backend.stop();
    }

    #[test]
    fn final_output_then_eof_is_a_game_over_turn() {
        let mut backend = sh_backend("echo 'Thanks for playing!'");
        let turn = backend.read_turn(Duration::from_secs(5)).expect("turn");
        assert!(turn.text.contains("Thanks for playing"));
        assert!(turn.game_over);
        backend.stop();
    }

    #[test]
    fn missing_game_file_is_a_start_error() {
        let mut backend = ZMachineBackend::new(
            PathBuf::from("dfrotz"),
            PathBuf::from("/no/such/game.z5"),
            tuning(),
        );
        let err = backend.start().expect_err("should fail");
        assert!(matches!(err, BackendError::Start(_)));
    }
}
