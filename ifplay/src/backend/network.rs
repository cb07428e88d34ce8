//! TCP text-stream backend for remote interpreters (MUD-style hosts).
//!
//! Remote hosts send partial lines across packets and have no framing at
//! all, so quiescence is prompt-pattern matching on the tail of the buffer
//! with the read-idle window as fallback. Telnet option negotiation and
//! ANSI color codes are stripped before any text reaches the extractors.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use tracing::{debug, instrument};

use crate::backend::{Backend, BackendError, Tuning};
use crate::core::extract;
use crate::core::types::TurnPayload;

#[derive(Debug)]
pub struct NetworkBackend {
    address: String,
    tuning: Tuning,
    stream: Option<TcpStream>,
    /// Set once EOF is observed; the socket stays around for `stop`.
    closed: bool,
    last_sent: Option<String>,
}

impl NetworkBackend {
    pub fn new(address: String, tuning: Tuning) -> Self {
        Self {
            address,
            tuning,
            stream: None,
            closed: false,
            last_sent: None,
        }
    }

    fn resolve(&self) -> Result<SocketAddr, BackendError> {
        self.address
            .to_socket_addrs()
            .map_err(|err| BackendError::Start(format!("resolve {}: {err}", self.address)))?
            .next()
            .ok_or_else(|| BackendError::Start(format!("no address for {}", self.address)))
    }

    /// Read until the host shows a prompt or goes idle after output.
    fn read_turn(&mut self, timeout: Duration) -> Result<TurnPayload, BackendError> {
        let suffix = self.tuning.prompt_suffix.clone();
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| BackendError::Disconnected("not connected".to_string()))?;

        let deadline = Instant::now() + timeout;
        let mut raw: Vec<u8> = Vec::new();
        let mut chunk = [0u8; 4096];

        loop {
            match stream.read(&mut chunk) {
                Ok(0) => {
                    self.closed = true;
                    if raw.is_empty() {
                        return Err(BackendError::Crash("connection closed by host".to_string()));
                    }
                    break;
                }
                Ok(n) => {
                    raw.extend_from_slice(&chunk[..n]);
                    if at_prompt(&decode(&raw), &suffix) {
                        break;
                    }
                }
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    // Read timeout doubles as the idle window.
                    if !raw.is_empty() {
                        break;
                    }
                    if Instant::now() >= deadline {
                        return Err(BackendError::Timeout(timeout));
                    }
                }
                Err(err) => {
                    self.closed = true;
                    return Err(BackendError::Crash(format!("read from host: {err}")));
                }
            }
        }

        let text = extract::clean_response(&decode(&raw));
        let text = extract::strip_prompt(&text, &suffix);
        let text = match self.last_sent.take() {
            Some(command) => extract::strip_command_echo(&text, &command),
            None => text,
        };

        debug!(bytes = text.len(), closed = self.closed, "turn complete");
        let game_over =
            self.closed || extract::looks_fatal(&text) || extract::looks_disconnected(&text);
        Ok(TurnPayload {
            location: extract::scrape_location(&text),
            score: extract::scrape_score(&text),
            game_over,
            text,
        })
    }
}

impl Backend for NetworkBackend {
    #[instrument(skip_all, fields(address = %self.address))]
    fn start(&mut self) -> Result<TurnPayload, BackendError> {
        let addr = self.resolve()?;
        let stream = TcpStream::connect_timeout(&addr, self.tuning.startup_timeout)
            .map_err(|err| BackendError::Start(format!("connect {}: {err}", self.address)))?;
        stream
            .set_read_timeout(Some(self.tuning.idle_window))
            .map_err(|err| BackendError::Start(format!("set read timeout: {err}")))?;
        self.stream = Some(stream);
        self.closed = false;

        let startup = self.tuning.startup_timeout;
        self.read_turn(startup).map_err(|err| match err {
            BackendError::Timeout(_) => {
                BackendError::Start(format!("no banner from host within {startup:?}"))
            }
            other => other,
        })
    }

    fn send(&mut self, command: &str) -> Result<(), BackendError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| BackendError::Disconnected("not connected".to_string()))?;
        stream
            .write_all(format!("{command}\r\n").as_bytes())
            .map_err(|err| BackendError::Disconnected(format!("write to host: {err}")))?;
        self.last_sent = Some(command.to_string());
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<TurnPayload, BackendError> {
        self.read_turn(timeout)
    }

    fn is_alive(&mut self) -> bool {
        self.stream.is_some() && !self.closed
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            let mut stream = stream;
            let _ = stream.write_all(b"quit\r\n");
            if let Err(err) = stream.shutdown(Shutdown::Both) {
                debug!(%err, "socket shutdown");
            }
        }
        self.closed = true;
    }
}

fn decode(raw: &[u8]) -> String {
    extract::strip_ansi(&String::from_utf8_lossy(&strip_telnet(raw)))
}

/// Check whether the tail of the text looks like an input prompt.
fn at_prompt(text: &str, suffix: &str) -> bool {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .next_back()
        .is_some_and(|line| line.trim_end().ends_with(suffix))
        && text.trim_end().ends_with(suffix)
}

/// Remove telnet IAC negotiation sequences.
fn strip_telnet(raw: &[u8]) -> Vec<u8> {
    const IAC: u8 = 255;
    const SB: u8 = 250;
    const SE: u8 = 240;

    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] != IAC || i + 1 >= raw.len() {
            out.push(raw[i]);
            i += 1;
            continue;
        }
        let cmd = raw[i + 1];
        if (251..=254).contains(&cmd) {
            // WILL/WONT/DO/DONT + option byte
            i += 3;
        } else if cmd == SB {
            // Subnegotiation runs until IAC SE
            match raw[i + 2..].windows(2).position(|w| w == [IAC, SE]) {
                Some(end) => i += 2 + end + 2,
                None => i += 2,
            }
        } else {
            i += 2;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::thread;

    fn tuning() -> Tuning {
        Tuning {
            startup_timeout: Duration::from_secs(5),
            idle_window: Duration::from_millis(50),
            ..Tuning::default()
        }
    }

    /// Fake MUD: banner, then one canned response per received line.
    fn fake_host<F>(handler: F) -> String
    where
        F: FnOnce(TcpStream) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let address = listener.local_addr().expect("addr").to_string();
        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                handler(stream);
            }
        });
        address
    }

    #[test]
    fn connect_banner_command_response_round_trip() {
        let address = fake_host(|mut stream| {
            stream
                .write_all(b"\xff\xfb\x01Welcome to DeepMud!\r\nThe Temple Square\r\n> ")
                .expect("banner");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut line = String::new();
            reader.read_line(&mut line).expect("read");
            stream
                .write_all(b"look\r\nThe Temple Square\r\nA quiet plaza.\r\n> ")
                .expect("reply");
        });

        let mut backend = NetworkBackend::new(address, tuning());
        let banner = backend.start().expect("start");
        assert!(banner.text.contains("Welcome to DeepMud!"));
        assert!(!banner.text.contains('\u{fffd}'));

        backend.send("look").expect("send");
        let turn = backend.receive(Duration::from_secs(5)).expect("receive");
        assert!(turn.text.starts_with("The Temple Square"));
        assert_eq!(turn.location, Some("The Temple Square".to_string()));
        assert!(!turn.game_over);

        backend.stop();
        backend.stop();
    }

    #[test]
    fn silent_host_times_out_after_banner() {
        let address = fake_host(|mut stream| {
            stream.write_all(b"Welcome!\r\n> ").expect("banner");
            thread::sleep(Duration::from_secs(10));
        });

        let mut backend = NetworkBackend::new(address, tuning());
        backend.start().expect("start");
        backend.send("look").expect("send");
        let err = backend
            .receive(Duration::from_millis(300))
            .expect_err("should time out");
        assert!(matches!(err, BackendError::Timeout(_)));
        backend.stop();
    }

    #[test]
    fn host_closing_mid_wait_is_a_crash() {
        let address = fake_host(|mut stream| {
            stream.write_all(b"Welcome!\r\n> ").expect("banner");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut line = String::new();
            reader.read_line(&mut line).expect("read");
            // Drop without replying.
        });

        let mut backend = NetworkBackend::new(address, tuning());
        backend.start().expect("start");
        backend.send("look").expect("send");
        let err = backend
            .receive(Duration::from_secs(5))
            .expect_err("should crash");
        assert!(matches!(err, BackendError::Crash(_)));
        assert!(!backend.is_alive());
        backend.stop();
    }

    #[test]
    fn unreachable_address_is_a_start_error() {
        let mut backend = NetworkBackend::new("127.0.0.1:1".to_string(), tuning());
        let err = backend.start().expect_err("should fail");
        assert!(matches!(err, BackendError::Start(_)));
    }

    #[test]
    fn strip_telnet_removes_negotiation() {
        let raw = b"\xff\xfb\x01hello\xff\xfa\x18\x00ansi\xff\xf0 world\xff\xf1";
        assert_eq!(strip_telnet(raw), b"hello world");
    }

    #[test]
    fn at_prompt_matches_trailing_marker_only() {
        assert!(at_prompt("The Temple\n> ", ">"));
        assert!(!at_prompt("You walk north.\n", ">"));
        assert!(!at_prompt("> \nmore text coming", ">"));
    }
}
