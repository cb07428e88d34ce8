//! Walkthroughs against a live fake interpreter: a shell script standing in
//! for dfrotz, exercising the real subprocess pipe, prompt quiescence, and
//! teardown paths.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

use ifplay::backend::zmachine::ZMachineBackend;
use ifplay::backend::{Backend, Tuning};
use ifplay::core::script::parse_script;
use ifplay::runner::{run_smoke, run_walkthrough};
use ifplay::test_support::RecordingSink;

const FAKE_INTERPRETER: &str = r#"#!/bin/sh
echo "West of House"
echo "You are standing in an open field west of a white house."
printf '> '
while read cmd; do
  case "$cmd" in
    "open mailbox") echo "Opening the small mailbox reveals a leaflet." ;;
    "take leaflet") echo "Taken." ;;
    inventory) echo "You are carrying:"; echo "  a leaflet" ;;
    quit|y) exit 0 ;;
    *) echo "You see nothing special." ;;
  esac
  printf '> '
done
"#;

struct Fixture {
    _dir: tempfile::TempDir,
    interpreter: PathBuf,
    game: PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let interpreter = dir.path().join("fake-dfrotz");
    std::fs::write(&interpreter, FAKE_INTERPRETER).expect("write interpreter");
    let mut perms = std::fs::metadata(&interpreter).expect("metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&interpreter, perms).expect("chmod");

    let game = dir.path().join("house.z5");
    std::fs::write(&game, b"not a real story file").expect("write game");

    Fixture {
        _dir: dir,
        interpreter,
        game,
    }
}

fn tuning() -> Tuning {
    Tuning {
        startup_timeout: Duration::from_secs(10),
        idle_window: Duration::from_millis(150),
        stop_grace: Duration::from_millis(500),
        ..Tuning::default()
    }
}

fn backend(fixture: &Fixture) -> ZMachineBackend {
    ZMachineBackend::new(fixture.interpreter.clone(), fixture.game.clone(), tuning())
}

#[test]
fn smoke_against_live_interpreter_passes() {
    let fixture = fixture();
    let report = run_smoke(backend(&fixture), Duration::from_secs(10));
    assert!(report.passed(), "smoke failed: {:?}", report.error);
}

#[test]
fn full_walkthrough_passes_and_records_a_transcript() {
    let fixture = fixture();
    let script = parse_script(
        r#"
# Opening moves of the fake house game.
open mailbox
@expect-contains "leaflet"
take leaflet
inventory
@expect-inventory "leaflet"
@expect-location "West of House"
@expect-not-contains "grue"
@expect-turns-lte 5
"#,
    )
    .expect("script");

    let mut sink = RecordingSink::default();
    let report = run_walkthrough(backend(&fixture), &script, &mut sink, Duration::from_secs(10));

    let failures: Vec<String> = report
        .failed_verdicts()
        .map(|verdict| format!("line {}: {}", verdict.line, verdict.message))
        .collect();
    assert!(report.passed(), "failures: {failures:?}");
    assert_eq!(report.turns, 3);

    let commands: Vec<&str> = sink.records.iter().map(|(_, cmd, _)| cmd.as_str()).collect();
    assert_eq!(commands, vec!["open mailbox", "take leaflet", "inventory"]);
    assert!(sink.records[0].2.contains("leaflet"));
}

#[test]
fn failing_assertion_reports_expected_and_observed() {
    let fixture = fixture();
    let script = parse_script("look\n@expect-location \"Cellar\"\n").expect("script");

    let report = run_walkthrough(
        backend(&fixture),
        &script,
        &mut RecordingSink::default(),
        Duration::from_secs(10),
    );

    assert_eq!(report.exit_code(), 2);
    let failure = report.failed_verdicts().next().expect("failure");
    assert!(failure.message.contains("Cellar"));
    assert!(failure.message.contains("West of House"));
}

#[test]
fn stop_is_idempotent_on_a_live_backend() {
    let fixture = fixture();
    let mut backend = backend(&fixture);
    backend.start().expect("start");
    assert!(backend.is_alive());

    let started = std::time::Instant::now();
    backend.stop();
    backend.stop();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!backend.is_alive());
}
