//! CLI for the ifplay harness.
//!
//! Three commands share the turn executor: `smoke` (liveness check),
//! `test` (scripted walkthrough), and `play` (autonomous play driven by an
//! external command generator). The process exit code follows the stable
//! contract in [`ifplay::exit_codes`].

use std::fs;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use ifplay::backend::{AnyBackend, glk::GlkBackend, network::NetworkBackend, zmachine::ZMachineBackend};
use ifplay::core::assertions::Assertion;
use ifplay::core::report::RunReport;
use ifplay::core::script::parse_script;
use ifplay::exit_codes;
use ifplay::io::config::{HarnessConfig, load_config};
use ifplay::io::source::GeneratorProgram;
use ifplay::io::transcript::{JsonlTranscript, NullTranscript, TranscriptSink};
use ifplay::{logging, runner};

#[derive(Parser)]
#[command(
    name = "ifplay",
    version,
    about = "Drive interactive-fiction interpreters and verify their behavior"
)]
struct Cli {
    /// Harness configuration file (TOML). Missing file means defaults.
    #[arg(long, default_value = "ifplay.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the interpreter, send one neutral command, require a response.
    Smoke {
        #[command(flatten)]
        target: Target,
    },
    /// Run a walkthrough script and evaluate its assertions.
    Test {
        #[command(flatten)]
        target: Target,

        /// Walkthrough script file.
        #[arg(long)]
        walkthrough: PathBuf,

        /// Write a JSON Lines transcript of the run.
        #[arg(long)]
        transcript: Option<PathBuf>,
    },
    /// Let an external command generator play, bounded by a turn limit.
    Play {
        #[command(flatten)]
        target: Target,

        /// Hard upper bound on turns (defaults from config).
        #[arg(long)]
        max_turns: Option<u32>,

        /// Command generator invocation, whitespace-separated
        /// (defaults from config `[generator]`).
        #[arg(long)]
        generator: Option<String>,

        /// Final assertion: location contains the given text.
        #[arg(long)]
        expect_location: Option<String>,

        /// Final assertion: last response contains the text (repeatable).
        #[arg(long)]
        expect_contains: Vec<String>,

        /// Write a JSON Lines transcript of the run.
        #[arg(long)]
        transcript: Option<PathBuf>,
    },
}

#[derive(Args)]
struct Target {
    /// Interpreter transport.
    #[arg(long, value_enum, default_value_t = TransportKind::Zmachine)]
    backend: TransportKind,

    /// Game file, for the subprocess transports.
    #[arg(long)]
    game: Option<PathBuf>,

    /// host:port, for the network transport.
    #[arg(long)]
    connect: Option<String>,

    /// Interpreter executable (defaults: dfrotz / glulxe).
    #[arg(long)]
    interpreter: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TransportKind {
    /// Line-oriented subprocess (dfrotz-style).
    Zmachine,
    /// JSON-framed subprocess (remglk-style).
    Glk,
    /// Raw TCP text stream (MUD-style).
    Network,
}

fn main() {
    logging::init();
    std::process::exit(run());
}

fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help/--version land here too; only real usage errors count
            // as invalid input.
            let code = if err.use_stderr() {
                exit_codes::INVALID_INPUT
            } else {
                exit_codes::OK
            };
            let _ = err.print();
            return code;
        }
    };

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid config: {err:#}");
            return exit_codes::INVALID_INPUT;
        }
    };

    let report = match cli.command {
        Command::Smoke { target } => {
            let backend = match build_backend(&target, &config) {
                Ok(backend) => backend,
                Err(message) => return invalid_input(&message),
            };
            runner::run_smoke(backend, config.command_timeout())
        }
        Command::Test {
            target,
            walkthrough,
            transcript,
        } => {
            // Parse before the backend starts: a malformed script must never
            // send a command.
            let text = match fs::read_to_string(&walkthrough) {
                Ok(text) => text,
                Err(err) => {
                    return invalid_input(&format!("read walkthrough {}: {err}", walkthrough.display()));
                }
            };
            let script = match parse_script(&text) {
                Ok(script) => script,
                Err(err) => return invalid_input(&err.to_string()),
            };
            let backend = match build_backend(&target, &config) {
                Ok(backend) => backend,
                Err(message) => return invalid_input(&message),
            };
            let mut sink = match open_sink(transcript.as_deref()) {
                Ok(sink) => sink,
                Err(err) => {
                    eprintln!("transcript: {err:#}");
                    return exit_codes::HARNESS_ERROR;
                }
            };
            runner::run_walkthrough(backend, &script, &mut sink, config.command_timeout())
        }
        Command::Play {
            target,
            max_turns,
            generator,
            expect_location,
            expect_contains,
            transcript,
        } => {
            let argv: Vec<String> = match generator {
                Some(line) => line.split_whitespace().map(str::to_string).collect(),
                None => config.generator.command.clone(),
            };
            if argv.is_empty() {
                return invalid_input("no command generator configured (--generator or [generator] in config)");
            }
            let mut source = match GeneratorProgram::new(
                argv,
                std::time::Duration::from_secs(config.generator.timeout_secs),
                config.generator.output_limit_bytes,
            ) {
                Ok(source) => source,
                Err(err) => return invalid_input(&err.to_string()),
            };

            let mut final_assertions = Vec::new();
            if let Some(expected) = expect_location {
                final_assertions.push(Assertion::Location { expected });
            }
            for expected in expect_contains {
                final_assertions.push(Assertion::Contains { expected });
            }

            let backend = match build_backend(&target, &config) {
                Ok(backend) => backend,
                Err(message) => return invalid_input(&message),
            };
            let mut sink = match open_sink(transcript.as_deref()) {
                Ok(sink) => sink,
                Err(err) => {
                    eprintln!("transcript: {err:#}");
                    return exit_codes::HARNESS_ERROR;
                }
            };
            runner::run_autonomous(
                backend,
                &mut source,
                &final_assertions,
                max_turns.unwrap_or(config.max_turns),
                &mut sink,
                config.command_timeout(),
            )
        }
    };

    print_report(&report);
    report.exit_code()
}

fn build_backend(target: &Target, config: &HarnessConfig) -> Result<AnyBackend, String> {
    let tuning = config.tuning();
    match target.backend {
        TransportKind::Zmachine => {
            let game = target
                .game
                .clone()
                .ok_or_else(|| "--game is required for the zmachine transport".to_string())?;
            let interpreter = target
                .interpreter
                .clone()
                .unwrap_or_else(|| PathBuf::from("dfrotz"));
            Ok(AnyBackend::ZMachine(ZMachineBackend::new(interpreter, game, tuning)))
        }
        TransportKind::Glk => {
            let game = target
                .game
                .clone()
                .ok_or_else(|| "--game is required for the glk transport".to_string())?;
            let interpreter = target
                .interpreter
                .clone()
                .unwrap_or_else(|| PathBuf::from("glulxe"));
            Ok(AnyBackend::Glk(GlkBackend::new(interpreter, game, tuning)))
        }
        TransportKind::Network => {
            let address = target
                .connect
                .clone()
                .ok_or_else(|| "--connect host:port is required for the network transport".to_string())?;
            Ok(AnyBackend::Network(NetworkBackend::new(address, tuning)))
        }
    }
}

fn open_sink(path: Option<&std::path::Path>) -> anyhow::Result<Box<dyn TranscriptSink>> {
    match path {
        Some(path) => Ok(Box::new(JsonlTranscript::create(path)?)),
        None => Ok(Box::new(NullTranscript)),
    }
}

fn invalid_input(message: &str) -> i32 {
    eprintln!("{message}");
    exit_codes::INVALID_INPUT
}

fn print_report(report: &RunReport) {
    for verdict in report.failed_verdicts() {
        if verdict.line > 0 {
            println!("FAIL line {}: {}: {}", verdict.line, verdict.directive, verdict.message);
        } else {
            println!("FAIL: {}: {}", verdict.directive, verdict.message);
        }
    }
    if !report.passed() {
        println!(
            "final state: location {}, score {}, turn {}",
            report.final_location.as_deref().unwrap_or("(unknown)"),
            report
                .final_score
                .map_or_else(|| "(unknown)".to_string(), |score| score.to_string()),
            report.turns,
        );
    }
    if let Some(error) = &report.error {
        eprintln!("error: {error}");
    }
    println!("{}", report.summary());
}
