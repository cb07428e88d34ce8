//! Harness configuration (TOML).
//!
//! This file is intended to be edited by humans and must remain stable and
//! automatable. Missing fields default to sensible values, so an empty or
//! absent file is a valid configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use crate::backend::Tuning;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Bound on interpreter launch + first output, in seconds. Launch
    /// latency and per-turn latency have different magnitudes, so this is
    /// separate from `command_timeout_secs`.
    pub startup_timeout_secs: u64,

    /// Per-command wait for one complete turn, in seconds.
    pub command_timeout_secs: u64,

    /// Read-idle window that declares quiescence on unframed transports,
    /// in milliseconds.
    pub idle_window_ms: u64,

    /// Prompt suffix marking end-of-turn for the text transports.
    pub prompt_suffix: String,

    /// Virtual screen size for subprocess interpreters.
    pub screen_width: u32,
    pub screen_height: u32,

    /// Grace period before a stubborn interpreter is force-killed, seconds.
    pub stop_grace_secs: u64,

    /// Hard upper bound on turns in autonomous play.
    pub max_turns: u32,

    pub generator: GeneratorConfig,
}

/// External command-generator program for autonomous play.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Command to invoke once per turn (e.g. `["claude", "-p"]`). Empty
    /// means no generator is configured.
    pub command: Vec<String>,

    /// Bound on one generator invocation, in seconds. Time spent here is
    /// outside the per-command interpreter timeout.
    pub timeout_secs: u64,

    /// Truncate generator stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 120,
            output_limit_bytes: 65_536,
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            startup_timeout_secs: 10,
            command_timeout_secs: 30,
            idle_window_ms: 500,
            prompt_suffix: ">".to_string(),
            screen_width: 80,
            screen_height: 50,
            stop_grace_secs: 5,
            max_turns: 100,
            generator: GeneratorConfig::default(),
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.startup_timeout_secs == 0 {
            return Err(anyhow!("startup_timeout_secs must be > 0"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.idle_window_ms == 0 {
            return Err(anyhow!("idle_window_ms must be > 0"));
        }
        if self.prompt_suffix.is_empty() {
            return Err(anyhow!("prompt_suffix must not be empty"));
        }
        if self.max_turns == 0 {
            return Err(anyhow!("max_turns must be > 0"));
        }
        if self.generator.timeout_secs == 0 {
            return Err(anyhow!("generator.timeout_secs must be > 0"));
        }
        if self.generator.output_limit_bytes == 0 {
            return Err(anyhow!("generator.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    /// Backend timing knobs derived from this config.
    pub fn tuning(&self) -> Tuning {
        Tuning {
            startup_timeout: Duration::from_secs(self.startup_timeout_secs),
            idle_window: Duration::from_millis(self.idle_window_ms),
            stop_grace: Duration::from_secs(self.stop_grace_secs),
            prompt_suffix: self.prompt_suffix.clone(),
            screen_width: self.screen_width,
            screen_height: self.screen_height,
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `HarnessConfig::default()`.
pub fn load_config(path: &Path) -> Result<HarnessConfig> {
    if !path.exists() {
        let cfg = HarnessConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: HarnessConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, HarnessConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults_for_absent_fields() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "command_timeout_secs = 5\n\n[generator]\ncommand = [\"claude\", \"-p\"]\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.command_timeout_secs, 5);
        assert_eq!(cfg.startup_timeout_secs, 10);
        assert_eq!(cfg.generator.command, vec!["claude", "-p"]);
        assert_eq!(cfg.generator.timeout_secs, 120);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "command_timeout_secs = 0\n").expect("write");
        let err = load_config(&path).expect_err("should fail");
        assert!(err.to_string().contains("command_timeout_secs"));
    }

    #[test]
    fn tuning_converts_units() {
        let cfg = HarnessConfig {
            idle_window_ms: 250,
            ..HarnessConfig::default()
        };
        assert_eq!(cfg.tuning().idle_window, Duration::from_millis(250));
        assert_eq!(cfg.command_timeout(), Duration::from_secs(30));
    }
}
