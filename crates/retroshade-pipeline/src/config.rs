use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagnostics::StackWindow;

pub const DEFAULT_STEP_QUANTUM: u32 = 1000;
pub const DEFAULT_FRAME_BUDGET_MS: u64 = 16;
pub const DEFAULT_STACK_WORDS_BEFORE: u32 = 4;
pub const DEFAULT_STACK_WORDS_AFTER: u32 = 16;
pub const DEFAULT_WORD_SIZE: u32 = 4;

pub const ENV_STEP_QUANTUM: &str = "RETROSHADE_STEP_QUANTUM";
pub const ENV_FRAME_BUDGET_MS: &str = "RETROSHADE_FRAME_BUDGET_MS";
pub const ENV_STACK_WORDS_BEFORE: &str = "RETROSHADE_STACK_WORDS_BEFORE";
pub const ENV_STACK_WORDS_AFTER: &str = "RETROSHADE_STACK_WORDS_AFTER";
pub const ENV_COMPILER_ROOT: &str = "RETROSHADE_COMPILER_ROOT";
pub const ENV_DRIVER_ROOT: &str = "RETROSHADE_DRIVER_ROOT";

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value {value:?} for {var}")]
    Env { var: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Stepping and diagnostics parameters of the execution scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Instructions executed per stepping call.
    pub step_quantum: u32,
    /// Wall-clock stepping budget per frame, in milliseconds.
    pub frame_budget_ms: u64,
    /// Stack words dumped below the stack pointer on halt.
    pub stack_words_before: u32,
    /// Stack words dumped from the stack pointer upwards on halt.
    pub stack_words_after: u32,
    /// Bytes per stack word.
    pub word_size: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            step_quantum: DEFAULT_STEP_QUANTUM,
            frame_budget_ms: DEFAULT_FRAME_BUDGET_MS,
            stack_words_before: DEFAULT_STACK_WORDS_BEFORE,
            stack_words_after: DEFAULT_STACK_WORDS_AFTER,
            word_size: DEFAULT_WORD_SIZE,
        }
    }
}

impl SchedulerConfig {
    pub fn frame_budget(&self) -> Duration {
        Duration::from_millis(self.frame_budget_ms)
    }

    pub fn stack_window(&self) -> StackWindow {
        StackWindow {
            words_before: self.stack_words_before,
            words_after: self.stack_words_after,
            word_size: self.word_size,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.step_quantum == 0 {
            return Err(ConfigError::Invalid("step_quantum must be non-zero"));
        }
        if self.word_size == 0 {
            return Err(ConfigError::Invalid("word_size must be non-zero"));
        }
        Ok(())
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub scheduler: SchedulerConfig,
    /// Directory compiler module paths are relative to.
    pub compiler_root: PathBuf,
    /// Directory driver module filenames are relative to.
    pub driver_root: PathBuf,
    /// Shader text starting with any of these is stored verbatim without running a compiler.
    pub passthrough_markers: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            compiler_root: PathBuf::from("compilers"),
            driver_root: PathBuf::from("drivers"),
            passthrough_markers: vec!["#version".to_string(), "!!".to_string()],
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Defaults overridden by `RETROSHADE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (normally the process environment). Empty values are
    /// ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get(ENV_STEP_QUANTUM) {
            self.scheduler.step_quantum = parse_env(ENV_STEP_QUANTUM, v)?;
        }
        if let Some(v) = get(ENV_FRAME_BUDGET_MS) {
            self.scheduler.frame_budget_ms = parse_env(ENV_FRAME_BUDGET_MS, v)?;
        }
        if let Some(v) = get(ENV_STACK_WORDS_BEFORE) {
            self.scheduler.stack_words_before = parse_env(ENV_STACK_WORDS_BEFORE, v)?;
        }
        if let Some(v) = get(ENV_STACK_WORDS_AFTER) {
            self.scheduler.stack_words_after = parse_env(ENV_STACK_WORDS_AFTER, v)?;
        }
        if let Some(v) = get(ENV_COMPILER_ROOT) {
            self.compiler_root = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_DRIVER_ROOT) {
            self.driver_root = PathBuf::from(v);
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate()?;
        if self.passthrough_markers.iter().any(String::is_empty) {
            // An empty marker matches every input.
            return Err(ConfigError::Invalid("passthrough markers must be non-empty"));
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(var: &'static str, value: String) -> Result<T> {
    value
        .parse()
        .map_err(|_| ConfigError::Env { var, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_constants() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.scheduler.step_quantum, 1000);
        assert_eq!(cfg.scheduler.frame_budget(), Duration::from_millis(16));
        let window = cfg.scheduler.stack_window();
        assert_eq!((window.words_before, window.words_after, window.word_size), (4, 16, 4));
        assert_eq!(cfg.passthrough_markers, ["#version", "!!"]);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = PipelineConfig::from_json_str(
            r#"{ "scheduler": { "frame_budget_ms": 8 }, "driver_root": "/opt/drivers" }"#,
        )
        .unwrap();
        assert_eq!(cfg.scheduler.frame_budget_ms, 8);
        assert_eq!(cfg.scheduler.step_quantum, DEFAULT_STEP_QUANTUM);
        assert_eq!(cfg.driver_root, PathBuf::from("/opt/drivers"));
        assert_eq!(cfg.compiler_root, PathBuf::from("compilers"));
    }

    #[test]
    fn zero_quantum_is_rejected() {
        let err = PipelineConfig::from_json_str(r#"{ "scheduler": { "step_quantum": 0 } }"#)
            .expect_err("expected validation failure");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn empty_marker_is_rejected() {
        let err = PipelineConfig::from_json_str(r##"{ "passthrough_markers": ["#version", ""] }"##)
            .expect_err("expected validation failure");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_STEP_QUANTUM, "250"),
            (ENV_FRAME_BUDGET_MS, " 33 "),
            (ENV_STACK_WORDS_AFTER, ""),
            (ENV_COMPILER_ROOT, "/srv/cc"),
        ]);
        let mut cfg = PipelineConfig::default();
        cfg.apply_env(|var| vars.get(var).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.scheduler.step_quantum, 250);
        assert_eq!(cfg.scheduler.frame_budget_ms, 33);
        assert_eq!(cfg.scheduler.stack_words_after, DEFAULT_STACK_WORDS_AFTER);
        assert_eq!(cfg.compiler_root, PathBuf::from("/srv/cc"));
    }

    #[test]
    fn bad_env_value_names_the_variable() {
        let mut cfg = PipelineConfig::default();
        let err = cfg
            .apply_env(|var| (var == ENV_FRAME_BUDGET_MS).then(|| "soon".to_string()))
            .expect_err("expected parse failure");
        assert_eq!(
            err.to_string(),
            "invalid value \"soon\" for RETROSHADE_FRAME_BUDGET_MS"
        );
    }
}
