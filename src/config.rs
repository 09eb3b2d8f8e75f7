use crate::Cli;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default heartbeat period.
pub const DEFAULT_HEARTBEAT_SECS: u64 = 3;

/// Optional TOML file supplying any parameter; command-line flags win.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub control_dir: Option<PathBuf>,
    pub result: Option<PathBuf>,
    pub log: Option<PathBuf>,
    pub cookie_name: Option<String>,
    pub cookie_value: Option<String>,
    pub script: Option<PathBuf>,
    pub interpreter: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub debug: Option<bool>,
    pub heartbeat_secs: Option<u64>,
}

/// Fully resolved supervisor configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub control_dir: PathBuf,
    pub result: PathBuf,
    pub log: PathBuf,
    pub cookie_name: String,
    pub cookie_value: String,
    pub script: PathBuf,
    pub interpreter: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub debug: bool,
    pub daemon: bool,
    pub heartbeat: Duration,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

fn required<T>(value: Option<T>, name: &'static str) -> Result<T, ConfigError> {
    value.ok_or(ConfigError::Missing { name })
}

impl Config {
    /// Merge CLI flags over the optional config file and check required parameters.
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(cli, file)
    }

    fn merge(cli: &Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let heartbeat_secs = cli
            .heartbeat_secs
            .or(file.heartbeat_secs)
            .unwrap_or(DEFAULT_HEARTBEAT_SECS);
        if heartbeat_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "heartbeat-secs",
                reason: "must be at least 1".to_string(),
            });
        }

        let cookie_name = required(
            cli.cookie_name.clone().or(file.cookie_name),
            "cookie-name",
        )?;
        if cookie_name.is_empty() || cookie_name.contains('=') || cookie_name.contains('\0') {
            return Err(ConfigError::Invalid {
                name: "cookie-name",
                reason: format!("{cookie_name:?} is not a valid environment variable name"),
            });
        }

        Ok(Self {
            control_dir: required(cli.control_dir.clone().or(file.control_dir), "control-dir")?,
            result: required(cli.result.clone().or(file.result), "result")?,
            log: required(cli.log.clone().or(file.log), "log")?,
            cookie_name,
            cookie_value: required(
                cli.cookie_value.clone().or(file.cookie_value),
                "cookie-value",
            )?,
            script: required(cli.script.clone().or(file.script), "script")?,
            interpreter: cli.interpreter.clone().or(file.interpreter),
            output: cli.output.clone().or(file.output),
            debug: cli.debug || file.debug.unwrap_or(false),
            daemon: cli.daemon,
            heartbeat: Duration::from_secs(heartbeat_secs),
        })
    }

    /// Render back to command-line flags for re-invocation.
    ///
    /// `--daemon` is left out so the re-invoked process runs in the foreground
    /// of its new session; `--config` is left out since every value is already
    /// resolved.
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        let mut push = |flag: &str, value: OsString| {
            args.push(flag.into());
            args.push(value);
        };

        push("--control-dir", self.control_dir.clone().into());
        push("--result", self.result.clone().into());
        push("--log", self.log.clone().into());
        push("--cookie-name", self.cookie_name.clone().into());
        push("--cookie-value", self.cookie_value.clone().into());
        push("--script", self.script.clone().into());
        if let Some(interpreter) = &self.interpreter {
            push("--interpreter", interpreter.clone().into());
        }
        if let Some(output) = &self.output {
            push("--output", output.clone().into());
        }
        push("--heartbeat-secs", self.heartbeat.as_secs().to_string().into());
        if self.debug {
            args.push("--debug".into());
        }
        args
    }
}

/// Errors from resolving configuration.
#[derive(Debug)]
pub enum ConfigError {
    Missing {
        name: &'static str,
    },
    Invalid {
        name: &'static str,
        reason: String,
    },
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing { name } => write!(f, "missing required parameter --{name}"),
            ConfigError::Invalid { name, reason } => write!(f, "invalid --{name}: {reason}"),
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}
