/// Supervisor context: the shared log file and the named log streams.
///
/// Built once in `main` after configuration is resolved and handed to each
/// task. Diagnostics go to the log file through `tracing`; the launcher also
/// clones the file handle to capture child output.
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Span;
use tracing_subscriber::EnvFilter;

/// Open the log file for appending, creating it if needed.
pub fn open_log(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the process-wide subscriber writing to `log`.
///
/// `RUST_LOG` overrides the level picked from `debug`.
pub fn init_logging(log: File, debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(log))
        .with_ansi(false)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

/// Handles to the three log streams plus the log path.
#[derive(Debug, Clone)]
pub struct Context {
    log_path: PathBuf,
    main: Span,
    launcher: Span,
    heartbeat: Span,
}

impl Context {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        let pid = std::process::id();
        Self {
            log_path: log_path.into(),
            main: tracing::info_span!("main", pid),
            launcher: tracing::info_span!("launcher"),
            heartbeat: tracing::info_span!("heartbeat"),
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn main(&self) -> Span {
        self.main.clone()
    }

    pub fn launcher(&self) -> Span {
        self.launcher.clone()
    }

    pub fn heartbeat(&self) -> Span {
        self.heartbeat.clone()
    }
}
