/// Launcher: run the script in its own session, capture its output, record the
/// exit status, then release the heartbeat.
use crate::completion::CompletionSender;
use crate::config::Config;
use crate::context::open_log;
use crate::detach;
use crate::result::{ResultFile, LAUNCH_FAILED};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

/// Flags passed to the interpreter ahead of the script path: exit on the
/// first failing command and treat unset variables as errors.
pub const STRICT_FLAGS: [&str; 2] = ["-e", "-u"];

/// Everything needed to start one child.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub script: PathBuf,
    pub interpreter: Option<PathBuf>,
    /// Receives the child's stdout when set; otherwise stdout goes to `log`.
    pub output: Option<PathBuf>,
    pub log: PathBuf,
    pub cookie_name: String,
    pub cookie_value: String,
}

impl LaunchSpec {
    pub fn from_config(config: &Config) -> Self {
        Self {
            script: config.script.clone(),
            interpreter: config.interpreter.clone(),
            output: config.output.clone(),
            log: config.log.clone(),
            cookie_name: config.cookie_name.clone(),
            cookie_value: config.cookie_value.clone(),
        }
    }
}

/// A child that ran to completion.
#[derive(Debug)]
pub struct Exited {
    pub pid: u32,
    pub code: i32,
}

/// Errors that stop the launcher from obtaining a real exit code.
#[derive(Debug)]
pub enum LaunchError {
    /// Failed to open the shared log for the child's output.
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to create the dedicated stdout file.
    OutputFile {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to spawn the child.
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },
    /// Failed while waiting on a started child.
    Wait {
        pid: u32,
        source: std::io::Error,
    },
}

impl std::fmt::Display for LaunchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchError::LogFile { path, source } => {
                write!(f, "failed to open log file {}: {}", path.display(), source)
            }
            LaunchError::OutputFile { path, source } => {
                write!(
                    f,
                    "failed to create output file {}: {}",
                    path.display(),
                    source
                )
            }
            LaunchError::Spawn { program, source } => {
                write!(f, "failed to start {}: {}", program.display(), source)
            }
            LaunchError::Wait { pid, source } => {
                write!(f, "failed to wait for child {}: {}", pid, source)
            }
        }
    }
}

impl std::error::Error for LaunchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LaunchError::LogFile { source, .. } => Some(source),
            LaunchError::OutputFile { source, .. } => Some(source),
            LaunchError::Spawn { source, .. } => Some(source),
            LaunchError::Wait { source, .. } => Some(source),
        }
    }
}

/// Build the child command: `<interpreter> -e -u <script>` or `<script>`.
fn build_command(spec: &LaunchSpec) -> Command {
    let mut cmd = match &spec.interpreter {
        Some(interpreter) => {
            let mut cmd = Command::new(interpreter);
            cmd.args(STRICT_FLAGS).arg(&spec.script);
            cmd
        }
        None => Command::new(&spec.script),
    };
    cmd.env(&spec.cookie_name, &spec.cookie_value)
        .stdin(Stdio::null());
    detach::new_session_async(&mut cmd);
    cmd
}

/// Point stdout/stderr at the output file and log.
fn wire_output(cmd: &mut Command, spec: &LaunchSpec) -> Result<(), LaunchError> {
    let log_err = |e: std::io::Error| LaunchError::LogFile {
        path: spec.log.clone(),
        source: e,
    };
    let log = open_log(&spec.log).map_err(log_err)?;

    match &spec.output {
        Some(path) => {
            let out = std::fs::File::create(path).map_err(|e| LaunchError::OutputFile {
                path: path.clone(),
                source: e,
            })?;
            cmd.stdout(Stdio::from(out)).stderr(Stdio::from(log));
        }
        None => {
            // stderr shares stdout's destination.
            let log_stderr = log.try_clone().map_err(log_err)?;
            cmd.stdout(Stdio::from(log)).stderr(Stdio::from(log_stderr));
        }
    }
    Ok(())
}

/// Map a finished process's status to the recorded code.
///
/// A child killed by a signal has no exit code; it is recorded the way shells
/// report it, `128 + signal`.
pub fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => LAUNCH_FAILED,
    }
}

/// Start the child and block until it exits.
pub async fn execute(spec: &LaunchSpec) -> Result<Exited, LaunchError> {
    let mut cmd = build_command(spec);
    wire_output(&mut cmd, spec)?;

    let program = spec.interpreter.as_ref().unwrap_or(&spec.script);
    if spec.interpreter.is_none() && !is_executable(&spec.script) {
        tracing::warn!(script = %spec.script.display(), "script is not an executable file");
    }
    tracing::info!(
        program = %program.display(),
        script = %spec.script.display(),
        output = ?spec.output,
        cookie = %spec.cookie_name,
        "starting child"
    );

    let mut child = cmd.spawn().map_err(|e| LaunchError::Spawn {
        program: program.clone(),
        source: e,
    })?;

    let pid = child.id().unwrap_or(0);
    tracing::info!(pid, "child started");

    let status = child
        .wait()
        .await
        .map_err(|e| LaunchError::Wait { pid, source: e })?;

    let code = exit_code(status);
    tracing::info!(pid, code, %status, "child exited");
    Ok(Exited { pid, code })
}

/// Launcher task body. Always records a result (or logs why it could not) and
/// always fires `done` before returning the recorded code.
pub async fn run(spec: LaunchSpec, results: ResultFile, done: CompletionSender) -> i32 {
    let code = match execute(&spec).await {
        Ok(exited) => {
            tracing::debug!(pid = exited.pid, "child reaped");
            exited.code
        }
        Err(e) => {
            tracing::error!(error = %e, "child did not produce an exit code");
            LAUNCH_FAILED
        }
    };

    record(&results, code);
    done.fire();
    code
}

fn record(results: &ResultFile, code: i32) {
    match results.record(code) {
        Ok(()) => tracing::info!(code, path = %results.path().display(), "result recorded"),
        Err(e) => tracing::error!(error = %e, code, "failed to record result"),
    }
}

/// Whether `path` looks runnable without an interpreter. Only feeds a
/// warning; the spawn result decides.
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
