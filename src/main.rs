mod completion;
mod config;
mod context;
mod daemon;
mod detach;
mod heartbeat;
mod launcher;
mod result;
mod signals;

use clap::{CommandFactory, Parser};
use config::Config;
use context::Context;
use heartbeat::{Heartbeat, HeartbeatOutcome};
use launcher::LaunchSpec;
use result::ResultFile;
use signals::SignalAbsorber;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Instrument;

/// Runs a script detached from the caller, keeps the log file's mtime fresh
/// while it runs, and writes the exit status to the result file when it ends.
#[derive(Parser, Debug)]
#[command(name = "jobwarden", version, about)]
pub struct Cli {
    /// Directory that must exist before the heartbeat starts
    #[arg(long, value_name = "DIR")]
    control_dir: Option<PathBuf>,

    /// Where the exit status is written when the script finishes
    #[arg(long, value_name = "FILE")]
    result: Option<PathBuf>,

    /// Log file: mtime is the heartbeat; also receives diagnostics and output
    #[arg(long, value_name = "FILE")]
    log: Option<PathBuf>,

    /// Environment variable name injected into the script's environment
    #[arg(long, value_name = "NAME")]
    cookie_name: Option<String>,

    /// Value for the cookie variable
    #[arg(long, value_name = "VALUE")]
    cookie_value: Option<String>,

    /// Script to run
    #[arg(long, value_name = "FILE")]
    script: Option<PathBuf>,

    /// Run the script through this interpreter in -e -u mode
    #[arg(long, value_name = "PROGRAM")]
    interpreter: Option<PathBuf>,

    /// Capture the script's stdout here instead of the log
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Seconds between heartbeats (default: 3)
    #[arg(long, value_name = "SECS")]
    heartbeat_secs: Option<u64>,

    /// TOML file supplying any of the above; flags take precedence
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose diagnostics in the log file
    #[arg(long)]
    debug: bool,

    /// Re-launch detached from the calling session and return immediately
    #[arg(long)]
    daemon: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::resolve(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("jobwarden: {e}");
            eprintln!("{}", Cli::command().render_usage());
            return ExitCode::from(2);
        }
    };

    if config.daemon {
        // No logging exists yet; failing to detach must not fall back to
        // running in the foreground.
        if let Err(e) = daemon::daemonize(&config) {
            eprintln!("jobwarden: {e}");
            std::process::abort();
        }
        return ExitCode::SUCCESS;
    }

    let log = match context::open_log(&config.log) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("jobwarden: failed to open log {}: {e}", config.log.display());
            return ExitCode::FAILURE;
        }
    };
    context::init_logging(log, config.debug);

    let ctx = Context::new(&config.log);
    let main_span = ctx.main();
    supervise(config, ctx).instrument(main_span).await
}

/// Install the absorber, run launcher and heartbeat concurrently, join both.
async fn supervise(config: Config, ctx: Context) -> ExitCode {
    tracing::info!(
        script = %config.script.display(),
        result = %config.result.display(),
        log = %ctx.log_path().display(),
        "supervisor starting"
    );
    tracing::debug!(?config, "resolved configuration");

    let absorber = match SignalAbsorber::install() {
        Ok(a) => Some(a),
        Err(e) => {
            tracing::warn!(error = %e, "failed to install signal handlers");
            None
        }
    };

    let (done_tx, done_rx) = completion::channel();

    let monitor = Heartbeat {
        control_dir: config.control_dir.clone(),
        result: config.result.clone(),
        log: config.log.clone(),
        period: config.heartbeat,
    };
    let heartbeat_task = tokio::spawn(monitor.run(done_rx).instrument(ctx.heartbeat()));

    let launcher_task = tokio::spawn(
        launcher::run(
            LaunchSpec::from_config(&config),
            ResultFile::new(&config.result),
            done_tx,
        )
        .instrument(ctx.launcher()),
    );

    let (launched, beat) = tokio::join!(launcher_task, heartbeat_task);

    let mut status = ExitCode::SUCCESS;
    match launched {
        Ok(code) => tracing::info!(code, "launcher finished"),
        Err(e) => {
            tracing::error!(error = %e, "launcher task failed");
            status = ExitCode::FAILURE;
        }
    }
    match beat {
        Ok(HeartbeatOutcome::Completed { beats }) => {
            tracing::info!(beats, "heartbeat finished")
        }
        Ok(outcome) => tracing::info!(?outcome, "heartbeat skipped"),
        Err(e) => {
            tracing::error!(error = %e, "heartbeat task failed");
            status = ExitCode::FAILURE;
        }
    }

    if let Some(absorber) = absorber {
        tracing::debug!(absorbed = absorber.absorbed(), "stopping signal absorber");
        absorber.stop();
    }

    tracing::info!("supervisor exiting");
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    fn config_in(dir: &Path, script: &str) -> Config {
        Config {
            control_dir: dir.to_path_buf(),
            result: dir.join("result"),
            log: dir.join("job.log"),
            cookie_name: "JOBWARDEN_TEST_COOKIE".to_string(),
            cookie_value: "main-test".to_string(),
            script: PathBuf::from(script),
            interpreter: None,
            output: None,
            debug: false,
            daemon: false,
            heartbeat: std::time::Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_supervise_true_records_zero() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path(), "/bin/true");
        let ctx = Context::new(&config.log);

        supervise(config.clone(), ctx).await;
        assert_eq!(std::fs::read_to_string(&config.result).unwrap(), "0");
    }

    #[tokio::test]
    async fn test_supervise_false_records_one() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path(), "/bin/false");

        supervise(config.clone(), Context::new(&config.log)).await;
        assert_eq!(std::fs::read_to_string(&config.result).unwrap(), "1");
    }

    #[tokio::test]
    async fn test_supervise_missing_script_records_sentinel() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("no-such-script");
        let config = config_in(dir.path(), missing.to_str().unwrap());

        supervise(config.clone(), Context::new(&config.log)).await;
        assert_eq!(std::fs::read_to_string(&config.result).unwrap(), "-2");
    }

    #[tokio::test]
    async fn test_supervise_heartbeats_long_child() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("job.sh");
        std::fs::write(&script, "sleep 2\n").unwrap();
        let mut config = config_in(dir.path(), script.to_str().unwrap());
        config.interpreter = Some(PathBuf::from("/bin/sh"));
        std::fs::write(&config.log, "").unwrap();
        let old = filetime::FileTime::from_unix_time(1_000_000, 0);
        filetime::set_file_mtime(&config.log, old).unwrap();

        tokio::time::timeout(
            std::time::Duration::from_secs(20),
            supervise(config.clone(), Context::new(&config.log)),
        )
        .await
        .unwrap();
        assert_eq!(std::fs::read_to_string(&config.result).unwrap(), "0");

        let touched = filetime::FileTime::from_last_modification_time(
            &std::fs::metadata(&config.log).unwrap(),
        );
        assert!(touched > old);
    }

    #[tokio::test]
    async fn test_supervise_survives_hangup_mid_run() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let dir = tempdir().unwrap();
        let script = dir.path().join("job.sh");
        std::fs::write(&script, "sleep 1\n").unwrap();
        let mut config = config_in(dir.path(), script.to_str().unwrap());
        config.interpreter = Some(PathBuf::from("/bin/sh"));

        let task = tokio::spawn(supervise(config.clone(), Context::new(&config.log)));
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        assert!(!config.result.exists(), "child should still be running");
        kill(Pid::this(), Signal::SIGHUP).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(20), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(std::fs::read_to_string(&config.result).unwrap(), "0");
    }

    #[test]
    fn test_cli_parses_all_flags() {
        let cli = Cli::parse_from([
            "jobwarden",
            "--control-dir",
            "/c",
            "--result",
            "/c/r",
            "--log",
            "/c/l",
            "--cookie-name",
            "N",
            "--cookie-value",
            "V",
            "--script",
            "/c/s",
            "--interpreter",
            "/bin/bash",
            "--output",
            "/c/o",
            "--heartbeat-secs",
            "7",
            "--debug",
            "--daemon",
        ]);
        assert_eq!(cli.interpreter, Some(PathBuf::from("/bin/bash")));
        assert_eq!(cli.heartbeat_secs, Some(7));
        assert!(cli.debug);
        assert!(cli.daemon);
    }

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }
}
