/// Self re-invocation: start this binary again in a new session with the
/// resolved configuration (minus `--daemon`), then let the caller exit.
use crate::config::Config;
use crate::detach;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

#[derive(Debug)]
pub enum DaemonError {
    CurrentExe { source: std::io::Error },
    Spawn {
        binary: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for DaemonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaemonError::CurrentExe { source } => {
                write!(f, "failed to locate current executable: {}", source)
            }
            DaemonError::Spawn { binary, source } => {
                write!(f, "failed to re-invoke {}: {}", binary.display(), source)
            }
        }
    }
}

impl std::error::Error for DaemonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DaemonError::CurrentExe { source } => Some(source),
            DaemonError::Spawn { source, .. } => Some(source),
        }
    }
}

/// Build the detached re-invocation of `binary`.
fn daemon_command(binary: &Path, config: &Config) -> Command {
    detached_command(binary, config.to_args())
}

/// `binary args...` in a new session with every standard stream on /dev/null.
fn detached_command<I, S>(binary: &Path, args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let mut cmd = Command::new(binary);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    detach::new_session(&mut cmd);
    cmd
}

/// Spawn the detached copy and return its pid. The child is not waited on.
pub fn daemonize(config: &Config) -> Result<u32, DaemonError> {
    let binary = std::env::current_exe().map_err(|e| DaemonError::CurrentExe { source: e })?;
    let child = daemon_command(&binary, config)
        .spawn()
        .map_err(|e| DaemonError::Spawn {
            binary: binary.clone(),
            source: e,
        })?;
    Ok(child.id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cli;
    use clap::Parser;

    #[test]
    fn test_daemon_command_drops_daemon_flag() {
        let cli = Cli::parse_from([
            "jobwarden",
            "--daemon",
            "--control-dir",
            "/tmp/ctl",
            "--result",
            "/tmp/ctl/result",
            "--log",
            "/tmp/ctl/log",
            "--cookie-name",
            "JOB_COOKIE",
            "--cookie-value",
            "abc",
            "--script",
            "/tmp/ctl/run.sh",
        ]);
        let config = Config::resolve(&cli).unwrap();
        let cmd = daemon_command(Path::new("/usr/local/bin/jobwarden"), &config);

        assert_eq!(cmd.get_program(), "/usr/local/bin/jobwarden");
        let args: Vec<_> = cmd.get_args().collect();
        assert!(!args.contains(&std::ffi::OsStr::new("--daemon")));
        assert!(args.contains(&std::ffi::OsStr::new("--script")));
        assert!(args.contains(&std::ffi::OsStr::new("/tmp/ctl/run.sh")));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_detached_command_leads_session_with_null_stdio() {
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("report");
        let script = format!(
            "read -r _ _ _ _ _ sid _ < /proc/$$/stat; \
             echo $$ $sid $(readlink /proc/$$/fd/1) $(readlink /proc/$$/fd/2) > '{}'",
            report.display()
        );

        let mut child = detached_command(Path::new("/bin/sh"), ["-c", script.as_str()])
            .spawn()
            .unwrap();
        assert!(child.wait().unwrap().success());

        let text = std::fs::read_to_string(&report).unwrap();
        let fields: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(fields.len(), 4, "unexpected report: {text}");
        assert_eq!(fields[0], fields[1], "child should lead its own session");
        assert_eq!(fields[2], "/dev/null");
        assert_eq!(fields[3], "/dev/null");
    }

    #[test]
    fn test_daemon_error_display() {
        let err = DaemonError::Spawn {
            binary: PathBuf::from("/usr/local/bin/jobwarden"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no perms"),
        };
        let msg = err.to_string();
        assert!(msg.contains("failed to re-invoke"));
        assert!(msg.contains("no perms"));
    }
}
