/// Liveness monitor for the supervised child.
///
/// Runs alongside the launcher, refreshing the log file's mtime every period
/// until the completion signal fires. An external poller compares that mtime
/// against its own staleness threshold.
use crate::completion::CompletionWatch;
use filetime::FileTime;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Inputs for one heartbeat run.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    pub control_dir: PathBuf,
    pub result: PathBuf,
    pub log: PathBuf,
    pub period: Duration,
}

/// How the heartbeat loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// Control directory was absent; nothing was touched.
    MissingControlDir,
    /// A result already existed for this path; nothing was touched.
    AlreadyFinished,
    /// Stopped after the completion signal, having attempted `beats` touches.
    Completed { beats: u64 },
}

/// Set the file's mtime (and atime) to now.
pub fn touch(path: &Path) -> std::io::Result<()> {
    let now = FileTime::now();
    filetime::set_file_times(path, now, now)
}

impl Heartbeat {
    /// Check preconditions once, then beat until `done` fires.
    pub async fn run(self, mut done: CompletionWatch) -> HeartbeatOutcome {
        if !self.control_dir.is_dir() {
            tracing::error!(
                control_dir = %self.control_dir.display(),
                "control directory does not exist, not starting heartbeat"
            );
            return HeartbeatOutcome::MissingControlDir;
        }
        if self.result.exists() {
            tracing::warn!(
                result = %self.result.display(),
                "result already exists, not starting heartbeat"
            );
            return HeartbeatOutcome::AlreadyFinished;
        }

        tracing::debug!(
            log = %self.log.display(),
            period_ms = self.period.as_millis() as u64,
            "heartbeat started"
        );

        let mut beats: u64 = 0;
        loop {
            if done.has_fired() {
                break;
            }

            beats += 1;
            match touch(&self.log) {
                Ok(()) => tracing::debug!(beats, "heartbeat"),
                Err(e) => tracing::warn!(
                    error = %e,
                    log = %self.log.display(),
                    "failed to touch log file"
                ),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.period) => {}
                _ = done.wait() => {}
            }
        }

        tracing::debug!(beats, "heartbeat stopped");
        HeartbeatOutcome::Completed { beats }
    }
}
