/// Signal absorption for the supervisor process.
///
/// SIGINT, SIGTERM and SIGHUP are logged and otherwise ignored: the supervisor
/// keeps running and the child (in its own session) never sees them. A dropped
/// SSH connection delivering SIGHUP is the usual case.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::Instrument;

pub struct SignalAbsorber {
    absorbed: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl SignalAbsorber {
    /// Register the handlers and start absorbing.
    ///
    /// Registration happens before this returns, so signals delivered after
    /// `install` can no longer kill the process.
    pub fn install() -> std::io::Result<SignalAbsorber> {
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sighup = signal(SignalKind::hangup())?;

        let absorbed = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&absorbed);

        let handle = tokio::spawn(async move {
            loop {
                let name = tokio::select! {
                    Some(()) = sigint.recv() => "SIGINT",
                    Some(()) = sigterm.recv() => "SIGTERM",
                    Some(()) = sighup.recv() => "SIGHUP",
                    else => break,
                };
                let total = counter.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::warn!(signal = name, total, "received signal, ignoring");
            }
        }
        .instrument(tracing::Span::current()));

        Ok(SignalAbsorber { absorbed, handle })
    }

    /// Number of signals absorbed so far.
    pub fn absorbed(&self) -> u64 {
        self.absorbed.load(Ordering::SeqCst)
    }

    /// Stop listening. The handlers stay registered with the runtime, so
    /// later signals are still swallowed, just no longer logged.
    pub fn stop(self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::{kill, Signal as NixSignal};
    use nix::unistd::Pid;
    use std::time::Duration;

    #[tokio::test]
    async fn test_absorbs_interrupt_hangup_and_terminate() {
        let absorber = SignalAbsorber::install().unwrap();

        kill(Pid::this(), NixSignal::SIGINT).unwrap();
        wait_for(&absorber, 1).await;
        kill(Pid::this(), NixSignal::SIGHUP).unwrap();
        wait_for(&absorber, 2).await;
        kill(Pid::this(), NixSignal::SIGTERM).unwrap();
        wait_for(&absorber, 3).await;

        // Still alive to make this assertion.
        assert!(absorber.absorbed() >= 3);
        absorber.stop();
    }

    async fn wait_for(absorber: &SignalAbsorber, n: u64) {
        for _ in 0..200 {
            if absorber.absorbed() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("absorbed {} signals, expected {}", absorber.absorbed(), n);
    }
}
