/// One-shot notification from the launcher to the heartbeat that the child is done.
///
/// Exactly one producer and one consumer. The producer fires at most once
/// (enforced by `fire(self)`); dropping it unfired also releases the consumer.
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

/// Producer half, owned by the launcher.
#[derive(Debug)]
pub struct CompletionSender {
    tx: oneshot::Sender<()>,
}

/// Consumer half, owned by the heartbeat.
#[derive(Debug)]
pub struct CompletionWatch {
    rx: oneshot::Receiver<()>,
    fired: bool,
}

/// Create a linked producer/consumer pair.
pub fn channel() -> (CompletionSender, CompletionWatch) {
    let (tx, rx) = oneshot::channel();
    (CompletionSender { tx }, CompletionWatch { rx, fired: false })
}

impl CompletionSender {
    /// Signal completion. Consumes the sender so it cannot fire twice.
    pub fn fire(self) {
        // The watch may already be gone if the heartbeat bailed out early.
        let _ = self.tx.send(());
    }
}

impl CompletionWatch {
    /// Non-blocking check.
    pub fn has_fired(&mut self) -> bool {
        if self.fired {
            return true;
        }
        match self.rx.try_recv() {
            Ok(()) | Err(TryRecvError::Closed) => {
                self.fired = true;
                true
            }
            Err(TryRecvError::Empty) => false,
        }
    }

    /// Wait until the producer fires or is dropped.
    pub async fn wait(&mut self) {
        if self.fired {
            return;
        }
        let _ = (&mut self.rx).await;
        self.fired = true;
    }
}
