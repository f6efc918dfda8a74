//! Cooperative cancellation token shared by workers, the coordinator and steps.

use tokio::sync::watch;

/// Sending side of a shutdown signal.
///
/// Dropping the handle does not trigger shutdown; call [`ShutdownHandle::shutdown`].
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Creates a handle and its associated token.
    pub fn new() -> (Self, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, Shutdown { rx })
    }

    /// Signals all tokens to stop. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiving side of a shutdown signal.
///
/// Cheap to clone; every long-running task and every saga step holds one and
/// polls it at suspension points. Once triggered the token stays cancelled.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Returns a token that is never cancelled. Useful in tests.
    pub fn never() -> Self {
        // One process-wide channel whose sender never sends and never drops.
        static NEVER: std::sync::LazyLock<(watch::Sender<bool>, watch::Receiver<bool>)> =
            std::sync::LazyLock::new(|| watch::channel(false));
        Self {
            rx: NEVER.1.clone(),
        }
    }

    /// Returns true once shutdown has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits until shutdown is requested.
    pub async fn cancelled(&mut self) {
        // A closed channel means the handle is gone; treat that as shutdown.
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}
