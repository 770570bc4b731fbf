use std::sync::Arc;

use tokio::sync::watch;

/// One-way flag with an async wait. Once set it never resets.
#[derive(Debug, Clone)]
struct Latch {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Latch {
    fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Returns true only for the call that actually set the flag.
    fn set(&self) -> bool {
        let mut first = false;
        self.tx.send_if_modified(|value| {
            if *value {
                false
            } else {
                *value = true;
                first = true;
                true
            }
        });
        first
    }

    fn is_set(&self) -> bool {
        *self.rx.borrow()
    }

    async fn wait(&self) {
        let mut rx = self.rx.clone();
        let closed = rx.wait_for(|value| *value).await.is_err();
        if closed {
            // The sender lives inside `self`, so this only happens during teardown.
            std::future::pending::<()>().await;
        }
    }
}

/// Cancellation request for one run. Observed at step boundaries and during
/// the trigger wait.
#[derive(Debug, Clone)]
pub struct CancelSignal(Latch);

impl CancelSignal {
    pub fn new() -> Self {
        Self(Latch::new())
    }

    pub fn cancel(&self) -> bool {
        self.0.set()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_set()
    }

    pub async fn cancelled(&self) {
        self.0.wait().await
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-use rendezvous between the operator ("I have logged in") and the
/// worker blocked in the login step.
#[derive(Debug, Clone)]
pub struct LoginGate(Latch);

impl LoginGate {
    pub fn new() -> Self {
        Self(Latch::new())
    }

    /// Opens the gate. Later calls are no-ops and return false.
    pub fn release(&self) -> bool {
        self.0.set()
    }

    pub fn is_released(&self) -> bool {
        self.0.is_set()
    }

    pub async fn wait(&self) {
        self.0.wait().await
    }
}

impl Default for LoginGate {
    fn default() -> Self {
        Self::new()
    }
}
