use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::reservation::SlotReport;

use super::state::{RunReport, RunState};

/// Receiver of human-readable progress lines. Called from the controller's
/// relay task; implementations must be thread-safe.
pub trait StatusSink: Send + Sync {
    fn report(&self, message: &str);
}

impl<F> StatusSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn report(&self, message: &str) {
        self(message)
    }
}

/// Keeps every message in memory, in delivery order.
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .any(|message| message.contains(needle))
    }
}

impl StatusSink for MemorySink {
    fn report(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// Everything a worker tells its controller, in one ordered stream.
#[derive(Debug, Clone)]
pub enum RunEvent {
    Status(String),
    State(RunState),
    /// The worker is parked at the login gate; confirmations count from now on.
    LoginPending,
    Slot(SlotReport),
    Finished(Box<RunReport>),
}

/// Worker-side handle onto the run's event channel.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    run_id: Uuid,
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl StatusReporter {
    pub fn new(run_id: Uuid, tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self { run_id, tx }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn report(&self, message: impl Into<String>) {
        let message = message.into();
        info!(run_id = %self.run_id, "{message}");
        self.send(RunEvent::Status(message));
    }

    pub fn transition(&self, state: RunState) {
        self.send(RunEvent::State(state));
    }

    pub fn login_pending(&self) {
        self.send(RunEvent::LoginPending);
    }

    pub fn slot(&self, report: SlotReport) {
        self.send(RunEvent::Slot(report));
    }

    pub fn finish(&self, report: RunReport) {
        self.send(RunEvent::Finished(Box::new(report)));
    }

    fn send(&self, event: RunEvent) {
        // A closed channel means the controller is gone; the run still
        // finishes and releases its view.
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reporter_preserves_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = StatusReporter::new(Uuid::new_v4(), tx);
        reporter.report("first");
        reporter.transition(RunState::Waiting);
        reporter.report("second");
        assert!(matches!(rx.try_recv(), Ok(RunEvent::Status(m)) if m == "first"));
        assert!(matches!(rx.try_recv(), Ok(RunEvent::State(RunState::Waiting))));
        assert!(matches!(rx.try_recv(), Ok(RunEvent::Status(m)) if m == "second"));
    }

    #[test]
    fn closures_are_sinks() {
        let seen = Mutex::new(Vec::new());
        let sink = |message: &str| seen.lock().unwrap().push(message.to_string());
        sink.report("hello");
        assert_eq!(*seen.lock().unwrap(), vec!["hello".to_string()]);
    }
}
