use std::sync::{Arc, Mutex};

use chrono::Local;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use crate::browser::{AdapterFactory, AutomationAdapter};
use crate::config::CourtbookConfig;
use crate::reservation::{BookingError, BookingResult, ReservationRequest, SlotReport};

use super::machine::{BookingMachine, LoginMode};
use super::signal::{CancelSignal, LoginGate};
use super::state::{RunReport, RunState};
use super::status::{RunEvent, StatusReporter, StatusSink};
use super::trigger::TriggerScheduler;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("a booking run is already active ({0})")]
    AlreadyRunning(Uuid),
    #[error("no tokio runtime available to host the booking worker")]
    NoRuntime,
}

pub type ControllerResult<T> = std::result::Result<T, ControllerError>;

struct ActiveRun {
    run_id: Uuid,
    gate: LoginGate,
    cancel: CancelSignal,
    done: watch::Receiver<Option<RunReport>>,
}

struct ControllerState {
    state: RunState,
    /// Set once the worker is actually waiting at the login gate.
    login_pending: bool,
    outcomes: Vec<SlotReport>,
    active: Option<ActiveRun>,
    last_report: Option<RunReport>,
}

/// Foreground owner of booking runs: at most one worker at a time, with
/// login confirmation and cancellation forwarded to it.
pub struct RunController {
    factory: Arc<dyn AdapterFactory>,
    sink: Arc<dyn StatusSink>,
    config: Arc<CourtbookConfig>,
    scheduler: TriggerScheduler,
    shared: Arc<Mutex<ControllerState>>,
}

impl std::fmt::Debug for RunController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.lock().unwrap();
        f.debug_struct("RunController")
            .field("state", &shared.state)
            .field("active", &shared.active.as_ref().map(|run| run.run_id))
            .finish_non_exhaustive()
    }
}

impl RunController {
    pub fn new(
        factory: Arc<dyn AdapterFactory>,
        sink: Arc<dyn StatusSink>,
        config: Arc<CourtbookConfig>,
    ) -> Self {
        Self {
            factory,
            sink,
            config,
            scheduler: TriggerScheduler::default(),
            shared: Arc::new(Mutex::new(ControllerState {
                state: RunState::Idle,
                login_pending: false,
                outcomes: Vec::new(),
                active: None,
                last_report: None,
            })),
        }
    }

    pub fn with_scheduler(mut self, scheduler: TriggerScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Spawns the worker for `request` and returns at once. Must be called
    /// from within a tokio runtime.
    pub fn start(
        &self,
        request: ReservationRequest,
        resume_login_automatically: bool,
    ) -> ControllerResult<Uuid> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| ControllerError::NoRuntime)?;

        let mut shared = self.shared.lock().unwrap();
        if let Some(active) = &shared.active {
            return Err(ControllerError::AlreadyRunning(active.run_id));
        }

        let run_id = Uuid::new_v4();
        let gate = LoginGate::new();
        let cancel = CancelSignal::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = watch::channel(None);

        shared.state = RunState::AwaitingLogin;
        shared.login_pending = false;
        shared.outcomes.clear();
        shared.active = Some(ActiveRun {
            run_id,
            gate: gate.clone(),
            cancel: cancel.clone(),
            done: done_rx,
        });
        drop(shared);

        let login = if resume_login_automatically {
            LoginMode::Automatic {
                grace: self.config.timing.auto_login_grace(),
            }
        } else {
            LoginMode::Manual
        };
        let status = StatusReporter::new(run_id, tx);
        let machine = BookingMachine::new(
            request.clone(),
            self.config.timing.clone(),
            self.config.selectors.clone(),
            self.scheduler.clone(),
            gate,
            cancel.clone(),
            status.clone(),
            login,
        );
        info!(%run_id, kind = %request.kind(), court = request.court(), "starting booking run");

        runtime.spawn(relay(
            Arc::clone(&self.shared),
            Arc::clone(&self.sink),
            rx,
            done_tx,
        ));
        runtime.spawn(drive(Worker {
            factory: Arc::clone(&self.factory),
            config: Arc::clone(&self.config),
            request,
            machine,
            cancel,
            status,
        }));
        Ok(run_id)
    }

    /// Releases the login gate of the active run. Returns false when there
    /// is nothing to confirm, including while the browser is still opening.
    pub fn confirm_login(&self) -> bool {
        let shared = self.shared.lock().unwrap();
        match &shared.active {
            Some(active) if shared.login_pending => active.gate.release(),
            _ => false,
        }
    }

    /// Requests cancellation of the active run. The worker stops at its next
    /// step boundary or wakes from whatever wait it is blocked in.
    pub fn cancel(&self) -> bool {
        let shared = self.shared.lock().unwrap();
        match &shared.active {
            Some(active) => {
                let first = active.cancel.cancel();
                active.gate.release();
                if first {
                    info!(run_id = %active.run_id, "cancellation requested");
                }
                first
            }
            None => false,
        }
    }

    pub fn state(&self) -> RunState {
        self.shared.lock().unwrap().state
    }

    pub fn outcomes(&self) -> Vec<SlotReport> {
        self.shared.lock().unwrap().outcomes.clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().unwrap().active.is_some()
    }

    pub fn active_run(&self) -> Option<Uuid> {
        self.shared
            .lock()
            .unwrap()
            .active
            .as_ref()
            .map(|run| run.run_id)
    }

    pub fn last_report(&self) -> Option<RunReport> {
        self.shared.lock().unwrap().last_report.clone()
    }

    /// Resolves once the active run has finished and its report is visible
    /// through the accessors. Without an active run, returns the last report.
    pub async fn wait(&self) -> Option<RunReport> {
        let mut done = {
            let shared = self.shared.lock().unwrap();
            match &shared.active {
                Some(active) => active.done.clone(),
                None => return shared.last_report.clone(),
            }
        };
        let finished = match done.wait_for(|report| report.is_some()).await {
            Ok(report) => report.clone(),
            Err(_) => None,
        };
        finished.or_else(|| self.last_report())
    }
}

async fn relay(
    shared: Arc<Mutex<ControllerState>>,
    sink: Arc<dyn StatusSink>,
    mut rx: mpsc::UnboundedReceiver<RunEvent>,
    done: watch::Sender<Option<RunReport>>,
) {
    let mut report = None;
    while let Some(event) = rx.recv().await {
        match event {
            RunEvent::Status(message) => sink.report(&message),
            RunEvent::State(state) => {
                let mut shared = shared.lock().unwrap();
                shared.state = state;
                if state != RunState::AwaitingLogin {
                    shared.login_pending = false;
                }
            }
            RunEvent::LoginPending => shared.lock().unwrap().login_pending = true,
            RunEvent::Slot(slot) => shared.lock().unwrap().outcomes.push(slot),
            RunEvent::Finished(finished) => report = Some(*finished),
        }
    }

    {
        let mut shared = shared.lock().unwrap();
        match &report {
            Some(report) => {
                shared.state = report.state;
                shared.outcomes = report.outcomes.clone();
                shared.last_report = Some(report.clone());
            }
            None => {
                warn!("booking worker ended without a report");
                shared.state = RunState::Failed;
            }
        }
        shared.login_pending = false;
        shared.active = None;
    }
    if report.is_none() {
        sink.report("booking run ended unexpectedly");
    }
    done.send_replace(report);
}

struct Worker {
    factory: Arc<dyn AdapterFactory>,
    config: Arc<CourtbookConfig>,
    request: ReservationRequest,
    machine: BookingMachine,
    cancel: CancelSignal,
    status: StatusReporter,
}

async fn drive(worker: Worker) {
    let Worker {
        factory,
        config,
        request,
        mut machine,
        cancel,
        status,
    } = worker;
    let started_at = Local::now();
    for line in request.summary_lines() {
        status.report(line);
    }

    let result = match factory.open().await {
        Ok(mut adapter) => {
            let result = machine.run(adapter.as_mut()).await;
            release(adapter.as_mut(), &config, &cancel, &status).await;
            result
        }
        Err(err) => Err(BookingError::Navigation(format!(
            "could not open the booking browser: {err}"
        ))),
    };
    let outcomes = machine.into_outcomes();

    let state = final_state(&result);
    match &result {
        Ok(()) => status.report(format!(
            "booking run completed: order submitted for {} slot(s)",
            outcomes.len()
        )),
        Err(BookingError::Cancelled) => status.report("booking run cancelled"),
        Err(err) => {
            warn!(run_id = %status.run_id(), error = %err, "booking run failed");
            status.report(format!("booking run failed: {err}"));
        }
    }
    status.transition(state);
    status.finish(RunReport {
        run_id: status.run_id(),
        request,
        state,
        outcomes,
        error: result.err(),
        started_at,
        finished_at: Local::now(),
    });
}

fn final_state(result: &BookingResult<()>) -> RunState {
    match result {
        Ok(()) => RunState::Completed,
        Err(err) if err.is_cancellation() => RunState::Cancelled,
        Err(_) => RunState::Failed,
    }
}

/// Keeps the page up briefly so the operator can see where the run ended,
/// then closes the session. Cancellation skips the delay.
async fn release(
    adapter: &mut dyn AutomationAdapter,
    config: &CourtbookConfig,
    cancel: &CancelSignal,
    status: &StatusReporter,
) {
    if !cancel.is_cancelled() {
        let delay = config.timing.release_delay();
        status.report(format!("closing browser in {}s", delay.as_secs()));
        tokio::select! {
            _ = sleep(delay) => {}
            _ = cancel.cancelled() => {}
        }
    }
    if let Err(err) = adapter.close().await {
        warn!(error = %err, "failed to close browser session");
    }
    status.report("browser closed");
}
