//! Run orchestration: the trigger scheduler, the booking step machine and the
//! controller that owns one background worker per run.

mod controller;
mod machine;
mod signal;
mod state;
mod status;
mod trigger;

pub use controller::{ControllerError, ControllerResult, RunController};
pub use machine::{BookingMachine, LoginMode};
pub use signal::{CancelSignal, LoginGate};
pub use state::{BookingStep, RunReport, RunState};
pub use status::{MemorySink, RunEvent, StatusReporter, StatusSink};
pub use trigger::{Clock, FixedClock, SystemClock, TriggerPlan, TriggerScheduler};
