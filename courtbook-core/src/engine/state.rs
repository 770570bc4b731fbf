use std::fmt;

use chrono::{DateTime, Local};
use serde::Serialize;
use uuid::Uuid;

use crate::reservation::{BookingError, ReservationRequest, SlotOutcome, SlotReport};

/// Lifecycle of a run as seen from the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    AwaitingLogin,
    Waiting,
    Selecting,
    Submitting,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunState::Idle => "idle",
            RunState::AwaitingLogin => "awaiting login",
            RunState::Waiting => "waiting for trigger",
            RunState::Selecting => "selecting",
            RunState::Submitting => "submitting",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Booking steps in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStep {
    OpenView,
    AwaitLogin,
    WaitForTrigger,
    SelectDate,
    LocateResource,
    SelectTimeSlots,
    Submit,
}

impl BookingStep {
    pub fn run_state(self) -> RunState {
        match self {
            BookingStep::OpenView | BookingStep::AwaitLogin => RunState::AwaitingLogin,
            BookingStep::WaitForTrigger => RunState::Waiting,
            BookingStep::SelectDate
            | BookingStep::LocateResource
            | BookingStep::SelectTimeSlots => RunState::Selecting,
            BookingStep::Submit => RunState::Submitting,
        }
    }
}

impl fmt::Display for BookingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BookingStep::OpenView => "open view",
            BookingStep::AwaitLogin => "await login",
            BookingStep::WaitForTrigger => "wait for trigger",
            BookingStep::SelectDate => "select date",
            BookingStep::LocateResource => "locate court",
            BookingStep::SelectTimeSlots => "select time slots",
            BookingStep::Submit => "submit",
        };
        f.write_str(label)
    }
}

/// Final record of one run, readable from the foreground once the worker
/// has finished.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub request: ReservationRequest,
    pub state: RunState,
    pub outcomes: Vec<SlotReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BookingError>,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }

    pub fn selected(&self) -> impl Iterator<Item = &SlotReport> {
        self.outcomes
            .iter()
            .filter(|report| report.outcome == SlotOutcome::Selected)
    }
}
