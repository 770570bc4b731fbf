use std::fmt;

use serde::Serialize;

use super::request::TimeLabel;

/// What happened to one requested time slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotOutcome {
    Selected,
    /// Slot disabled on the page (already booked or closed).
    Unavailable,
    /// Click issued but the page never showed it as selected.
    UncertainClick,
}

impl fmt::Display for SlotOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SlotOutcome::Selected => "selected",
            SlotOutcome::Unavailable => "unavailable",
            SlotOutcome::UncertainClick => "uncertain click",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotReport {
    pub time: TimeLabel,
    pub outcome: SlotOutcome,
}

impl SlotReport {
    pub fn new(time: TimeLabel, outcome: SlotOutcome) -> Self {
        Self { time, outcome }
    }
}

impl fmt::Display for SlotReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.time, self.outcome)
    }
}
