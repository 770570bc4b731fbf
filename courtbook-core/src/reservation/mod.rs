mod error;
mod outcome;
mod request;

pub use error::{BookingError, BookingResult};
pub use outcome::{SlotOutcome, SlotReport};
pub use request::{MonthDay, ReservationRequest, ResourceKind, TimeLabel, TriggerTime};
