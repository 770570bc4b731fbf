pub mod browser;
pub mod config;
pub mod engine;
pub mod error;
pub mod reservation;

pub use browser::{
    AdapterError, AdapterFactory, AdapterResult, AutomationAdapter, ChromiumLauncher,
    ChromiumSession, ElementRef, LaunchOverrides, Selector,
};
pub use config::{
    load_courtbook_config, BrowserSection, CourtbookConfig, SelectorSection, TimingSection,
};
pub use engine::{
    BookingMachine, BookingStep, CancelSignal, Clock, ControllerError, ControllerResult,
    FixedClock, LoginGate, LoginMode, MemorySink, RunController, RunEvent, RunReport, RunState,
    StatusReporter, StatusSink, SystemClock, TriggerPlan, TriggerScheduler,
};
pub use error::{ConfigError, Result};
pub use reservation::{
    BookingError, BookingResult, MonthDay, ReservationRequest, ResourceKind, SlotOutcome,
    SlotReport, TimeLabel, TriggerTime,
};
