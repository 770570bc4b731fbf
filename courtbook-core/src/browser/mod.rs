mod adapter;
mod chromium;
mod error;

pub use adapter::{AdapterFactory, AutomationAdapter, ElementRef, Selector};
pub use chromium::{ChromiumLauncher, ChromiumSession, LaunchOverrides};
pub use error::{AdapterError, AdapterResult};
