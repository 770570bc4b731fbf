use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CourtbookConfig {
    pub browser: BrowserSection,
    pub timing: TimingSection,
    pub selectors: SelectorSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    /// Chromium binary; autodetected by chromiumoxide when unset.
    pub executable_path: Option<String>,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    /// Persistent profile so a login survives between runs.
    pub user_data_dir: Option<String>,
    pub window_size: [u32; 2],
    pub request_timeout_seconds: Option<u64>,
    pub poll_interval_ms: u64,
    pub lang: Option<String>,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            executable_path: None,
            headless: false,
            sandbox: true,
            disable_gpu: false,
            user_data_dir: None,
            window_size: [1366, 900],
            request_timeout_seconds: None,
            poll_interval_ms: 200,
            lang: None,
        }
    }
}

impl BrowserSection {
    pub fn user_data_dir(&self) -> Option<PathBuf> {
        self.user_data_dir.as_ref().map(PathBuf::from)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingSection {
    pub date_timeout_seconds: u64,
    pub agreement_timeout_seconds: u64,
    pub submit_timeout_seconds: u64,
    pub submission_ack_seconds: u64,
    pub release_delay_seconds: u64,
    pub auto_login_grace_seconds: u64,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            date_timeout_seconds: 10,
            agreement_timeout_seconds: 10,
            submit_timeout_seconds: 10,
            submission_ack_seconds: 5,
            release_delay_seconds: 3,
            auto_login_grace_seconds: 30,
        }
    }
}

impl TimingSection {
    pub fn date_timeout(&self) -> Duration {
        Duration::from_secs(self.date_timeout_seconds)
    }

    pub fn agreement_timeout(&self) -> Duration {
        Duration::from_secs(self.agreement_timeout_seconds)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_seconds)
    }

    pub fn submission_ack(&self) -> Duration {
        Duration::from_secs(self.submission_ack_seconds)
    }

    pub fn release_delay(&self) -> Duration {
        Duration::from_secs(self.release_delay_seconds)
    }

    pub fn auto_login_grace(&self) -> Duration {
        Duration::from_secs(self.auto_login_grace_seconds)
    }
}

/// Page vocabulary used by the booking steps. Every selector is CSS; text
/// matching is layered on top by the step that needs it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorSection {
    pub date_option: String,
    pub court_container: String,
    pub court_name: String,
    pub time_axis_label: String,
    pub slot_cell: String,
    pub disabled_class: String,
    pub checked_class: String,
    pub confirmed_icon: String,
    pub agreement_input: String,
    pub agreement_label: String,
    pub submit_button: String,
    pub submit_text: String,
}

impl Default for SelectorSection {
    fn default() -> Self {
        Self {
            date_option: "div, span, li, p, a".into(),
            court_container: ".field-box".into(),
            court_name: ".item-name".into(),
            time_axis_label: "div.time-line > div.item".into(),
            slot_cell: ".item".into(),
            disabled_class: "disabled".into(),
            checked_class: "checked".into(),
            confirmed_icon: ".iconzhengque".into(),
            agreement_input: "label.el-checkbox input[type=\"checkbox\"]".into(),
            agreement_label: "label.el-checkbox".into(),
            submit_button: "button.btn-primary".into(),
            submit_text: "提交订单".into(),
        }
    }
}

pub fn load_courtbook_config<P: AsRef<Path>>(path: P) -> Result<CourtbookConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
