use std::io::{self, BufRead};
use std::sync::Arc;

use chrono::Local;
use clap::Args;
use courtbook_core::{
    ChromiumLauncher, CourtbookConfig, LaunchOverrides, ReservationRequest, RunController,
    RunReport, StatusSink,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Arguments for one interactive booking run.
#[derive(Args, Debug, Clone)]
pub struct BookArgs {
    /// Court type (badminton | tennis)
    #[arg(long)]
    pub kind: String,
    /// Court name exactly as listed by `courts`, e.g. 2号场
    #[arg(long)]
    pub court: String,
    /// Booking date as MM/DD
    #[arg(long)]
    pub date: String,
    /// Time slot (HH:MM); repeat for several, processed in the given order
    #[arg(long = "time", required = true, value_name = "HH:MM")]
    pub times: Vec<String>,
    /// Daily trigger instant (HH:MM:SS)
    #[arg(long, default_value = "08:00:00")]
    pub trigger: String,
    /// Continue after the login grace period without waiting for `ok`
    #[arg(long)]
    pub auto_login: bool,
    /// Run Chromium headless (login must then already be cached in the profile)
    #[arg(long)]
    pub headless: bool,
}

impl BookArgs {
    pub fn request(&self) -> Result<ReservationRequest> {
        Ok(ReservationRequest::parse(
            &self.kind,
            &self.court,
            &self.date,
            &self.times,
            &self.trigger,
        )?)
    }
}

/// Prints status lines with a wall-clock prefix.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleSink {
    to_stderr: bool,
}

impl ConsoleSink {
    /// JSON output keeps stdout for the final report only.
    pub fn new(to_stderr: bool) -> Self {
        Self { to_stderr }
    }
}

impl StatusSink for ConsoleSink {
    fn report(&self, message: &str) {
        let line = format_status_line(Local::now().format("%H:%M:%S"), message);
        if self.to_stderr {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }
}

pub fn format_status_line(at: impl std::fmt::Display, message: &str) -> String {
    format!("[{at}] {message}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorInput {
    ConfirmLogin,
    Cancel,
}

pub fn parse_operator_input(line: &str) -> Option<OperatorInput> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "ok" | "y" | "yes" => Some(OperatorInput::ConfirmLogin),
        "q" | "quit" | "cancel" => Some(OperatorInput::Cancel),
        _ => None,
    }
}

pub fn book(config: CourtbookConfig, args: &BookArgs, quiet_stdout: bool) -> Result<RunReport> {
    let request = args.request()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(drive(config, args, request, quiet_stdout))
}

async fn drive(
    config: CourtbookConfig,
    args: &BookArgs,
    request: ReservationRequest,
    quiet_stdout: bool,
) -> Result<RunReport> {
    let overrides = LaunchOverrides {
        headless: args.headless.then_some(true),
    };
    let launcher = ChromiumLauncher::new(config.browser.clone()).with_overrides(overrides);
    let sink = ConsoleSink::new(quiet_stdout);
    let controller = RunController::new(Arc::new(launcher), Arc::new(sink), Arc::new(config));

    let run_id = controller.start(request, args.auto_login)?;
    debug!(%run_id, "run started");
    sink.report("type `ok` (or press Enter) once logged in; `q` cancels");

    let mut input = spawn_stdin_reader();
    let mut stdin_open = true;
    let mut interrupted = false;
    let done = controller.wait();
    tokio::pin!(done);

    let report = loop {
        tokio::select! {
            report = &mut done => break report,
            line = input.recv(), if stdin_open => match line {
                Some(line) => match parse_operator_input(&line) {
                    Some(OperatorInput::ConfirmLogin) => {
                        if !controller.confirm_login() {
                            sink.report("no login is pending");
                        }
                    }
                    Some(OperatorInput::Cancel) => {
                        controller.cancel();
                    }
                    None => sink.report("unrecognized input; use `ok` or `q`"),
                },
                None => stdin_open = false,
            },
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                match signal {
                    Ok(()) => {
                        sink.report("interrupt received; cancelling");
                        controller.cancel();
                    }
                    Err(err) => warn!(error = %err, "could not listen for ctrl-c"),
                }
            }
        }
    };

    report.ok_or_else(|| AppError::MissingResource("booking run ended without a report".into()))
}

fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}
