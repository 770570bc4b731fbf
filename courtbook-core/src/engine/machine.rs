use std::collections::HashMap;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::browser::{AdapterError, AutomationAdapter, ElementRef, Selector};
use crate::config::{SelectorSection, TimingSection};
use crate::reservation::{
    BookingError, BookingResult, ReservationRequest, SlotOutcome, SlotReport, TimeLabel,
};

use super::signal::{CancelSignal, LoginGate};
use super::state::BookingStep;
use super::status::StatusReporter;
use super::trigger::TriggerScheduler;

/// How the login step is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    /// Block until the operator confirms.
    Manual,
    /// Continue on its own after the grace period unless confirmed sooner.
    Automatic { grace: Duration },
}

/// Drives one booking attempt through the fixed step sequence. Steps never
/// go back; any error ends the run.
pub struct BookingMachine {
    request: ReservationRequest,
    timing: TimingSection,
    selectors: SelectorSection,
    scheduler: TriggerScheduler,
    gate: LoginGate,
    cancel: CancelSignal,
    status: StatusReporter,
    login: LoginMode,
    outcomes: Vec<SlotReport>,
}

impl BookingMachine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        request: ReservationRequest,
        timing: TimingSection,
        selectors: SelectorSection,
        scheduler: TriggerScheduler,
        gate: LoginGate,
        cancel: CancelSignal,
        status: StatusReporter,
        login: LoginMode,
    ) -> Self {
        Self {
            request,
            timing,
            selectors,
            scheduler,
            gate,
            cancel,
            status,
            login,
            outcomes: Vec::new(),
        }
    }

    pub fn outcomes(&self) -> &[SlotReport] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<SlotReport> {
        self.outcomes
    }

    pub async fn run(&mut self, adapter: &mut dyn AutomationAdapter) -> BookingResult<()> {
        self.open_view(adapter).await?;
        self.await_login().await?;
        self.wait_for_trigger(adapter).await?;
        self.select_date(adapter).await?;
        let court = self.locate_court(adapter).await?;
        self.select_time_slots(adapter, court).await?;
        self.submit(adapter).await?;
        Ok(())
    }

    fn enter(&self, step: BookingStep) -> BookingResult<()> {
        if self.cancel.is_cancelled() {
            self.status
                .report(format!("cancellation observed before step `{step}`"));
            return Err(BookingError::Cancelled);
        }
        debug!(run_id = %self.status.run_id(), %step, "entering step");
        self.status.transition(step.run_state());
        Ok(())
    }

    async fn open_view(&mut self, adapter: &mut dyn AutomationAdapter) -> BookingResult<()> {
        self.enter(BookingStep::OpenView)?;
        let kind = self.request.kind();
        let url = kind.endpoint();
        self.status
            .report(format!("opening {} booking page {url}", kind.display_name()));
        adapter
            .navigate(url)
            .await
            .map_err(|err| BookingError::Navigation(err.to_string()))?;
        self.status.report("booking page opened");
        Ok(())
    }

    async fn await_login(&mut self) -> BookingResult<()> {
        self.enter(BookingStep::AwaitLogin)?;
        self.status.login_pending();
        match self.login {
            LoginMode::Manual => {
                self.status
                    .report("waiting for login; log in inside the browser, then confirm");
                self.gate.wait().await;
            }
            LoginMode::Automatic { grace } => {
                self.status.report(format!(
                    "waiting {}s for login before continuing automatically",
                    grace.as_secs()
                ));
                tokio::select! {
                    _ = self.gate.wait() => {}
                    _ = sleep(grace) => {
                        self.gate.release();
                    }
                }
            }
        }
        if self.cancel.is_cancelled() {
            self.status.report("cancellation requested while waiting for login");
            return Err(BookingError::Cancelled);
        }
        self.status.report("login confirmed; continuing");
        Ok(())
    }

    async fn wait_for_trigger(&mut self, adapter: &mut dyn AutomationAdapter) -> BookingResult<()> {
        self.enter(BookingStep::WaitForTrigger)?;
        self.scheduler
            .wait(self.request.trigger(), &self.cancel, &self.status)
            .await?;
        adapter.reload().await?;
        self.status.report("trigger time reached; page reloaded");
        Ok(())
    }

    async fn select_date(&mut self, adapter: &mut dyn AutomationAdapter) -> BookingResult<()> {
        self.enter(BookingStep::SelectDate)?;
        let label = self.request.date().to_string();
        self.status.report(format!("selecting date {label}"));
        let selector = Selector::exact_text(&self.selectors.date_option, &label);
        let timeout = self.timing.date_timeout();
        let element = adapter
            .wait_until_clickable(&selector, timeout)
            .await
            .map_err(|err| match err {
                AdapterError::NotFound(_) | AdapterError::Timeout(_) => {
                    BookingError::ElementNotFound(format!(
                        "date {label} not clickable within {}s",
                        timeout.as_secs()
                    ))
                }
                other => other.into(),
            })?;
        adapter.click(element).await?;
        self.status.report(format!("selected date {label}"));
        Ok(())
    }

    /// First container (page order) whose displayed name contains the
    /// requested court name.
    async fn locate_court(&mut self, adapter: &mut dyn AutomationAdapter) -> BookingResult<ElementRef> {
        self.enter(BookingStep::LocateResource)?;
        let wanted = self.request.court().to_string();
        self.status.report(format!("looking for court {wanted}"));
        let containers = adapter
            .find_all(&Selector::css(&self.selectors.court_container), None)
            .await?;
        let name_selector = Selector::css(&self.selectors.court_name);
        for container in containers {
            let name = match adapter.find_first(&name_selector, Some(container)).await {
                Ok(element) => adapter.text(element).await?,
                Err(AdapterError::NotFound(_)) => continue,
                Err(err) => return Err(err.into()),
            };
            if name.contains(&wanted) {
                self.status.report(format!("found court: {name}"));
                return Ok(container);
            }
        }
        Err(BookingError::ElementNotFound(format!("court not found: {wanted}")))
    }

    async fn select_time_slots(
        &mut self,
        adapter: &mut dyn AutomationAdapter,
        court: ElementRef,
    ) -> BookingResult<()> {
        self.enter(BookingStep::SelectTimeSlots)?;
        self.status.report(format!(
            "selecting {} time slot(s) at {}",
            self.request.times().len(),
            self.request.court()
        ));
        let index = self.scan_time_axis(adapter).await?;

        // Every label must resolve before the first slot is touched.
        if let Some(missing) = self
            .request
            .times()
            .iter()
            .find(|time| !index.contains_key(&time.to_string()))
        {
            return Err(BookingError::Configuration(format!(
                "time {missing} is not on the page's time axis"
            )));
        }

        let times = self.request.times().to_vec();
        for time in times {
            let column = index[&time.to_string()];
            self.status
                .report(format!("processing time slot {time} (column {column})"));
            let outcome = self.select_slot(adapter, court, time, column).await?;
            let report = SlotReport::new(time, outcome);
            match outcome {
                SlotOutcome::Selected => self
                    .status
                    .report(format!("selected {time} at {}", self.request.court())),
                SlotOutcome::Unavailable => self
                    .status
                    .report(format!("{time} is unavailable (already booked); skipping")),
                SlotOutcome::UncertainClick => self.status.report(format!(
                    "{time} was clicked but selection could not be confirmed; continuing"
                )),
            }
            self.status.slot(report.clone());
            self.outcomes.push(report);
        }

        let selected = self
            .outcomes
            .iter()
            .filter(|report| report.outcome == SlotOutcome::Selected)
            .count();
        self.status.report(format!(
            "time slot selection finished: {selected} of {} confirmed",
            self.outcomes.len()
        ));
        Ok(())
    }

    async fn scan_time_axis(
        &mut self,
        adapter: &mut dyn AutomationAdapter,
    ) -> BookingResult<HashMap<String, usize>> {
        let labels = adapter
            .find_all(&Selector::css(&self.selectors.time_axis_label), None)
            .await?;
        let mut index = HashMap::with_capacity(labels.len());
        let mut ordered = Vec::with_capacity(labels.len());
        for (position, element) in labels.into_iter().enumerate() {
            let text = adapter.text(element).await?.trim().to_string();
            ordered.push(format!("{text}={position}"));
            index.insert(text, position);
        }
        self.status
            .report(format!("time axis: {}", ordered.join(", ")));
        Ok(index)
    }

    async fn select_slot(
        &mut self,
        adapter: &mut dyn AutomationAdapter,
        court: ElementRef,
        time: TimeLabel,
        column: usize,
    ) -> BookingResult<SlotOutcome> {
        let cells = adapter
            .find_all(&Selector::css(&self.selectors.slot_cell), Some(court))
            .await?;
        let cell = cells.get(column).copied().ok_or_else(|| {
            BookingError::ElementNotFound(format!(
                "slot {time} (column {column}) missing from court row with {} cells",
                cells.len()
            ))
        })?;

        let class = adapter.attribute(cell, "class").await?;
        if has_class(class.as_deref(), &self.selectors.disabled_class) {
            return Ok(SlotOutcome::Unavailable);
        }

        adapter.scroll_into_view(cell).await?;
        adapter.click(cell).await?;

        match self.confirm_selection(adapter, cell).await {
            Ok(true) => Ok(SlotOutcome::Selected),
            Ok(false) => Ok(SlotOutcome::UncertainClick),
            Err(err) => {
                warn!(%time, error = %err, "could not inspect slot after click");
                Ok(SlotOutcome::UncertainClick)
            }
        }
    }

    async fn confirm_selection(
        &self,
        adapter: &mut dyn AutomationAdapter,
        cell: ElementRef,
    ) -> Result<bool, AdapterError> {
        let class = adapter.attribute(cell, "class").await?;
        if has_class(class.as_deref(), &self.selectors.checked_class) {
            return Ok(true);
        }
        let icons = adapter
            .find_all(&Selector::css(&self.selectors.confirmed_icon), Some(cell))
            .await?;
        Ok(!icons.is_empty())
    }

    async fn submit(&mut self, adapter: &mut dyn AutomationAdapter) -> BookingResult<()> {
        self.enter(BookingStep::Submit)?;
        self.status.report("submitting order");
        adapter.scroll_to_top().await?;

        let agreement_timeout = self.timing.agreement_timeout();
        let checkbox = adapter
            .wait_until_present(
                &Selector::css(&self.selectors.agreement_input),
                agreement_timeout,
            )
            .await
            .map_err(|err| match err {
                AdapterError::NotFound(_) | AdapterError::Timeout(_) => {
                    BookingError::ElementNotFound(format!(
                        "agreement checkbox not present within {}s",
                        agreement_timeout.as_secs()
                    ))
                }
                other => other.into(),
            })?;
        if !adapter.is_checked(checkbox).await? {
            let label = adapter
                .find_first(&Selector::css(&self.selectors.agreement_label), None)
                .await?;
            adapter.click(label).await?;
        }
        self.status.report("agreement checked");

        let submit_timeout = self.timing.submit_timeout();
        let button = adapter
            .wait_until_clickable(
                &Selector::contains_text(
                    &self.selectors.submit_button,
                    &self.selectors.submit_text,
                ),
                submit_timeout,
            )
            .await
            .map_err(|err| match err {
                AdapterError::NotFound(_) | AdapterError::Timeout(_) => {
                    BookingError::ElementNotFound(format!(
                        "submit button not clickable within {}s",
                        submit_timeout.as_secs()
                    ))
                }
                other => other.into(),
            })?;
        if adapter.attribute(button, "disabled").await?.is_some() {
            return Err(BookingError::SubmissionRejected(
                "submit button is disabled; no time slot is currently held".into(),
            ));
        }
        adapter.click(button).await?;
        self.status.report("order submitted");
        sleep(self.timing.submission_ack()).await;
        Ok(())
    }
}

fn has_class(class_attr: Option<&str>, class: &str) -> bool {
    class_attr
        .map(|value| value.split_whitespace().any(|token| token == class))
        .unwrap_or(false)
}
