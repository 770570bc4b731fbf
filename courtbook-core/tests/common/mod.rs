//! Scripted in-memory booking page used by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use courtbook_core::{
    AdapterError, AdapterFactory, AdapterResult, AutomationAdapter, CourtbookConfig, ElementRef,
    FixedClock, MemorySink, RunController, SelectorSection, Selector, TriggerScheduler,
};

/// How a slot reacts to a click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotBehaviour {
    /// Gains the checked class.
    Checks,
    /// Shows the confirmation icon instead of a class.
    ShowsIcon,
    /// Accepts the click with no visible change.
    Silent,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct Court {
    pub name: String,
    pub slots: Vec<SlotBehaviour>,
    pub clicked: Vec<bool>,
}

#[derive(Debug, Clone)]
pub struct Page {
    pub dates: Vec<String>,
    pub courts: Vec<Court>,
    pub axis: Vec<String>,
    pub agreement_present: bool,
    pub agreement_checked: bool,
    pub submit_disabled: bool,
    pub fail_navigation: bool,
    /// Every adapter call in order, e.g. `click slot 2号场 19:00`.
    pub log: Vec<String>,
}

impl Page {
    /// Badminton page for 07/20 with courts 1-3, every slot bookable.
    pub fn badminton() -> Self {
        let axis = (10..=20)
            .filter(|hour| *hour != 12)
            .map(|hour| format!("{hour:02}:00"))
            .collect::<Vec<_>>();
        let courts = ["1号场", "2号场", "3号场"]
            .iter()
            .map(|name| Court {
                name: format!("{name} (羽毛球)"),
                slots: vec![SlotBehaviour::Checks; axis.len()],
                clicked: vec![false; axis.len()],
            })
            .collect();
        Self {
            dates: vec!["07/19".into(), "07/20".into(), "07/21".into()],
            courts,
            axis,
            agreement_present: true,
            agreement_checked: false,
            submit_disabled: false,
            fail_navigation: false,
            log: Vec::new(),
        }
    }

    pub fn set_slot(&mut self, court: &str, time: &str, behaviour: SlotBehaviour) {
        let column = self
            .axis
            .iter()
            .position(|label| label == time)
            .expect("time on axis");
        let court = self
            .courts
            .iter_mut()
            .find(|candidate| candidate.name.contains(court))
            .expect("court on page");
        court.slots[column] = behaviour;
    }

    pub fn calls_matching(&self, prefix: &str) -> Vec<String> {
        self.log
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Date(usize),
    Container(usize),
    CourtName(usize),
    AxisLabel(usize),
    Slot(usize, usize),
    ConfirmIcon(usize, usize),
    AgreementInput,
    AgreementLabel,
    SubmitButton,
}

pub struct StubAdapter {
    page: Arc<Mutex<Page>>,
    selectors: SelectorSection,
    nodes: Vec<Node>,
}

impl StubAdapter {
    fn register(&mut self, node: Node) -> ElementRef {
        self.nodes.push(node);
        ElementRef::new(self.nodes.len() - 1)
    }

    fn node(&self, element: ElementRef) -> AdapterResult<Node> {
        self.nodes
            .get(element.id())
            .copied()
            .ok_or_else(|| AdapterError::Backend(format!("stale element {}", element.id())))
    }

    fn log(&self, entry: String) {
        self.page.lock().unwrap().log.push(entry);
    }

    fn text_of(page: &Page, node: Node) -> String {
        match node {
            Node::Date(i) => page.dates[i].clone(),
            Node::CourtName(i) | Node::Container(i) => page.courts[i].name.clone(),
            Node::AxisLabel(i) => format!(" {} ", page.axis[i]),
            Node::SubmitButton => "提交订单".into(),
            Node::AgreementLabel => "我已阅读并同意".into(),
            _ => String::new(),
        }
    }

    fn query(&self, selector: &Selector, within: Option<Node>) -> Vec<Node> {
        let page = self.page.lock().unwrap();
        let css = selector.css_part();
        let s = &self.selectors;
        let candidates: Vec<Node> = if css == s.date_option && within.is_none() {
            (0..page.dates.len()).map(Node::Date).collect()
        } else if css == s.court_container && within.is_none() {
            (0..page.courts.len()).map(Node::Container).collect()
        } else if css == s.court_name {
            match within {
                Some(Node::Container(i)) => vec![Node::CourtName(i)],
                _ => (0..page.courts.len()).map(Node::CourtName).collect(),
            }
        } else if css == s.time_axis_label {
            (0..page.axis.len()).map(Node::AxisLabel).collect()
        } else if css == s.slot_cell {
            match within {
                Some(Node::Container(i)) => (0..page.courts[i].slots.len())
                    .map(|column| Node::Slot(i, column))
                    .collect(),
                _ => Vec::new(),
            }
        } else if css == s.confirmed_icon {
            match within {
                Some(Node::Slot(court, column))
                    if page.courts[court].clicked[column]
                        && page.courts[court].slots[column] == SlotBehaviour::ShowsIcon =>
                {
                    vec![Node::ConfirmIcon(court, column)]
                }
                _ => Vec::new(),
            }
        } else if css == s.agreement_input && page.agreement_present {
            vec![Node::AgreementInput]
        } else if css == s.agreement_label && page.agreement_present {
            vec![Node::AgreementLabel]
        } else if css == s.submit_button {
            vec![Node::SubmitButton]
        } else {
            Vec::new()
        };
        candidates
            .into_iter()
            .filter(|node| selector.matches_text(&Self::text_of(&page, *node)))
            .collect()
    }

    fn wait_for(&mut self, selector: &Selector) -> AdapterResult<ElementRef> {
        match self.query(selector, None).into_iter().next() {
            Some(node) => Ok(self.register(node)),
            None => Err(AdapterError::Timeout(selector.to_string())),
        }
    }
}

#[async_trait]
impl AutomationAdapter for StubAdapter {
    async fn navigate(&mut self, url: &str) -> AdapterResult<()> {
        self.log(format!("navigate {url}"));
        if self.page.lock().unwrap().fail_navigation {
            return Err(AdapterError::Navigation(format!("{url} unreachable")));
        }
        self.nodes.clear();
        Ok(())
    }

    async fn reload(&mut self) -> AdapterResult<()> {
        self.log("reload".into());
        self.nodes.clear();
        Ok(())
    }

    async fn find_all(
        &mut self,
        selector: &Selector,
        within: Option<ElementRef>,
    ) -> AdapterResult<Vec<ElementRef>> {
        let scope = within.map(|element| self.node(element)).transpose()?;
        let found = self.query(selector, scope);
        Ok(found.into_iter().map(|node| self.register(node)).collect())
    }

    async fn text(&mut self, element: ElementRef) -> AdapterResult<String> {
        let node = self.node(element)?;
        let page = self.page.lock().unwrap();
        Ok(Self::text_of(&page, node))
    }

    async fn attribute(
        &mut self,
        element: ElementRef,
        name: &str,
    ) -> AdapterResult<Option<String>> {
        let node = self.node(element)?;
        let page = self.page.lock().unwrap();
        let value = match (node, name) {
            (Node::Slot(court, column), "class") => {
                let court = &page.courts[court];
                let mut class = String::from("item");
                match court.slots[column] {
                    SlotBehaviour::Disabled => class.push_str(" disabled"),
                    SlotBehaviour::Checks if court.clicked[column] => class.push_str(" checked"),
                    _ => {}
                }
                Some(class)
            }
            (Node::SubmitButton, "disabled") if page.submit_disabled => Some("disabled".into()),
            (Node::SubmitButton, "class") => Some("btn btn-primary".into()),
            _ => None,
        };
        Ok(value)
    }

    async fn is_checked(&mut self, element: ElementRef) -> AdapterResult<bool> {
        match self.node(element)? {
            Node::AgreementInput => Ok(self.page.lock().unwrap().agreement_checked),
            _ => Ok(false),
        }
    }

    async fn click(&mut self, element: ElementRef) -> AdapterResult<()> {
        let node = self.node(element)?;
        let entry = {
            let mut page = self.page.lock().unwrap();
            match node {
                Node::Date(i) => format!("click date {}", page.dates[i]),
                Node::Slot(court, column) => {
                    page.courts[court].clicked[column] = true;
                    format!("click slot {} {}", page.courts[court].name, page.axis[column])
                }
                Node::AgreementLabel => {
                    page.agreement_checked = true;
                    "click agreement".into()
                }
                Node::SubmitButton => "click submit".into(),
                other => format!("click {other:?}"),
            }
        };
        self.log(entry);
        Ok(())
    }

    async fn scroll_into_view(&mut self, element: ElementRef) -> AdapterResult<()> {
        self.node(element)?;
        Ok(())
    }

    async fn scroll_to_top(&mut self) -> AdapterResult<()> {
        self.log("scroll top".into());
        Ok(())
    }

    async fn wait_until_clickable(
        &mut self,
        selector: &Selector,
        _timeout: Duration,
    ) -> AdapterResult<ElementRef> {
        self.wait_for(selector)
    }

    async fn wait_until_present(
        &mut self,
        selector: &Selector,
        _timeout: Duration,
    ) -> AdapterResult<ElementRef> {
        self.wait_for(selector)
    }

    async fn close(&mut self) -> AdapterResult<()> {
        self.log("close".into());
        Ok(())
    }
}

pub struct StubFactory {
    pub page: Arc<Mutex<Page>>,
    pub selectors: SelectorSection,
    pub fail_open: bool,
}

#[async_trait]
impl AdapterFactory for StubFactory {
    async fn open(&self) -> AdapterResult<Box<dyn AutomationAdapter>> {
        if self.fail_open {
            return Err(AdapterError::Launch("chromium executable not found".into()));
        }
        Ok(Box::new(StubAdapter {
            page: Arc::clone(&self.page),
            selectors: self.selectors.clone(),
            nodes: Vec::new(),
        }))
    }
}

/// 07:59:59 on a fixed day, one second before the usual trigger.
pub fn just_before_eight() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 7, 13)
        .unwrap()
        .and_hms_opt(7, 59, 59)
        .unwrap()
}

pub struct Harness {
    pub controller: RunController,
    pub page: Arc<Mutex<Page>>,
    pub sink: Arc<MemorySink>,
}

impl Harness {
    pub fn new(page: Page) -> Self {
        Self::build(page, false)
    }

    pub fn without_browser() -> Self {
        Self::build(Page::badminton(), true)
    }

    fn build(page: Page, fail_open: bool) -> Self {
        let config = Arc::new(CourtbookConfig::default());
        let page = Arc::new(Mutex::new(page));
        let sink = Arc::new(MemorySink::new());
        let factory = StubFactory {
            page: Arc::clone(&page),
            selectors: config.selectors.clone(),
            fail_open,
        };
        let controller = RunController::new(Arc::new(factory), sink.clone(), config)
            .with_scheduler(TriggerScheduler::new(Arc::new(FixedClock(just_before_eight()))));
        Self {
            controller,
            page,
            sink,
        }
    }

    pub fn log(&self) -> Vec<String> {
        self.page.lock().unwrap().log.clone()
    }

    pub fn calls_matching(&self, prefix: &str) -> Vec<String> {
        self.page.lock().unwrap().calls_matching(prefix)
    }

    /// Confirms login once the worker is parked at the login gate.
    pub async fn log_in(&self) {
        self.until_reported("waiting for login").await;
        assert!(self.controller.confirm_login(), "login should be pending");
    }

    /// Polls the sink in virtual time until a message containing `needle`
    /// shows up.
    pub async fn until_reported(&self, needle: &str) {
        for _ in 0..10_000 {
            if self.sink.contains(needle) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("never reported `{needle}`: {:?}", self.sink.messages());
    }
}
