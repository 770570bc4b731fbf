use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use serde::{Serialize, Serializer};

use super::error::{BookingError, BookingResult};

const BADMINTON_COURTS: &[&str] = &["1号场", "2号场", "3号场", "4号场", "5号场", "6号场"];
const TENNIS_COURTS: &[&str] = &["EB东网球场", "EB西网球场", "FB北网球场", "FB南网球场"];

const FIRST_HOUR: u8 = 8;
const LAST_HOUR: u8 = 20;
const BADMINTON_CLOSED_HOURS: &[u8] = &[8, 9, 12];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Badminton,
    Tennis,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 2] = [ResourceKind::Badminton, ResourceKind::Tennis];

    pub fn endpoint(self) -> &'static str {
        match self {
            ResourceKind::Badminton => {
                "https://sportscentre.xipueduinno.cn/website/court?serviceId=1002"
            }
            ResourceKind::Tennis => "https://sportscentre.xipueduinno.cn/website/court?serviceId=1003",
        }
    }

    pub fn courts(self) -> &'static [&'static str] {
        match self {
            ResourceKind::Badminton => BADMINTON_COURTS,
            ResourceKind::Tennis => TENNIS_COURTS,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ResourceKind::Badminton => "羽毛球场",
            ResourceKind::Tennis => "网球场",
        }
    }

    pub fn is_known_court(self, name: &str) -> bool {
        self.courts().contains(&name)
    }

    /// Hourly labels this venue sells, in page order.
    pub fn time_options(self) -> Vec<TimeLabel> {
        (FIRST_HOUR..=LAST_HOUR)
            .filter(|hour| self != ResourceKind::Badminton || !BADMINTON_CLOSED_HOURS.contains(hour))
            .map(|hour| TimeLabel { hour, minute: 0 })
            .collect()
    }

    pub fn offers_time(self, label: TimeLabel) -> bool {
        self.time_options().contains(&label)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceKind::Badminton => "badminton",
            ResourceKind::Tennis => "tennis",
        };
        f.write_str(label)
    }
}

impl FromStr for ResourceKind {
    type Err = BookingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "badminton" => Ok(ResourceKind::Badminton),
            "tennis" => Ok(ResourceKind::Tennis),
            other => Err(BookingError::Configuration(format!(
                "unsupported court type: {other}"
            ))),
        }
    }
}

/// Time-of-day label as printed on the page's time axis (`19:00`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeLabel {
    hour: u8,
    minute: u8,
}

impl TimeLabel {
    pub fn new(hour: u8, minute: u8) -> BookingResult<Self> {
        if hour > 23 || minute > 59 {
            return Err(BookingError::Configuration(format!(
                "invalid time {hour}:{minute}"
            )));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }
}

impl fmt::Display for TimeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeLabel {
    type Err = BookingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            BookingError::Configuration(format!("invalid time label `{value}`, expected HH:MM"))
        };
        let (hour, minute) = value.trim().split_once(':').ok_or_else(invalid)?;
        let hour = hour.parse::<u8>().map_err(|_| invalid())?;
        let minute = minute.parse::<u8>().map_err(|_| invalid())?;
        TimeLabel::new(hour, minute).map_err(|_| invalid())
    }
}

impl Serialize for TimeLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Calendar day without a year; it always means the next occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonthDay {
    month: u32,
    day: u32,
}

impl MonthDay {
    pub fn new(month: u32, day: u32) -> BookingResult<Self> {
        // 2000 is a leap year, so Feb 29 is accepted.
        if NaiveDate::from_ymd_opt(2000, month, day).is_none() {
            return Err(BookingError::Configuration(format!(
                "invalid date {month:02}/{day:02}"
            )));
        }
        Ok(Self { month, day })
    }

    pub fn month(self) -> u32 {
        self.month
    }

    pub fn day(self) -> u32 {
        self.day
    }

    /// First date on or after `today` that falls on this month/day.
    pub fn next_occurrence(self, today: NaiveDate) -> NaiveDate {
        (today.year()..=today.year() + 8)
            .filter_map(|year| NaiveDate::from_ymd_opt(year, self.month, self.day))
            .find(|date| *date >= today)
            .unwrap_or(today)
    }
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{:02}", self.month, self.day)
    }
}

impl FromStr for MonthDay {
    type Err = BookingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid =
            || BookingError::Configuration(format!("invalid date `{value}`, expected MM/DD"));
        let (month, day) = value.trim().split_once('/').ok_or_else(invalid)?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        let day = day.parse::<u32>().map_err(|_| invalid())?;
        MonthDay::new(month, day)
    }
}

impl Serialize for MonthDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Daily instant, second precision, at which the booking fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerTime(NaiveTime);

impl TriggerTime {
    pub fn new(time: NaiveTime) -> Self {
        Self(time.with_nanosecond(0).unwrap_or(time))
    }

    pub fn time(self) -> NaiveTime {
        self.0
    }
}

impl fmt::Display for TriggerTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M:%S"))
    }
}

impl FromStr for TriggerTime {
    type Err = BookingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(value.trim(), "%H:%M:%S")
            .map(TriggerTime::new)
            .map_err(|_| {
                BookingError::Configuration(format!(
                    "invalid trigger time `{value}`, expected HH:MM:SS"
                ))
            })
    }
}

impl Serialize for TriggerTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Immutable description of one booking attempt. Construction validates the
/// court against the venue and every requested time against its hours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationRequest {
    kind: ResourceKind,
    court: String,
    date: MonthDay,
    times: Vec<TimeLabel>,
    trigger: TriggerTime,
}

impl ReservationRequest {
    pub fn new(
        kind: ResourceKind,
        court: impl Into<String>,
        date: MonthDay,
        times: Vec<TimeLabel>,
        trigger: TriggerTime,
    ) -> BookingResult<Self> {
        let court = court.into();
        if !kind.is_known_court(&court) {
            return Err(BookingError::Configuration(format!(
                "court `{court}` is not a {kind} court (expected one of: {})",
                kind.courts().join(", ")
            )));
        }
        if times.is_empty() {
            return Err(BookingError::Configuration(
                "at least one time slot is required".into(),
            ));
        }
        let mut seen = HashSet::new();
        for time in &times {
            if !seen.insert(*time) {
                return Err(BookingError::Configuration(format!(
                    "time {time} requested more than once"
                )));
            }
            if !kind.offers_time(*time) {
                return Err(BookingError::Configuration(format!(
                    "{kind} courts are not bookable at {time}"
                )));
            }
        }
        Ok(Self {
            kind,
            court,
            date,
            times,
            trigger,
        })
    }

    /// Builds a request from operator-entered text fields.
    pub fn parse<S: AsRef<str>>(
        kind: &str,
        court: &str,
        date: &str,
        times: &[S],
        trigger: &str,
    ) -> BookingResult<Self> {
        let kind = kind.parse::<ResourceKind>()?;
        let date = date.parse::<MonthDay>()?;
        let times = times
            .iter()
            .map(|value| value.as_ref().parse::<TimeLabel>())
            .collect::<BookingResult<Vec<_>>>()?;
        let trigger = trigger.parse::<TriggerTime>()?;
        Self::new(kind, court.trim(), date, times, trigger)
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn court(&self) -> &str {
        &self.court
    }

    pub fn date(&self) -> MonthDay {
        self.date
    }

    /// Requested slots in click priority order.
    pub fn times(&self) -> &[TimeLabel] {
        &self.times
    }

    pub fn trigger(&self) -> TriggerTime {
        self.trigger
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let times = self
            .times
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        vec![
            format!("court type: {} ({})", self.kind.display_name(), self.kind),
            format!("court: {}", self.court),
            format!("date: {}", self.date),
            format!("time slots: {times}"),
            format!("trigger time: {}", self.trigger),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn badminton_hours_skip_closed_slots() {
        let labels = ResourceKind::Badminton
            .time_options()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        assert_eq!(labels.first().map(String::as_str), Some("10:00"));
        assert!(!labels.contains(&"12:00".to_string()));
        assert_eq!(labels.last().map(String::as_str), Some("20:00"));
        assert_eq!(ResourceKind::Tennis.time_options().len(), 13);
    }

    #[test]
    fn parses_operator_fields() {
        let request =
            ReservationRequest::parse("Badminton", "2号场", "7/20", &["19:00", "20:00"], "08:00:00")
                .unwrap();
        assert_eq!(request.kind(), ResourceKind::Badminton);
        assert_eq!(request.date().to_string(), "07/20");
        assert_eq!(request.times()[1].to_string(), "20:00");
        assert_eq!(request.trigger().to_string(), "08:00:00");
    }

    #[test]
    fn rejects_court_from_another_venue() {
        let err = ReservationRequest::parse("tennis", "2号场", "07/20", &["19:00"], "08:00:00")
            .unwrap_err();
        assert_eq!(err.kind(), "configuration");
    }

    #[test]
    fn rejects_empty_duplicate_and_closed_times() {
        let empty: [&str; 0] = [];
        assert!(ReservationRequest::parse("tennis", "EB东网球场", "07/20", &empty, "08:00:00").is_err());
        assert!(ReservationRequest::parse(
            "tennis",
            "EB东网球场",
            "07/20",
            &["19:00", "19:00"],
            "08:00:00"
        )
        .is_err());
        assert!(
            ReservationRequest::parse("badminton", "1号场", "07/20", &["09:00"], "08:00:00")
                .is_err()
        );
    }

    #[test]
    fn rejects_malformed_labels() {
        assert!("13/01".parse::<MonthDay>().is_err());
        assert!("02/30".parse::<MonthDay>().is_err());
        assert!("25:00".parse::<TimeLabel>().is_err());
        assert!("8am".parse::<TriggerTime>().is_err());
        assert!("squash".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn month_day_resolves_to_next_future_date() {
        let today = NaiveDate::from_ymd_opt(2025, 7, 21).unwrap();
        let date: MonthDay = "07/20".parse().unwrap();
        assert_eq!(
            date.next_occurrence(today),
            NaiveDate::from_ymd_opt(2026, 7, 20).unwrap()
        );
        let same_day: MonthDay = "07/21".parse().unwrap();
        assert_eq!(same_day.next_occurrence(today), today);
        let leap: MonthDay = "02/29".parse().unwrap();
        assert_eq!(
            leap.next_occurrence(today),
            NaiveDate::from_ymd_opt(2028, 2, 29).unwrap()
        );
    }
}
