use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::Serialize;

use crate::config::ScheduleConfig;

/// Source of "now", injected so schedule decisions can be tested.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleInfo {
    pub today: String,
    pub is_send_day: bool,
    pub next_send_date: NaiveDate,
    pub send_days: Vec<String>,
    pub nominal_send_time: NaiveTime,
    pub is_report_day: bool,
}

pub struct Schedule<'a> {
    config: &'a ScheduleConfig,
}

impl<'a> Schedule<'a> {
    pub fn new(config: &'a ScheduleConfig) -> Self {
        Self { config }
    }

    pub fn is_send_day(&self, now: DateTime<Utc>) -> bool {
        self.config.send_days.contains(&now.weekday())
    }

    pub fn is_report_day(&self, now: DateTime<Utc>) -> bool {
        now.weekday() == self.config.report_day
    }

    /// First send day strictly after `now`, looking at most a week ahead.
    ///
    /// The send-day set is never empty, so the scan always finds a date.
    pub fn next_send_date(&self, now: DateTime<Utc>) -> NaiveDate {
        let today = now.date_naive();
        (1..=7)
            .map(|days_ahead| today + Duration::days(days_ahead))
            .find(|date| self.config.send_days.contains(&date.weekday()))
            .unwrap_or(today + Duration::days(7))
    }

    pub fn schedule_info(&self, now: DateTime<Utc>) -> ScheduleInfo {
        ScheduleInfo {
            today: weekday_name(now.weekday()).to_string(),
            is_send_day: self.is_send_day(now),
            next_send_date: self.next_send_date(now),
            send_days: self
                .config
                .send_days
                .iter()
                .map(|day| weekday_name(*day).to_string())
                .collect(),
            nominal_send_time: self.config.send_time,
            is_report_day: self.is_report_day(now),
        }
    }

    /// "Monday, Wednesday and Friday at 20:00".
    pub fn describe(&self) -> String {
        let names: Vec<&str> = self.config.send_days.iter().map(|d| weekday_name(*d)).collect();
        let days = match names.split_last() {
            Some((last, rest)) if !rest.is_empty() => format!("{} and {}", rest.join(", "), last),
            Some((last, _)) => last.to_string(),
            None => String::new(),
        };
        format!("{} at {}", days, self.config.send_time.format("%H:%M"))
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}
