//! Trading calendar: which dates are sessions and when they open and close.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::EngineError;

/// Which calendar days are eligible to be sessions (before holidays apply).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Monday through Friday.
    #[default]
    Weekdays,
    /// Every calendar day (crypto-style or synthetic data).
    AllDays,
}

/// Session calendar with a fixed intraday schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingCalendar {
    kind: SessionKind,
    holidays: BTreeSet<NaiveDate>,
    open: NaiveTime,
    close: NaiveTime,
}

impl Default for TradingCalendar {
    fn default() -> Self {
        Self::new(SessionKind::Weekdays)
    }
}

impl TradingCalendar {
    /// A calendar with the regular 09:30–16:00 session.
    pub fn new(kind: SessionKind) -> Self {
        Self {
            kind,
            holidays: BTreeSet::new(),
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default(),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap_or_default(),
        }
    }

    pub fn weekdays() -> Self {
        Self::new(SessionKind::Weekdays)
    }

    pub fn all_days() -> Self {
        Self::new(SessionKind::AllDays)
    }

    pub fn with_holidays(mut self, holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(holidays);
        self
    }

    /// Replace the session hours. Fails unless `open < close`.
    pub fn with_session(mut self, open: NaiveTime, close: NaiveTime) -> Result<Self, EngineError> {
        if open >= close {
            return Err(EngineError::InvalidRange(format!(
                "session open {open} must be before close {close}"
            )));
        }
        self.open = open;
        self.close = close;
        Ok(self)
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn holidays(&self) -> &BTreeSet<NaiveDate> {
        &self.holidays
    }

    pub fn open_time(&self) -> NaiveTime {
        self.open
    }

    pub fn close_time(&self) -> NaiveTime {
        self.close
    }

    pub fn is_session(&self, date: NaiveDate) -> bool {
        let eligible = match self.kind {
            SessionKind::Weekdays => !matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
            SessionKind::AllDays => true,
        };
        eligible && !self.holidays.contains(&date)
    }

    /// Sessions in `[start, end]`, ascending.
    pub fn sessions(&self, start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> + '_ {
        start
            .iter_days()
            .take_while(move |d| *d <= end)
            .filter(move |d| self.is_session(*d))
    }

    pub fn session_open(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.open)
    }

    pub fn session_close(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.close)
    }

    /// Number of one-minute bars in a session.
    pub fn minutes_per_session(&self) -> usize {
        (self.close - self.open).num_minutes().max(0) as usize
    }
}
