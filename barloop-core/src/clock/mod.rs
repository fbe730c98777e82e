//! Simulation clock: enumerates trading timestamps between two dates.
//!
//! Daily ticks are stamped at each session's close. Minute ticks run from one
//! minute after the open through the close inclusive, so every tick timestamp
//! marks the end of the bar it represents.

pub mod calendar;

pub use calendar::{SessionKind, TradingCalendar};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// Bar frequency of a clock or a history series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Frequency {
    #[serde(rename = "1d", alias = "daily")]
    Daily,
    #[serde(rename = "1m", alias = "minute")]
    Minute,
}

impl Frequency {
    pub const ALL: [Frequency; 2] = [Frequency::Daily, Frequency::Minute];

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "1d",
            Frequency::Minute => "1m",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1d" | "daily" | "day" => Ok(Frequency::Daily),
            "1m" | "minute" | "1min" => Ok(Frequency::Minute),
            other => Err(EngineError::InvalidRange(format!(
                "unsupported frequency '{other}' (expected \"1d\" or \"1m\")"
            ))),
        }
    }
}

/// One simulated time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub index: usize,
    pub timestamp: NaiveDateTime,
    pub session: NaiveDate,
    /// True on the first tick of each session.
    pub session_start: bool,
}

/// A validated `[start, end]` range over a calendar at one frequency.
#[derive(Debug, Clone)]
pub struct Clock {
    calendar: TradingCalendar,
    start: NaiveDate,
    end: NaiveDate,
    frequency: Frequency,
}

impl Clock {
    pub fn new(
        calendar: TradingCalendar,
        start: NaiveDate,
        end: NaiveDate,
        frequency: Frequency,
    ) -> Result<Self, EngineError> {
        if start > end {
            return Err(EngineError::InvalidRange(format!(
                "start date {start} is after end date {end}"
            )));
        }
        Ok(Self {
            calendar,
            start,
            end,
            frequency,
        })
    }

    /// Parse the frequency from its string form (`"1d"`, `"1m"`, ...).
    pub fn from_frequency_str(
        calendar: TradingCalendar,
        start: NaiveDate,
        end: NaiveDate,
        frequency: &str,
    ) -> Result<Self, EngineError> {
        Self::new(calendar, start, end, frequency.parse()?)
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    /// A fresh iterator from the first tick. Calling again restarts.
    pub fn ticks(&self) -> Ticks {
        Ticks {
            calendar: self.calendar.clone(),
            cursor: Some(self.start),
            end: self.end,
            frequency: self.frequency,
            session: None,
            minute: 0,
            index: 0,
        }
    }

    /// Number of ticks the clock will produce.
    pub fn len(&self) -> usize {
        let sessions = self.calendar.sessions(self.start, self.end).count();
        match self.frequency {
            Frequency::Daily => sessions,
            Frequency::Minute => sessions * self.calendar.minutes_per_session(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lazy tick sequence produced by [`Clock::ticks`].
#[derive(Debug, Clone)]
pub struct Ticks {
    calendar: TradingCalendar,
    cursor: Option<NaiveDate>,
    end: NaiveDate,
    frequency: Frequency,
    session: Option<NaiveDate>,
    minute: usize,
    index: usize,
}

impl Ticks {
    fn emit(&mut self, timestamp: NaiveDateTime, session: NaiveDate, session_start: bool) -> Tick {
        let tick = Tick {
            index: self.index,
            timestamp,
            session,
            session_start,
        };
        self.index += 1;
        tick
    }

    fn advance_session(&mut self) -> Option<NaiveDate> {
        while let Some(day) = self.cursor {
            if day > self.end {
                self.cursor = None;
                break;
            }
            self.cursor = day.succ_opt();
            if self.calendar.is_session(day) {
                return Some(day);
            }
        }
        None
    }
}

impl Iterator for Ticks {
    type Item = Tick;

    fn next(&mut self) -> Option<Tick> {
        loop {
            if let Some(session) = self.session {
                match self.frequency {
                    Frequency::Daily => {
                        self.session = None;
                        let ts = self.calendar.session_close(session);
                        return Some(self.emit(ts, session, true));
                    }
                    Frequency::Minute => {
                        if self.minute < self.calendar.minutes_per_session() {
                            let minute = self.minute;
                            self.minute += 1;
                            let ts = self.calendar.session_open(session)
                                + Duration::minutes(minute as i64 + 1);
                            return Some(self.emit(ts, session, minute == 0));
                        }
                        self.session = None;
                    }
                }
            }

            let next = self.advance_session()?;
            self.session = Some(next);
            self.minute = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn daily_ticks_are_stamped_at_close() {
        let clock = Clock::new(
            TradingCalendar::weekdays(),
            date(2013, 1, 1),
            date(2013, 1, 5),
            Frequency::Daily,
        )
        .unwrap();
        let ticks: Vec<Tick> = clock.ticks().collect();
        assert_eq!(ticks.len(), 4);
        assert_eq!(ticks.len(), clock.len());
        assert_eq!(ticks[0].timestamp, date(2013, 1, 1).and_hms_opt(16, 0, 0).unwrap());
        assert!(ticks.iter().all(|t| t.session_start));
        assert_eq!(ticks.iter().map(|t| t.index).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn minute_ticks_cover_the_session() {
        let clock = Clock::new(
            TradingCalendar::weekdays(),
            date(2013, 1, 2),
            date(2013, 1, 3),
            Frequency::Minute,
        )
        .unwrap();
        let ticks: Vec<Tick> = clock.ticks().collect();
        assert_eq!(ticks.len(), 780);
        assert_eq!(clock.len(), 780);
        assert_eq!(ticks[0].timestamp, date(2013, 1, 2).and_hms_opt(9, 31, 0).unwrap());
        assert_eq!(ticks[389].timestamp, date(2013, 1, 2).and_hms_opt(16, 0, 0).unwrap());
        assert!(ticks[0].session_start);
        assert!(!ticks[1].session_start);
        assert!(ticks[390].session_start);
        assert!(ticks.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn ticks_restart() {
        let clock = Clock::new(
            TradingCalendar::all_days(),
            date(2013, 1, 1),
            date(2013, 1, 5),
            Frequency::Daily,
        )
        .unwrap();
        let first: Vec<Tick> = clock.ticks().collect();
        let second: Vec<Tick> = clock.ticks().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
    }

    #[test]
    fn start_after_end_is_invalid() {
        let err = Clock::new(
            TradingCalendar::default(),
            date(2013, 1, 5),
            date(2013, 1, 1),
            Frequency::Daily,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRange(_)));
    }

    #[test]
    fn unsupported_frequency_is_invalid() {
        let err = Clock::from_frequency_str(
            TradingCalendar::default(),
            date(2013, 1, 1),
            date(2013, 1, 5),
            "1h",
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRange(msg) if msg.contains("1h")));
    }

    #[test]
    fn weekend_only_range_is_empty() {
        let clock = Clock::new(
            TradingCalendar::weekdays(),
            date(2013, 1, 5),
            date(2013, 1, 6),
            Frequency::Minute,
        )
        .unwrap();
        assert!(clock.is_empty());
        assert_eq!(clock.ticks().count(), 0);
    }

    #[test]
    fn frequency_parses_aliases() {
        assert_eq!("daily".parse::<Frequency>().unwrap(), Frequency::Daily);
        assert_eq!("1M".parse::<Frequency>().unwrap(), Frequency::Minute);
        assert_eq!(Frequency::Minute.to_string(), "1m");
    }
}
