//! Run lifecycle state and the callback phases it reports.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `NotStarted → Running → Completed`, or `Running → Failed` (terminal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Running {
        next_tick: usize,
    },
    Completed,
    Failed {
        tick_index: usize,
        timestamp: Option<NaiveDateTime>,
        cause: String,
    },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed { .. })
    }
}

/// Which callback (or engine step) a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initialize,
    BeforeTradingStart,
    HandleData,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Initialize => "initialize",
            Phase::BeforeTradingStart => "before_trading_start",
            Phase::HandleData => "handle_data",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
