//! Time period labels such as `24h`, `7d`, `2w`

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AnalyticsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodUnit {
    Hours,
    Days,
    Weeks,
}

impl PeriodUnit {
    fn suffix(&self) -> char {
        match self {
            PeriodUnit::Hours => 'h',
            PeriodUnit::Days => 'd',
            PeriodUnit::Weeks => 'w',
        }
    }
}

/// A lookback window, serialized as its label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimePeriod {
    amount: u32,
    unit: PeriodUnit,
}

impl TimePeriod {
    pub fn hours(amount: u32) -> Self {
        Self {
            amount,
            unit: PeriodUnit::Hours,
        }
    }

    pub fn days(amount: u32) -> Self {
        Self {
            amount,
            unit: PeriodUnit::Days,
        }
    }

    pub fn weeks(amount: u32) -> Self {
        Self {
            amount,
            unit: PeriodUnit::Weeks,
        }
    }

    pub fn duration(&self) -> Duration {
        let amount = i64::from(self.amount);
        match self.unit {
            PeriodUnit::Hours => Duration::hours(amount),
            PeriodUnit::Days => Duration::days(amount),
            PeriodUnit::Weeks => Duration::weeks(amount),
        }
    }

    pub fn label(&self) -> String {
        format!("{}{}", self.amount, self.unit.suffix())
    }
}

impl Default for TimePeriod {
    fn default() -> Self {
        Self::days(7)
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.suffix())
    }
}

impl FromStr for TimePeriod {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || AnalyticsError::InvalidPeriod(s.to_string());

        let suffix = trimmed.chars().last().ok_or_else(invalid)?;
        let unit = match suffix.to_ascii_lowercase() {
            'h' => PeriodUnit::Hours,
            'd' => PeriodUnit::Days,
            'w' => PeriodUnit::Weeks,
            _ => return Err(invalid()),
        };

        let amount: u32 = trimmed[..trimmed.len() - 1].parse().map_err(|_| invalid())?;
        if amount == 0 {
            return Err(invalid());
        }

        Ok(Self { amount, unit })
    }
}

impl TryFrom<String> for TimePeriod {
    type Error = AnalyticsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimePeriod> for String {
    fn from(period: TimePeriod) -> Self {
        period.label()
    }
}
