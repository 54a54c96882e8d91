//! Time-tagged quantities and their conversion into generations.
//!
//! Every rate and span entering the model carries its time unit. The only
//! place where a unit is turned into "per generation" is [`GenerationTime`],
//! so a per-day rate can never reach the recursion unconverted.

use crate::{error::ConfigError, utils::check_num};
use serde::{Deserialize, Serialize};

const DAYS_PER_WEEK: f64 = 7.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Day,
    Week,
    Generation,
}

/// An amount of something per unit of time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rate {
    pub value: f64,
    pub per: TimeUnit,
}

impl Rate {
    pub fn per_day(value: f64) -> Self {
        Self {
            value,
            per: TimeUnit::Day,
        }
    }

    pub fn per_week(value: f64) -> Self {
        Self {
            value,
            per: TimeUnit::Week,
        }
    }

    pub fn per_generation(value: f64) -> Self {
        Self {
            value,
            per: TimeUnit::Generation,
        }
    }

    pub fn scaled(self, factor: f64) -> Self {
        Self {
            value: self.value * factor,
            per: self.per,
        }
    }
}

/// A length of time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub value: f64,
    pub unit: TimeUnit,
}

impl Span {
    pub fn days(value: f64) -> Self {
        Self {
            value,
            unit: TimeUnit::Day,
        }
    }

    pub fn generations(value: f64) -> Self {
        Self {
            value,
            unit: TimeUnit::Generation,
        }
    }
}

/// The fixed length of one simulation generation.
///
/// Built once per scenario. Per-week and per-day conversion ratios are
/// derived from it and are never accepted as inputs of their own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationTime {
    days: f64,
}

impl GenerationTime {
    pub fn from_days(days: f64) -> Result<Self, ConfigError> {
        check_num("generation_time", days, f64::MIN_POSITIVE..)?;
        Ok(Self { days })
    }

    pub fn days(&self) -> f64 {
        self.days
    }

    /// Length of one generation expressed in weeks.
    pub fn weeks(&self) -> f64 {
        self.days / DAYS_PER_WEEK
    }

    fn days_per(&self, unit: TimeUnit) -> f64 {
        match unit {
            TimeUnit::Day => 1.0,
            TimeUnit::Week => DAYS_PER_WEEK,
            TimeUnit::Generation => self.days,
        }
    }

    /// Convert a rate into the amount accumulated over one generation.
    pub fn per_generation(&self, rate: Rate) -> f64 {
        rate.value * self.days / self.days_per(rate.per)
    }

    pub fn span_in_days(&self, span: Span) -> f64 {
        span.value * self.days_per(span.unit)
    }

    pub fn span_in_generations(&self, span: Span) -> f64 {
        self.span_in_days(span) / self.days
    }

    /// Check that a rate is finite and non-negative when converted.
    pub fn check_rate(&self, param: &str, rate: Rate) -> Result<f64, ConfigError> {
        let value = self.per_generation(rate);
        check_num(param, value, 0.0..)?;
        Ok(value)
    }

    /// Check that a span is finite and non-negative, returning it in days.
    pub fn check_span(&self, param: &str, span: Span) -> Result<f64, ConfigError> {
        let days = self.span_in_days(span);
        check_num(param, days, 0.0..)?;
        Ok(days)
    }
}
