//! Failure-condition expressions such as `errorRate > 5%` or
//! `avgResponseTime >= 2000ms`.

use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::types::{Error, Result};

#[allow(clippy::expect_used)]
static CONDITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(errorRate|avgResponseTime|maxResponseTime|failedChecks)\s*(>=|<=|>|<)\s*(\d+(?:\.\d+)?)\s*(%|ms)?\s*$",
    )
    .expect("static pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Percent of failed checks.
    ErrorRate,
    /// Mean probe response time in milliseconds.
    AvgResponseTime,
    MaxResponseTime,
    FailedChecks,
}

impl Metric {
    fn unit(self) -> Option<&'static str> {
        match self {
            Metric::ErrorRate => Some("%"),
            Metric::AvgResponseTime | Metric::MaxResponseTime => Some("ms"),
            Metric::FailedChecks => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparison {
    fn holds(self, observed: f64, threshold: f64) -> bool {
        match self {
            Comparison::Gt => observed > threshold,
            Comparison::Ge => observed >= threshold,
            Comparison::Lt => observed < threshold,
            Comparison::Le => observed <= threshold,
        }
    }
}

/// Aggregates a condition is evaluated against.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ObservedMetrics {
    pub error_rate_percent: f64,
    pub avg_response_ms: f64,
    pub max_response_ms: f64,
    pub failed_checks: u64,
}

impl ObservedMetrics {
    fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::ErrorRate => self.error_rate_percent,
            Metric::AvgResponseTime => self.avg_response_ms,
            Metric::MaxResponseTime => self.max_response_ms,
            Metric::FailedChecks => self.failed_checks as f64,
        }
    }
}

/// A parsed failure condition.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureCondition {
    pub metric: Metric,
    pub comparison: Comparison,
    pub threshold: f64,
    raw: String,
}

impl FailureCondition {
    /// Observed value when the condition triggers.
    pub fn evaluate(&self, observed: &ObservedMetrics) -> Option<f64> {
        let value = observed.value(self.metric);
        self.comparison.holds(value, self.threshold).then_some(value)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for FailureCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for FailureCondition {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let invalid = |why: &str| {
            Error::validation(format!("invalid failure condition '{}': {}", raw, why))
        };
        let caps = CONDITION
            .captures(raw)
            .ok_or_else(|| invalid("expected '<metric> <op> <number>[%|ms]'"))?;

        let metric = match &caps[1] {
            "errorRate" => Metric::ErrorRate,
            "avgResponseTime" => Metric::AvgResponseTime,
            "maxResponseTime" => Metric::MaxResponseTime,
            _ => Metric::FailedChecks,
        };
        let comparison = match &caps[2] {
            ">" => Comparison::Gt,
            ">=" => Comparison::Ge,
            "<" => Comparison::Lt,
            _ => Comparison::Le,
        };
        let threshold: f64 = caps[3].parse().map_err(|_| invalid("bad number"))?;
        if let Some(unit) = caps.get(4).map(|m| m.as_str()) {
            if metric.unit() != Some(unit) {
                return Err(invalid(&format!("unit '{}' does not apply to {}", unit, &caps[1])));
            }
        }

        Ok(Self {
            metric,
            comparison,
            threshold,
            raw: raw.trim().to_string(),
        })
    }
}

/// Parse every condition, failing on the first invalid one.
pub fn parse_all(raw: &[String]) -> Result<Vec<FailureCondition>> {
    raw.iter().map(|c| c.parse()).collect()
}
