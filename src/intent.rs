//! Intent Extraction
//!
//! Keyword classifier that turns a business question into a structured
//! [`Intent`]. Pure and infallible: unknown phrasing falls back to defaults.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

const TREND_KEYWORDS: &[&str] = &["trend", "over time", "growth", "decline"];
const SUM_KEYWORDS: &[&str] = &["revenue", "sales", "amount", "gmv"];
const DISTINCT_KEYWORDS: &[&str] = &["distinct", "unique"];
const COMPARE_KEYWORDS: &[&str] = &["compare", "vs", "versus", "change", "last period", "previous"];

lazy_static! {
    static ref RELATIVE_RANGE: Regex =
        Regex::new(r"last\s+(\d+)\s+(day|days|week|weeks|month|months|year|years)")
            .expect("relative range pattern is valid");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    Summary,
    Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Count,
    Sum,
    CountDistinct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Day,
    Week,
    Month,
    Year,
}

impl TimeUnit {
    /// Prefix match, so both "month" and "months" resolve to `Month`.
    pub fn from_word(word: &str) -> Option<Self> {
        let word = word.to_lowercase();
        if word.starts_with("day") {
            Some(TimeUnit::Day)
        } else if word.starts_with("week") {
            Some(TimeUnit::Week)
        } else if word.starts_with("month") {
            Some(TimeUnit::Month)
        } else if word.starts_with("year") {
            Some(TimeUnit::Year)
        } else {
            None
        }
    }

    /// Interval keyword understood by the execution engine.
    pub fn sql_keyword(&self) -> &'static str {
        match self {
            TimeUnit::Day => "DAY",
            TimeUnit::Week => "WEEK",
            TimeUnit::Month => "MONTH",
            TimeUnit::Year => "YEAR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeRange {
    Default,
    Relative { value: u32, unit: TimeUnit },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub analysis_type: AnalysisType,
    pub metric: MetricKind,
    pub time_range: TimeRange,
    pub compare_period: bool,
}

pub fn extract_intent(question: &str) -> Intent {
    let q = question.to_lowercase();

    let analysis_type = if contains_any(&q, TREND_KEYWORDS) {
        AnalysisType::Trend
    } else {
        AnalysisType::Summary
    };

    // Distinct wins over sum when both appear.
    let metric = if contains_any(&q, DISTINCT_KEYWORDS) {
        MetricKind::CountDistinct
    } else if contains_any(&q, SUM_KEYWORDS) {
        MetricKind::Sum
    } else {
        MetricKind::Count
    };

    Intent {
        analysis_type,
        metric,
        time_range: extract_time_range(&q),
        compare_period: contains_any(&q, COMPARE_KEYWORDS),
    }
}

fn extract_time_range(question_lower: &str) -> TimeRange {
    let Some(caps) = RELATIVE_RANGE.captures(question_lower) else {
        return TimeRange::Default;
    };
    let value = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
    let unit = caps.get(2).and_then(|m| TimeUnit::from_word(m.as_str()));
    match (value, unit) {
        (Some(value), Some(unit)) => TimeRange::Relative { value, unit },
        _ => TimeRange::Default,
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
