//! Insight Engine
//!
//! Turns result rows into an executive summary, key findings,
//! recommendations and stated limitations. The branch taken depends only on
//! the shape of the rows.

use crate::execution::result::{ResultRow, ScalarValue};
use serde::{Deserialize, Serialize};

pub const ANOMALY_Z_THRESHOLD: f64 = 2.0;
const MAX_REPORTED_ANOMALIES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub executive_summary: String,
    pub key_insights: Vec<String>,
    pub recommendations: Vec<String>,
    pub limitations: Option<String>,
}

impl Insight {
    fn fixed(summary: &str, insight: &str, recommendation: &str, limitation: Option<&str>) -> Self {
        Self {
            executive_summary: summary.to_string(),
            key_insights: vec![insight.to_string()],
            recommendations: vec![recommendation.to_string()],
            limitations: limitation.map(str::to_string),
        }
    }
}

/// Period-over-period statistics of a trend result.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendStatistics {
    pub first: f64,
    pub last: f64,
    pub change: f64,
    /// `None` when the first value is zero.
    pub pct_change: Option<f64>,
    pub mean: f64,
    pub std_dev: f64,
    /// `(period, value)` with |z| at or above the threshold, in row order.
    pub anomalies: Vec<(ScalarValue, f64)>,
}

/// Statistics over the rows with a numeric `metric_value`; `None` below two such rows.
pub fn trend_statistics(rows: &[ResultRow]) -> Option<TrendStatistics> {
    let clean: Vec<(ScalarValue, f64)> = rows
        .iter()
        .filter_map(|row| {
            let value = row.get("metric_value")?.as_f64()?;
            let period = row.get("period").cloned().unwrap_or(ScalarValue::Null);
            Some((period, value))
        })
        .collect();
    if clean.len() < 2 {
        return None;
    }

    let first = clean[0].1;
    let last = clean[clean.len() - 1].1;
    let change = last - first;
    let pct_change = if first != 0.0 { Some(change / first * 100.0) } else { None };

    let n = clean.len() as f64;
    let mean = clean.iter().map(|(_, v)| v).sum::<f64>() / n;
    let std_dev = (clean.iter().map(|(_, v)| (v - mean).powi(2)).sum::<f64>() / n).sqrt();

    let anomalies = if std_dev > 0.0 {
        clean
            .into_iter()
            .filter(|(_, v)| ((v - mean) / std_dev).abs() >= ANOMALY_Z_THRESHOLD)
            .collect()
    } else {
        Vec::new()
    };

    Some(TrendStatistics {
        first,
        last,
        change,
        pct_change,
        mean,
        std_dev,
        anomalies,
    })
}

pub fn generate_insight(question: &str, rows: &[ResultRow]) -> Insight {
    let Some(first_row) = rows.first() else {
        return Insight::fixed(
            "No rows matched the query criteria.",
            "The current filters produced an empty result set.",
            "Broaden the time range or remove restrictive filters.",
            Some("Insufficient data returned from source query."),
        );
    };

    if first_row.contains("period") && first_row.contains("metric_value") {
        return trend_insight(rows);
    }

    if let Some(value) = rows.iter().find_map(|row| row.get("metric_value").and_then(ScalarValue::as_f64)) {
        return Insight::fixed(
            &format!("Current metric value is {}.", format_number(value)),
            &format!("Answer generated for question: {}", question),
            "Track this metric over time to add trend context.",
            Some("Single aggregated value; no temporal pattern available."),
        );
    }

    Insight::fixed(
        "Result set returned non-numeric output.",
        "Unable to derive quantitative trend from current result format.",
        "Run a time-series aggregate query for deeper insight.",
        Some("Metric value column missing or non-numeric."),
    )
}

fn trend_insight(rows: &[ResultRow]) -> Insight {
    let Some(stats) = trend_statistics(rows) else {
        return Insight::fixed(
            "Trend analysis needs at least two periods.",
            "Only one data period was available.",
            "Expand the lookback window to compare periods.",
            Some("Insufficient period count for trend calculations."),
        );
    };

    let direction = if stats.change >= 0.0 { "increased" } else { "decreased" };
    let executive_summary = match stats.pct_change {
        Some(pct) => format!("Metric {} by {:.1}% over the selected period.", direction, pct.abs()),
        None => format!(
            "Metric {} from {} to {}.",
            direction,
            format_number(stats.first),
            format_number(stats.last)
        ),
    };

    let mut key_insights = vec![
        format!(
            "Start period value: {}; end period value: {}.",
            format_number(stats.first),
            format_number(stats.last)
        ),
        format!("Absolute change: {}.", format_number(stats.change)),
    ];
    if stats.anomalies.is_empty() {
        key_insights.push(format!(
            "No statistical anomalies detected at z-score threshold {:.1}.",
            ANOMALY_Z_THRESHOLD
        ));
    } else {
        let listed: Vec<String> = stats
            .anomalies
            .iter()
            .take(MAX_REPORTED_ANOMALIES)
            .map(|(period, value)| format!("{} ({})", period, format_number(*value)))
            .collect();
        key_insights.push(format!("Potential anomalies detected at: {}.", listed.join(", ")));
    }

    let recommendations = if stats.change < 0.0 {
        vec![
            "Investigate recent operational or pricing changes that may be suppressing performance.".to_string(),
            "Prioritize recovery actions on the most recent down periods.".to_string(),
        ]
    } else {
        vec![
            "Sustain growth drivers and verify capacity planning for continued demand.".to_string(),
            "Test targeted investments in channels with strongest recent lift.".to_string(),
        ]
    };

    Insight {
        executive_summary,
        key_insights,
        recommendations,
        limitations: None,
    }
}

/// Two decimals with thousands separators, e.g. `-1,234.50`.
pub fn format_number(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (integer, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let digits: Vec<char> = integer.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*digit);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, fraction)
}
