//! Restricted Metric Detection
//!
//! Denies a question up front when it only mentions metrics the role cannot
//! see. A question that also touches a visible metric is let through; the
//! allowlist and SQL guardrail still bound what it can read.

use crate::semantic::metric::MetricDefinition;
use itertools::Itertools;
use regex::Regex;

const STOPWORDS: &[&str] = &["count", "metric", "table", "from", "default", "generated", "column"];
const MIN_TOKEN_LEN: usize = 4;

/// Matched metrics for one question, split by visibility to the role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricHits {
    pub restricted: usize,
    pub visible: usize,
}

impl MetricHits {
    pub fn targets_only_restricted(&self) -> bool {
        self.restricted > 0 && self.visible == 0
    }
}

/// Significant tokens of a metric's name and description, in first-seen order.
pub fn important_tokens(text: &str) -> Vec<String> {
    text.replace('_', " ")
        .split_whitespace()
        .map(|token| token.trim().to_lowercase())
        .filter(|token| token.chars().count() >= MIN_TOKEN_LEN && !STOPWORDS.contains(&token.as_str()))
        .unique()
        .collect()
}

pub fn tally_metric_hits(question: &str, metrics: &[MetricDefinition], role: &str) -> MetricHits {
    let question = question.to_lowercase();
    let mut hits = MetricHits::default();

    for metric in metrics {
        let tokens = important_tokens(&format!("{} {}", metric.name, metric.description));
        if !tokens.iter().any(|token| contains_word(&question, token)) {
            continue;
        }
        if metric.is_visible_to(role) {
            hits.visible += 1;
        } else {
            hits.restricted += 1;
        }
    }
    hits
}

pub fn is_restricted_metric_request(question: &str, metrics: &[MetricDefinition], role: &str) -> bool {
    tally_metric_hits(question, metrics, role).targets_only_restricted()
}

/// `word` occurs in `haystack` with no word character on either side.
fn contains_word(haystack: &str, word: &str) -> bool {
    if word.is_empty() {
        return false;
    }
    Regex::new(&format!(r"\b{}\b", regex::escape(word)))
        .map(|pattern| pattern.is_match(haystack))
        .unwrap_or(false)
}
