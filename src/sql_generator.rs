//! Deterministic SQL Generation
//!
//! Builds one aggregation-first MySQL statement from the intent, the
//! retrieved documents and the role's allowlist. Every identifier written
//! into the statement comes from the allowlist; question text is only ever
//! used for scoring, never interpolated.

use crate::intent::{AnalysisType, Intent, MetricKind, TimeRange};
use crate::security::allowlist::{split_table_name, Allowlist};
use crate::semantic::document::{SemanticDocument, SemanticType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedQuery {
    pub sql: String,
    pub rationale: String,
}

/// Generate SQL for `question`. `None` only when the allowlist is empty.
pub fn generate_sql(
    question: &str,
    intent: &Intent,
    docs: &[SemanticDocument],
    allowlist: &Allowlist,
) -> Option<GeneratedQuery> {
    let selected = pick_table(question, docs, allowlist)?;
    let (database, table) = split_table_name(&selected)?;
    let allowed = allowlist.columns(&selected)?;

    let table_docs: Vec<&SemanticDocument> = docs
        .iter()
        .filter(|d| d.database_name == database && d.table_name == table)
        .collect();
    let time_col = pick_column(&table_docs, allowed, SemanticType::TimeDimension);
    let measure_col = pick_column(&table_docs, allowed, SemanticType::Measure);
    let dimension_col = pick_column(&table_docs, allowed, SemanticType::Dimension);

    let metric_expr = match (intent.metric, measure_col, dimension_col.or(measure_col)) {
        (MetricKind::Sum, Some(measure), _) => format!("SUM({})", quote_ident(measure)),
        (MetricKind::CountDistinct, _, Some(column)) => format!("COUNT(DISTINCT {})", quote_ident(column)),
        _ => "COUNT(*)".to_string(),
    };

    let where_sql = match (time_col, intent.time_range) {
        (Some(time), TimeRange::Relative { value, unit }) => Some(format!(
            "WHERE {} >= DATE_SUB(CURRENT_DATE, INTERVAL {} {})",
            quote_ident(time),
            value,
            unit.sql_keyword()
        )),
        _ => None,
    };

    let from_sql = format!("FROM {}.{}", quote_ident(database), quote_ident(table));
    let mut parts: Vec<String> = Vec::new();
    match (intent.analysis_type, time_col) {
        (AnalysisType::Trend, Some(time)) => {
            let period = format!("DATE_FORMAT({}, '%Y-%m')", quote_ident(time));
            parts.push(format!("SELECT {} AS period, {} AS metric_value", period, metric_expr));
            parts.push(from_sql);
            parts.extend(where_sql);
            parts.push(format!("GROUP BY {}", period));
            parts.push("ORDER BY period".to_string());
        }
        _ => {
            parts.push(format!("SELECT {} AS metric_value", metric_expr));
            parts.push(from_sql);
            parts.extend(where_sql);
        }
    }

    Some(GeneratedQuery {
        sql: parts.join(" "),
        rationale: format!(
            "Selected {} based on semantic retrieval and generated aggregation-first SQL.",
            selected
        ),
    })
}

/// Most-voted allowlisted table among the documents (first seen wins ties),
/// else the best lexical match against the question, in lexicographic order.
fn pick_table(question: &str, docs: &[SemanticDocument], allowlist: &Allowlist) -> Option<String> {
    let mut votes: Vec<(String, usize)> = Vec::new();
    for doc in docs {
        if doc.database_name.is_empty() || doc.table_name.is_empty() {
            continue;
        }
        let fq = doc.fully_qualified_table();
        if !allowlist.contains_table(&fq) {
            continue;
        }
        match votes.iter_mut().find(|(table, _)| *table == fq) {
            Some((_, count)) => *count += 1,
            None => votes.push((fq, 1)),
        }
    }

    let mut best: Option<(String, usize)> = None;
    for (table, count) in votes {
        if best.as_ref().map_or(true, |(_, top)| count > *top) {
            best = Some((table, count));
        }
    }
    if let Some((table, _)) = best {
        return Some(table);
    }

    let question = question.to_lowercase();
    let mut lexical: Option<(&String, usize)> = None;
    for (fq, columns) in allowlist.tables() {
        let table = split_table_name(fq).map(|(_, t)| t).unwrap_or(fq.as_str());
        let score = usize::from(question.contains(&table.to_lowercase()))
            + columns
                .iter()
                .filter(|c| question.contains(&c.to_lowercase()))
                .count();
        if lexical.map_or(true, |(_, top)| score > top) {
            lexical = Some((fq, score));
        }
    }
    lexical.map(|(fq, _)| fq.clone())
}

fn pick_column<'a>(
    docs: &[&'a SemanticDocument],
    allowed: &BTreeSet<String>,
    semantic_type: SemanticType,
) -> Option<&'a str> {
    docs.iter()
        .filter(|d| d.semantic_type == Some(semantic_type))
        .filter_map(|d| d.column_name.as_deref())
        .find(|column| allowed.contains(*column))
}

fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
