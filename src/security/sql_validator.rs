//! SQL Guardrail
//!
//! Pure check that a statement is a single, wildcard-free SELECT that only
//! reads allowlisted, database-qualified tables and columns. Never executes
//! anything and keeps no state between calls.

use crate::security::allowlist::Allowlist;
use lazy_static::lazy_static;
use regex::Regex;
use sqlparser::ast::{Expr, Ident, ObjectName, Query, SelectItem, SetExpr, Statement, TableFactor, TableWithJoins, Visit, Visitor};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::ControlFlow;
use thiserror::Error;
use tracing::debug;

lazy_static! {
    static ref FORBIDDEN_TOKENS: Regex = Regex::new(
        r"\b(insert|update|delete|drop|alter|truncate|grant|revoke|create|replace|call|execute)\b"
    )
    .expect("forbidden token pattern is valid");
}

/// MySQL runs `/*! ... */` bodies and reads `--x` as double negation, while
/// the parser drops both as comments, so no comment reaches the parser.
const COMMENT_MARKERS: [&str; 3] = ["/*", "--", "#"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationRejection {
    #[error("Only SELECT queries are allowed")]
    NotSelect,

    #[error("Multiple statements are not allowed")]
    MultipleStatements,

    #[error("Forbidden SQL token detected: {0}")]
    ForbiddenToken(String),

    #[error("SQL could not be parsed: {0}")]
    ParseFailure(String),

    #[error("Wildcard projections are not allowed")]
    WildcardProjection,

    #[error("Query must reference at least one table")]
    NoTableReference,

    #[error("Table {0} must be qualified with its database name")]
    UnqualifiedTable(String),

    #[error("Table {0} is outside role permissions")]
    TableNotAllowed(String),

    #[error("Column {0} is outside role permissions")]
    ColumnNotAllowed(String),
}

impl ValidationRejection {
    /// Stable code recorded in audit trails.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationRejection::NotSelect => "not-select",
            ValidationRejection::MultipleStatements => "multiple-statements",
            ValidationRejection::ForbiddenToken(_) => "forbidden-token",
            ValidationRejection::ParseFailure(_) => "parse-failure",
            ValidationRejection::WildcardProjection => "wildcard-projection",
            ValidationRejection::NoTableReference => "no-table-reference",
            ValidationRejection::UnqualifiedTable(_) => "unqualified-table",
            ValidationRejection::TableNotAllowed(_) => "table-not-allowed",
            ValidationRejection::ColumnNotAllowed(_) => "column-not-allowed",
        }
    }
}

/// Validate `sql` against the role's allowlist. Identifiers compare case-insensitively.
pub fn validate_sql(sql: &str, allowlist: &Allowlist) -> Result<(), ValidationRejection> {
    let result = check(sql, allowlist);
    if let Err(rejection) = &result {
        debug!(code = rejection.code(), %rejection, "sql rejected");
    }
    result
}

fn check(sql: &str, allowlist: &Allowlist) -> Result<(), ValidationRejection> {
    let normalized = sql.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    if !normalized.starts_with("select") {
        return Err(ValidationRejection::NotSelect);
    }
    if normalized.contains(';') {
        return Err(ValidationRejection::MultipleStatements);
    }
    if let Some(token) = FORBIDDEN_TOKENS.find(&normalized) {
        return Err(ValidationRejection::ForbiddenToken(token.as_str().to_string()));
    }
    if let Some(marker) = COMMENT_MARKERS.iter().find(|marker| normalized.contains(*marker)) {
        return Err(ValidationRejection::ForbiddenToken(marker.to_string()));
    }

    let statements = Parser::parse_sql(&MySqlDialect {}, sql)
        .map_err(|e| ValidationRejection::ParseFailure(e.to_string()))?;
    let statement = match statements.as_slice() {
        [statement] => statement,
        [] => return Err(ValidationRejection::NotSelect),
        _ => return Err(ValidationRejection::MultipleStatements),
    };
    if !matches!(statement, Statement::Query(_)) {
        return Err(ValidationRejection::NotSelect);
    }

    let mut references = ReferenceCollector::default();
    match statement.visit(&mut references) {
        ControlFlow::Continue(()) => references.enforce(allowlist),
        ControlFlow::Break(rejection) => Err(rejection),
    }
}

fn lower(ident: &Ident) -> String {
    ident.value.to_lowercase()
}

fn name_parts(name: &ObjectName) -> Vec<String> {
    name.0.iter().map(lower).collect()
}

fn is_wildcard(item: &SelectItem) -> bool {
    matches!(item, SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..))
}

/// Output column aliases of a query body; set operations name columns after the left side.
fn projection_aliases(body: &SetExpr) -> HashSet<String> {
    match body {
        SetExpr::Select(select) => select
            .projection
            .iter()
            .filter_map(|item| match item {
                SelectItem::ExprWithAlias { alias, .. } => Some(lower(alias)),
                _ => None,
            })
            .collect(),
        SetExpr::SetOperation { left, .. } => projection_aliases(left),
        _ => HashSet::new(),
    }
}

struct ColumnRef {
    qualifier: Option<String>,
    column: String,
}

impl ColumnRef {
    fn display(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{}.{}", q, self.column),
            None => self.column.clone(),
        }
    }
}

/// Bare ORDER BY identifiers that name a projection alias of the query,
/// counted per alias. Each count is spent by one unqualified reference.
type AliasScope = HashMap<String, usize>;

#[derive(Default)]
struct ReferenceCollector {
    saw_select: bool,
    tables: Vec<Vec<String>>,
    aliases: Vec<(String, Vec<String>)>,
    columns: Vec<ColumnRef>,
    /// One entry per query currently being walked, innermost last.
    order_by_scopes: Vec<AliasScope>,
}

impl ReferenceCollector {
    fn scan_body(&mut self, body: &SetExpr) -> ControlFlow<ValidationRejection> {
        match body {
            SetExpr::Select(select) => {
                self.saw_select = true;
                if select.projection.iter().any(is_wildcard) {
                    return ControlFlow::Break(ValidationRejection::WildcardProjection);
                }
                for from in &select.from {
                    self.collect_aliases(from);
                }
            }
            SetExpr::SetOperation { left, right, .. } => {
                self.scan_body(left)?;
                self.scan_body(right)?;
            }
            // Nested queries get their own pre_visit_query call.
            _ => {}
        }
        ControlFlow::Continue(())
    }

    /// True when `name` is an ORDER BY alias still unspent in the innermost query.
    fn spend_order_by_alias(&mut self, name: &str) -> bool {
        match self.order_by_scopes.last_mut().and_then(|scope| scope.get_mut(name)) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn collect_aliases(&mut self, from: &TableWithJoins) {
        self.collect_factor_alias(&from.relation);
        for join in &from.joins {
            self.collect_factor_alias(&join.relation);
        }
    }

    fn collect_factor_alias(&mut self, factor: &TableFactor) {
        match factor {
            TableFactor::Table { name, alias: Some(alias), .. } => {
                self.aliases.push((lower(&alias.name), name_parts(name)));
            }
            TableFactor::NestedJoin { table_with_joins, .. } => self.collect_aliases(table_with_joins),
            _ => {}
        }
    }

    fn enforce(self, allowlist: &Allowlist) -> Result<(), ValidationRejection> {
        if !self.saw_select {
            return Err(ValidationRejection::NotSelect);
        }
        if self.tables.is_empty() {
            return Err(ValidationRejection::NoTableReference);
        }

        let scoped: BTreeMap<String, BTreeSet<String>> = allowlist
            .tables()
            .map(|(table, columns)| {
                (table.to_lowercase(), columns.iter().map(|c| c.to_lowercase()).collect())
            })
            .collect();

        let mut alias_to_table: HashMap<String, String> = HashMap::new();
        let mut referenced: BTreeSet<String> = BTreeSet::new();
        for parts in &self.tables {
            let [database, table] = parts.as_slice() else {
                return Err(ValidationRejection::UnqualifiedTable(parts.join(".")));
            };
            let fq = format!("{}.{}", database, table);
            if !scoped.contains_key(&fq) {
                return Err(ValidationRejection::TableNotAllowed(fq));
            }
            alias_to_table.insert(table.clone(), fq.clone());
            alias_to_table.insert(fq.clone(), fq.clone());
            referenced.insert(fq);
        }
        for (alias, parts) in &self.aliases {
            if parts.len() == 2 {
                alias_to_table.insert(alias.clone(), parts.join("."));
            }
        }

        let union: BTreeSet<&String> = referenced
            .iter()
            .filter_map(|fq| scoped.get(fq))
            .flatten()
            .collect();

        for column in &self.columns {
            let allowed = match &column.qualifier {
                Some(qualifier) => alias_to_table
                    .get(qualifier)
                    .and_then(|fq| scoped.get(fq))
                    .map(|columns| columns.contains(&column.column))
                    .unwrap_or(false),
                None => union.contains(&column.column),
            };
            if !allowed {
                return Err(ValidationRejection::ColumnNotAllowed(column.display()));
            }
        }
        Ok(())
    }
}

impl Visitor for ReferenceCollector {
    type Break = ValidationRejection;

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        self.scan_body(&query.body)?;
        let aliases = projection_aliases(&query.body);
        let mut scope = AliasScope::new();
        for order in &query.order_by {
            if let Expr::Identifier(ident) = &order.expr {
                let name = lower(ident);
                if aliases.contains(&name) {
                    *scope.entry(name).or_default() += 1;
                }
            }
        }
        self.order_by_scopes.push(scope);
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.order_by_scopes.pop();
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        self.tables.push(name_parts(relation));
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        match expr {
            Expr::Identifier(ident) => {
                let column = lower(ident);
                if !self.spend_order_by_alias(&column) {
                    self.columns.push(ColumnRef { qualifier: None, column });
                }
            }
            Expr::CompoundIdentifier(idents) => {
                if let Some((column, qualifier)) = idents.split_last() {
                    self.columns.push(ColumnRef {
                        qualifier: Some(qualifier.iter().map(lower).collect::<Vec<_>>().join(".")),
                        column: lower(column),
                    });
                }
            }
            Expr::Wildcard | Expr::QualifiedWildcard(_) => {
                return ControlFlow::Break(ValidationRejection::WildcardProjection);
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }
}
