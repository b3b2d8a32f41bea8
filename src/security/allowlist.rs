//! Role-Scoped Allowlists
//!
//! An [`Allowlist`] maps `database.table` to the columns one role may read.
//! It is resolved fresh for every request and never persisted here.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Ordered so that iteration (and every tie-break built on it) is lexicographic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Allowlist {
    tables: BTreeMap<String, BTreeSet<String>>,
}

impl Allowlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tables<I, T, C, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = (T, C)>,
        T: Into<String>,
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut allowlist = Self::new();
        for (table, columns) in tables {
            allowlist.insert_table(table, columns);
        }
        allowlist
    }

    /// Tables with no columns are invisible and are not stored.
    pub fn insert_table<T, C, S>(&mut self, table: T, columns: C)
    where
        T: Into<String>,
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: BTreeSet<String> = columns.into_iter().map(Into::into).collect();
        if !columns.is_empty() {
            self.tables.entry(table.into()).or_default().extend(columns);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn contains_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn columns(&self, table: &str) -> Option<&BTreeSet<String>> {
        self.tables.get(table)
    }

    pub fn allows_column(&self, table: &str, column: &str) -> bool {
        self.tables
            .get(table)
            .map(|columns| columns.contains(column))
            .unwrap_or(false)
    }

    pub fn tables(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.tables.iter()
    }
}

/// Split `database.table` at the first dot.
pub fn split_table_name(fully_qualified: &str) -> Option<(&str, &str)> {
    fully_qualified
        .split_once('.')
        .filter(|(db, table)| !db.is_empty() && !table.is_empty())
}

#[async_trait]
pub trait AccessPolicy: Send + Sync {
    async fn resolve_role_scoped_allowlist(&self, data_source_id: &str, role: &str) -> Result<Allowlist>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRule {
    pub column_name: String,
    /// Empty means every role.
    #[serde(default)]
    pub allowed_roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRule {
    pub database_name: String,
    pub table_name: String,
    /// Empty means every role.
    #[serde(default)]
    pub allowed_roles: Vec<String>,
    #[serde(default)]
    pub columns: Vec<ColumnRule>,
}

impl TableRule {
    pub fn fully_qualified(&self) -> String {
        format!("{}.{}", self.database_name, self.table_name)
    }
}

fn role_permitted(allowed_roles: &[String], role: &str) -> bool {
    allowed_roles.is_empty() || allowed_roles.iter().any(|r| r == role)
}

/// Apply table and column role rules for one role.
pub fn resolve_for_role(rules: &[TableRule], role: &str) -> Allowlist {
    let mut allowlist = Allowlist::new();
    for rule in rules {
        if !role_permitted(&rule.allowed_roles, role) {
            continue;
        }
        let columns = rule
            .columns
            .iter()
            .filter(|c| role_permitted(&c.allowed_roles, role))
            .map(|c| c.column_name.clone());
        allowlist.insert_table(rule.fully_qualified(), columns);
    }
    allowlist
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(r: &[&str]) -> Vec<String> {
        r.iter().map(|s| s.to_string()).collect()
    }

    fn orders_rule() -> TableRule {
        TableRule {
            database_name: "analytics".to_string(),
            table_name: "orders".to_string(),
            allowed_roles: roles(&["admin", "finance", "sales"]),
            columns: vec![
                ColumnRule { column_name: "order_date".to_string(), allowed_roles: vec![] },
                ColumnRule { column_name: "revenue".to_string(), allowed_roles: roles(&["admin", "finance"]) },
                ColumnRule { column_name: "quantity".to_string(), allowed_roles: roles(&["sales"]) },
            ],
        }
    }

    #[test]
    fn test_resolve_for_role_filters_columns() {
        let rules = vec![orders_rule()];

        let finance = resolve_for_role(&rules, "finance");
        assert!(finance.allows_column("analytics.orders", "revenue"));
        assert!(!finance.allows_column("analytics.orders", "quantity"));

        let sales = resolve_for_role(&rules, "sales");
        assert!(sales.allows_column("analytics.orders", "quantity"));
        assert!(!sales.allows_column("analytics.orders", "revenue"));
    }

    #[test]
    fn test_table_roles_exclude() {
        let rules = vec![orders_rule()];
        assert!(resolve_for_role(&rules, "executive").is_empty());
    }

    #[test]
    fn test_table_without_visible_columns_is_dropped() {
        let rule = TableRule {
            database_name: "hr".to_string(),
            table_name: "salaries".to_string(),
            allowed_roles: vec![],
            columns: vec![ColumnRule { column_name: "salary".to_string(), allowed_roles: roles(&["admin"]) }],
        };
        let allowlist = resolve_for_role(&[rule], "sales");
        assert!(allowlist.is_empty());
        assert!(!allowlist.contains_table("hr.salaries"));
    }

    #[test]
    fn test_empty_column_set_is_not_stored() {
        let allowlist = Allowlist::from_tables(vec![
            ("analytics.orders", vec!["revenue"]),
            ("analytics.hidden", vec![]),
        ]);
        assert_eq!(allowlist.len(), 1);
        assert!(allowlist.columns("analytics.hidden").is_none());
    }

    #[test]
    fn test_split_table_name() {
        assert_eq!(split_table_name("analytics.orders"), Some(("analytics", "orders")));
        assert_eq!(split_table_name("orders"), None);
        assert_eq!(split_table_name(".orders"), None);
    }
}
