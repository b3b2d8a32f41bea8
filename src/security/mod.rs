//! Access control: role-scoped allowlists, the restricted-metric check and
//! the SQL guardrail.

pub mod allowlist;
pub mod restricted_metric;
pub mod sql_validator;

pub use allowlist::{resolve_for_role, AccessPolicy, Allowlist, ColumnRule, TableRule};
pub use restricted_metric::{is_restricted_metric_request, tally_metric_hits, MetricHits};
pub use sql_validator::{validate_sql, ValidationRejection};
