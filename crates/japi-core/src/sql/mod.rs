//! Relational query plan and its rendering into dialect-specific SQL.

pub mod column;
pub mod condition;
pub mod dialect;
pub mod helpers;
pub mod on;
pub mod query;
pub mod selector;

pub use column::{JsonAccess, Operand, QualifiedColumn};
pub use condition::{CompareOp, Condition, SortDirection};
pub use dialect::{Dialect, DialectKind, MySql, Postgres, SqlWriter, Sqlite};
pub use on::{OnClause, RightOperand};
pub use query::{Join, JoinKind, QueryPlan};
pub use selector::{Aggregate, SelectItem, Selector};
