//! Boolean predicate trees rendered into `WHERE` clauses.

use std::fmt;

use super::column::Operand;
use super::dialect::SqlWriter;
use crate::error::Result;
use crate::value::DynamicValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Lt,
    Gt,
    Lte,
    Gte,
}

impl CompareOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::Lte => "<=",
            CompareOp::Gte => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Conjunction; empty renders as a tautology.
    All(Vec<Condition>),
    /// Disjunction; empty renders as a contradiction.
    Any(Vec<Condition>),
    In(Operand, Vec<DynamicValue>),
    NotIn(Operand, Vec<DynamicValue>),
    IsNull(Operand),
    IsNotNull(Operand),
    /// Comparison against one bound value.
    Compare(Operand, CompareOp, DynamicValue),
    /// Case-insensitive substring match with `pattern` bound as-is.
    ContainsInsensitive(Operand, String),
}

impl Condition {
    /// Collapses single-child groups.
    pub fn simplify(self) -> Condition {
        match self {
            Condition::All(mut items) if items.len() == 1 => items.remove(0).simplify(),
            Condition::Any(mut items) if items.len() == 1 => items.remove(0).simplify(),
            Condition::All(items) => Condition::All(items.into_iter().map(Self::simplify).collect()),
            Condition::Any(items) => Condition::Any(items.into_iter().map(Self::simplify).collect()),
            other => other,
        }
    }

    pub fn write(&self, w: &mut SqlWriter<'_>) -> Result<()> {
        match self {
            Condition::All(items) => write_group(w, items, " AND ", "1 = 1"),
            Condition::Any(items) => write_group(w, items, " OR ", "1 = 0"),
            Condition::In(_, values) if values.is_empty() => {
                w.push("1 = 0");
                Ok(())
            }
            Condition::NotIn(_, values) if values.is_empty() => {
                w.push("1 = 1");
                Ok(())
            }
            Condition::In(op, values) => {
                op.write(w)?;
                w.push(" IN (");
                w.push_bind_list(values, op.cast());
                w.push(")");
                Ok(())
            }
            Condition::NotIn(op, values) => {
                op.write(w)?;
                w.push(" NOT IN (");
                w.push_bind_list(values, op.cast());
                w.push(")");
                Ok(())
            }
            Condition::IsNull(op) => {
                op.write(w)?;
                w.push(" IS NULL");
                Ok(())
            }
            Condition::IsNotNull(op) => {
                op.write(w)?;
                w.push(" IS NOT NULL");
                Ok(())
            }
            Condition::Compare(op, cmp, value) => {
                op.write(w)?;
                w.push(" ");
                w.push(cmp.as_sql());
                w.push(" ");
                w.push_cast_bind(value.clone(), op.cast());
                Ok(())
            }
            Condition::ContainsInsensitive(op, pattern) => {
                let dialect = w.dialect();
                let (open, close) = dialect.text_cast();
                if dialect.native_ilike() {
                    w.push(open);
                    op.write(w)?;
                    w.push(close);
                    w.push(" ILIKE ");
                    w.push_bind(DynamicValue::from(pattern.as_str()));
                } else {
                    w.push("LOWER(");
                    w.push(open);
                    op.write(w)?;
                    w.push(close);
                    w.push(") LIKE LOWER(");
                    w.push_bind(DynamicValue::from(pattern.as_str()));
                    w.push(")");
                }
                Ok(())
            }
        }
    }
}

fn write_group(w: &mut SqlWriter<'_>, items: &[Condition], sep: &str, empty: &str) -> Result<()> {
    if items.is_empty() {
        w.push(empty);
        return Ok(());
    }
    w.push("(");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            w.push(sep);
        }
        item.write(w)?;
    }
    w.push(")");
    Ok(())
}
