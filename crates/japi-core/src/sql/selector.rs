use std::{fmt, str::FromStr};

use smol_str::SmolStr;

use super::column::{JsonAccess, QualifiedColumn};
use super::dialect::SqlWriter;
use crate::error::{JapiError, Result};

/// Aggregate wrapper accepted in sparse fieldsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    Sum,
    Avg,
    Max,
    Min,
}

impl Aggregate {
    pub fn name(self) -> &'static str {
        match self {
            Aggregate::Count => "count",
            Aggregate::Sum => "sum",
            Aggregate::Avg => "avg",
            Aggregate::Max => "max",
            Aggregate::Min => "min",
        }
    }
}

impl FromStr for Aggregate {
    type Err = JapiError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "count" => Ok(Aggregate::Count),
            "sum" => Ok(Aggregate::Sum),
            "avg" => Ok(Aggregate::Avg),
            "max" => Ok(Aggregate::Max),
            "min" => Ok(Aggregate::Min),
            _ => Err(JapiError::InvalidPlan(format!("unknown aggregate `{s}`"))),
        }
    }
}

#[derive(Clone, PartialEq)]
pub struct Selector {
    column: QualifiedColumn,
    alias: Option<SmolStr>,
    aggregate: Option<Aggregate>,
}

impl Selector {
    pub fn new(column: QualifiedColumn) -> Self {
        Selector {
            column,
            alias: None,
            aggregate: None,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.column.table()
    }

    pub fn column(&self) -> &str {
        self.column.column()
    }

    pub fn qualified(&self) -> &QualifiedColumn {
        &self.column
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn aggregate(&self) -> Option<Aggregate> {
        self.aggregate
    }

    pub fn set_alias(mut self, alias: &str) -> Self {
        self.alias = Some(SmolStr::new(alias));
        self
    }

    /// Wraps the column in `agg(..)`, aliased to the function name unless aliased already.
    pub fn set_aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = Some(aggregate);
        if self.alias.is_none() {
            self.alias = Some(SmolStr::new(aggregate.name()));
        }
        self
    }

    pub fn write(&self, w: &mut SqlWriter<'_>) -> Result<()> {
        if self.column.is_wildcard() && (self.alias.is_some() || self.aggregate.is_some()) {
            return Err(JapiError::InvalidPlan(
                "cannot alias or aggregate a wildcard selector".into(),
            ));
        }
        match self.aggregate {
            Some(agg) => {
                w.push(&agg.name().to_ascii_uppercase());
                w.push("(");
                w.push_column(&self.column)?;
                w.push(")");
            }
            None => w.push_column(&self.column)?,
        }
        if let Some(alias) = &self.alias {
            w.push(" AS ");
            w.push_ident(alias)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector")
            .field("source", &self.source())
            .field("column", &self.column())
            .field("alias", &self.alias())
            .field("aggregate", &self.aggregate)
            .finish()
    }
}

/// One entry of a `SELECT` list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Column(Selector),
    /// JSON extraction, aliased to the leaf key of the path.
    Json { access: JsonAccess, alias: SmolStr },
}

impl SelectItem {
    pub fn column(column: QualifiedColumn) -> Self {
        SelectItem::Column(Selector::new(column))
    }

    pub fn write(&self, w: &mut SqlWriter<'_>) -> Result<()> {
        match self {
            SelectItem::Column(sel) => sel.write(w),
            SelectItem::Json { access, alias } => {
                super::column::Operand::Json(access.clone()).write(w)?;
                w.push(" AS ");
                w.push_ident(alias)
            }
        }
    }

    /// True when this item yields `column` of `table` unchanged.
    pub fn covers(&self, table: &str, column: &str) -> bool {
        match self {
            SelectItem::Column(sel) => {
                sel.aggregate().is_none()
                    && sel.source() == Some(table)
                    && (sel.qualified().is_wildcard()
                        || (sel.column() == column && sel.alias().map_or(true, |a| a == column)))
            }
            SelectItem::Json { .. } => false,
        }
    }
}

impl From<Selector> for SelectItem {
    fn from(sel: Selector) -> Self {
        SelectItem::Column(sel)
    }
}
