//! Column operands: plain qualified columns and JSON sub-document accessors.

use smol_str::SmolStr;
use std::fmt;

use super::dialect::SqlWriter;
use super::helpers::validate_segment;
use crate::error::Result;
use crate::token::CastType;

/// `table.column`, `column` or `table.*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedColumn {
    table: Option<SmolStr>,
    column: SmolStr,
}

impl QualifiedColumn {
    pub fn new(table: Option<&str>, column: &str) -> Self {
        Self {
            table: table.map(SmolStr::new),
            column: SmolStr::new(column),
        }
    }

    pub fn wildcard(table: &str) -> Self {
        Self::new(Some(table), "*")
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn is_wildcard(&self) -> bool {
        self.column == "*"
    }

    /// Checks both segments without rendering.
    pub fn validate(&self) -> Result<()> {
        if let Some(t) = &self.table {
            validate_segment(t)?;
        }
        if self.is_wildcard() {
            Ok(())
        } else {
            validate_segment(&self.column)
        }
    }
}

impl fmt::Display for QualifiedColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(t) => write!(f, "{t}.{}", self.column),
            None => f.write_str(&self.column),
        }
    }
}

/// Text extracted from a JSON column, optionally cast.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonAccess {
    pub column: QualifiedColumn,
    pub path: Vec<SmolStr>,
    pub cast: Option<CastType>,
}

impl JsonAccess {
    pub fn leaf(&self) -> Option<&str> {
        self.path.last().map(SmolStr::as_str)
    }
}

/// Left-hand side of a predicate, ordering or selection.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(QualifiedColumn),
    /// Plain column cast to a type; values compared against it get the same cast.
    Cast(QualifiedColumn, CastType),
    Json(JsonAccess),
}

impl Operand {
    pub fn cast(&self) -> Option<CastType> {
        match self {
            Operand::Column(_) => None,
            Operand::Cast(_, cast) => Some(*cast),
            Operand::Json(j) => j.cast,
        }
    }

    pub fn write(&self, w: &mut SqlWriter<'_>) -> Result<()> {
        match self {
            Operand::Column(c) => w.push_column(c),
            Operand::Cast(c, cast) => {
                let (open, close) = w.dialect().cast(*cast);
                w.push(open);
                w.push_column(c)?;
                w.push(close);
                Ok(())
            }
            Operand::Json(j) => {
                let dialect = w.dialect();
                let cast = j.cast.map(|c| dialect.cast(c));
                if let Some((open, _)) = cast {
                    w.push(open);
                }
                dialect.write_json_extract(w, &j.column, &j.path)?;
                if let Some((_, close)) = cast {
                    w.push(close);
                }
                Ok(())
            }
        }
    }
}

impl From<QualifiedColumn> for Operand {
    fn from(c: QualifiedColumn) -> Self {
        Operand::Column(c)
    }
}

impl From<JsonAccess> for Operand {
    fn from(j: JsonAccess) -> Self {
        Operand::Json(j)
    }
}
