use super::column::QualifiedColumn;
use super::dialect::SqlWriter;
use crate::error::Result;
use crate::value::DynamicValue;

#[derive(Debug, Clone, PartialEq)]
pub enum RightOperand {
    Column(QualifiedColumn),
    /// Bound as a parameter, never inlined.
    Value(DynamicValue),
}

/// One `left = right` condition of a join.
#[derive(Debug, Clone, PartialEq)]
pub struct OnClause {
    left: QualifiedColumn,
    right: RightOperand,
}

impl OnClause {
    /// `left = right` between two columns.
    pub fn columns(left: QualifiedColumn, right: QualifiedColumn) -> Self {
        Self {
            left,
            right: RightOperand::Column(right),
        }
    }

    /// `left = <bound value>`.
    pub fn value(left: QualifiedColumn, value: impl Into<DynamicValue>) -> Self {
        Self {
            left,
            right: RightOperand::Value(value.into()),
        }
    }

    pub fn write(&self, w: &mut SqlWriter<'_>) -> Result<()> {
        w.push_column(&self.left)?;
        w.push(" = ");
        match &self.right {
            RightOperand::Column(c) => w.push_column(c),
            RightOperand::Value(v) => {
                w.push_bind(v.clone());
                Ok(())
            }
        }
    }
}
