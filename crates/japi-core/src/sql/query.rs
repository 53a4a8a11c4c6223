use smol_str::SmolStr;
use std::fmt;
use tracing::warn;

use super::column::{Operand, QualifiedColumn};
use super::condition::{Condition, SortDirection};
use super::dialect::{Dialect, SqlWriter};
use super::helpers::validate_segment;
use super::on::OnClause;
use super::selector::SelectItem;
use crate::error::Result;
use crate::value::DynamicValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
}

impl JoinKind {
    fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::LeftOuter => "LEFT OUTER JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: SmolStr,
    pub alias: SmolStr,
    pub on: Vec<OnClause>,
}

impl Join {
    pub fn new(kind: JoinKind, table: &str, alias: &str, on: Vec<OnClause>) -> Self {
        Self {
            kind,
            table: SmolStr::new(table),
            alias: SmolStr::new(alias),
            on,
        }
    }

    fn write(&self, w: &mut SqlWriter<'_>) -> Result<()> {
        w.push(" ");
        w.push(self.kind.as_sql());
        w.push(" ");
        w.push_ident(&self.table)?;
        if self.alias != self.table {
            w.push(" AS ");
            w.push_ident(&self.alias)?;
        }
        w.push(" ON ");
        for (i, clause) in self.on.iter().enumerate() {
            if i > 0 {
                w.push(" AND ");
            }
            clause.write(w)?;
        }
        Ok(())
    }
}

/// The accumulated state of one relational query.
///
/// Built incrementally by the compiler and rendered once per dialect. Every
/// user-provided value ends up as a bind, never as SQL text.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    table: SmolStr,
    alias: Option<SmolStr>,
    distinct: bool,
    select: Vec<SelectItem>,
    joins: Vec<Join>,
    conditions: Vec<Condition>,
    group_by: Vec<QualifiedColumn>,
    order_by: Vec<(Operand, SortDirection)>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl QueryPlan {
    /// Creates an empty plan for a specific table.
    pub fn new(table: &str) -> Self {
        QueryPlan {
            table: SmolStr::new(table),
            alias: None,
            distinct: false,
            select: Vec::new(),
            joins: Vec::new(),
            conditions: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Name the table is referred to by in the rest of the query.
    pub fn alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    pub fn set_alias(&mut self, alias: &str) -> &mut Self {
        self.alias = (alias != self.table).then(|| SmolStr::new(alias));
        self
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.distinct = true;
        self
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn select(&mut self, item: impl Into<SelectItem>) -> &mut Self {
        let item = item.into();
        if !self.select.contains(&item) {
            self.select.push(item);
        }
        self
    }

    /// Adds `table.column` unless something already yields it.
    pub fn ensure_column(&mut self, table: &str, column: &str) -> &mut Self {
        if !self.select.is_empty() && !self.select.iter().any(|s| s.covers(table, column)) {
            self.select
                .push(SelectItem::column(QualifiedColumn::new(Some(table), column)));
        }
        self
    }

    pub fn selections(&self) -> &[SelectItem] {
        &self.select
    }

    pub fn has_selection(&self) -> bool {
        !self.select.is_empty()
    }

    pub fn has_join(&self, alias: &str) -> bool {
        self.joins.iter().any(|j| j.alias == alias)
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    /// Attaches a join once per alias. Returns `false` when the alias is taken.
    pub fn join(&mut self, join: Join) -> bool {
        if self.has_join(&join.alias) || join.alias == self.alias() {
            if self.joins.iter().all(|j| *j != join) {
                warn!(alias = %join.alias, table = %join.table, "join alias already in use, skipping");
            }
            return false;
        }
        self.joins.push(join);
        true
    }

    pub fn where_(&mut self, condition: Condition) -> &mut Self {
        self.conditions.push(condition);
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn group_by(&mut self, column: QualifiedColumn) -> &mut Self {
        self.group_by.push(column);
        self
    }

    pub fn order_by(&mut self, operand: impl Into<Operand>, direction: SortDirection) -> &mut Self {
        self.order_by.push((operand.into(), direction));
        self
    }

    pub fn orderings(&self) -> &[(Operand, SortDirection)] {
        &self.order_by
    }

    /// Limits the query to `count` rows.
    pub fn limit(&mut self, count: u64) -> &mut Self {
        self.limit = Some(count);
        self
    }

    /// Offsets the query by `count` rows.
    pub fn offset(&mut self, count: u64) -> &mut Self {
        self.offset = Some(count);
        self
    }

    pub fn clear_page(&mut self) -> &mut Self {
        self.limit = None;
        self.offset = None;
        self
    }

    fn write_body(&self, w: &mut SqlWriter<'_>) -> Result<()> {
        validate_segment(&self.table)?;
        w.push("SELECT ");
        if self.distinct {
            w.push("DISTINCT ");
        }
        if self.select.is_empty() {
            if self.joins.is_empty() {
                w.push("*");
            } else {
                // avoid ambiguity when joins exist
                w.push_column(&QualifiedColumn::wildcard(self.alias()))?;
            }
        } else {
            for (i, item) in self.select.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                item.write(w)?;
            }
        }

        w.push(" FROM ");
        w.push_ident(&self.table)?;
        if let Some(alias) = &self.alias {
            w.push(" AS ");
            w.push_ident(alias)?;
        }

        // JOINs (must come before WHERE)
        for j in &self.joins {
            j.write(w)?;
        }

        if !self.conditions.is_empty() {
            w.push(" WHERE ");
            for (i, cond) in self.conditions.iter().enumerate() {
                if i > 0 {
                    w.push(" AND ");
                }
                cond.write(w)?;
            }
        }

        if !self.group_by.is_empty() {
            w.push(" GROUP BY ");
            for (i, col) in self.group_by.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                w.push_column(col)?;
            }
        }
        Ok(())
    }

    /// Renders the full statement and its binds in placeholder order.
    pub fn to_sql(&self, dialect: &dyn Dialect) -> Result<(String, Vec<DynamicValue>)> {
        let mut w = SqlWriter::new(dialect);
        self.write_body(&mut w)?;

        if !self.order_by.is_empty() {
            w.push(" ORDER BY ");
            for (i, (operand, dir)) in self.order_by.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                operand.write(&mut w)?;
                w.push(" ");
                w.push(dir.as_sql());
            }
        }

        // LIMIT/OFFSET
        if let Some(l) = self.limit {
            w.push(" LIMIT ");
            w.push_bind(DynamicValue::from(i64::try_from(l).unwrap_or(i64::MAX)));
        }
        if let Some(o) = self.offset {
            if self.limit.is_none() && dialect.kind() != super::DialectKind::Postgres {
                // MySQL and SQLite need a LIMIT before OFFSET
                w.push(" LIMIT ");
                w.push_bind(DynamicValue::from(i64::MAX));
            }
            w.push(" OFFSET ");
            w.push_bind(DynamicValue::from(i64::try_from(o).unwrap_or(i64::MAX)));
        }

        Ok(w.finish())
    }

    /// `SELECT COUNT(*)` over this plan without ordering or paging.
    pub fn to_count_sql(&self, dialect: &dyn Dialect) -> Result<(String, Vec<DynamicValue>)> {
        let mut w = SqlWriter::new(dialect);
        w.push("SELECT COUNT(*) AS ");
        w.push_ident("count")?;
        w.push(" FROM (");
        self.write_body(&mut w)?;
        w.push(") AS ");
        w.push_ident("japi_count")?;
        Ok(w.finish())
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_sql(&super::dialect::Postgres) {
            Ok((sql, _)) => write!(f, "Query: {}", sql),
            Err(e) => write!(f, "Query: <error: {}>", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::condition::CompareOp;
    use crate::sql::dialect::{MySql, Postgres, Sqlite};

    fn col(t: &str, c: &str) -> QualifiedColumn {
        QualifiedColumn::new(Some(t), c)
    }

    #[test]
    fn bare_plan_selects_everything() -> anyhow::Result<()> {
        let plan = QueryPlan::new("persons");
        let (sql, binds) = plan.to_sql(&Sqlite)?;
        assert_eq!(sql, "SELECT * FROM \"persons\"");
        assert!(binds.is_empty());
        Ok(())
    }

    #[test]
    fn joins_qualify_the_wildcard() -> anyhow::Result<()> {
        let mut plan = QueryPlan::new("persons");
        plan.join(Join::new(
            JoinKind::LeftOuter,
            "pets",
            "pets",
            vec![OnClause::columns(col("persons", "id"), col("pets", "person_id"))],
        ));
        let (sql, _) = plan.to_sql(&MySql)?;
        assert_eq!(
            sql,
            "SELECT `persons`.* FROM `persons` LEFT OUTER JOIN `pets` ON `persons`.`id` = `pets`.`person_id`"
        );
        Ok(())
    }

    #[test]
    fn join_is_added_once_per_alias() {
        let mut plan = QueryPlan::new("persons");
        let join = Join::new(
            JoinKind::LeftOuter,
            "pets",
            "pets",
            vec![OnClause::columns(col("persons", "id"), col("pets", "person_id"))],
        );
        assert!(plan.join(join.clone()));
        assert!(!plan.join(join));
        assert_eq!(plan.joins().len(), 1);
    }

    #[test]
    fn full_statement_bind_order() -> anyhow::Result<()> {
        let mut plan = QueryPlan::new("persons");
        plan.set_alias("person")
            .distinct()
            .select(SelectItem::column(col("person", "first_name")))
            .where_(Condition::Compare(
                Operand::Column(col("person", "age")),
                CompareOp::Gt,
                20i64.into(),
            ))
            .where_(Condition::In(
                Operand::Column(col("person", "gender")),
                vec!["m".into(), "f".into()],
            ))
            .group_by(col("person", "first_name"))
            .order_by(col("person", "first_name"), SortDirection::Desc)
            .limit(10)
            .offset(20);

        let (sql, binds) = plan.to_sql(&Postgres)?;
        assert_eq!(
            sql,
            "SELECT DISTINCT \"person\".\"first_name\" FROM \"persons\" AS \"person\" \
             WHERE \"person\".\"age\" > $1 AND \"person\".\"gender\" IN ($2, $3) \
             GROUP BY \"person\".\"first_name\" ORDER BY \"person\".\"first_name\" DESC \
             LIMIT $4 OFFSET $5"
        );
        assert_eq!(binds.len(), 5);
        assert_eq!(binds[3], DynamicValue::from(10i64));
        assert_eq!(binds[4], DynamicValue::from(20i64));
        Ok(())
    }

    #[test]
    fn count_wraps_without_paging() -> anyhow::Result<()> {
        let mut plan = QueryPlan::new("persons");
        plan.where_(Condition::IsNotNull(Operand::Column(col("persons", "age"))))
            .order_by(col("persons", "age"), SortDirection::Asc)
            .limit(5);
        let (sql, binds) = plan.to_count_sql(&Sqlite)?;
        assert_eq!(
            sql,
            "SELECT COUNT(*) AS \"count\" FROM (SELECT * FROM \"persons\" WHERE \"persons\".\"age\" IS NOT NULL) AS \"japi_count\""
        );
        assert!(binds.is_empty());
        Ok(())
    }

    #[test]
    fn ensure_column_respects_wildcards_and_star() {
        let mut plan = QueryPlan::new("persons");
        plan.ensure_column("persons", "id");
        assert!(!plan.has_selection());

        plan.select(SelectItem::column(col("persons", "first_name")));
        plan.ensure_column("persons", "id");
        plan.ensure_column("persons", "id");
        assert_eq!(plan.selections().len(), 2);
    }

    #[test]
    fn oversized_paging_is_clamped() -> anyhow::Result<()> {
        let mut plan = QueryPlan::new("persons");
        plan.limit(u64::MAX).offset(u64::MAX);
        let (_, binds) = plan.to_sql(&Postgres)?;
        assert_eq!(binds, vec![DynamicValue::from(i64::MAX), DynamicValue::from(i64::MAX)]);
        Ok(())
    }

    #[test]
    fn invalid_table_is_rejected() {
        let plan = QueryPlan::new("persons; drop");
        assert!(plan.to_sql(&Sqlite).is_err());
    }
}
