//! Eager loading of included relations and stitching into parent rows.
//!
//! Loads run parents first: each child query is restricted to the link
//! values found on the rows of its parent and carries the matched value
//! under [`LINK_COLUMN`]. Stitching then runs deepest first, so a row is
//! complete before it is nested into its own parent.

use anyhow::{Context, Result};
use japi_core::sql::{Condition, Dialect, Operand, Selector};
use japi_core::{DynamicValue, EagerLoad, ObjectValue};
use japi_shared::QueryMetrics;
use sqlx::AnyPool;
use std::collections::HashMap;
use tracing::debug;

use crate::row::{build_query, decode_row};

/// Column each child row carries the parent link value in; removed before nesting.
pub const LINK_COLUMN: &str = "__japi_link";

/// Distinct, non-null values of `column` across `rows`, in first-seen order.
fn link_values(rows: &[ObjectValue], column: &str) -> Vec<DynamicValue> {
    let mut seen = Vec::new();
    let mut values = Vec::new();
    for value in rows.iter().filter_map(|r| r.get(column)) {
        if let Some(key) = value.link_key() {
            if !seen.contains(&key) {
                seen.push(key);
                values.push(value.clone());
            }
        }
    }
    values
}

async fn load(
    pool: &AnyPool,
    dialect: &dyn Dialect,
    include: &EagerLoad,
    parents: &[ObjectValue],
) -> Result<Vec<ObjectValue>> {
    let values = link_values(parents, &include.link.parent_column);
    if values.is_empty() {
        debug!(path = %include.path, "no parent values, skipping eager load");
        return Ok(Vec::new());
    }

    let mut plan = include.query.clone();
    plan.where_(Condition::In(
        Operand::Column(include.link.child_key.clone()),
        values,
    ))
    .select(Selector::new(include.link.child_key.clone()).set_alias(LINK_COLUMN));

    let (sql, binds) = plan.to_sql(dialect)?;
    debug!(path = %include.path, sql = %sql, binds = binds.len(), "eager load");
    let rows = build_query(&sql, &binds)?
        .fetch_all(pool)
        .await
        .with_context(|| format!("eager load `{}` failed: {sql}", include.path))?;
    QueryMetrics::eager_load(&include.path);

    rows.iter().map(decode_row).collect()
}

fn stitch(include: &EagerLoad, children: Vec<ObjectValue>, parents: &mut [ObjectValue]) {
    let mut groups: HashMap<String, Vec<ObjectValue>> = HashMap::new();
    for mut child in children {
        let key = child.remove(LINK_COLUMN).and_then(|v| v.link_key());
        if let Some(key) = key {
            groups.entry(key).or_default().push(child);
        }
    }

    for parent in parents.iter_mut() {
        let matched = parent
            .get(&include.link.parent_column)
            .and_then(DynamicValue::link_key)
            .and_then(|k| groups.get(&k));
        let value = match (include.link.many, matched) {
            (true, Some(rows)) => {
                DynamicValue::from_seq(rows.iter().cloned().map(DynamicValue::from).collect())
            }
            (true, None) => DynamicValue::from_seq(Vec::new()),
            (false, Some(rows)) => rows
                .first()
                .cloned()
                .map(DynamicValue::from)
                .unwrap_or_else(DynamicValue::none),
            (false, None) => DynamicValue::none(),
        };
        parent.insert(include.name.clone(), value);
    }
}

/// Runs every load for `roots` and nests the results in place.
pub async fn load_includes(
    pool: &AnyPool,
    dialect: &dyn Dialect,
    includes: &[EagerLoad],
    roots: &mut [ObjectValue],
) -> Result<()> {
    if includes.is_empty() || roots.is_empty() {
        return Ok(());
    }

    let mut loaded: HashMap<&str, Vec<ObjectValue>> = HashMap::new();
    for include in includes {
        let rows = match include.parent_path.as_deref() {
            None => load(pool, dialect, include, roots).await?,
            Some(parent) => {
                let parents = loaded.get(parent).map(Vec::as_slice).unwrap_or_default();
                load(pool, dialect, include, parents).await?
            }
        };
        loaded.insert(include.path.as_str(), rows);
    }

    for include in includes.iter().rev() {
        let children = loaded.remove(include.path.as_str()).unwrap_or_default();
        match include.parent_path.as_deref() {
            None => stitch(include, children, roots),
            Some(parent) => {
                if let Some(parents) = loaded.get_mut(parent) {
                    stitch(include, children, parents);
                }
            }
        }
    }
    Ok(())
}
