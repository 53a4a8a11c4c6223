//! Sparse fieldsets.
//!
//! Root fields are keyed by `""`, the root alias or the root table and make
//! the root query `DISTINCT`. Fields of included relations are applied while
//! planning includes, see [`super::include`].

use smol_str::SmolStr;
use std::collections::BTreeMap;
use tracing::debug;

use super::{operand_for, CompileContext};
use crate::entity::NameFormat;
use crate::format::{format_column, split_aggregate};
use crate::sql::{Operand, QualifiedColumn, QueryPlan, SelectItem, Selector};
use crate::token::ColumnReference;

/// Key under which `fields` holds the root entity's columns.
pub fn root_field_key<'f>(
    ctx: &CompileContext<'_>,
    fields: &'f BTreeMap<String, Vec<String>>,
) -> Option<&'f str> {
    ["", ctx.root_alias, ctx.entity.table_name.as_str(), ctx.entity.name.as_str()]
        .into_iter()
        .find_map(|k| fields.get_key_value(k).map(|(k, _)| k.as_str()))
}

/// Applies the root fieldset. Returns whether one was given.
///
/// `claimed` holds the keys already consumed by included relations.
pub fn apply_fields(
    ctx: &CompileContext<'_>,
    fields: &BTreeMap<String, Vec<String>>,
    claimed: &[String],
    plan: &mut QueryPlan,
) -> bool {
    let root_key = root_field_key(ctx, fields);
    for key in fields.keys() {
        if Some(key.as_str()) != root_key && !claimed.contains(key) {
            debug!(key = %key, "ignoring fields for unknown type");
        }
    }
    let Some(tokens) = root_key.and_then(|k| fields.get(k)) else {
        return false;
    };

    plan.distinct();
    for token in tokens {
        let (aggregate, inner) = split_aggregate(token);
        let reference = ctx.reference(inner);
        match ctx.operand(&reference) {
            Some(operand) => push_selection(plan, operand, aggregate, token),
            None => continue,
        }
    }
    true
}

/// Selects `tokens` from `alias`, formatted with `format`. Relation paths are ignored.
pub fn select_tokens(plan: &mut QueryPlan, alias: &str, tokens: &[String], format: &NameFormat) {
    for token in tokens {
        let formatted = format_column(token, format);
        let (aggregate, inner) = split_aggregate(&formatted);
        let reference = ColumnReference::parse(inner);
        if let Some(operand) = operand_for(&reference, alias) {
            push_selection(plan, operand, aggregate, token);
        }
    }
}

/// Plain columns of `alias` that must be selected in any case.
pub fn select_columns(plan: &mut QueryPlan, alias: &str, columns: &[SmolStr]) {
    for column in columns {
        plan.select(SelectItem::column(QualifiedColumn::new(Some(alias), column)));
    }
}

fn push_selection(
    plan: &mut QueryPlan,
    operand: Operand,
    aggregate: Option<crate::sql::Aggregate>,
    token: &str,
) {
    let operand = match operand {
        Operand::Cast(column, _) => Operand::Column(column),
        other => other,
    };
    match (operand, aggregate) {
        (Operand::Column(column), Some(agg)) if !column.is_wildcard() => {
            plan.select(Selector::new(column).set_aggregate(agg));
        }
        (Operand::Column(column), None) => {
            plan.select(SelectItem::column(column));
        }
        (Operand::Json(access), None) => {
            let alias = SmolStr::new(access.leaf().unwrap_or(access.column.column()));
            plan.select(SelectItem::Json { access, alias });
        }
        _ => debug!(token = %token, "dropping aggregate over wildcard or json path"),
    }
}
