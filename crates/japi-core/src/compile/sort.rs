use tracing::debug;

use super::{operand_for, CompileContext};
use crate::sql::{Operand, QueryPlan, SortDirection};

/// Adds `ORDER BY` entries; a leading `-` sorts descending.
pub fn compile_sort(ctx: &CompileContext<'_>, tokens: &[String], plan: &mut QueryPlan) {
    let descending: Vec<String> = tokens
        .iter()
        .filter_map(|t| t.strip_prefix('-'))
        .map(|t| ctx.reference(t).to_string())
        .collect();

    for token in tokens {
        let stripped = token.strip_prefix('-').unwrap_or(token);
        let reference = ctx.reference(stripped);
        // a column listed with `-` anywhere sorts descending everywhere
        let direction = if descending.contains(&reference.to_string()) {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        };
        if let Some(operand) = ctx.operand(&reference) {
            plan.order_by(operand, direction);
        }
    }
}

/// Adds `GROUP BY` columns. JSON tokens cannot be grouped on and are dropped.
pub fn compile_group(ctx: &CompileContext<'_>, tokens: &[String], plan: &mut QueryPlan) {
    for token in tokens {
        let reference = ctx.reference(token);
        if !ctx.is_reachable(&reference) {
            debug!(token = %token, "dropping group on unknown relation path");
            continue;
        }
        match operand_for(&reference, reference.table_alias(ctx.root_alias)) {
            Some(Operand::Column(column)) | Some(Operand::Cast(column, _)) => {
                plan.group_by(column);
            }
            Some(Operand::Json(_)) => debug!(token = %token, "dropping group on json path"),
            None => {}
        }
    }
}
