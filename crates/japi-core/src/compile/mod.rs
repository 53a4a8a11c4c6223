//! Compilers turning parameter entries into query plan clauses.
//!
//! Every compiler resolves tokens through a [`CompileContext`]: the token is
//! formatted, parsed and qualified against the root alias, and entries whose
//! relation path is not joined or whose identifiers are invalid are dropped.

pub mod fields;
pub mod filter;
pub mod include;
pub mod sort;

use tracing::debug;

use crate::entity::EntityDescriptor;
use crate::format::format_column;
use crate::options::PluginOptions;
use crate::registry::Registry;
use crate::relations::DependencyNode;
use crate::sql::{JsonAccess, Operand, QualifiedColumn};
use crate::token::ColumnReference;

pub use fields::apply_fields;
pub use filter::{FilterNode, FilterOperator, FilterValue};
pub use include::{plan_includes, EagerLoad, IncludePlan};
pub use sort::{compile_group, compile_sort};

pub struct CompileContext<'a> {
    pub registry: &'a Registry,
    pub entity: &'a EntityDescriptor,
    pub root_alias: &'a str,
    pub options: &'a PluginOptions,
    pub dependencies: DependencyNode,
}

impl<'a> CompileContext<'a> {
    pub fn new(
        registry: &'a Registry,
        entity: &'a EntityDescriptor,
        root_alias: &'a str,
        options: &'a PluginOptions,
    ) -> Self {
        Self {
            registry,
            entity,
            root_alias,
            options,
            dependencies: DependencyNode::new(),
        }
    }

    /// Formats and parses a token with the root entity's name format.
    pub fn reference(&self, token: &str) -> ColumnReference {
        ColumnReference::parse(&format_column(token, &self.entity.format))
    }

    /// Records the relation path of `token` in the dependency tree.
    pub fn add_dependency(&mut self, token: &str) {
        let reference = self.reference(token);
        if reference.has_relation() {
            self.dependencies
                .insert_path(self.registry, self.entity, &reference.relation_path);
        }
    }

    /// Whether the relation path of `reference` is joined.
    pub fn is_reachable(&self, reference: &ColumnReference) -> bool {
        !reference.has_relation() || self.dependencies.contains(&reference.relation_path)
    }

    /// The qualified operand for a reference, `None` when it cannot be used.
    pub fn operand(&self, reference: &ColumnReference) -> Option<Operand> {
        if !self.is_reachable(reference) {
            debug!(token = %reference, "dropping entry on unknown relation path");
            return None;
        }
        operand_for(reference, reference.table_alias(self.root_alias))
    }
}

/// Operand for `reference` read from `table`; `None` when an identifier is invalid.
pub fn operand_for(reference: &ColumnReference, table: &str) -> Option<Operand> {
    let column = QualifiedColumn::new(Some(table), &reference.column);
    if let Err(err) = column.validate() {
        debug!(token = %reference, error = %err, "dropping entry with invalid identifier");
        return None;
    }
    Some(match (&reference.json_path, reference.cast) {
        (Some(path), cast) => Operand::Json(JsonAccess {
            column,
            path: path.clone(),
            cast,
        }),
        (None, Some(cast)) => Operand::Cast(column, cast),
        (None, None) => Operand::Column(column),
    })
}
