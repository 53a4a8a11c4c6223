//! Relation metadata, join resolution and the dependency tree of joined relations.

pub mod graph;
pub mod helpers;
pub mod resolver;
pub mod types;

pub use graph::DependencyNode;
pub use resolver::{Morph, Pivot, RelationLink, ResolvedRelation};
pub use types::{MorphSpec, RelationKind, RelationSpec};
