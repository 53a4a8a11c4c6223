//! Core compiler for japi: JSON:API style query parameters to relational query plans.

pub mod compile;
pub mod entity;
pub mod error;
pub mod fetch;
pub mod format;
pub mod options;
pub mod orchestrator;
pub mod params;
pub mod registry;
pub mod relations;
pub mod sql;
pub mod token;
pub mod value;

pub use error::*;

pub use compile::{EagerLoad, IncludePlan};
pub use entity::{EntityDescriptor, NameFormat, Validate};
pub use fetch::{FetchRequest, Fetched, Fetcher, Page, PageRequest, Pagination};
pub use options::PluginOptions;
pub use orchestrator::{CompiledQuery, FetchMode, JsonApi, JsonApiQuery};
pub use params::{IncludeRequest, PageParam, PageSpec, QueryParams};
pub use registry::Registry;
pub use relations::{RelationKind, RelationLink, RelationSpec};
pub use sql::{Dialect, DialectKind, QueryPlan};
pub use token::{CastType, ColumnReference};
pub use value::{DynamicValue, ObjectValue, ValueKind};
