//! `japi`: convenience façade over `japi-core`, `japi-shared` and `japi-sqlx`.

#![deny(missing_docs)]

/// Re-export **everything** from japi-core at the crate root, so users can `use japi::*;`.
#[doc(inline)]
pub use japi_core::*;

/// Also expose japi-core as a nested module for `japi::core::...` paths.
pub use japi_core as core;

/// Configuration loading and logging/metrics setup.
pub use japi_shared as shared;

pub use japi_shared::{init_logging, JapiConfig};

/// sqlx execution layer, available with feature `sqlx` (on by default).
#[cfg(feature = "sqlx")]
pub use japi_sqlx as sqlx;

#[cfg(feature = "sqlx")]
#[doc(inline)]
pub use japi_sqlx::{ConnectionManager, SqlxFetcher};

/// The types most callers need to compile and run a fetch.
pub mod prelude {
    pub use japi_core::{
        EntityDescriptor, Fetched, Fetcher, JapiError, JsonApi, NameFormat, PageSpec,
        PluginOptions, QueryParams, Registry, RelationSpec,
    };

    #[cfg(feature = "sqlx")]
    pub use japi_sqlx::SqlxFetcher;
}
