//! Configuration and observability shared by the japi crates

pub mod config;
pub mod observability;

pub use config::*;
pub use observability::*;
