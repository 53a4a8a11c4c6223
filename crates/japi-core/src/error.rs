//! Error types for japi core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JapiError {
    #[error("relation `{relation}` is not defined on `{entity}`")]
    RelationNotFound { entity: String, relation: String },

    #[error("relation `{relation}` of kind `{kind}` is not supported")]
    UnsupportedRelation { relation: String, kind: &'static str },

    #[error("unknown entity `{0}`")]
    UnknownEntity(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("invalid query plan: {0}")]
    InvalidPlan(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, JapiError>;

impl From<anyhow::Error> for JapiError {
    fn from(err: anyhow::Error) -> Self {
        JapiError::Execution(format!("{err:#}"))
    }
}

impl JapiError {
    pub fn relation_not_found(entity: impl Into<String>, relation: impl Into<String>) -> Self {
        JapiError::RelationNotFound {
            entity: entity.into(),
            relation: relation.into(),
        }
    }
}
