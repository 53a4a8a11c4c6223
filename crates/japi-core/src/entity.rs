use heck::{ToLowerCamelCase, ToSnakeCase};
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::fmt;
use std::sync::Arc;

use crate::error::{JapiError, Result};
use crate::relations::RelationSpec;
use crate::sql::helpers::validate_segment;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Maps public attribute names to stored column names.
#[derive(Clone, Default)]
pub enum NameFormat {
    #[default]
    Identity,
    /// `firstName` -> `first_name`
    SnakeCase,
    /// `first_name` -> `firstName`
    CamelCase,
    Custom(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl NameFormat {
    pub fn custom(f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        NameFormat::Custom(Arc::new(f))
    }

    pub fn apply(&self, name: &str) -> String {
        match self {
            NameFormat::Identity => name.to_string(),
            NameFormat::SnakeCase => name.to_snake_case(),
            NameFormat::CamelCase => name.to_lower_camel_case(),
            NameFormat::Custom(f) => f(name),
        }
    }
}

impl fmt::Debug for NameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NameFormat::Identity => "Identity",
            NameFormat::SnakeCase => "SnakeCase",
            NameFormat::CamelCase => "CamelCase",
            NameFormat::Custom(_) => "Custom(..)",
        })
    }
}

/// Entity metadata: what table backs it and how it relates to others.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    pub name: SmolStr,          // logical name used for lookups (e.g., "person")
    pub table_name: SmolStr,    // DB table (e.g., "persons")
    pub id_attribute: SmolStr,  // primary key column
    pub format: NameFormat,
    relations: IndexMap<SmolStr, RelationSpec>,
}

impl EntityDescriptor {
    pub fn new(name: &str, table_name: &str) -> Self {
        Self {
            name: SmolStr::new(name),
            table_name: SmolStr::new(table_name),
            id_attribute: SmolStr::new("id"),
            format: NameFormat::Identity,
            relations: IndexMap::new(),
        }
    }

    pub fn with_id_attribute(mut self, id: &str) -> Self {
        self.id_attribute = SmolStr::new(id);
        self
    }

    pub fn with_format(mut self, format: NameFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_relation(mut self, name: &str, spec: RelationSpec) -> Self {
        self.relations.insert(SmolStr::new(name), spec);
        self
    }

    /// Lookup a relation by its public name.
    pub fn relation(&self, name: &str) -> Option<&RelationSpec> {
        self.relations.get(name)
    }
}

impl Validate for EntityDescriptor {
    fn validate(&self) -> Result<()> {
        validate_segment(&self.table_name)?;
        validate_segment(&self.id_attribute)?;
        for (name, spec) in &self.relations {
            validate_segment(name).map_err(|_| {
                JapiError::InvalidIdentifier(format!(
                    "relation `{name}` on `{}`",
                    self.name
                ))
            })?;
            spec.validate()?;
        }
        Ok(())
    }
}

impl fmt::Display for EntityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @{} [PK {}]", self.name, self.table_name, self.id_attribute)?;
        for (name, spec) in &self.relations {
            write!(f, " {name}: {} {}", spec.kind, spec.target)?;
        }
        Ok(())
    }
}
