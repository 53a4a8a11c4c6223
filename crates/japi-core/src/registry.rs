use smol_str::SmolStr;
use std::collections::HashMap;
use std::sync::Arc;

use crate::entity::{EntityDescriptor, Validate};
use crate::error::{JapiError, Result};
use crate::relations::RelationSpec;

/// Read-only catalogue of entities, shareable across threads once built.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    entities: HashMap<SmolStr, Arc<EntityDescriptor>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and stores an entity under its name, replacing any previous one.
    pub fn register(&mut self, entity: EntityDescriptor) -> Result<&mut Self> {
        entity.validate()?;
        self.entities.insert(entity.name.clone(), Arc::new(entity));
        Ok(self)
    }

    pub fn with(mut self, entity: EntityDescriptor) -> Result<Self> {
        self.register(entity)?;
        Ok(self)
    }

    pub fn get_entity_by_name(&self, name: &str) -> Result<Arc<EntityDescriptor>> {
        self.entities
            .get(name)
            .cloned()
            .ok_or_else(|| JapiError::UnknownEntity(name.to_string()))
    }

    pub fn get_entity_by_table_name(&self, table_name: &str) -> Result<Arc<EntityDescriptor>> {
        self.entities
            .values()
            .find(|e| e.table_name == table_name)
            .cloned()
            .ok_or_else(|| JapiError::UnknownEntity(table_name.to_string()))
    }

    /// `resolve(entity, relation) -> RelationSpec | NotFound`, together with the target entity.
    pub fn resolve(
        &self,
        entity: &EntityDescriptor,
        relation: &str,
    ) -> Result<(RelationSpec, Arc<EntityDescriptor>)> {
        let spec = entity
            .relation(relation)
            .ok_or_else(|| JapiError::relation_not_found(entity.name.as_str(), relation))?;
        if spec.target.is_empty() {
            // morphTo has no static target
            return Ok((spec.clone(), Arc::new(EntityDescriptor::new("", ""))));
        }
        let target = self.get_entity_by_name(&spec.target)?;
        Ok((spec.clone(), target))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::new()
            .with(
                EntityDescriptor::new("person", "persons")
                    .with_relation("pets", RelationSpec::has_many("pet")),
            )
            .and_then(|r| r.with(EntityDescriptor::new("pet", "pets")))
            .unwrap()
    }

    #[test]
    fn lookup_by_name_and_table() {
        let r = registry();
        assert_eq!(r.get_entity_by_name("person").unwrap().table_name, "persons");
        assert_eq!(r.get_entity_by_table_name("pets").unwrap().name, "pet");
        assert!(matches!(
            r.get_entity_by_name("toy"),
            Err(JapiError::UnknownEntity(_))
        ));
    }

    #[test]
    fn resolve_relation_or_not_found() {
        let r = registry();
        let person = r.get_entity_by_name("person").unwrap();
        let (spec, target) = r.resolve(&person, "pets").unwrap();
        assert!(spec.kind.is_many());
        assert_eq!(target.table_name, "pets");
        assert!(matches!(
            r.resolve(&person, "toys"),
            Err(JapiError::RelationNotFound { .. })
        ));
    }
}
