use indexmap::IndexMap;
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::debug;

use crate::entity::EntityDescriptor;
use crate::error::Result;
use crate::registry::Registry;
use crate::sql::QueryPlan;

use super::resolver::ResolvedRelation;
use super::types::RelationKind;

/// Prefix tree of relation paths that need a join. One node per path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyNode {
    children: IndexMap<SmolStr, DependencyNode>,
}

impl DependencyNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &DependencyNode)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Inserts `path` when every segment is a relation of the entity before it.
    ///
    /// Returns `false` and leaves the tree untouched otherwise.
    pub fn insert_path(
        &mut self,
        registry: &Registry,
        root: &EntityDescriptor,
        path: &[SmolStr],
    ) -> bool {
        if path.is_empty() {
            return true;
        }
        if !Self::is_valid_path(registry, root, path) {
            debug!(path = %path.join("."), entity = %root.name, "dropping unknown relation path");
            return false;
        }
        let mut level = self;
        for seg in path {
            level = level.children.entry(seg.clone()).or_default();
        }
        true
    }

    fn is_valid_path(registry: &Registry, root: &EntityDescriptor, path: &[SmolStr]) -> bool {
        let mut current = registry
            .get_entity_by_name(&root.name)
            .unwrap_or_else(|_| Arc::new(root.clone()));
        for (i, seg) in path.iter().enumerate() {
            let Some(spec) = current.relation(seg) else {
                return false;
            };
            if spec.kind == RelationKind::MorphTo {
                // no static target to walk into; resolution reports it
                return i + 1 == path.len();
            }
            match registry.get_entity_by_name(&spec.target) {
                Ok(next) => current = next,
                Err(_) => return false,
            }
        }
        true
    }

    pub fn contains(&self, path: &[SmolStr]) -> bool {
        let mut level = self;
        for seg in path {
            match level.children.get(seg) {
                Some(next) => level = next,
                None => return false,
            }
        }
        true
    }

    /// Attaches the joins of every node depth-first, each alias chained off its parent's.
    pub fn attach(
        &self,
        registry: &Registry,
        parent: &EntityDescriptor,
        parent_alias: &str,
        plan: &mut QueryPlan,
    ) -> Result<()> {
        for (name, child) in &self.children {
            let relation = ResolvedRelation::resolve(registry, parent, name)?;
            for join in relation.joins(parent_alias)? {
                plan.join(join);
            }
            child.attach(registry, &relation.target, name, plan)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JapiError;
    use crate::relations::RelationSpec;
    use crate::sql::dialect::Sqlite;

    fn registry() -> Registry {
        let mut r = Registry::new();
        r.register(
            EntityDescriptor::new("person", "persons")
                .with_relation("pets", RelationSpec::has_many("pet"))
                .with_relation("subject", RelationSpec::morph_to("subject")),
        )
        .unwrap();
        r.register(
            EntityDescriptor::new("pet", "pets")
                .with_relation("toy", RelationSpec::has_one("toy").foreign_key("pet_id")),
        )
        .unwrap();
        r.register(EntityDescriptor::new("toy", "toys")).unwrap();
        r
    }

    fn path(p: &str) -> Vec<SmolStr> {
        p.split('.').map(SmolStr::new).collect()
    }

    #[test]
    fn invalid_paths_are_ignored() {
        let r = registry();
        let person = r.get_entity_by_name("person").unwrap();
        let mut tree = DependencyNode::new();
        assert!(!tree.insert_path(&r, &person, &path("pets.bogus")));
        assert!(!tree.insert_path(&r, &person, &path("owner")));
        assert!(tree.is_empty());
    }

    #[test]
    fn shared_prefixes_join_once() -> anyhow::Result<()> {
        let r = registry();
        let person = r.get_entity_by_name("person").unwrap();
        let mut tree = DependencyNode::new();
        assert!(tree.insert_path(&r, &person, &path("pets")));
        assert!(tree.insert_path(&r, &person, &path("pets.toy")));
        assert!(tree.insert_path(&r, &person, &path("pets")));
        assert!(tree.contains(&path("pets.toy")));

        let mut plan = QueryPlan::new("persons");
        tree.attach(&r, &person, "persons", &mut plan)?;
        tree.attach(&r, &person, "persons", &mut plan)?;
        let (sql, _) = plan.to_sql(&Sqlite)?;
        assert_eq!(
            sql,
            "SELECT \"persons\".* FROM \"persons\" \
             LEFT OUTER JOIN \"pets\" ON \"persons\".\"id\" = \"pets\".\"person_id\" \
             LEFT OUTER JOIN \"toys\" AS \"toy\" ON \"pets\".\"id\" = \"toy\".\"pet_id\""
        );
        Ok(())
    }

    #[test]
    fn morph_to_fails_on_attach() {
        let r = registry();
        let person = r.get_entity_by_name("person").unwrap();
        let mut tree = DependencyNode::new();
        assert!(tree.insert_path(&r, &person, &path("subject")));
        let mut plan = QueryPlan::new("persons");
        assert!(matches!(
            tree.attach(&r, &person, "persons", &mut plan),
            Err(JapiError::UnsupportedRelation { .. })
        ));
    }
}
