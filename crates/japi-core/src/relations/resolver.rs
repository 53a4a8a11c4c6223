use smol_str::SmolStr;
use std::sync::Arc;

use crate::entity::EntityDescriptor;
use crate::error::{JapiError, Result};
use crate::registry::Registry;
use crate::sql::{Condition, Join, JoinKind, OnClause, Operand, QualifiedColumn, QueryPlan};

use super::helpers::{default_join_table, default_key, pivot_alias, singularize, through_alias};
use super::types::RelationKind;

/// Intermediate table between parent and target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pivot {
    pub table: SmolStr,
    pub alias: SmolStr,
    /// Pivot column matched against the parent.
    pub parent_column: SmolStr,
    /// Pivot column matched against the target.
    pub target_column: SmolStr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Morph {
    pub type_column: SmolStr,
    pub id_column: SmolStr,
    pub value: SmolStr,
}

/// How parent rows and eager-loaded child rows are matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationLink {
    /// Column of the parent row holding the link value.
    pub parent_column: SmolStr,
    /// Column of the child query matched against the parent values.
    pub child_key: QualifiedColumn,
    pub many: bool,
}

/// A relation with every default key filled in.
#[derive(Debug, Clone)]
pub struct ResolvedRelation {
    pub name: SmolStr,
    pub kind: RelationKind,
    pub target: Arc<EntityDescriptor>,
    pub parent_id: SmolStr,
    pub target_id: SmolStr,
    pub foreign_key: SmolStr,
    pub pivot: Option<Pivot>,
    pub morph: Option<Morph>,
}

impl ResolvedRelation {
    /// Looks `name` up on `parent` and fills in the naming defaults.
    pub fn resolve(registry: &Registry, parent: &EntityDescriptor, name: &str) -> Result<Self> {
        let (spec, target) = registry.resolve(parent, name)?;
        if spec.kind == RelationKind::MorphTo {
            return Err(JapiError::UnsupportedRelation {
                relation: name.to_string(),
                kind: spec.kind.as_str(),
            });
        }

        let parent_id = spec
            .parent_id_attribute
            .clone()
            .unwrap_or_else(|| parent.id_attribute.clone());
        let target_id = spec
            .target_id_attribute
            .clone()
            .unwrap_or_else(|| target.id_attribute.clone());

        let foreign_key = match (&spec.foreign_key, spec.kind) {
            (Some(fk), _) => fk.clone(),
            (None, RelationKind::BelongsTo) => default_key(&target.table_name, &target_id).into(),
            (None, _) => default_key(&parent.table_name, &parent_id).into(),
        };

        let pivot = match spec.kind {
            RelationKind::BelongsTo => spec.through_table.as_ref().map(|through| Pivot {
                table: through.clone(),
                alias: through_alias(name, through).into(),
                parent_column: spec
                    .through_id_attribute
                    .clone()
                    .unwrap_or_else(|| SmolStr::new("id")),
                target_column: foreign_key.clone(),
            }),
            RelationKind::BelongsToMany => {
                let table: SmolStr = spec.through_table.clone().unwrap_or_else(|| {
                    default_join_table(&parent.table_name, &target.table_name).into()
                });
                Some(Pivot {
                    alias: pivot_alias(name, &table).into(),
                    parent_column: foreign_key.clone(),
                    target_column: spec.other_key.clone().unwrap_or_else(|| {
                        format!("{}_id", singularize(&target.table_name)).into()
                    }),
                    table,
                })
            }
            _ => None,
        };

        let morph = spec.morph.as_ref().filter(|_| spec.kind.is_morph()).map(|m| Morph {
            type_column: m
                .type_column
                .clone()
                .unwrap_or_else(|| format!("{}_type", m.name).into()),
            id_column: m
                .id_column
                .clone()
                .unwrap_or_else(|| format!("{}_id", m.name).into()),
            value: m.value.clone().unwrap_or_else(|| parent.table_name.clone()),
        });

        Ok(Self {
            name: SmolStr::new(name),
            kind: spec.kind,
            target,
            parent_id,
            target_id,
            foreign_key,
            pivot,
            morph,
        })
    }

    fn col(table: &str, column: &str) -> QualifiedColumn {
        QualifiedColumn::new(Some(table), column)
    }

    fn morph_parts(&self) -> Result<&Morph> {
        self.morph.as_ref().ok_or_else(|| {
            JapiError::InvalidPlan(format!("morph relation `{}` has no morph name", self.name))
        })
    }

    /// Left outer joins reaching this relation from `parent_alias`, aliased to the relation name.
    pub fn joins(&self, parent_alias: &str) -> Result<Vec<Join>> {
        let name = self.name.as_str();
        let table = self.target.table_name.as_str();
        let joins = match (self.kind, &self.pivot) {
            (RelationKind::HasOne | RelationKind::HasMany, _) => vec![Join::new(
                JoinKind::LeftOuter,
                table,
                name,
                vec![OnClause::columns(
                    Self::col(parent_alias, &self.parent_id),
                    Self::col(name, &self.foreign_key),
                )],
            )],
            (RelationKind::BelongsTo, None) => vec![Join::new(
                JoinKind::LeftOuter,
                table,
                name,
                vec![OnClause::columns(
                    Self::col(parent_alias, &self.foreign_key),
                    Self::col(name, &self.target_id),
                )],
            )],
            (RelationKind::BelongsTo | RelationKind::BelongsToMany, Some(pivot)) => vec![
                Join::new(
                    JoinKind::LeftOuter,
                    &pivot.table,
                    &pivot.alias,
                    vec![OnClause::columns(
                        Self::col(parent_alias, &self.parent_id),
                        Self::col(&pivot.alias, &pivot.parent_column),
                    )],
                ),
                Join::new(
                    JoinKind::LeftOuter,
                    table,
                    name,
                    vec![OnClause::columns(
                        Self::col(&pivot.alias, &pivot.target_column),
                        Self::col(name, &self.target_id),
                    )],
                ),
            ],
            (RelationKind::MorphOne | RelationKind::MorphMany, _) => {
                let morph = self.morph_parts()?;
                vec![Join::new(
                    JoinKind::LeftOuter,
                    table,
                    name,
                    vec![
                        OnClause::columns(
                            Self::col(name, &morph.id_column),
                            Self::col(parent_alias, &self.parent_id),
                        ),
                        OnClause::value(
                            Self::col(name, &morph.type_column),
                            morph.value.as_str(),
                        ),
                    ],
                )]
            }
            (kind, _) => {
                return Err(JapiError::UnsupportedRelation {
                    relation: self.name.to_string(),
                    kind: kind.as_str(),
                })
            }
        };
        Ok(joins)
    }

    /// Base query for eager loading this relation, plus how its rows link back.
    pub fn child_plan(&self) -> Result<(QueryPlan, RelationLink)> {
        let name = self.name.as_str();
        let mut plan = QueryPlan::new(&self.target.table_name);
        plan.set_alias(name);
        let many = self.kind.is_many();

        let link = match (self.kind, &self.pivot) {
            (RelationKind::HasOne | RelationKind::HasMany, _) => RelationLink {
                parent_column: self.parent_id.clone(),
                child_key: Self::col(name, &self.foreign_key),
                many,
            },
            (RelationKind::BelongsTo, None) => RelationLink {
                parent_column: self.foreign_key.clone(),
                child_key: Self::col(name, &self.target_id),
                many,
            },
            (RelationKind::BelongsTo | RelationKind::BelongsToMany, Some(pivot)) => {
                plan.join(Join::new(
                    JoinKind::Inner,
                    &pivot.table,
                    &pivot.alias,
                    vec![OnClause::columns(
                        Self::col(&pivot.alias, &pivot.target_column),
                        Self::col(name, &self.target_id),
                    )],
                ));
                RelationLink {
                    parent_column: self.parent_id.clone(),
                    child_key: Self::col(&pivot.alias, &pivot.parent_column),
                    many,
                }
            }
            (RelationKind::MorphOne | RelationKind::MorphMany, _) => {
                let morph = self.morph_parts()?;
                plan.where_(Condition::In(
                    Operand::Column(Self::col(name, &morph.type_column)),
                    vec![morph.value.as_str().into()],
                ));
                RelationLink {
                    parent_column: self.parent_id.clone(),
                    child_key: Self::col(name, &morph.id_column),
                    many,
                }
            }
            (kind, _) => {
                return Err(JapiError::UnsupportedRelation {
                    relation: self.name.to_string(),
                    kind: kind.as_str(),
                })
            }
        };
        Ok((plan, link))
    }

    /// Column the parent row must carry for this relation to be stitched.
    pub fn parent_required_column(&self) -> &str {
        match (self.kind, &self.pivot) {
            (RelationKind::BelongsTo, None) => &self.foreign_key,
            _ => &self.parent_id,
        }
    }

    /// Columns of the target table every eager-loaded row carries.
    pub fn child_required_columns(&self) -> Vec<SmolStr> {
        let mut cols = vec![self.target_id.clone()];
        let mut push = |c: &SmolStr| {
            if !cols.contains(c) {
                cols.push(c.clone());
            }
        };
        match self.kind {
            RelationKind::HasOne | RelationKind::HasMany => push(&self.foreign_key),
            RelationKind::MorphOne | RelationKind::MorphMany => {
                if let Some(m) = &self.morph {
                    push(&m.id_column);
                    push(&m.type_column);
                }
            }
            _ => {}
        }
        cols
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relations::RelationSpec;
    use crate::sql::dialect::Postgres;

    fn registry() -> Registry {
        let mut r = Registry::new();
        r.register(
            EntityDescriptor::new("person", "persons")
                .with_relation("pets", RelationSpec::has_many("pet"))
                .with_relation("pet", RelationSpec::has_one("pet"))
                .with_relation("employer", RelationSpec::belongs_to("company"))
                .with_relation(
                    "sponsor",
                    RelationSpec::belongs_to("company").target_id_attribute("uuid"),
                )
                .with_relation("tags", RelationSpec::belongs_to_many("tag"))
                .with_relation("comments", RelationSpec::morph_many("comment", "commentable"))
                .with_relation(
                    "manager",
                    RelationSpec::belongs_to("person")
                        .through("assignments")
                        .foreign_key("manager_id"),
                )
                .with_relation("subject", RelationSpec::morph_to("subject")),
        )
        .unwrap();
        r.register(EntityDescriptor::new("pet", "pets")).unwrap();
        r.register(EntityDescriptor::new("company", "companies")).unwrap();
        r.register(EntityDescriptor::new("tag", "tags")).unwrap();
        r.register(EntityDescriptor::new("comment", "comments")).unwrap();
        r
    }

    fn join_sql(rel: &str) -> String {
        let r = registry();
        let person = r.get_entity_by_name("person").unwrap();
        let resolved = ResolvedRelation::resolve(&r, &person, rel).unwrap();
        let mut plan = QueryPlan::new("persons");
        for j in resolved.joins("persons").unwrap() {
            plan.join(j);
        }
        plan.to_sql(&Postgres).unwrap().0
    }

    #[test]
    fn has_many_defaults_foreign_key_from_parent_table() {
        assert_eq!(
            join_sql("pets"),
            "SELECT \"persons\".* FROM \"persons\" LEFT OUTER JOIN \"pets\" ON \"persons\".\"id\" = \"pets\".\"person_id\""
        );
    }

    #[test]
    fn belongs_to_defaults_foreign_key_from_target_table() {
        assert_eq!(
            join_sql("employer"),
            "SELECT \"persons\".* FROM \"persons\" LEFT OUTER JOIN \"companies\" AS \"employer\" ON \"persons\".\"company_id\" = \"employer\".\"id\""
        );
    }

    #[test]
    fn belongs_to_through_joins_pivot_first() {
        assert_eq!(
            join_sql("manager"),
            "SELECT \"persons\".* FROM \"persons\" \
             LEFT OUTER JOIN \"assignments\" AS \"manager_assignments_pivot\" ON \"persons\".\"id\" = \"manager_assignments_pivot\".\"id\" \
             LEFT OUTER JOIN \"persons\" AS \"manager\" ON \"manager_assignments_pivot\".\"manager_id\" = \"manager\".\"id\""
        );
    }

    #[test]
    fn belongs_to_many_uses_sorted_join_table() {
        assert_eq!(
            join_sql("tags"),
            "SELECT \"persons\".* FROM \"persons\" \
             LEFT OUTER JOIN \"persons_tags\" AS \"tags_persons_tags\" ON \"persons\".\"id\" = \"tags_persons_tags\".\"person_id\" \
             LEFT OUTER JOIN \"tags\" ON \"tags_persons_tags\".\"tag_id\" = \"tags\".\"id\""
        );
    }

    #[test]
    fn morph_many_binds_type_in_join() {
        let r = registry();
        let person = r.get_entity_by_name("person").unwrap();
        let resolved = ResolvedRelation::resolve(&r, &person, "comments").unwrap();
        let mut plan = QueryPlan::new("persons");
        for j in resolved.joins("persons").unwrap() {
            plan.join(j);
        }
        let (sql, binds) = plan.to_sql(&Postgres).unwrap();
        assert_eq!(
            sql,
            "SELECT \"persons\".* FROM \"persons\" LEFT OUTER JOIN \"comments\" ON \"comments\".\"commentable_id\" = \"persons\".\"id\" AND \"comments\".\"commentable_type\" = $1"
        );
        assert_eq!(binds, vec![crate::value::DynamicValue::from("persons")]);
    }

    #[test]
    fn morph_to_is_unsupported() {
        let r = registry();
        let person = r.get_entity_by_name("person").unwrap();
        assert!(matches!(
            ResolvedRelation::resolve(&r, &person, "subject"),
            Err(JapiError::UnsupportedRelation { kind: "morphTo", .. })
        ));
    }

    #[test]
    fn links_and_required_columns() {
        let r = registry();
        let person = r.get_entity_by_name("person").unwrap();

        let pet = ResolvedRelation::resolve(&r, &person, "pet").unwrap();
        let (_, link) = pet.child_plan().unwrap();
        assert_eq!(link.parent_column, "id");
        assert_eq!(link.child_key.to_string(), "pet.person_id");
        assert!(!link.many);
        assert_eq!(pet.child_required_columns(), vec!["id", "person_id"]);

        let employer = ResolvedRelation::resolve(&r, &person, "employer").unwrap();
        assert_eq!(employer.parent_required_column(), "company_id");
        assert_eq!(employer.child_required_columns(), vec!["id"]);

        let sponsor = ResolvedRelation::resolve(&r, &person, "sponsor").unwrap();
        assert_eq!(sponsor.parent_required_column(), "company_uuid");
        assert_eq!(sponsor.child_required_columns(), vec!["uuid"]);

        let tags = ResolvedRelation::resolve(&r, &person, "tags").unwrap();
        let (plan, link) = tags.child_plan().unwrap();
        assert!(link.many);
        assert_eq!(link.child_key.to_string(), "tags_persons_tags.person_id");
        assert_eq!(plan.joins().len(), 1);
    }
}
