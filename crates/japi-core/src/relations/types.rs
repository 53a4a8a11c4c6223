use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

use crate::entity::Validate;
use crate::error::Result;
use crate::sql::helpers::validate_segment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    HasOne,
    HasMany,
    BelongsTo,
    BelongsToMany,
    MorphOne,
    MorphMany,
    MorphTo,
}

impl RelationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::HasOne => "hasOne",
            RelationKind::HasMany => "hasMany",
            RelationKind::BelongsTo => "belongsTo",
            RelationKind::BelongsToMany => "belongsToMany",
            RelationKind::MorphOne => "morphOne",
            RelationKind::MorphMany => "morphMany",
            RelationKind::MorphTo => "morphTo",
        }
    }

    /// Whether the relation yields a list of related rows.
    pub fn is_many(self) -> bool {
        matches!(
            self,
            RelationKind::HasMany | RelationKind::BelongsToMany | RelationKind::MorphMany
        )
    }

    pub fn is_morph(self) -> bool {
        matches!(
            self,
            RelationKind::MorphOne | RelationKind::MorphMany | RelationKind::MorphTo
        )
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Polymorphic relation columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MorphSpec {
    pub name: SmolStr,
    pub type_column: Option<SmolStr>,
    pub id_column: Option<SmolStr>,
    /// Value stored in the type column for the parent; defaults to the parent table.
    pub value: Option<SmolStr>,
}

/// Relation metadata as declared on the parent entity.
///
/// Unset keys are filled in by [`super::resolve`] using the naming defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSpec {
    pub kind: RelationKind,
    /// Registry name of the target entity.
    pub target: SmolStr,
    pub foreign_key: Option<SmolStr>,
    pub parent_id_attribute: Option<SmolStr>,
    pub target_id_attribute: Option<SmolStr>,
    /// Pivot table: `through` for `belongsTo`, the join table for `belongsToMany`.
    pub through_table: Option<SmolStr>,
    pub through_id_attribute: Option<SmolStr>,
    pub other_key: Option<SmolStr>,
    pub morph: Option<MorphSpec>,
}

impl RelationSpec {
    fn new(kind: RelationKind, target: &str) -> Self {
        Self {
            kind,
            target: SmolStr::new(target),
            foreign_key: None,
            parent_id_attribute: None,
            target_id_attribute: None,
            through_table: None,
            through_id_attribute: None,
            other_key: None,
            morph: None,
        }
    }

    fn new_morph(kind: RelationKind, target: &str, name: &str) -> Self {
        let mut spec = Self::new(kind, target);
        spec.morph = Some(MorphSpec {
            name: SmolStr::new(name),
            type_column: None,
            id_column: None,
            value: None,
        });
        spec
    }

    pub fn has_one(target: &str) -> Self {
        Self::new(RelationKind::HasOne, target)
    }

    pub fn has_many(target: &str) -> Self {
        Self::new(RelationKind::HasMany, target)
    }

    pub fn belongs_to(target: &str) -> Self {
        Self::new(RelationKind::BelongsTo, target)
    }

    pub fn belongs_to_many(target: &str) -> Self {
        Self::new(RelationKind::BelongsToMany, target)
    }

    pub fn morph_one(target: &str, name: &str) -> Self {
        Self::new_morph(RelationKind::MorphOne, target, name)
    }

    pub fn morph_many(target: &str, name: &str) -> Self {
        Self::new_morph(RelationKind::MorphMany, target, name)
    }

    pub fn morph_to(name: &str) -> Self {
        Self::new_morph(RelationKind::MorphTo, "", name)
    }

    pub fn foreign_key(mut self, key: &str) -> Self {
        self.foreign_key = Some(SmolStr::new(key));
        self
    }

    pub fn parent_id_attribute(mut self, key: &str) -> Self {
        self.parent_id_attribute = Some(SmolStr::new(key));
        self
    }

    pub fn target_id_attribute(mut self, key: &str) -> Self {
        self.target_id_attribute = Some(SmolStr::new(key));
        self
    }

    pub fn through(mut self, table: &str) -> Self {
        self.through_table = Some(SmolStr::new(table));
        self
    }

    pub fn through_id_attribute(mut self, key: &str) -> Self {
        self.through_id_attribute = Some(SmolStr::new(key));
        self
    }

    pub fn other_key(mut self, key: &str) -> Self {
        self.other_key = Some(SmolStr::new(key));
        self
    }

    pub fn morph_columns(mut self, type_column: &str, id_column: &str) -> Self {
        if let Some(m) = self.morph.as_mut() {
            m.type_column = Some(SmolStr::new(type_column));
            m.id_column = Some(SmolStr::new(id_column));
        }
        self
    }

    pub fn morph_value(mut self, value: &str) -> Self {
        if let Some(m) = self.morph.as_mut() {
            m.value = Some(SmolStr::new(value));
        }
        self
    }
}

impl Validate for RelationSpec {
    fn validate(&self) -> Result<()> {
        let keys = [
            &self.foreign_key,
            &self.parent_id_attribute,
            &self.target_id_attribute,
            &self.through_table,
            &self.through_id_attribute,
            &self.other_key,
        ];
        for key in keys.into_iter().flatten() {
            validate_segment(key)?;
        }
        if let Some(m) = &self.morph {
            validate_segment(&m.name)?;
            for col in [&m.type_column, &m.id_column].into_iter().flatten() {
                validate_segment(col)?;
            }
        }
        Ok(())
    }
}
