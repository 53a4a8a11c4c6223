//! Eager-load planning for `include`.
//!
//! Every path is expanded into its prefixes (`pets.toy` loads `pets` then
//! `toy`), each prefix becomes one child query. Parents are always planned
//! before their children, so nested loads can ask their parent for the
//! column they link on.

use indexmap::IndexMap;
use smol_str::SmolStr;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::fields::{select_columns, select_tokens};
use super::CompileContext;
use crate::entity::EntityDescriptor;
use crate::error::Result;
use crate::params::{IncludeRequest, Refinement};
use crate::relations::{RelationKind, RelationLink, ResolvedRelation};
use crate::sql::{QualifiedColumn, QueryPlan, SelectItem};

/// One relation to load for the rows of its parent.
#[derive(Debug, Clone)]
pub struct EagerLoad {
    /// Full dotted path from the root entity.
    pub path: String,
    /// Path of the parent load; `None` when the parent is the root query.
    pub parent_path: Option<String>,
    /// Key the loaded rows are stored under in each parent row.
    pub name: SmolStr,
    pub kind: RelationKind,
    pub target: Arc<EntityDescriptor>,
    pub link: RelationLink,
    pub query: QueryPlan,
}

impl EagerLoad {
    /// Nesting depth, `0` for relations of the root.
    pub fn depth(&self) -> usize {
        self.path.matches('.').count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct IncludePlan {
    /// Loads ordered parents first.
    pub loads: Vec<EagerLoad>,
    /// Root columns the loads link on.
    pub root_required: Vec<SmolStr>,
    /// `fields` keys consumed by the loads.
    pub claimed_fields: Vec<String>,
}

impl IncludePlan {
    pub fn is_empty(&self) -> bool {
        self.loads.is_empty()
    }

    fn position(&self, path: &str) -> Option<usize> {
        self.loads.iter().position(|l| l.path == path)
    }
}

/// Every prefix of every path, parents first, duplicates removed.
fn expand_paths(includes: &[IncludeRequest]) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for request in includes {
        let mut prefix = String::new();
        for seg in request.path.split('.').map(str::trim) {
            if seg.is_empty() {
                break;
            }
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(seg);
            if !paths.contains(&prefix) {
                paths.push(prefix.clone());
            }
        }
    }
    paths.sort_by_key(|p| p.matches('.').count());
    paths
}

/// Plans one child query per included path.
pub fn plan_includes(
    ctx: &CompileContext<'_>,
    includes: &[IncludeRequest],
    fields: &BTreeMap<String, Vec<String>>,
) -> Result<IncludePlan> {
    let mut refinements: IndexMap<&str, Vec<&Refinement>> = IndexMap::new();
    for request in includes {
        if let Some(refine) = &request.refine {
            refinements
                .entry(request.path.trim())
                .or_default()
                .push(refine);
        }
    }

    let mut out = IncludePlan::default();
    for path in expand_paths(includes) {
        let (parent_path, name) = match path.rsplit_once('.') {
            Some((p, n)) => (Some(p.to_string()), n),
            None => (None, path.as_str()),
        };
        let parent_index = parent_path.as_deref().and_then(|p| out.position(p));
        let parent: &EntityDescriptor = match parent_index {
            Some(i) => &out.loads[i].target,
            None => ctx.entity,
        };

        let relation = ResolvedRelation::resolve(ctx.registry, parent, name)?;
        let (mut query, link) = relation.child_plan()?;

        for refine in refinements.get(path.as_str()).into_iter().flatten() {
            refine(&mut query);
        }

        if !query.has_selection() {
            let target = &relation.target;
            let key = [path.as_str(), target.name.as_str(), target.table_name.as_str()]
                .into_iter()
                .find(|k| fields.contains_key(*k));
            match key {
                Some(key) => {
                    select_columns(&mut query, name, &relation.child_required_columns());
                    select_tokens(&mut query, name, &fields[key], &target.format);
                    if !out.claimed_fields.iter().any(|k| k == key) {
                        out.claimed_fields.push(key.to_string());
                    }
                }
                None => {
                    query.select(SelectItem::column(QualifiedColumn::wildcard(name)));
                }
            }
        }

        let required = SmolStr::new(relation.parent_required_column());
        match parent_index {
            Some(i) => {
                let parent_load = &mut out.loads[i];
                let alias = parent_load.name.clone();
                parent_load.query.ensure_column(&alias, &required);
            }
            None => {
                if !out.root_required.contains(&required) {
                    out.root_required.push(required);
                }
            }
        }

        debug!(path = %path, kind = %relation.kind, "planned eager load");
        out.loads.push(EagerLoad {
            name: relation.name.clone(),
            kind: relation.kind,
            target: relation.target.clone(),
            path: path.clone(),
            parent_path,
            link,
            query,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JapiError;
    use crate::options::PluginOptions;
    use crate::registry::Registry;
    use crate::relations::RelationSpec;
    use crate::sql::Sqlite;

    fn registry() -> Registry {
        let mut r = Registry::new();
        r.register(
            EntityDescriptor::new("person", "persons")
                .with_relation("pets", RelationSpec::has_many("pet"))
                .with_relation("employer", RelationSpec::belongs_to("company"))
                .with_relation("tags", RelationSpec::belongs_to_many("tag")),
        )
        .unwrap();
        r.register(
            EntityDescriptor::new("pet", "pets")
                .with_relation("toy", RelationSpec::has_one("toy")),
        )
        .unwrap();
        r.register(EntityDescriptor::new("toy", "toys")).unwrap();
        r.register(EntityDescriptor::new("company", "companies")).unwrap();
        r.register(EntityDescriptor::new("tag", "tags")).unwrap();
        r
    }

    fn plan(includes: &[IncludeRequest], fields: &BTreeMap<String, Vec<String>>) -> Result<IncludePlan> {
        let r = registry();
        let options = PluginOptions::default();
        let person = r.get_entity_by_name("person")?;
        let ctx = CompileContext::new(&r, &person, "persons", &options);
        plan_includes(&ctx, includes, fields)
    }

    #[test]
    fn nested_paths_expand_parents_first() -> anyhow::Result<()> {
        let out = plan(
            &[IncludeRequest::new("pets.toy"), IncludeRequest::new("employer")],
            &BTreeMap::new(),
        )?;
        let paths: Vec<_> = out.loads.iter().map(|l| l.path.as_str()).collect();
        assert_eq!(paths, vec!["pets", "employer", "pets.toy"]);
        assert_eq!(out.loads[2].parent_path.as_deref(), Some("pets"));
        assert_eq!(out.loads[2].depth(), 1);
        assert_eq!(out.root_required, vec![SmolStr::new("id"), SmolStr::new("company_id")]);

        let (sql, _) = out.loads[2].query.to_sql(&Sqlite)?;
        assert_eq!(sql, "SELECT \"toy\".* FROM \"toys\" AS \"toy\"");
        Ok(())
    }

    #[test]
    fn sparse_fields_keep_link_columns() -> anyhow::Result<()> {
        let mut fields = BTreeMap::new();
        fields.insert("pets".to_string(), vec!["name".to_string()]);
        fields.insert("toy".to_string(), vec!["color".to_string()]);
        let out = plan(&[IncludeRequest::new("pets.toy")], &fields)?;

        let (sql, _) = out.loads[0].query.to_sql(&Sqlite)?;
        assert_eq!(
            sql,
            "SELECT \"pets\".\"id\", \"pets\".\"person_id\", \"pets\".\"name\" FROM \"pets\""
        );
        let (sql, _) = out.loads[1].query.to_sql(&Sqlite)?;
        assert_eq!(
            sql,
            "SELECT \"toy\".\"id\", \"toy\".\"pet_id\", \"toy\".\"color\" FROM \"toys\" AS \"toy\""
        );
        assert_eq!(out.claimed_fields, vec!["pets".to_string(), "toy".to_string()]);
        Ok(())
    }

    #[test]
    fn refinements_override_fields_but_keep_links() -> anyhow::Result<()> {
        let mut fields = BTreeMap::new();
        fields.insert("pets".to_string(), vec!["name".to_string()]);
        let mut includes = vec![IncludeRequest::new("pets.toy")];
        includes.push(IncludeRequest {
            path: "pets".into(),
            refine: Some(Arc::new(|q: &mut QueryPlan| {
                q.select(SelectItem::column(QualifiedColumn::new(
                    Some("pets"),
                    "species",
                )));
            })),
        });
        let out = plan(&includes, &fields)?;
        let (sql, _) = out.loads[0].query.to_sql(&Sqlite)?;
        assert_eq!(sql, "SELECT \"pets\".\"species\", \"pets\".\"id\" FROM \"pets\"");
        assert!(out.claimed_fields.is_empty());
        Ok(())
    }

    #[test]
    fn pivot_loads_join_the_join_table() -> anyhow::Result<()> {
        let out = plan(&[IncludeRequest::new("tags")], &BTreeMap::new())?;
        let (sql, _) = out.loads[0].query.to_sql(&Sqlite)?;
        assert_eq!(
            sql,
            "SELECT \"tags\".* FROM \"tags\" \
             INNER JOIN \"persons_tags\" AS \"tags_persons_tags\" ON \"tags_persons_tags\".\"tag_id\" = \"tags\".\"id\""
        );
        assert_eq!(out.loads[0].link.child_key.to_string(), "tags_persons_tags.person_id");
        Ok(())
    }

    #[test]
    fn unknown_relation_is_an_error() {
        assert!(matches!(
            plan(&[IncludeRequest::new("pets.owner")], &BTreeMap::new()),
            Err(JapiError::RelationNotFound { .. })
        ));
    }
}
