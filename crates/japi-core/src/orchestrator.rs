//! Entry point turning a parameter object into a query and running it.
//!
//! Compilation walks a fixed sequence of stages. Dependencies are resolved
//! first so that filters, sorting and grouping may reference joined
//! relations; includes are planned before fields so that the columns they
//! link on can be added to a sparse root selection.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::compile::filter::{compile_filter, filter_tokens, parse_filter};
use crate::compile::fields::root_field_key;
use crate::compile::{apply_fields, compile_group, compile_sort, plan_includes, CompileContext};
use crate::entity::EntityDescriptor;
use crate::error::{JapiError, Result};
use crate::fetch::{FetchRequest, Fetched, Fetcher, PageRequest};
use crate::format::split_aggregate;
use crate::options::PluginOptions;
use crate::params::{PageParam, QueryParams};
use crate::registry::Registry;
use crate::sql::helpers::validate_segment;
use crate::sql::{QualifiedColumn, QueryPlan, SelectItem};

/// Callback run on the root query after every parameter has been applied.
pub type AdditionalQuery = Box<dyn FnOnce(&mut QueryPlan) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Init,
    DependenciesResolved,
    FiltersApplied,
    GroupApplied,
    SortApplied,
    IncludesPlanned,
    FieldsApplied,
    AdditionalQueryApplied,
    Paginated,
    Unpaginated,
    Executed,
}

struct Progress {
    stage: Stage,
}

impl Progress {
    fn new() -> Self {
        Self { stage: Stage::Init }
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(next > self.stage, "stage {next:?} after {:?}", self.stage);
        debug!(from = ?self.stage, to = ?next, "compile stage");
        self.stage = next;
    }
}

/// How a compiled query is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    One,
    All,
    Page(PageRequest),
}

#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub request: FetchRequest,
    pub mode: FetchMode,
}

/// Registry plus the options shared by every fetch.
#[derive(Debug, Clone)]
pub struct JsonApi {
    registry: Arc<Registry>,
    options: PluginOptions,
}

impl JsonApi {
    pub fn new(registry: Registry, options: PluginOptions) -> Self {
        Self::from_shared(Arc::new(registry), options)
    }

    pub fn from_shared(registry: Arc<Registry>, options: PluginOptions) -> Self {
        Self { registry, options }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn options(&self) -> &PluginOptions {
        &self.options
    }

    /// Starts a query on the entity registered as `entity`.
    pub fn query(&self, entity: &str) -> Result<JsonApiQuery<'_>> {
        Ok(JsonApiQuery {
            api: self,
            entity: self.registry.get_entity_by_name(entity)?,
            type_name: None,
            base: None,
            additional: None,
        })
    }
}

pub struct JsonApiQuery<'a> {
    api: &'a JsonApi,
    entity: Arc<EntityDescriptor>,
    type_name: Option<String>,
    base: Option<QueryPlan>,
    additional: Option<AdditionalQuery>,
}

impl fmt::Debug for JsonApiQuery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonApiQuery")
            .field("entity", &self.entity.name)
            .field("type_name", &self.type_name)
            .field("base", &self.base)
            .field("additional", &self.additional.is_some())
            .finish()
    }
}

impl<'a> JsonApiQuery<'a> {
    /// Aliases the root table to `name`; unqualified columns resolve against it.
    pub fn type_name(mut self, name: &str) -> Self {
        self.type_name = Some(name.to_string());
        self
    }

    /// Starts from an existing plan on the entity's table instead of an empty one.
    pub fn base(mut self, plan: QueryPlan) -> Self {
        self.base = Some(plan);
        self
    }

    pub fn additional(mut self, f: impl FnOnce(&mut QueryPlan) + Send + 'static) -> Self {
        self.additional = Some(Box::new(f));
        self
    }

    /// Builds the root query and the eager loads for `params`.
    pub fn compile(self, params: &QueryParams, is_collection: bool) -> Result<CompiledQuery> {
        let mut progress = Progress::new();
        let entity = self.entity.as_ref();
        let registry = self.api.registry.as_ref();
        let options = &self.api.options;

        let root_alias = self
            .type_name
            .clone()
            .unwrap_or_else(|| entity.table_name.to_string());
        validate_segment(&root_alias)?;

        let mut plan = match self.base {
            Some(base) if base.table_name() != entity.table_name.as_str() => {
                return Err(JapiError::InvalidPlan(format!(
                    "base query is on `{}`, expected `{}`",
                    base.table_name(),
                    entity.table_name
                )))
            }
            Some(base) => base,
            None => QueryPlan::new(&entity.table_name),
        };
        if self.type_name.is_some() {
            plan.set_alias(&root_alias);
        }

        let mut ctx = CompileContext::new(registry, entity, &root_alias, options);
        for token in dependency_tokens(&ctx, params) {
            ctx.add_dependency(&token);
        }
        ctx.dependencies.attach(registry, entity, &root_alias, &mut plan)?;
        let root_fields = root_field_key(&ctx, &params.fields).is_some();
        if !root_fields && !ctx.dependencies.is_empty() && !plan.has_selection() {
            plan.select(SelectItem::column(QualifiedColumn::wildcard(&root_alias)));
        }
        progress.advance(Stage::DependenciesResolved);

        let nodes = parse_filter(&ctx, &params.filter);
        for condition in compile_filter(&ctx, &nodes) {
            plan.where_(condition);
        }
        progress.advance(Stage::FiltersApplied);

        compile_group(&ctx, &params.group, &mut plan);
        progress.advance(Stage::GroupApplied);

        compile_sort(&ctx, &params.sort, &mut plan);
        progress.advance(Stage::SortApplied);

        let includes = plan_includes(&ctx, &params.include, &params.fields)?;
        progress.advance(Stage::IncludesPlanned);

        apply_fields(&ctx, &params.fields, &includes.claimed_fields, &mut plan);
        for column in &includes.root_required {
            plan.ensure_column(&root_alias, column);
        }
        progress.advance(Stage::FieldsApplied);

        if let Some(additional) = self.additional {
            additional(&mut plan);
            progress.advance(Stage::AdditionalQueryApplied);
        }

        let mode = fetch_mode(&params.page, options, is_collection);
        progress.advance(match mode {
            FetchMode::Page(_) => Stage::Paginated,
            _ => Stage::Unpaginated,
        });

        Ok(CompiledQuery {
            request: FetchRequest {
                query: plan,
                includes: includes.loads,
            },
            mode,
        })
    }

    /// Compiles `params` and runs the result through `fetcher`.
    #[instrument(skip_all, fields(entity = %self.entity.name, collection = is_collection))]
    pub async fn fetch(
        self,
        fetcher: &dyn Fetcher,
        params: &QueryParams,
        is_collection: bool,
    ) -> Result<Fetched> {
        let compiled = self.compile(params, is_collection)?;
        let fetched = match compiled.mode {
            FetchMode::One => Fetched::One(fetcher.fetch_one(compiled.request).await?),
            FetchMode::All => Fetched::Many(fetcher.fetch_all(compiled.request).await?),
            FetchMode::Page(page) => Fetched::Page(fetcher.fetch_page(compiled.request, page).await?),
        };
        info!(rows = fetched.rows().len(), "fetched");
        debug!(to = ?Stage::Executed, "compile stage");
        Ok(fetched)
    }
}

/// Tokens whose relation paths must be joined on the root query.
fn dependency_tokens(ctx: &CompileContext<'_>, params: &QueryParams) -> Vec<String> {
    let mut tokens = filter_tokens(&params.filter);
    tokens.extend(
        params
            .sort
            .iter()
            .map(|t| t.strip_prefix('-').unwrap_or(t).to_string()),
    );
    tokens.extend(params.group.iter().cloned());
    if let Some(key) = root_field_key(ctx, &params.fields) {
        tokens.extend(
            params.fields[key]
                .iter()
                .map(|t| split_aggregate(t).1.to_string()),
        );
    }
    tokens
}

fn fetch_mode(page: &PageParam, options: &PluginOptions, is_collection: bool) -> FetchMode {
    if !is_collection {
        return FetchMode::One;
    }
    match page {
        PageParam::Disabled => FetchMode::All,
        PageParam::Spec(spec) => FetchMode::Page(PageRequest::from_spec(spec)),
        PageParam::Absent => match &options.pagination {
            Some(default) => FetchMode::Page(PageRequest::from_spec(default)),
            None => FetchMode::All,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::NameFormat;
    use crate::fetch::{MockFetcher, Page};
    use crate::params::PageSpec;
    use crate::relations::RelationSpec;
    use crate::sql::{Postgres, Sqlite};
    use crate::value::{DynamicValue, ObjectValue};
    use mockall::predicate::*;
    use serde_json::json;

    fn api(options: PluginOptions) -> JsonApi {
        let mut r = Registry::new();
        r.register(
            EntityDescriptor::new("person", "persons")
                .with_format(NameFormat::SnakeCase)
                .with_relation("pets", RelationSpec::has_many("pet")),
        )
        .unwrap();
        r.register(
            EntityDescriptor::new("pet", "pets")
                .with_relation("toy", RelationSpec::has_one("toy")),
        )
        .unwrap();
        r.register(EntityDescriptor::new("toy", "toys")).unwrap();
        JsonApi::new(r, options)
    }

    fn row(id: i64) -> ObjectValue {
        let mut o = ObjectValue::new();
        o.insert("id", DynamicValue::from(id));
        o
    }

    #[test]
    fn full_parameter_object() -> anyhow::Result<()> {
        let api = api(PluginOptions::default());
        let params = QueryParams::from_json(json!({
            "include": "pets.toy",
            "fields": { "person": "firstName", "pets": "name" },
            "filter": { "pets.name": "Rex", "gte": { "age": 20 } },
            "sort": "-lastName",
        }))?;
        let compiled = api.query("person")?.type_name("person").compile(&params, true)?;
        let (sql, binds) = compiled.request.query.to_sql(&Postgres)?;
        assert_eq!(
            sql,
            "SELECT DISTINCT \"person\".\"first_name\", \"person\".\"id\" FROM \"persons\" AS \"person\" \
             LEFT OUTER JOIN \"pets\" ON \"person\".\"id\" = \"pets\".\"person_id\" \
             WHERE \"pets\".\"name\" IN ($1) AND \"person\".\"age\" >= $2 \
             ORDER BY \"person\".\"last_name\" DESC"
        );
        assert_eq!(binds, vec![DynamicValue::from("Rex"), DynamicValue::from(20i64)]);
        assert_eq!(compiled.mode, FetchMode::All);
        assert_eq!(compiled.request.includes.len(), 2);
        Ok(())
    }

    #[test]
    fn joined_root_without_fields_selects_root_columns() -> anyhow::Result<()> {
        let api = api(PluginOptions::default());
        let params = QueryParams::new().sort("pets.name");
        let compiled = api.query("person")?.compile(&params, true)?;
        let (sql, _) = compiled.request.query.to_sql(&Sqlite)?;
        assert_eq!(
            sql,
            "SELECT \"persons\".* FROM \"persons\" \
             LEFT OUTER JOIN \"pets\" ON \"persons\".\"id\" = \"pets\".\"person_id\" \
             ORDER BY \"pets\".\"name\" ASC"
        );
        Ok(())
    }

    #[test]
    fn root_wildcard_precedes_additional_selections() -> anyhow::Result<()> {
        let api = api(PluginOptions::default());
        let params = QueryParams::new().sort("pets.name");
        let compiled = api
            .query("person")?
            .additional(|plan| {
                plan.select(SelectItem::column(QualifiedColumn::new(Some("pets"), "name")));
            })
            .compile(&params, true)?;
        let selections = compiled.request.query.selections();
        assert_eq!(
            selections[0],
            SelectItem::column(QualifiedColumn::wildcard("persons"))
        );
        let (sql, _) = compiled.request.query.to_sql(&Sqlite)?;
        assert!(sql.starts_with("SELECT \"persons\".*, \"pets\".\"name\" FROM \"persons\""));
        Ok(())
    }

    #[test]
    fn base_and_additional_queries() -> anyhow::Result<()> {
        let api = api(PluginOptions::default());
        let mut base = QueryPlan::new("persons");
        base.limit(3);
        let compiled = api
            .query("person")?
            .base(base)
            .additional(|q| {
                q.distinct();
            })
            .compile(&QueryParams::new(), true)?;
        let (sql, _) = compiled.request.query.to_sql(&Sqlite)?;
        assert_eq!(sql, "SELECT DISTINCT * FROM \"persons\" LIMIT ?");

        let wrong = api.query("person")?.base(QueryPlan::new("pets"));
        assert!(matches!(
            wrong.compile(&QueryParams::new(), true),
            Err(JapiError::InvalidPlan(_))
        ));
        Ok(())
    }

    #[test]
    fn paging_modes() {
        let default = PluginOptions::default().with_pagination(PageSpec::numbered(1, 10));
        let plain = PluginOptions::default();
        let spec = PageParam::Spec(PageSpec::offset_based(5, 10));

        assert_eq!(fetch_mode(&PageParam::Absent, &plain, true), FetchMode::All);
        assert_eq!(
            fetch_mode(&PageParam::Absent, &default, true),
            FetchMode::Page(PageRequest::Numbered { page: 1, page_size: 10 })
        );
        assert_eq!(fetch_mode(&PageParam::Disabled, &default, true), FetchMode::All);
        assert_eq!(
            fetch_mode(&spec, &plain, true),
            FetchMode::Page(PageRequest::Offset { limit: 5, offset: 10 })
        );
        assert_eq!(fetch_mode(&spec, &default, false), FetchMode::One);
    }

    #[test]
    fn unknown_entity_and_include() {
        let api = api(PluginOptions::default());
        assert!(matches!(api.query("ghost"), Err(JapiError::UnknownEntity(_))));

        let params = QueryParams::new().include("owner");
        assert!(matches!(
            api.query("person").unwrap().compile(&params, true),
            Err(JapiError::RelationNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn single_fetch_ignores_paging() -> anyhow::Result<()> {
        let api = api(PluginOptions::default().with_pagination(PageSpec::numbered(1, 10)));
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch_one()
            .times(1)
            .returning(|_| Ok(Some(row(1))));
        fetcher.expect_fetch_page().never();

        let params = QueryParams::new().page(PageSpec::numbered(2, 5));
        let fetched = api.query("person")?.fetch(&fetcher, &params, false).await?;
        assert_eq!(fetched.rows().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn collection_fetch_pages_with_the_request() -> anyhow::Result<()> {
        let api = api(PluginOptions::default());
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch_page()
            .with(always(), eq(PageRequest::Offset { limit: 2, offset: 0 }))
            .times(1)
            .returning(|_, page| {
                Ok(Page {
                    rows: vec![row(1), row(2)],
                    pagination: page.pagination(3),
                })
            });

        let params = QueryParams::new().page(PageSpec::offset_based(2, 0));
        let fetched = api.query("person")?.fetch(&fetcher, &params, true).await?;
        match fetched {
            Fetched::Page(page) => {
                assert_eq!(page.rows.len(), 2);
                assert_eq!(page.pagination.page_count, 2);
            }
            other => panic!("expected a page, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn fetch_errors_propagate() {
        let api = api(PluginOptions::default());
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch_all()
            .returning(|_| Err(JapiError::Execution("connection reset".into())));
        let result = api
            .query("person")
            .unwrap()
            .fetch(&fetcher, &QueryParams::new(), true)
            .await;
        assert!(matches!(result, Err(JapiError::Execution(_))));
    }
}
