//! Filter objects to predicate trees.
//!
//! ```text
//! { "type": "t-rex,triceratops" }                 equality, null aware
//! { "like": { "firstName": "ba,coo" } }           case-insensitive OR per value
//! { "not": { "type": "null,monster" } }           IS NOT NULL AND NOT IN
//! { "gte": { "meta:age:numeric": 30 } }           single comparison
//! { "age::numeric": "20,30" }                     plain column and values cast
//! { "or": [ { .. }, { "or": [ .. ] } ] }          nested disjunction
//! ```

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

use super::CompileContext;
use crate::sql::{CompareOp, Condition, Operand};
use crate::token::{split_escaped, ColumnReference};
use crate::value::DynamicValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Like,
    Not,
    Lt,
    Gt,
    Lte,
    Gte,
}

impl FromStr for FilterOperator {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(FilterOperator::Like),
            "not" => Ok(FilterOperator::Not),
            "lt" => Ok(FilterOperator::Lt),
            "gt" => Ok(FilterOperator::Gt),
            "lte" => Ok(FilterOperator::Lte),
            "gte" => Ok(FilterOperator::Gte),
            _ => Err(()),
        }
    }
}

impl FilterOperator {
    fn comparison(self) -> Option<CompareOp> {
        match self {
            FilterOperator::Lt => Some(CompareOp::Lt),
            FilterOperator::Gt => Some(CompareOp::Gt),
            FilterOperator::Lte => Some(CompareOp::Lte),
            FilterOperator::Gte => Some(CompareOp::Gte),
            FilterOperator::Like | FilterOperator::Not => None,
        }
    }
}

/// A filter argument as given, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Scalar(DynamicValue),
    CsvString(String),
    List(Vec<DynamicValue>),
}

impl FilterValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => FilterValue::CsvString(s.clone()),
            Value::Array(items) => FilterValue::List(items.iter().map(DynamicValue::from_json).collect()),
            other => FilterValue::Scalar(DynamicValue::from_json(other)),
        }
    }

    /// Values with null sentinels removed, and whether one was present.
    pub fn normalize(&self, null_string: &str) -> (Vec<DynamicValue>, bool) {
        let is_null = |v: &DynamicValue| v.is_none() || v.as_str() == Some(null_string);
        let items: Vec<DynamicValue> = match self {
            FilterValue::Scalar(v) => vec![v.clone()],
            FilterValue::CsvString(s) if s == null_string => vec![DynamicValue::none()],
            FilterValue::CsvString(s) => split_escaped(s).into_iter().map(DynamicValue::from).collect(),
            FilterValue::List(items) => items.clone(),
        };
        let has_null = items.iter().any(is_null);
        (items.into_iter().filter(|v| !is_null(v)).collect(), has_null)
    }

    /// The one value of a comparison; lists and nulls have none.
    pub fn single(&self, null_string: &str) -> Option<DynamicValue> {
        match self {
            FilterValue::Scalar(v) if !v.is_none() => Some(v.clone()),
            FilterValue::CsvString(s) if s != null_string => Some(DynamicValue::from(s.as_str())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    Equality {
        token: String,
        column: ColumnReference,
        value: FilterValue,
    },
    Typed {
        operator: FilterOperator,
        token: String,
        column: ColumnReference,
        value: FilterValue,
    },
    /// Each child is one filter object.
    Or(Vec<Vec<FilterNode>>),
}

/// Every column token mentioned by a filter object, recursively.
pub fn filter_tokens(filter: &Map<String, Value>) -> Vec<String> {
    let mut out = Vec::new();
    for (key, value) in filter {
        match value {
            Value::Array(items) if key == "or" => {
                for item in items {
                    if let Value::Object(map) = item {
                        out.extend(filter_tokens(map));
                    }
                }
            }
            Value::Object(map) => {
                if FilterOperator::from_str(key).is_ok() {
                    out.extend(map.keys().cloned());
                }
            }
            _ if key == "or" => {}
            _ => out.push(key.clone()),
        }
    }
    out
}

/// Parses one filter object. Unknown operators and malformed `or` entries are dropped.
pub fn parse_filter(ctx: &CompileContext<'_>, filter: &Map<String, Value>) -> Vec<FilterNode> {
    let mut nodes = Vec::new();
    for (key, value) in filter {
        match value {
            Value::Array(items) if key == "or" => {
                let groups: Vec<Vec<FilterNode>> = items
                    .iter()
                    .filter_map(|item| match item {
                        Value::Object(map) => Some(parse_filter(ctx, map)),
                        other => {
                            debug!(entry = %other, "dropping non-object `or` entry");
                            None
                        }
                    })
                    .collect();
                if groups.is_empty() {
                    debug!("dropping empty `or`");
                } else {
                    nodes.push(FilterNode::Or(groups));
                }
            }
            _ if key == "or" => debug!(entry = %value, "dropping `or` that is not a list"),
            Value::Object(map) => match FilterOperator::from_str(key) {
                Ok(operator) => {
                    for (token, arg) in map {
                        nodes.push(FilterNode::Typed {
                            operator,
                            token: token.clone(),
                            column: ctx.reference(token),
                            value: FilterValue::from_json(arg),
                        });
                    }
                }
                Err(()) => debug!(operator = %key, "dropping unknown filter operator"),
            },
            other => nodes.push(FilterNode::Equality {
                token: key.clone(),
                column: ctx.reference(key),
                value: FilterValue::from_json(other),
            }),
        }
    }
    nodes
}

fn equality(operand: Operand, values: Vec<DynamicValue>, has_null: bool) -> Condition {
    match (values.is_empty(), has_null) {
        (true, true) => Condition::IsNull(operand),
        (false, true) => Condition::Any(vec![
            Condition::IsNull(operand.clone()),
            Condition::In(operand, values),
        ]),
        (_, false) => Condition::In(operand, values),
    }
}

/// Compiles one parsed filter object into conditions to be AND-ed.
pub fn compile_filter(ctx: &CompileContext<'_>, nodes: &[FilterNode]) -> Vec<Condition> {
    let null = ctx.options.null_string.as_str();

    let like_tokens: Vec<&str> = nodes
        .iter()
        .filter_map(|n| match n {
            FilterNode::Typed {
                operator: FilterOperator::Like,
                token,
                ..
            } => Some(token.as_str()),
            _ => None,
        })
        .collect();
    let equalities: HashMap<&str, &FilterValue> = nodes
        .iter()
        .filter_map(|n| match n {
            FilterNode::Equality { token, value, .. } => Some((token.as_str(), value)),
            _ => None,
        })
        .collect();

    let mut out = Vec::new();
    for node in nodes {
        match node {
            FilterNode::Equality { token, column, value } => {
                if like_tokens.contains(&token.as_str()) {
                    continue;
                }
                let Some(operand) = ctx.operand(column) else { continue };
                let (values, has_null) = value.normalize(null);
                out.push(equality(operand, values, has_null));
            }
            FilterNode::Typed {
                operator: FilterOperator::Like,
                token,
                column,
                value,
            } => {
                let Some(operand) = ctx.operand(column) else { continue };
                let (values, _) = value.normalize(null);
                let mut any: Vec<Condition> = values
                    .iter()
                    .map(|v| Condition::ContainsInsensitive(operand.clone(), format!("%{v}%")))
                    .collect();
                if let Some(extra) = equalities.get(token.as_str()) {
                    let (values, has_null) = extra.normalize(null);
                    any.push(equality(operand.clone(), values, has_null));
                }
                if any.is_empty() {
                    debug!(token = %token, "dropping `like` without values");
                    continue;
                }
                out.push(Condition::Any(any).simplify());
            }
            FilterNode::Typed {
                operator: FilterOperator::Not,
                column,
                value,
                ..
            } => {
                let Some(operand) = ctx.operand(column) else { continue };
                let (values, has_null) = value.normalize(null);
                if has_null {
                    out.push(Condition::IsNotNull(operand.clone()));
                }
                if !values.is_empty() {
                    out.push(Condition::NotIn(operand, values));
                }
            }
            FilterNode::Typed {
                operator,
                token,
                column,
                value,
            } => {
                let Some(cmp) = operator.comparison() else { continue };
                let Some(single) = value.single(null) else {
                    debug!(token = %token, "dropping comparison without a single value");
                    continue;
                };
                let Some(operand) = ctx.operand(column) else { continue };
                out.push(Condition::Compare(operand, cmp, single));
            }
            FilterNode::Or(groups) => {
                let any: Vec<Condition> = groups
                    .iter()
                    .map(|g| Condition::All(compile_filter(ctx, g)).simplify())
                    .collect();
                out.push(Condition::Any(any).simplify());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityDescriptor, NameFormat};
    use crate::options::PluginOptions;
    use crate::registry::Registry;
    use crate::relations::RelationSpec;
    use crate::sql::{Dialect, Postgres, QueryPlan, Sqlite};
    use serde_json::json;

    fn fixture() -> (Registry, PluginOptions) {
        let mut r = Registry::new();
        r.register(
            EntityDescriptor::new("person", "persons")
                .with_format(NameFormat::SnakeCase)
                .with_relation("pets", RelationSpec::has_many("pet")),
        )
        .unwrap();
        r.register(EntityDescriptor::new("pet", "pets")).unwrap();
        (r, PluginOptions::default())
    }

    fn render(filter: serde_json::Value, dialect: &dyn Dialect) -> (String, Vec<DynamicValue>) {
        let (r, options) = fixture();
        let person = r.get_entity_by_name("person").unwrap();
        let mut ctx = CompileContext::new(&r, &person, "persons", &options);
        let map = filter.as_object().unwrap().clone();
        for token in filter_tokens(&map) {
            ctx.add_dependency(&token);
        }
        let nodes = parse_filter(&ctx, &map);
        let mut plan = QueryPlan::new("persons");
        ctx.dependencies
            .attach(&r, &person, "persons", &mut plan)
            .unwrap();
        for cond in compile_filter(&ctx, &nodes) {
            plan.where_(cond);
        }
        plan.to_sql(dialect).unwrap()
    }

    #[test]
    fn equality_with_null_sentinel() {
        let (sql, binds) = render(json!({ "type": "null,t-rex" }), &Postgres);
        assert_eq!(
            sql,
            "SELECT * FROM \"persons\" WHERE (\"persons\".\"type\" IS NULL OR \"persons\".\"type\" IN ($1))"
        );
        assert_eq!(binds, vec![DynamicValue::from("t-rex")]);

        let (sql, binds) = render(json!({ "type": null }), &Postgres);
        assert_eq!(sql, "SELECT * FROM \"persons\" WHERE \"persons\".\"type\" IS NULL");
        assert!(binds.is_empty());
    }

    #[test]
    fn equality_splits_escaped_commas() {
        let (_, binds) = render(json!({ "firstName": "a\\,b,c" }), &Sqlite);
        assert_eq!(binds, vec![DynamicValue::from("a,b"), DynamicValue::from("c")]);
    }

    #[test]
    fn like_ors_values_and_merges_equality() {
        let (sql, binds) = render(
            json!({ "like": { "firstName": "ba,coo" }, "firstName": "Elmo" }),
            &Sqlite,
        );
        assert_eq!(
            sql,
            "SELECT * FROM \"persons\" WHERE (\
             LOWER(CAST(\"persons\".\"first_name\" AS TEXT)) LIKE LOWER(?) OR \
             LOWER(CAST(\"persons\".\"first_name\" AS TEXT)) LIKE LOWER(?) OR \
             \"persons\".\"first_name\" IN (?))"
        );
        assert_eq!(
            binds,
            vec![
                DynamicValue::from("%ba%"),
                DynamicValue::from("%coo%"),
                DynamicValue::from("Elmo")
            ]
        );
    }

    #[test]
    fn not_splits_out_null() {
        let (sql, binds) = render(json!({ "not": { "type": "null,monster" } }), &Postgres);
        assert_eq!(
            sql,
            "SELECT * FROM \"persons\" WHERE \"persons\".\"type\" IS NOT NULL AND \"persons\".\"type\" NOT IN ($1)"
        );
        assert_eq!(binds, vec![DynamicValue::from("monster")]);
    }

    #[test]
    fn comparisons_take_one_value() {
        let (sql, binds) = render(
            json!({ "gte": { "age": 20 }, "lt": { "age": [1, 2] } }),
            &Postgres,
        );
        assert_eq!(sql, "SELECT * FROM \"persons\" WHERE \"persons\".\"age\" >= $1");
        assert_eq!(binds, vec![DynamicValue::from(20i64)]);
    }

    #[test]
    fn nested_or_groups() {
        let (sql, _) = render(
            json!({
                "or": [
                    { "type": "monster" },
                    { "or": [ { "gt": { "age": 60 } }, { "lt": { "age": 13 } } ] }
                ]
            }),
            &Sqlite,
        );
        assert_eq!(
            sql,
            "SELECT * FROM \"persons\" WHERE (\"persons\".\"type\" IN (?) OR \
             (\"persons\".\"age\" > ? OR \"persons\".\"age\" < ?))"
        );
    }

    #[test]
    fn relation_filters_use_the_join_alias() {
        let (sql, _) = render(json!({ "pets.name": "Big Bird", "owner.name": "x" }), &Sqlite);
        assert_eq!(
            sql,
            "SELECT \"persons\".* FROM \"persons\" \
             LEFT OUTER JOIN \"pets\" ON \"persons\".\"id\" = \"pets\".\"person_id\" \
             WHERE \"pets\".\"name\" IN (?)"
        );
    }

    #[test]
    fn json_filters_bind_path_segments() {
        let (sql, binds) = render(json!({ "gt": { "metaData:stats.age:numeric": "30" } }), &Postgres);
        assert_eq!(
            sql,
            "SELECT * FROM \"persons\" WHERE CAST(\"persons\".\"meta_data\" #>> ARRAY[$1, $2] AS numeric) > CAST($3 AS numeric)"
        );
        assert_eq!(
            binds,
            vec![
                DynamicValue::from("stats"),
                DynamicValue::from("age"),
                DynamicValue::from("30")
            ]
        );
    }

    #[test]
    fn json_like_suppresses_same_key_equality() {
        let (sql, binds) = render(json!({ "like": { "meta:a.b": "x" }, "meta:a.b": "y" }), &Sqlite);
        assert_eq!(
            sql,
            "SELECT * FROM \"persons\" WHERE (\
             LOWER(CAST(json_extract(\"persons\".\"meta\", ?) AS TEXT)) LIKE LOWER(?) OR \
             json_extract(\"persons\".\"meta\", ?) IN (?))"
        );
        assert_eq!(sql.matches(" IN (").count(), 1);
        assert_eq!(
            binds,
            vec![
                DynamicValue::from("$.\"a\".\"b\""),
                DynamicValue::from("%x%"),
                DynamicValue::from("$.\"a\".\"b\""),
                DynamicValue::from("y")
            ]
        );
    }

    #[test]
    fn cast_token_casts_plain_column_and_values() {
        let (sql, binds) = render(
            json!({ "age::numeric": "20,30", "lt": { "age::numeric": "70" } }),
            &Postgres,
        );
        assert_eq!(
            sql,
            "SELECT * FROM \"persons\" WHERE \
             CAST(\"persons\".\"age\" AS numeric) IN (CAST($1 AS numeric), CAST($2 AS numeric)) AND \
             CAST(\"persons\".\"age\" AS numeric) < CAST($3 AS numeric)"
        );
        assert_eq!(
            binds,
            vec![DynamicValue::from("20"), DynamicValue::from("30"), DynamicValue::from("70")]
        );
    }

    #[test]
    fn custom_null_sentinel() {
        let (r, _) = fixture();
        let options = PluginOptions::default().with_null_string("NIL");
        let person = r.get_entity_by_name("person").unwrap();
        let ctx = CompileContext::new(&r, &person, "persons", &options);
        let map = json!({ "type": "NIL" }).as_object().unwrap().clone();
        let conds = compile_filter(&ctx, &parse_filter(&ctx, &map));
        assert!(matches!(conds.as_slice(), [Condition::IsNull(_)]));
    }
}
