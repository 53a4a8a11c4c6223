//! The JSON:API style parameter object.
//!
//! ```text
//! include: "a,b.c" | ["a", "b.c"]           (+ refinements added in code)
//! fields:  { "<type or relation path or ''>": "x,y" | ["x", "y"] }
//! sort:    "-a,b" | ["-a", "b"]
//! filter:  { <token>: scalar | list | {like|not|lt|gt|lte|gte: {..}} , "or": [ {..}, .. ] }
//! group:   "a,b" | ["a", "b"]
//! page:    { limit, offset } | { page, pageSize } | false
//! ```

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::sql::QueryPlan;

/// Callback refining the sub-query of an included relation.
pub type Refinement = Arc<dyn Fn(&mut QueryPlan) + Send + Sync>;

#[derive(Clone)]
pub struct IncludeRequest {
    pub path: String,
    pub refine: Option<Refinement>,
}

impl IncludeRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            refine: None,
        }
    }
}

impl fmt::Debug for IncludeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncludeRequest")
            .field("path", &self.path)
            .field("refine", &self.refine.is_some())
            .finish()
    }
}

/// Paging parameters; numeric strings are accepted for every field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpec {
    #[serde(default, deserialize_with = "lenient_u64", skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64", skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64", skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(
        default,
        rename = "pageSize",
        alias = "page_size",
        deserialize_with = "lenient_u64",
        skip_serializing_if = "Option::is_none"
    )]
    pub page_size: Option<u64>,
}

impl PageSpec {
    pub fn offset_based(limit: u64, offset: u64) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
            ..Self::default()
        }
    }

    pub fn numbered(page: u64, page_size: u64) -> Self {
        Self {
            page: Some(page),
            page_size: Some(page_size),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.offset.is_none() && self.page.is_none() && self.page_size.is_none()
    }
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    use serde_json::Value;
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("expected a non-negative integer, got {n}"))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("expected a non-negative integer, got `{s}`"))),
        Some(other) => Err(de::Error::custom(format!(
            "expected a non-negative integer, got {other}"
        ))),
    }
}

/// `page` as given: omitted, explicitly disabled, or a spec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PageParam {
    #[default]
    Absent,
    Disabled,
    Spec(PageSpec),
}

impl<'de> Deserialize<'de> for PageParam {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Spec(PageSpec),
        }
        Ok(match Option::<Raw>::deserialize(d)? {
            None | Some(Raw::Flag(true)) => PageParam::Absent,
            Some(Raw::Flag(false)) => PageParam::Disabled,
            Some(Raw::Spec(spec)) if spec.is_empty() => PageParam::Absent,
            Some(Raw::Spec(spec)) => PageParam::Spec(spec),
        })
    }
}

fn comma_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => comma_list(&s),
            OneOrMany::Many(v) => v,
        }
    }
}

fn string_or_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<OneOrMany>::deserialize(d)?
        .map(OneOrMany::into_vec)
        .unwrap_or_default())
}

fn includes<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<IncludeRequest>, D::Error> {
    Ok(string_or_list(d)?.into_iter().map(IncludeRequest::new).collect())
}

fn field_map<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<String, Vec<String>>, D::Error> {
    Ok(Option::<BTreeMap<String, OneOrMany>>::deserialize(d)?
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, v.into_vec()))
        .collect())
}

/// Parameters of one fetch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryParams {
    #[serde(default, deserialize_with = "includes")]
    pub include: Vec<IncludeRequest>,
    #[serde(default, deserialize_with = "field_map")]
    pub fields: BTreeMap<String, Vec<String>>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub sort: Vec<String>,
    #[serde(default)]
    pub filter: serde_json::Map<String, serde_json::Value>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub group: Vec<String>,
    #[serde(default)]
    pub page: PageParam,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(value: serde_json::Value) -> crate::Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn include(mut self, path: &str) -> Self {
        self.include.push(IncludeRequest::new(path));
        self
    }

    /// Includes `path` and refines its sub-query with `refine`.
    pub fn include_with(
        mut self,
        path: &str,
        refine: impl Fn(&mut QueryPlan) + Send + Sync + 'static,
    ) -> Self {
        self.include.push(IncludeRequest {
            path: path.to_string(),
            refine: Some(Arc::new(refine)),
        });
        self
    }

    pub fn fields<I, S>(mut self, key: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields
            .insert(key.to_string(), columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn sort(mut self, token: &str) -> Self {
        self.sort.push(token.to_string());
        self
    }

    pub fn group(mut self, token: &str) -> Self {
        self.group.push(token.to_string());
        self
    }

    /// Merges the entries of a JSON object into the filter.
    pub fn filter(mut self, filter: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = filter {
            self.filter.extend(map);
        }
        self
    }

    pub fn page(mut self, page: PageSpec) -> Self {
        self.page = if page.is_empty() {
            PageParam::Absent
        } else {
            PageParam::Spec(page)
        };
        self
    }

    pub fn without_paging(mut self) -> Self {
        self.page = PageParam::Disabled;
        self
    }
}
