//! Column reference tokens: `[relation.path.]column[:json.sub.path][:cast]`.
//!
//! A plain column takes a cast with an empty json path: `age::numeric`.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;
use std::str::FromStr;

/// Type a column or JSON-extracted value is cast to before comparison or ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CastType {
    Numeric,
    Date,
    Timestamp,
}

impl FromStr for CastType {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "numeric" => Ok(CastType::Numeric),
            "date" => Ok(CastType::Date),
            "timestamp" => Ok(CastType::Timestamp),
            _ => Err(()),
        }
    }
}

impl fmt::Display for CastType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CastType::Numeric => "numeric",
            CastType::Date => "date",
            CastType::Timestamp => "timestamp",
        })
    }
}

/// Parsed column token. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnReference {
    pub relation_path: Vec<SmolStr>,
    pub column: SmolStr,
    pub json_path: Option<Vec<SmolStr>>,
    pub cast: Option<CastType>,
}

impl ColumnReference {
    /// Never fails: an unknown cast is dropped, an empty json path means no json access.
    pub fn parse(token: &str) -> Self {
        let mut parts = token.splitn(3, ':');
        let path = parts.next().unwrap_or_default();
        let json = parts.next().filter(|s| !s.is_empty());
        let cast = parts.next().and_then(|c| c.parse::<CastType>().ok());

        let mut segments: Vec<SmolStr> = path.split('.').map(SmolStr::new).collect();
        let column = segments.pop().unwrap_or_default();
        let json_path = json.map(|j| j.split('.').map(SmolStr::new).collect::<Vec<_>>());

        ColumnReference {
            relation_path: segments,
            column,
            json_path,
            cast,
        }
    }

    pub fn is_json(&self) -> bool {
        self.json_path.is_some()
    }

    pub fn has_relation(&self) -> bool {
        !self.relation_path.is_empty()
    }

    /// Dotted relation path, empty for root columns.
    pub fn relation_key(&self) -> String {
        self.relation_path.join(".")
    }

    /// Alias of the table holding the column: the last relation segment, or `root`.
    pub fn table_alias<'a>(&'a self, root: &'a str) -> &'a str {
        self.relation_path.last().map(SmolStr::as_str).unwrap_or(root)
    }
}

impl fmt::Display for ColumnReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rel in &self.relation_path {
            write!(f, "{rel}.")?;
        }
        f.write_str(&self.column)?;
        match (&self.json_path, self.cast) {
            (Some(json), Some(cast)) => write!(f, ":{}:{cast}", json.join(".")),
            (Some(json), None) => write!(f, ":{}", json.join(".")),
            (None, Some(cast)) => write!(f, "::{cast}"),
            (None, None) => Ok(()),
        }
    }
}

/// Splits on commas not preceded by a backslash; `\,` becomes a literal comma.
pub fn split_escaped(input: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&',') => {
                current.push(',');
                chars.next();
            }
            ',' => out.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    out.push(current);
    out
}
