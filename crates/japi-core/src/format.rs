//! Public column names to stored column names.
//!
//! Only the final segment of the column path goes through the entity's
//! [`NameFormat`]; relation segments and the `:json.path:cast` suffix are kept
//! verbatim. Aggregate wrappers keep their function name and format the
//! argument only.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::entity::NameFormat;
use crate::sql::Aggregate;

static AGGREGATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(count|sum|avg|max|min)\((.+)\)$").unwrap());

/// Splits `count(x)` into its function and argument.
pub fn split_aggregate(token: &str) -> (Option<Aggregate>, &str) {
    match AGGREGATE.captures(token) {
        Some(caps) => match (caps.get(1), caps.get(2)) {
            (Some(f), Some(arg)) => (f.as_str().parse().ok(), arg.as_str()),
            _ => (None, token),
        },
        None => (None, token),
    }
}

/// Formats the last path segment of a token.
pub fn format_column(token: &str, format: &NameFormat) -> String {
    let (aggregate, inner) = split_aggregate(token);
    if let Some(agg) = aggregate {
        return format!("{}({})", agg.name(), format_column(inner, format));
    }

    let (path, suffix) = match inner.split_once(':') {
        Some((p, s)) => (p, Some(s)),
        None => (inner, None),
    };
    let formatted = match path.rsplit_once('.') {
        Some((relations, column)) => format!("{relations}.{}", format.apply(column)),
        None => format.apply(path),
    };
    match suffix {
        Some(s) => format!("{formatted}:{s}"),
        None => formatted,
    }
}
