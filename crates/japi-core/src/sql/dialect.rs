//! SQL dialect capabilities and the statement writer.
//!
//! A [`Dialect`] knows how to quote identifiers, number placeholders, cast
//! expressions and reach into JSON documents for one engine. [`SqlWriter`]
//! accumulates SQL text and bound parameters in textual order, so the
//! placeholder for every bind is decided at the moment it is written.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

use super::column::QualifiedColumn;
use super::helpers::validate_segment;
use crate::error::Result;
use crate::token::CastType;
use crate::value::DynamicValue;

pub trait Dialect: fmt::Debug + Send + Sync {
    fn kind(&self) -> DialectKind;

    /// Quotes a single, already validated identifier segment.
    fn quote_ident(&self, ident: &str) -> String;

    /// Placeholder for the `index`-th bind (1-based).
    fn placeholder(&self, index: usize) -> String;

    /// Opening/closing text around an expression cast to text.
    fn text_cast(&self) -> (&'static str, &'static str);

    /// Opening/closing text around an expression cast to `cast`.
    fn cast(&self, cast: CastType) -> (&'static str, &'static str);

    /// Whether the engine has a native case-insensitive `ILIKE`.
    fn native_ilike(&self) -> bool {
        false
    }

    /// Writes an expression extracting `path` from the JSON document in `column` as text.
    fn write_json_extract(
        &self,
        w: &mut SqlWriter<'_>,
        column: &QualifiedColumn,
        path: &[SmolStr],
    ) -> Result<()>;
}

/// `$."a"."b"` style path used by MySQL and SQLite.
fn dollar_path(path: &[SmolStr]) -> String {
    let mut out = String::from("$");
    for seg in path {
        out.push_str(".\"");
        out.push_str(&seg.replace('\\', "\\\\").replace('"', "\\\""));
        out.push('"');
    }
    out
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Postgres;

impl Dialect for Postgres {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{ident}\"")
    }
    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }
    fn text_cast(&self) -> (&'static str, &'static str) {
        ("CAST(", " AS text)")
    }
    fn cast(&self, cast: CastType) -> (&'static str, &'static str) {
        match cast {
            CastType::Numeric => ("CAST(", " AS numeric)"),
            CastType::Date => ("CAST(", " AS date)"),
            CastType::Timestamp => ("CAST(", " AS timestamp)"),
        }
    }
    fn native_ilike(&self) -> bool {
        true
    }
    fn write_json_extract(
        &self,
        w: &mut SqlWriter<'_>,
        column: &QualifiedColumn,
        path: &[SmolStr],
    ) -> Result<()> {
        w.push_column(column)?;
        w.push(" #>> ARRAY[");
        for (i, seg) in path.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.push_bind(DynamicValue::from(seg.as_str()));
        }
        w.push("]");
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MySql;

impl Dialect for MySql {
    fn kind(&self) -> DialectKind {
        DialectKind::MySql
    }
    fn quote_ident(&self, ident: &str) -> String {
        format!("`{ident}`")
    }
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }
    fn text_cast(&self) -> (&'static str, &'static str) {
        ("CAST(", " AS CHAR)")
    }
    fn cast(&self, cast: CastType) -> (&'static str, &'static str) {
        match cast {
            CastType::Numeric => ("CAST(", " AS DECIMAL(65,30))"),
            CastType::Date => ("CAST(", " AS DATE)"),
            CastType::Timestamp => ("CAST(", " AS DATETIME)"),
        }
    }
    fn write_json_extract(
        &self,
        w: &mut SqlWriter<'_>,
        column: &QualifiedColumn,
        path: &[SmolStr],
    ) -> Result<()> {
        w.push("JSON_UNQUOTE(JSON_EXTRACT(");
        w.push_column(column)?;
        w.push(", ");
        w.push_bind(DynamicValue::from(dollar_path(path)));
        w.push("))");
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{ident}\"")
    }
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }
    fn text_cast(&self) -> (&'static str, &'static str) {
        ("CAST(", " AS TEXT)")
    }
    fn cast(&self, cast: CastType) -> (&'static str, &'static str) {
        match cast {
            CastType::Numeric => ("CAST(", " AS NUMERIC)"),
            CastType::Date => ("date(", ")"),
            CastType::Timestamp => ("datetime(", ")"),
        }
    }
    fn write_json_extract(
        &self,
        w: &mut SqlWriter<'_>,
        column: &QualifiedColumn,
        path: &[SmolStr],
    ) -> Result<()> {
        w.push("json_extract(");
        w.push_column(column)?;
        w.push(", ");
        w.push_bind(DynamicValue::from(dollar_path(path)));
        w.push(")");
        Ok(())
    }
}

/// Engine selector, usable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    Postgres,
    MySql,
    Sqlite,
}

static POSTGRES: Postgres = Postgres;
static MYSQL: MySql = MySql;
static SQLITE: Sqlite = Sqlite;

impl DialectKind {
    pub fn dialect(self) -> &'static dyn Dialect {
        match self {
            DialectKind::Postgres => &POSTGRES,
            DialectKind::MySql => &MYSQL,
            DialectKind::Sqlite => &SQLITE,
        }
    }

    /// Infers the engine from a connection URL scheme.
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split_once(':').map(|(s, _)| s)?;
        match scheme.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(DialectKind::Postgres),
            "mysql" | "mariadb" => Some(DialectKind::MySql),
            "sqlite" => Some(DialectKind::Sqlite),
            _ => None,
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DialectKind::Postgres => "postgres",
            DialectKind::MySql => "mysql",
            DialectKind::Sqlite => "sqlite",
        })
    }
}

/// Accumulates SQL text and its bind values.
pub struct SqlWriter<'d> {
    dialect: &'d dyn Dialect,
    sql: String,
    binds: Vec<DynamicValue>,
}

impl<'d> SqlWriter<'d> {
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            binds: Vec::new(),
        }
    }

    pub fn dialect(&self) -> &'d dyn Dialect {
        self.dialect
    }

    pub fn push(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    /// Validates and quotes a single identifier.
    pub fn push_ident(&mut self, ident: &str) -> Result<()> {
        validate_segment(ident)?;
        let quoted = self.dialect.quote_ident(ident);
        self.sql.push_str(&quoted);
        Ok(())
    }

    pub fn push_column(&mut self, column: &QualifiedColumn) -> Result<()> {
        if let Some(table) = column.table() {
            self.push_ident(table)?;
            self.sql.push('.');
        }
        if column.is_wildcard() {
            self.sql.push('*');
            Ok(())
        } else {
            self.push_ident(column.column())
        }
    }

    pub fn push_bind(&mut self, value: DynamicValue) {
        self.binds.push(value);
        let placeholder = self.dialect.placeholder(self.binds.len());
        self.sql.push_str(&placeholder);
    }

    /// Placeholder wrapped in `cast` when given.
    pub fn push_cast_bind(&mut self, value: DynamicValue, cast: Option<CastType>) {
        match cast {
            Some(cast) => {
                let (open, close) = self.dialect.cast(cast);
                self.sql.push_str(open);
                self.push_bind(value);
                self.sql.push_str(close);
            }
            None => self.push_bind(value),
        }
    }

    /// Comma separated placeholders for every value, each wrapped in `cast` when given.
    pub fn push_bind_list(&mut self, values: &[DynamicValue], cast: Option<CastType>) {
        for (i, v) in values.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.push_cast_bind(v.clone(), cast);
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn finish(self) -> (String, Vec<DynamicValue>) {
        (self.sql, self.binds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_follow_bind_order() {
        let mut w = SqlWriter::new(&Postgres);
        w.push("a = ");
        w.push_bind(1i64.into());
        w.push(" AND b IN (");
        w.push_bind_list(&["x".into(), "y".into()], None);
        w.push(")");
        let (sql, binds) = w.finish();
        assert_eq!(sql, "a = $1 AND b IN ($2, $3)");
        assert_eq!(binds.len(), 3);
    }

    #[test]
    fn cast_binds_per_engine() {
        let values: [DynamicValue; 2] = ["1".into(), "2".into()];
        let mut w = SqlWriter::new(&Postgres);
        w.push_bind_list(&values, Some(CastType::Numeric));
        assert_eq!(w.sql(), "CAST($1 AS numeric), CAST($2 AS numeric)");

        let mut w = SqlWriter::new(&Sqlite);
        w.push_cast_bind("2024-01-01".into(), Some(CastType::Date));
        assert_eq!(w.sql(), "date(?)");
    }

    #[test]
    fn quoting_per_engine() -> anyhow::Result<()> {
        let col = QualifiedColumn::new(Some("persons"), "first_name");
        for (dialect, expected) in [
            (&Postgres as &dyn Dialect, "\"persons\".\"first_name\""),
            (&MySql, "`persons`.`first_name`"),
            (&Sqlite, "\"persons\".\"first_name\""),
        ] {
            let mut w = SqlWriter::new(dialect);
            w.push_column(&col)?;
            assert_eq!(w.sql(), expected);
        }
        Ok(())
    }

    #[test]
    fn json_extract_binds_every_segment() -> anyhow::Result<()> {
        let col = QualifiedColumn::new(Some("persons"), "meta");
        let path = [SmolStr::new("address"), SmolStr::new("city")];

        let mut w = SqlWriter::new(&Postgres);
        Postgres.write_json_extract(&mut w, &col, &path)?;
        let (sql, binds) = w.finish();
        assert_eq!(sql, "\"persons\".\"meta\" #>> ARRAY[$1, $2]");
        assert_eq!(binds, vec![DynamicValue::from("address"), DynamicValue::from("city")]);

        let mut w = SqlWriter::new(&MySql);
        MySql.write_json_extract(&mut w, &col, &path)?;
        let (sql, binds) = w.finish();
        assert_eq!(sql, "JSON_UNQUOTE(JSON_EXTRACT(`persons`.`meta`, ?))");
        assert_eq!(binds, vec![DynamicValue::from("$.\"address\".\"city\"")]);

        let mut w = SqlWriter::new(&Sqlite);
        Sqlite.write_json_extract(&mut w, &col, &path)?;
        assert_eq!(w.sql(), "json_extract(\"persons\".\"meta\", ?)");
        Ok(())
    }

    #[test]
    fn dialect_from_url() {
        assert_eq!(DialectKind::from_url("postgres://x/y"), Some(DialectKind::Postgres));
        assert_eq!(DialectKind::from_url("mysql://x/y"), Some(DialectKind::MySql));
        assert_eq!(DialectKind::from_url("sqlite::memory:"), Some(DialectKind::Sqlite));
        assert_eq!(DialectKind::from_url("oracle://x"), None);
    }
}
