//! Row decoding and parameter binding for the `Any` driver.

use anyhow::{anyhow, bail, Result};
use japi_core::value::ValueRepr;
use japi_core::{DynamicValue, ObjectValue};
use smol_str::SmolStr;
use sqlx::any::{Any, AnyArguments, AnyRow, AnyValueRef};
use sqlx::decode::Decode;
use sqlx::query::Query;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::collections::BTreeMap;

/// Decodes one column value. The `Any` driver reports a small fixed set of type names.
pub fn decode_value(vr: AnyValueRef<'_>) -> Result<DynamicValue> {
    if vr.is_null() {
        return Ok(DynamicValue::none());
    }

    let tn = vr.type_info().name().to_string();

    macro_rules! dec {
        ($t:ty) => {{
            <$t as Decode<'_, Any>>::decode(vr).map_err(|e| {
                anyhow!(
                    "decode {} as {} failed: {}",
                    tn,
                    std::any::type_name::<$t>(),
                    e
                )
            })
        }};
    }

    match tn.as_str() {
        "NULL" => Ok(DynamicValue::none()),
        "BOOLEAN" => Ok(DynamicValue::from(dec!(bool)?)),
        "SMALLINT" => Ok(DynamicValue::from(dec!(i16)?)),
        "INTEGER" => Ok(DynamicValue::from(dec!(i32)?)),
        "BIGINT" => Ok(DynamicValue::from(dec!(i64)?)),
        "REAL" => Ok(DynamicValue::from(dec!(f32)?)),
        "DOUBLE" => Ok(DynamicValue::from(dec!(f64)?)),
        "TEXT" => Ok(DynamicValue::from(dec!(String)?)),
        "BLOB" => Ok(DynamicValue::from(dec!(Vec<u8>)?)),
        other => bail!("Unsupported column type: {other}"),
    }
}

/// Decodes a whole row keyed by column name.
pub fn decode_row(row: &AnyRow) -> Result<ObjectValue> {
    let mut map = BTreeMap::new();
    for col in row.columns() {
        let name = col.name();
        let dv = row
            .try_get_raw(col.ordinal())
            .map_err(|e| anyhow!("error accessing column {name}: {e}"))
            .and_then(decode_value)?;
        map.insert(SmolStr::new(name), dv);
    }
    Ok(ObjectValue::with_map(map))
}

/// Binds one compiled parameter. Sequences and objects are bound as JSON text.
pub fn bind_value<'q>(
    q: Query<'q, Any, AnyArguments<'q>>,
    v: &DynamicValue,
) -> Result<Query<'q, Any, AnyArguments<'q>>> {
    Ok(match &v.0 {
        // NULL carries no type; bind it as text
        ValueRepr::None => q.bind(Option::<String>::None),
        ValueRepr::Bool(b) => q.bind(*b),
        ValueRepr::I64(i) => q.bind(*i),
        ValueRepr::F64(f) => q.bind(*f),
        ValueRepr::String(s) => q.bind(s.to_string()),
        ValueRepr::Bytes(b) => q.bind(b.as_ref().clone()),
        ValueRepr::Seq(_) | ValueRepr::Object(_) => q.bind(serde_json::to_string(v)?),
    })
}

/// Builds a query for `sql` with every parameter bound in order.
pub fn build_query<'q>(sql: &'q str, binds: &[DynamicValue]) -> Result<Query<'q, Any, AnyArguments<'q>>> {
    let mut q = sqlx::query::<Any>(sql);
    for v in binds {
        q = bind_value(q, v)?;
    }
    Ok(q)
}
