//! Engine-agnostic dynamic value representation.
//!
//! `DynamicValue` is what filter arguments are normalized into before they are
//! bound as query parameters, and what fetched rows are decoded into. It is a
//! small, clone-cheap wrapper over `ValueRepr`. `ObjectValue` is a row: a
//! key/value map with stable iteration order and copy-on-write inserts, which
//! lets eager-loaded relations be nested under their relation name.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use smol_str::SmolStr;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Coarse classification of values.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[non_exhaustive]
pub enum ValueKind {
    None,
    Bool,
    Number,
    String,
    Bytes,
    Seq,
    Object,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            ValueKind::None => "none",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Bytes => "bytes",
            ValueKind::Seq => "sequence",
            ValueKind::Object => "object",
        })
    }
}

/// Nested key/value object: stable iteration via `BTreeMap`, cheap clone via `Arc`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectValue(Arc<BTreeMap<SmolStr, DynamicValue>>);

impl ObjectValue {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_map(map: BTreeMap<SmolStr, DynamicValue>) -> Self {
        Self(Arc::new(map))
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn get(&self, key: &str) -> Option<&DynamicValue> {
        self.0.get(key)
    }
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
    pub fn keys(&self) -> impl Iterator<Item = &SmolStr> {
        self.0.keys()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&SmolStr, &DynamicValue)> {
        self.0.iter()
    }

    /// Persistent-style insert. Reuses allocation if uniquely owned.
    pub fn insert(&mut self, key: impl Into<SmolStr>, value: DynamicValue) -> &Self {
        let map = Arc::make_mut(&mut self.0);
        map.insert(key.into(), value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<DynamicValue> {
        Arc::make_mut(&mut self.0).remove(key)
    }
}

impl FromIterator<(SmolStr, DynamicValue)> for ObjectValue {
    fn from_iter<T: IntoIterator<Item = (SmolStr, DynamicValue)>>(iter: T) -> Self {
        Self::with_map(iter.into_iter().collect())
    }
}

impl Serialize for ObjectValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k.as_str(), v)?;
        }
        map.end()
    }
}

/// Internal representation for `DynamicValue`.
#[derive(Clone)]
pub enum ValueRepr {
    None,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(SmolStr),
    Bytes(Arc<Vec<u8>>),
    Seq(Arc<Vec<DynamicValue>>),
    Object(ObjectValue),
}

impl fmt::Debug for ValueRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueRepr::None => f.write_str("none"),
            ValueRepr::Bool(v) => v.fmt(f),
            ValueRepr::I64(v) => v.fmt(f),
            ValueRepr::F64(v) => v.fmt(f),
            ValueRepr::String(s) => s.as_str().fmt(f),
            ValueRepr::Bytes(b) => {
                write!(f, "b'")?;
                for &byte in b.iter() {
                    write!(f, "{}", byte.escape_ascii())?;
                }
                write!(f, "'")
            }
            ValueRepr::Seq(items) => f.debug_list().entries(items.iter()).finish(),
            ValueRepr::Object(obj) => f
                .debug_map()
                .entries(obj.iter().map(|(k, v)| (k.as_str(), v)))
                .finish(),
        }
    }
}

/// Public dynamic value wrapper.
#[derive(Clone)]
pub struct DynamicValue(pub ValueRepr);

impl DynamicValue {
    #[inline]
    pub fn none() -> Self {
        Self(ValueRepr::None)
    }

    #[inline]
    pub fn from_bytes(b: Vec<u8>) -> Self {
        Self(ValueRepr::Bytes(Arc::new(b)))
    }

    #[inline]
    pub fn from_object(obj: ObjectValue) -> Self {
        Self(ValueRepr::Object(obj))
    }

    #[inline]
    pub fn from_seq(items: Vec<DynamicValue>) -> Self {
        Self(ValueRepr::Seq(Arc::new(items)))
    }

    /// Converts a JSON scalar or container. Numbers keep their integer-ness.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::none(),
            serde_json::Value::Bool(b) => Self::from(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::from(i),
                None => Self::from(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::from(s.as_str()),
            serde_json::Value::Array(items) => {
                Self::from_seq(items.iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::from_object(
                map.iter()
                    .map(|(k, v)| (SmolStr::new(k), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match &self.0 {
            ValueRepr::None => ValueKind::None,
            ValueRepr::Bool(_) => ValueKind::Bool,
            ValueRepr::I64(_) | ValueRepr::F64(_) => ValueKind::Number,
            ValueRepr::String(_) => ValueKind::String,
            ValueRepr::Bytes(_) => ValueKind::Bytes,
            ValueRepr::Seq(_) => ValueKind::Seq,
            ValueRepr::Object(_) => ValueKind::Object,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self.0, ValueRepr::None)
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.0 {
            ValueRepr::String(s) => Some(s.as_str()),
            ValueRepr::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }
    pub fn as_i64(&self) -> Option<i64> {
        match &self.0 {
            ValueRepr::I64(n) => Some(*n),
            ValueRepr::F64(f) => (f.is_finite() && f.fract() == 0.0).then_some(*f as i64),
            ValueRepr::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }
    pub fn as_f64(&self) -> Option<f64> {
        match &self.0 {
            ValueRepr::F64(f) => Some(*f),
            ValueRepr::I64(n) => Some(*n as f64),
            _ => None,
        }
    }
    pub fn as_object(&self) -> Option<&ObjectValue> {
        match &self.0 {
            ValueRepr::Object(obj) => Some(obj),
            _ => None,
        }
    }
    pub fn as_seq(&self) -> Option<&[DynamicValue]> {
        match &self.0 {
            ValueRepr::Seq(items) => Some(items),
            _ => None,
        }
    }

    /// Key used to match a parent row to its children during relation stitching.
    ///
    /// Integers and their textual form share a key so that an integer primary key
    /// matches a foreign key stored as text. `None` never links.
    pub fn link_key(&self) -> Option<String> {
        match &self.0 {
            ValueRepr::None | ValueRepr::Seq(_) | ValueRepr::Object(_) => None,
            ValueRepr::F64(f) if f.fract() == 0.0 && f.is_finite() => Some((*f as i64).to_string()),
            _ => Some(self.to_string()),
        }
    }
}

impl fmt::Debug for DynamicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for DynamicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ValueRepr::None => f.write_str("null"),
            ValueRepr::Bool(v) => v.fmt(f),
            ValueRepr::I64(v) => v.fmt(f),
            ValueRepr::F64(v) => v.fmt(f),
            ValueRepr::String(s) => f.write_str(s),
            ValueRepr::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            ValueRepr::Seq(_) | ValueRepr::Object(_) => match serde_json::to_string(self) {
                Ok(s) => f.write_str(&s),
                Err(_) => Err(fmt::Error),
            },
        }
    }
}

impl Serialize for DynamicValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.0 {
            ValueRepr::None => serializer.serialize_none(),
            ValueRepr::Bool(b) => serializer.serialize_bool(*b),
            ValueRepr::I64(n) => serializer.serialize_i64(*n),
            ValueRepr::F64(f) => serializer.serialize_f64(*f),
            ValueRepr::String(s) => serializer.serialize_str(s),
            ValueRepr::Bytes(b) => serializer.serialize_str(&String::from_utf8_lossy(b)),
            ValueRepr::Seq(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            ValueRepr::Object(obj) => obj.serialize(serializer),
        }
    }
}

/* ----------------------- Equality across kinds ----------------------- */

impl PartialEq for DynamicValue {
    fn eq(&self, other: &Self) -> bool {
        use ValueRepr::*;
        match (&self.0, &other.0) {
            (None, None) => true,
            (Bool(a), Bool(b)) => a == b,
            (I64(a), I64(b)) => a == b,
            (F64(a), F64(b)) => a == b,
            (I64(a), F64(b)) | (F64(b), I64(a)) => (*a as f64) == *b,
            (String(a), String(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (Seq(a), Seq(b)) => a == b,
            (Object(a), Object(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for DynamicValue {
    fn from(v: bool) -> Self {
        Self(ValueRepr::Bool(v))
    }
}
impl From<i64> for DynamicValue {
    fn from(v: i64) -> Self {
        Self(ValueRepr::I64(v))
    }
}
impl From<i32> for DynamicValue {
    fn from(v: i32) -> Self {
        Self(ValueRepr::I64(v as i64))
    }
}
impl From<i16> for DynamicValue {
    fn from(v: i16) -> Self {
        Self(ValueRepr::I64(v as i64))
    }
}
impl From<f64> for DynamicValue {
    fn from(v: f64) -> Self {
        Self(ValueRepr::F64(v))
    }
}
impl From<f32> for DynamicValue {
    fn from(v: f32) -> Self {
        Self(ValueRepr::F64(v as f64))
    }
}
impl From<&str> for DynamicValue {
    fn from(s: &str) -> Self {
        Self(ValueRepr::String(SmolStr::new(s)))
    }
}
impl From<String> for DynamicValue {
    fn from(s: String) -> Self {
        Self(ValueRepr::String(SmolStr::from(s)))
    }
}
impl From<Vec<u8>> for DynamicValue {
    fn from(b: Vec<u8>) -> Self {
        DynamicValue::from_bytes(b)
    }
}
impl From<ObjectValue> for DynamicValue {
    fn from(o: ObjectValue) -> Self {
        DynamicValue::from_object(o)
    }
}
impl<T: Into<DynamicValue>> From<Option<T>> for DynamicValue {
    fn from(v: Option<T>) -> Self {
        v.map_or_else(DynamicValue::none, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_numbers_keep_integer_kind() {
        let v = DynamicValue::from_json(&json!(12));
        assert_eq!(v.as_i64(), Some(12));
        assert_eq!(v.kind(), ValueKind::Number);

        let v = DynamicValue::from_json(&json!(1.5));
        assert_eq!(v.as_f64(), Some(1.5));
        assert_eq!(v.as_i64(), None);
    }

    #[test]
    fn narrow_driver_numbers_widen() {
        assert_eq!(DynamicValue::from(7i16), DynamicValue::from(7i64));
        assert_eq!(DynamicValue::from(-3i32).as_i64(), Some(-3));
        assert_eq!(DynamicValue::from(0.5f32).as_f64(), Some(0.5));
    }

    #[test]
    fn link_keys_match_across_numeric_and_text() {
        assert_eq!(DynamicValue::from(1i64).link_key(), Some("1".to_string()));
        assert_eq!(DynamicValue::from("1").link_key(), Some("1".to_string()));
        assert_eq!(DynamicValue::from(1.0f64).link_key(), Some("1".to_string()));
        assert_eq!(DynamicValue::none().link_key(), None);
    }

    #[test]
    fn object_insert_is_copy_on_write() {
        let mut a = ObjectValue::new();
        a.insert("id", DynamicValue::from(1i64));
        let b = a.clone();
        a.insert("name", DynamicValue::from("Barney"));
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn serializes_nested_rows_as_json() {
        let mut pet = ObjectValue::new();
        pet.insert("name", DynamicValue::from("Big Bird"));
        let mut person = ObjectValue::new();
        person.insert("id", DynamicValue::from(1i64));
        person.insert("pets", DynamicValue::from_seq(vec![pet.into()]));
        person.insert("nickname", DynamicValue::none());

        let out = serde_json::to_value(&person).unwrap();
        assert_eq!(
            out,
            json!({"id": 1, "nickname": null, "pets": [{"name": "Big Bird"}]})
        );
    }
}
