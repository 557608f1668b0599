// src/identity/params.rs

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::identity::hash::{CanonicalEncoder, tag};

/// Parameter map of a dataset. Keys are kept sorted.
pub type Params = BTreeMap<String, ParamValue>;

/// Hashable, order-stable parameter value.
///
/// Containers are normalised on the way in: maps are sorted by key and sets
/// are sorted and deduplicated by canonical encoding, so two semantically
/// equal parameter sets always encode (and hash) identically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ParamValue>),
    Set(Vec<ParamValue>),
    Map(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    /// Build a set value; order and duplicates in `items` are irrelevant.
    pub fn set<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ParamValue>,
    {
        let mut keyed: Vec<(Vec<u8>, ParamValue)> = items
            .into_iter()
            .map(|item| {
                let value = item.into().normalized();
                (value.canonical_bytes(), value)
            })
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        keyed.dedup_by(|a, b| a.0 == b.0);
        ParamValue::Set(keyed.into_iter().map(|(_, v)| v).collect())
    }

    /// Re-establish set ordering after deserialisation or hand construction.
    pub fn normalized(self) -> Self {
        match self {
            ParamValue::List(items) => {
                ParamValue::List(items.into_iter().map(ParamValue::normalized).collect())
            }
            ParamValue::Set(items) => ParamValue::set(items),
            ParamValue::Map(map) => ParamValue::Map(
                map.into_iter().map(|(k, v)| (k, v.normalized())).collect(),
            ),
            scalar => scalar,
        }
    }

    pub fn encode(&self, enc: &mut CanonicalEncoder) {
        match self {
            ParamValue::Null => {
                enc.null();
            }
            ParamValue::Bool(b) => {
                enc.bool(*b);
            }
            ParamValue::Int(i) => {
                enc.int(*i);
            }
            ParamValue::Float(f) => {
                enc.float(*f);
            }
            ParamValue::Str(s) => {
                enc.str(s);
            }
            ParamValue::List(items) => {
                enc.tag(tag::LIST).len_prefix(items.len());
                for item in items {
                    item.encode(enc);
                }
            }
            ParamValue::Set(items) => {
                let mut encoded: Vec<Vec<u8>> =
                    items.iter().map(ParamValue::canonical_bytes).collect();
                encoded.sort();
                encoded.dedup();
                enc.tag(tag::SET).len_prefix(encoded.len());
                for bytes in &encoded {
                    enc.raw(bytes);
                }
            }
            ParamValue::Map(map) => {
                enc.tag(tag::MAP).len_prefix(map.len());
                for (key, value) in map {
                    enc.str(key);
                    value.encode(enc);
                }
            }
        }
    }

    /// False if any float inside is NaN or infinite. Such values have no
    /// JSON form and cannot be persisted.
    pub fn is_finite(&self) -> bool {
        match self {
            ParamValue::Float(f) => f.is_finite(),
            ParamValue::List(items) | ParamValue::Set(items) => items.iter().all(Self::is_finite),
            ParamValue::Map(map) => map.values().all(Self::is_finite),
            _ => true,
        }
    }

    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut enc = CanonicalEncoder::new();
        self.encode(&mut enc);
        enc.into_bytes()
    }

    /// Interpret a command-line string as bool, integer, float, else string.
    pub fn parse_loose(raw: &str) -> Self {
        if let Ok(b) = raw.parse::<bool>() {
            return ParamValue::Bool(b);
        }
        if let Ok(i) = raw.parse::<i64>() {
            return ParamValue::Int(i);
        }
        match raw.parse::<f64>() {
            Ok(f) if f.is_finite() => return ParamValue::Float(f),
            _ => {}
        }
        ParamValue::Str(raw.to_string())
    }
}

/// Encode a whole parameter map.
pub fn encode_params(params: &Params, enc: &mut CanonicalEncoder) {
    enc.tag(tag::MAP).len_prefix(params.len());
    for (key, value) in params {
        enc.str(key);
        value.encode(enc);
    }
}

/// Normalise every value of a parameter map.
pub fn normalize_params(params: Params) -> Params {
    params
        .into_iter()
        .map(|(k, v)| (k, v.normalized()))
        .collect()
}

impl PartialEq for ParamValue {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_bytes() == other.canonical_bytes()
    }
}

impl Eq for ParamValue {}

impl Hash for ParamValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_bytes().hash(state);
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => write!(f, "null"),
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Str(s) => write!(f, "{s:?}"),
            ParamValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            ParamValue::Set(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "}}")
            }
            ParamValue::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ParamValue::Null, Into::into)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(value: Vec<T>) -> Self {
        ParamValue::List(value.into_iter().map(|v| v.into().normalized()).collect())
    }
}

impl<T: Into<ParamValue>> From<BTreeSet<T>> for ParamValue {
    fn from(value: BTreeSet<T>) -> Self {
        ParamValue::set(value)
    }
}

impl<T: Into<ParamValue>> From<HashSet<T>> for ParamValue {
    fn from(value: HashSet<T>) -> Self {
        ParamValue::set(value)
    }
}

impl<V: Into<ParamValue>> From<BTreeMap<String, V>> for ParamValue {
    fn from(value: BTreeMap<String, V>) -> Self {
        ParamValue::Map(
            value
                .into_iter()
                .map(|(k, v)| (k, v.into().normalized()))
                .collect(),
        )
    }
}

impl<V: Into<ParamValue>> From<HashMap<String, V>> for ParamValue {
    fn from(value: HashMap<String, V>) -> Self {
        ParamValue::Map(
            value
                .into_iter()
                .map(|(k, v)| (k, v.into().normalized()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_order_and_duplicates_do_not_matter() {
        let a = ParamValue::set(vec![3, 1, 2, 1]);
        let b = ParamValue::set(vec![1, 2, 3]);
        assert_eq!(a, b);
        assert_eq!(a.canonical_bytes(), b.canonical_bytes());
    }

    #[test]
    fn list_order_matters() {
        let a = ParamValue::from(vec![1, 2]);
        let b = ParamValue::from(vec![2, 1]);
        assert_ne!(a, b);
    }

    #[test]
    fn hash_map_and_btree_map_encode_identically() {
        let mut hashed = HashMap::new();
        hashed.insert("b".to_string(), 2);
        hashed.insert("a".to_string(), 1);
        let mut sorted = BTreeMap::new();
        sorted.insert("a".to_string(), 1);
        sorted.insert("b".to_string(), 2);

        assert_eq!(ParamValue::from(hashed), ParamValue::from(sorted));
    }

    #[test]
    fn int_and_float_are_distinct() {
        assert_ne!(ParamValue::Int(1), ParamValue::Float(1.0));
    }

    #[test]
    fn parse_loose_prefers_narrowest_type() {
        assert_eq!(ParamValue::parse_loose("true"), ParamValue::Bool(true));
        assert_eq!(ParamValue::parse_loose("12"), ParamValue::Int(12));
        assert_eq!(ParamValue::parse_loose("1.5"), ParamValue::Float(1.5));
        assert_eq!(ParamValue::parse_loose("abc"), ParamValue::from("abc"));
        assert_eq!(ParamValue::parse_loose("NaN"), ParamValue::from("NaN"));
        assert_eq!(ParamValue::parse_loose("inf"), ParamValue::from("inf"));
    }

    #[test]
    fn deserialised_sets_are_renormalised() {
        let json = r#"{"type":"set","value":[{"type":"int","value":2},{"type":"int","value":1}]}"#;
        let parsed: ParamValue = serde_json::from_str(json).unwrap();
        match parsed.clone().normalized() {
            ParamValue::Set(items) => assert_eq!(items, vec![ParamValue::Int(1), ParamValue::Int(2)]),
            other => panic!("expected set, got {other:?}"),
        }
        assert_eq!(parsed, ParamValue::set(vec![1, 2]));
    }
}
