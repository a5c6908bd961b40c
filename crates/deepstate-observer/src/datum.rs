use indexmap::IndexMap;
use serde_json::{Map, Number, Value};

/// A value that can live in an observed tree.
///
/// `Array` and `Object` are composite and get wrapped node-by-node when they
/// enter a tree. `Binary`, `Date` and `Error` are opaque leaves: they are
/// stored as-is and never observed.
///
/// # Round-Trip Warning
///
/// Converting to [`Value`] encodes the opaque variants as plain JSON
/// (`Binary` as an array of byte numbers, `Date` as epoch milliseconds,
/// `Error` as its message). `Value -> Datum -> Value` is lossless,
/// `Datum -> Value -> Datum` is not for opaque leaves.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Datum>),
    Object(IndexMap<String, Datum>),
    /// Binary data (a blob).
    Binary(Vec<u8>),
    /// A point in time, as milliseconds since the Unix epoch.
    Date(i64),
    /// An error-like value carrying its message.
    Error(String),
}

impl Datum {
    /// Returns `true` for values that are wrapped into tree nodes.
    pub fn is_composite(&self) -> bool {
        matches!(self, Datum::Array(_) | Datum::Object(_))
    }

    /// Returns `true` for the non-observable leaf types.
    pub fn is_opaque(&self) -> bool {
        matches!(self, Datum::Binary(_) | Datum::Date(_) | Datum::Error(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Datum::Null => "null",
            Datum::Bool(_) => "boolean",
            Datum::Number(_) => "number",
            Datum::String(_) => "string",
            Datum::Array(_) => "array",
            Datum::Object(_) => "object",
            Datum::Binary(_) => "binary",
            Datum::Date(_) => "date",
            Datum::Error(_) => "error",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Datum::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Datum>> {
        match self {
            Datum::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Datum>> {
        match self {
            Datum::Object(map) => Some(map),
            _ => None,
        }
    }
}

impl From<Value> for Datum {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Datum::Null,
            Value::Bool(b) => Datum::Bool(b),
            Value::Number(n) => Datum::Number(n),
            Value::String(s) => Datum::String(s),
            Value::Array(items) => Datum::Array(items.into_iter().map(Datum::from).collect()),
            Value::Object(map) => {
                Datum::Object(map.into_iter().map(|(k, v)| (k, Datum::from(v))).collect())
            }
        }
    }
}

impl From<&Value> for Datum {
    fn from(value: &Value) -> Self {
        Datum::from(value.clone())
    }
}

impl From<Datum> for Value {
    /// Converts a `Datum` to a `Value`.
    ///
    /// **Note:** opaque leaves lose their type, see the type-level docs.
    fn from(datum: Datum) -> Self {
        match datum {
            Datum::Null => Value::Null,
            Datum::Bool(b) => Value::Bool(b),
            Datum::Number(n) => Value::Number(n),
            Datum::String(s) => Value::String(s),
            Datum::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Datum::Object(map) => {
                let mut out = Map::new();
                for (key, val) in map {
                    out.insert(key, Value::from(val));
                }
                Value::Object(out)
            }
            Datum::Binary(bytes) => {
                Value::Array(bytes.into_iter().map(|b| Value::Number(b.into())).collect())
            }
            Datum::Date(millis) => Value::Number(millis.into()),
            Datum::Error(message) => Value::String(message),
        }
    }
}

impl PartialEq<Value> for Datum {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Datum::Null, Value::Null) => true,
            (Datum::Bool(a), Value::Bool(b)) => a == b,
            (Datum::Number(a), Value::Number(b)) => a == b,
            (Datum::String(a), Value::String(b)) => a == b,
            (Datum::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
            }
            (Datum::Object(a), Value::Object(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v == w))
            }
            _ => false,
        }
    }
}

impl From<bool> for Datum {
    fn from(b: bool) -> Self {
        Datum::Bool(b)
    }
}

impl From<i64> for Datum {
    fn from(n: i64) -> Self {
        Datum::Number(n.into())
    }
}

impl From<i32> for Datum {
    fn from(n: i32) -> Self {
        Datum::Number(n.into())
    }
}

impl From<u64> for Datum {
    fn from(n: u64) -> Self {
        Datum::Number(n.into())
    }
}

impl From<f64> for Datum {
    /// Non-finite floats have no JSON number form and become `Null`.
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(Datum::Null, Datum::Number)
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Datum::String(s.to_owned())
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Self {
        Datum::String(s)
    }
}

impl From<Vec<Datum>> for Datum {
    fn from(items: Vec<Datum>) -> Self {
        Datum::Array(items)
    }
}

impl From<IndexMap<String, Datum>> for Datum {
    fn from(map: IndexMap<String, Datum>) -> Self {
        Datum::Object(map)
    }
}
