use std::collections::BTreeMap;

use crate::error::RedisError;

/// The script value. This is the only type crossing the script/host boundary.
/// Integers and floats carry distinct tags; Lua's unified number type is
/// re-disambiguated when a reply re-enters the host (see [`Value::from_json`]).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Host-language truthiness: `Null`, `false`, `0`, `0.0`, and the empty
    /// string are falsy. Containers are truthy even when empty.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(_) | Self::Map(_) => true,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Redis-style stringification used by `Concat`, `ToStr`, and the command
    /// marshaling paths. Integral floats print without a trailing `.0`.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Null => "nil".to_string(),
            Self::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            Self::Int(n) => n.to_string(),
            Self::Float(f) => fmt_float(*f),
            Self::Str(s) => s.clone(),
            Self::List(_) => "list".to_string(),
            Self::Map(_) => "map".to_string(),
        }
    }

    /// Interprets the value as a number, coercing numeric strings.
    /// Returns `None` if no numeric reading exists.
    #[must_use]
    pub fn as_number(&self) -> Option<Value> {
        match self {
            Self::Int(_) | Self::Float(_) => Some(self.clone()),
            Self::Str(s) => parse_number(s),
            _ => None,
        }
    }

    /// Interprets the value as an integer, truncating floats and coercing
    /// numeric strings the way Redis count arguments do.
    pub fn coerce_int(&self) -> Result<i64, RedisError> {
        match self {
            Self::Int(n) => Ok(*n),
            Self::Float(f) => Ok(*f as i64),
            Self::Str(s) => match parse_number(s) {
                Some(Value::Int(n)) => Ok(n),
                Some(Value::Float(f)) => Ok(f as i64),
                _ => Err(RedisError::NotInteger),
            },
            _ => Err(RedisError::NotInteger),
        }
    }

    /// Interprets the value as a float, coercing numeric strings.
    pub fn coerce_float(&self) -> Result<f64, RedisError> {
        match self {
            Self::Int(n) => Ok(*n as f64),
            Self::Float(f) => Ok(*f),
            Self::Str(s) => s.trim().parse::<f64>().map_err(|_| RedisError::NotFloat),
            _ => Err(RedisError::NotFloat),
        }
    }

    /// The boundary rule: at the outermost script return an empty list and an
    /// empty map both collapse to `Null`. Nested empties are left alone; Lua
    /// cannot represent them either, so the outermost collapse is sufficient.
    #[must_use]
    pub fn collapse_empty(self) -> Value {
        match &self {
            Self::List(items) if items.is_empty() => Self::Null,
            Self::Map(map) if map.is_empty() => Self::Null,
            _ => self,
        }
    }

    /// Encodes the value as compact JSON. Used for the `ARGV` framing and the
    /// `cjson.encode` script operation.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::Value::from(self.clone()).to_string()
    }

    /// Decodes strict JSON into a value. Whole numbers without a fraction or
    /// exponent become `Int`; everything else numeric becomes `Float`.
    pub fn from_json(text: &str) -> Result<Value, RedisError> {
        let parsed: serde_json::Value = serde_json::from_str(text)
            .map_err(|err| RedisError::parse(format!("invalid json: {err}")))?;
        Ok(Value::from(parsed))
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(n) => serde_json::Value::from(n),
            Value::Float(f) => {
                serde_json::Number::from_f64(f).map_or(serde_json::Value::Null, serde_json::Value::Number)
            }
            Value::Str(s) => serde_json::Value::String(s),
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(num) => match num.as_i64() {
                Some(n) => Value::Int(n),
                None => Value::Float(num.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::List(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Self::List(value.into_iter().map(Value::Str).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Self::Map(value)
    }
}

/// Formats a float the way Redis stringifies numbers: no trailing `.0` on
/// integral values.
#[must_use]
pub fn fmt_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e17 {
        format!("{}", f as i64)
    } else {
        format!("{f}")
    }
}

/// Parses a numeric string, preserving the int/float distinction.
#[must_use]
pub fn parse_number(s: &str) -> Option<Value> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Some(Value::Int(n));
    }
    trimmed.parse::<f64>().ok().map(Value::Float)
}
