//! Typed action parameters
//!
//! Mapping params are a small closed set of YAML value kinds. Actions read
//! the keys they need through typed accessors; unknown keys are ignored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Key holding the preset list of a cycling mapping
pub const PRESETS_KEY: &str = "presets";

/// A single parameter value
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<ParamValue>),
    Map(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "integer",
            ParamValue::Float(_) => "float",
            ParamValue::String(_) => "string",
            ParamValue::List(_) => "list",
            ParamValue::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            ParamValue::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ParamValue]> {
        match self {
            ParamValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, ParamValue>> {
        match self {
            ParamValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up `key` when this value is a map
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.as_map().and_then(|m| m.get(key))
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::String(s) => f.write_str(s),
            ParamValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            ParamValue::Map(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::String(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::String(s)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Int(i)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl From<Vec<ParamValue>> for ParamValue {
    fn from(items: Vec<ParamValue>) -> Self {
        ParamValue::List(items)
    }
}

/// Missing or mistyped parameter
#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("missing required parameter '{0}'")]
    Missing(String),
    #[error("parameter '{key}' must be a {expected}, got {actual}")]
    WrongType {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },
}

/// String-keyed parameter bag handed to an action
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ParamValue> {
        self.0.get_mut(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut ParamValue> {
        self.0.values_mut()
    }

    /// Copy of these params without `key`
    pub fn without(&self, key: &str) -> Params {
        Params(
            self.0
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Required string parameter
    pub fn str(&self, key: &str) -> Result<&str, ParamError> {
        let value = self.require(key)?;
        value.as_str().ok_or_else(|| wrong_type(key, "string", value))
    }

    /// Optional string parameter (present but mistyped is still an error)
    pub fn opt_str(&self, key: &str) -> Result<Option<&str>, ParamError> {
        self.get(key)
            .map(|value| value.as_str().ok_or_else(|| wrong_type(key, "string", value)))
            .transpose()
    }

    /// Required integer parameter
    pub fn i64(&self, key: &str) -> Result<i64, ParamError> {
        let value = self.require(key)?;
        value.as_i64().ok_or_else(|| wrong_type(key, "integer", value))
    }

    /// Optional list parameter
    pub fn opt_list(&self, key: &str) -> Result<Option<&[ParamValue]>, ParamError> {
        self.get(key)
            .map(|value| value.as_list().ok_or_else(|| wrong_type(key, "list", value)))
            .transpose()
    }

    /// Optional map parameter
    pub fn opt_map(&self, key: &str) -> Result<Option<&ParamValue>, ParamError> {
        self.get(key)
            .map(|value| match value {
                ParamValue::Map(_) => Ok(value),
                other => Err(wrong_type(key, "map", other)),
            })
            .transpose()
    }

    fn require(&self, key: &str) -> Result<&ParamValue, ParamError> {
        self.get(key).ok_or_else(|| ParamError::Missing(key.to_string()))
    }
}

impl FromIterator<(String, ParamValue)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Params(iter.into_iter().collect())
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("(no params)");
        }
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        f.write_str(&parts.join(", "))
    }
}

fn wrong_type(key: &str, expected: &'static str, value: &ParamValue) -> ParamError {
    ParamError::WrongType {
        key: key.to_string(),
        expected,
        actual: value.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_accessors() {
        let params = Params::new()
            .with("entity_id", "light.desk")
            .with("percent", 40i64);

        assert_eq!(params.str("entity_id"), Ok("light.desk"));
        assert_eq!(params.i64("percent"), Ok(40));
        assert_eq!(params.str("missing"), Err(ParamError::Missing("missing".into())));
        assert_eq!(
            params.str("percent"),
            Err(ParamError::WrongType {
                key: "percent".into(),
                expected: "string",
                actual: "integer",
            })
        );
        assert_eq!(params.opt_str("missing"), Ok(None));
    }

    #[test]
    fn test_without_strips_key() {
        let params = Params::new()
            .with("entity_id", "light.desk")
            .with(PRESETS_KEY, vec![ParamValue::from("a")]);

        let stripped = params.without(PRESETS_KEY);
        assert!(!stripped.contains_key(PRESETS_KEY));
        assert_eq!(stripped.len(), 1);
        // Original untouched
        assert!(params.contains_key(PRESETS_KEY));
    }

    #[test]
    fn test_deserialize_from_yaml() {
        let params: Params = serde_yaml::from_str(
            r#"
entity_id: light.x
presets:
  - {rgb: [255, 0, 0], name: Red}
  - {rgb: [0, 0, 255], name: Blue}
enabled: true
gain: 0.5
"#,
        )
        .unwrap();

        assert_eq!(params.str("entity_id"), Ok("light.x"));
        let presets = params.opt_list("presets").unwrap().unwrap();
        assert_eq!(presets.len(), 2);
        assert_eq!(presets[1].get("name").and_then(|v| v.as_str()), Some("Blue"));
        assert_eq!(params.get("enabled"), Some(&ParamValue::Bool(true)));
        assert_eq!(params.get("gain"), Some(&ParamValue::Float(0.5)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Params::new().to_string(), "(no params)");
        let params = Params::new().with("command", "ls").with("n", 3i64);
        assert_eq!(params.to_string(), "command=ls, n=3");
    }
}
