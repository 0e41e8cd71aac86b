pub mod filters;
pub mod manager;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use manager::FeatureManager;

/// Parameters attached to one filter config
pub type Parameters = HashMap<String, ParamValue>;

// Identity snapshot passed into every filter evaluation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureContext {
    pub user_id: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl FeatureContext {
    pub fn new(
        user_id: impl Into<String>,
        roles: impl IntoIterator<Item = impl Into<String>>,
        permissions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            roles: roles.into_iter().map(Into::into).collect(),
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// A single filter parameter value as it appears in a feature document.
///
/// Variant order matters for untagged decoding: booleans and numbers are
/// tried before strings so `true` and `0.5` keep their types. Anything else
/// (null, mixed lists, maps) lands in `Other` and is only rejected by the
/// filter that reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<String>),
    Other(serde_yaml::Value),
}

impl ParamValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Other(serde_yaml::Value::Null))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            ParamValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<Vec<&str>> for ParamValue {
    fn from(value: Vec<&str>) -> Self {
        ParamValue::List(value.into_iter().map(str::to_string).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub name: String,
    #[serde(default)]
    pub parameters: Parameters,
}

impl FilterConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Parameters::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

// Filters are evaluated in list order, first match wins
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDefinition {
    pub name: String,
    pub enabled: bool,
    pub filters: Vec<FilterConfig>,
}

impl FeatureDefinition {
    pub fn new(name: impl Into<String>, enabled: bool, filters: Vec<FilterConfig>) -> Self {
        Self {
            name: name.into(),
            enabled,
            filters,
        }
    }
}

// Why a flag evaluated the way it did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "filter", rename_all = "snake_case")]
pub enum EvaluationReason {
    NotFound,
    Disabled,
    FilterMatched(String),
    NoFilterMatched,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureEvaluation {
    pub enabled: bool,
    pub reason: EvaluationReason,
}

impl FeatureEvaluation {
    fn off(reason: EvaluationReason) -> Self {
        Self {
            enabled: false,
            reason,
        }
    }
}
