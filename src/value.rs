//! Values carried by environment mutations and manifests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactId;
use crate::mutation::Mutation;
use crate::template::Template;

/// A closed, recursive value type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Text
    String(String),
    /// Number
    Number(f64),
    /// Boolean
    Boolean(bool),
    /// Artifact reference
    Artifact(ArtifactId),
    /// Template
    Template(Template),
    /// String-keyed map
    Map(BTreeMap<String, Value>),
    /// Ordered list
    Array(Vec<Value>),
    /// A deferred mutation
    Mutation(Box<Mutation>),
}

impl Value {
    /// Returns the kind name used in JSON and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::Artifact(_) => "artifact",
            Value::Template(_) => "template",
            Value::Map(_) => "map",
            Value::Array(_) => "array",
            Value::Mutation(_) => "mutation",
        }
    }

    /// Returns this value as a template, if it is text-like.
    pub fn as_template(&self) -> Option<Template> {
        match self {
            Value::String(s) => Some(Template::from(s.as_str())),
            Value::Template(t) => Some(t.clone()),
            Value::Artifact(id) => Some(Template::from(id.clone())),
            Value::Number(_) | Value::Boolean(_) => self.clone().normalize().as_template(),
            Value::Map(_) | Value::Array(_) | Value::Mutation(_) => None,
        }
    }

    /// Converts scalars to the string forms an environment can hold.
    ///
    /// Booleans become `"1"` or `""`, numbers their decimal form. Containers,
    /// templates, and nested mutations are normalized recursively.
    pub fn normalize(self) -> Value {
        match self {
            Value::Boolean(b) => Value::String(if b { "1".into() } else { String::new() }),
            Value::Number(n) => Value::String(format_number(n)),
            Value::Map(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, v.normalize()))
                    .collect(),
            ),
            Value::Array(values) => {
                Value::Array(values.into_iter().map(Value::normalize).collect())
            }
            Value::Mutation(mutation) => Value::Mutation(Box::new(mutation.normalize())),
            other => other,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Template> for Value {
    fn from(t: Template) -> Self {
        Value::Template(t)
    }
}

impl From<ArtifactId> for Value {
    fn from(id: ArtifactId) -> Self {
        Value::Artifact(id)
    }
}

impl From<Mutation> for Value {
    fn from(m: Mutation) -> Self {
        Value::Mutation(Box::new(m))
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::Array(values)
    }
}
