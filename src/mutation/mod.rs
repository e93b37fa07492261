//! Environment mutations and their algebra.
//!
//! A [`Mutation`] describes how one variable changes. Wrapping a wrapper
//! stacks mutations, so [`merge`] folds a pair into the shortest sequence
//! with the same effect and [`Env`] keeps each variable's list minimal.

mod env;
mod merge;

pub use env::Env;
pub use merge::merge;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::template::Template;
use crate::value::Value;

/// A change to a single variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mutation {
    /// Remove the variable
    Unset,
    /// Replace the variable
    Set {
        /// New value
        value: Value,
    },
    /// Set the variable only if it has no value
    SetIfUnset {
        /// Value used when unset
        value: Value,
    },
    /// Prepend text, with a separator when a value already exists
    Prefix {
        /// Text to prepend
        template: Template,
        /// Separator placed between the new text and the old value
        #[serde(default, skip_serializing_if = "Option::is_none")]
        separator: Option<String>,
    },
    /// Append text, with a separator when a value already exists
    Suffix {
        /// Text to append
        template: Template,
        /// Separator placed between the old value and the new text
        #[serde(default, skip_serializing_if = "Option::is_none")]
        separator: Option<String>,
    },
    /// Insert values at the front of a list
    Prepend {
        /// Values to insert
        values: Vec<Value>,
    },
    /// Insert values at the back of a list
    Append {
        /// Values to insert
        values: Vec<Value>,
    },
    /// Merge keys into a map
    Merge {
        /// Keys to merge; these win over existing keys
        value: BTreeMap<String, Value>,
    },
}

impl Mutation {
    /// Creates a `set` mutation.
    pub fn set(value: impl Into<Value>) -> Self {
        Mutation::Set {
            value: value.into(),
        }
    }

    /// Creates a `set_if_unset` mutation.
    pub fn set_if_unset(value: impl Into<Value>) -> Self {
        Mutation::SetIfUnset {
            value: value.into(),
        }
    }

    /// Creates a `prefix` mutation.
    pub fn prefix(template: impl Into<Template>, separator: Option<&str>) -> Self {
        Mutation::Prefix {
            template: template.into(),
            separator: separator.map(str::to_string),
        }
    }

    /// Creates a `suffix` mutation.
    pub fn suffix(template: impl Into<Template>, separator: Option<&str>) -> Self {
        Mutation::Suffix {
            template: template.into(),
            separator: separator.map(str::to_string),
        }
    }

    /// Returns the kind name used in JSON and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::Unset => "unset",
            Mutation::Set { .. } => "set",
            Mutation::SetIfUnset { .. } => "set_if_unset",
            Mutation::Prefix { .. } => "prefix",
            Mutation::Suffix { .. } => "suffix",
            Mutation::Prepend { .. } => "prepend",
            Mutation::Append { .. } => "append",
            Mutation::Merge { .. } => "merge",
        }
    }

    /// Normalizes every value this mutation carries.
    pub fn normalize(self) -> Self {
        match self {
            Mutation::Set { value } => Mutation::Set {
                value: value.normalize(),
            },
            Mutation::SetIfUnset { value } => Mutation::SetIfUnset {
                value: value.normalize(),
            },
            Mutation::Prepend { values } => Mutation::Prepend {
                values: values.into_iter().map(Value::normalize).collect(),
            },
            Mutation::Append { values } => Mutation::Append {
                values: values.into_iter().map(Value::normalize).collect(),
            },
            Mutation::Merge { value } => Mutation::Merge {
                value: value.into_iter().map(|(k, v)| (k, v.normalize())).collect(),
            },
            other => other,
        }
    }

    /// Applies this mutation to an optional current value.
    ///
    /// This defines what a mutation means; [`merge`] must agree with it.
    pub fn apply(&self, current: Option<Value>) -> Result<Option<Value>> {
        let incompatible = |existing: &Value| Error::IncompatibleMutation {
            existing: existing.kind(),
            incoming: self.kind(),
        };

        match self {
            Mutation::Unset => Ok(None),
            Mutation::Set { value } => Ok(Some(value.clone())),
            Mutation::SetIfUnset { value } => Ok(Some(current.unwrap_or_else(|| value.clone()))),
            Mutation::Prefix {
                template,
                separator,
            } => match current {
                None => Ok(Some(Value::Template(template.clone()))),
                Some(existing) => {
                    let old = existing.as_template().ok_or_else(|| incompatible(&existing))?;
                    Ok(Some(Value::Template(Template::join(
                        Some(separator.as_deref().unwrap_or("")),
                        [template.clone(), old],
                    ))))
                }
            },
            Mutation::Suffix {
                template,
                separator,
            } => match current {
                None => Ok(Some(Value::Template(template.clone()))),
                Some(existing) => {
                    let old = existing.as_template().ok_or_else(|| incompatible(&existing))?;
                    Ok(Some(Value::Template(Template::join(
                        Some(separator.as_deref().unwrap_or("")),
                        [old, template.clone()],
                    ))))
                }
            },
            Mutation::Prepend { values } => match current {
                None => Ok(Some(Value::Array(values.clone()))),
                Some(Value::Array(old)) => {
                    let mut out = values.clone();
                    out.extend(old);
                    Ok(Some(Value::Array(out)))
                }
                Some(existing) => Err(incompatible(&existing)),
            },
            Mutation::Append { values } => match current {
                None => Ok(Some(Value::Array(values.clone()))),
                Some(Value::Array(mut old)) => {
                    old.extend(values.iter().cloned());
                    Ok(Some(Value::Array(old)))
                }
                Some(existing) => Err(incompatible(&existing)),
            },
            Mutation::Merge { value } => match current {
                None => Ok(Some(Value::Map(value.clone()))),
                Some(Value::Map(mut old)) => {
                    old.extend(value.iter().map(|(k, v)| (k.clone(), v.clone())));
                    Ok(Some(Value::Map(old)))
                }
                Some(existing) => Err(incompatible(&existing)),
            },
        }
    }
}

/// Applies a sequence of mutations in order.
pub fn apply_all<'a, I>(mutations: I, mut current: Option<Value>) -> Result<Option<Value>>
where
    I: IntoIterator<Item = &'a Mutation>,
{
    for mutation in mutations {
        current = mutation.apply(current)?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_text() {
        let prefix = Mutation::prefix("/a", Some(":"));
        let suffix = Mutation::suffix("/z", Some(":"));

        assert_eq!(
            prefix.apply(None).unwrap(),
            Some(Value::Template("/a".into()))
        );
        assert_eq!(
            prefix.apply(Some("/b".into())).unwrap(),
            Some(Value::Template("/a:/b".into()))
        );
        assert_eq!(
            suffix.apply(Some("/b".into())).unwrap(),
            Some(Value::Template("/b:/z".into()))
        );
        assert!(matches!(
            prefix.apply(Some(Value::Array(vec![]))),
            Err(Error::IncompatibleMutation {
                existing: "array",
                incoming: "prefix"
            })
        ));
    }

    #[test]
    fn test_apply_lists_and_maps() {
        let append = Mutation::Append {
            values: vec!["b".into()],
        };
        let prepend = Mutation::Prepend {
            values: vec!["a".into()],
        };
        let out = apply_all([&append, &prepend], None).unwrap();
        assert_eq!(out, Some(Value::Array(vec!["a".into(), "b".into()])));

        let merge = Mutation::Merge {
            value: [("k".to_string(), Value::from("new"))].into_iter().collect(),
        };
        let base = Value::Map(
            [
                ("k".to_string(), Value::from("old")),
                ("j".to_string(), Value::from("keep")),
            ]
            .into_iter()
            .collect(),
        );
        let Some(Value::Map(out)) = merge.apply(Some(base)).unwrap() else {
            panic!("expected map");
        };
        assert_eq!(out["k"], Value::from("new"));
        assert_eq!(out["j"], Value::from("keep"));
    }

    #[test]
    fn test_set_if_unset() {
        let m = Mutation::set_if_unset("default");
        assert_eq!(m.apply(None).unwrap(), Some("default".into()));
        assert_eq!(m.apply(Some("x".into())).unwrap(), Some("x".into()));
    }

    #[test]
    fn test_json_shape() {
        let m = Mutation::prefix("/bin", Some(":"));
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["kind"], "prefix");
        assert_eq!(json["separator"], ":");
        assert_eq!(json["template"]["components"][0]["value"], "/bin");

        let unset: Mutation = serde_json::from_str(r#"{"kind":"unset"}"#).unwrap();
        assert_eq!(unset, Mutation::Unset);

        let set: Mutation =
            serde_json::from_str(r#"{"kind":"set_if_unset","value":{"kind":"boolean","value":true}}"#)
                .unwrap();
        assert_eq!(set.normalize(), Mutation::set_if_unset("1"));
    }
}
