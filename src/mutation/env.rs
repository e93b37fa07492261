//! Per-variable mutation lists.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::value::Value;

use super::{merge, Mutation};

/// An ordered map from variable name to its minimal mutation list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Env {
    vars: BTreeMap<String, Vec<Mutation>>,
}

impl Env {
    /// Creates an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no variable is mutated.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Returns the number of mutated variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns the mutation list of a variable.
    pub fn get(&self, name: &str) -> Option<&[Mutation]> {
        self.vars.get(name).map(Vec::as_slice)
    }

    /// Iterates variables in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Mutation])> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Adds a mutation to a variable, folding it into the list.
    ///
    /// A merged pair keeps folding backwards. An incoming mutation that
    /// commutes with the last one is also tried against the one before it,
    /// so `prefix, suffix, prefix` keeps a single prefix.
    pub fn push(&mut self, name: &str, mutation: Mutation, aggressive: bool) -> Result<()> {
        let list = self.vars.entry(name.to_string()).or_default();
        fold_into(list, mutation.normalize(), aggressive)
    }

    /// Applies every mutation of `other` after the mutations already here.
    pub fn merge(&mut self, other: Env, aggressive: bool) -> Result<()> {
        for (name, mutations) in other.vars {
            for mutation in mutations {
                self.push(&name, mutation, aggressive)?;
            }
        }
        Ok(())
    }

    /// Encodes the environment as `set(map{NAME: array[mutation...]})`.
    pub fn to_mutation(&self) -> Mutation {
        let map = self
            .vars
            .iter()
            .map(|(name, mutations)| {
                let values = mutations.iter().cloned().map(Value::from).collect();
                (name.clone(), Value::Array(values))
            })
            .collect();
        Mutation::Set {
            value: Value::Map(map),
        }
    }

    /// Decodes an environment from its manifest form.
    ///
    /// Besides arrays of mutations, a variable may hold a single mutation or
    /// a plain value, which means `set(value)`.
    pub fn from_mutation(mutation: &Mutation, aggressive: bool) -> Result<Self> {
        let Mutation::Set {
            value: Value::Map(map),
        } = mutation
        else {
            return Err(Error::UnsupportedEnv(mutation.kind()));
        };

        let mut env = Env::new();
        for (name, value) in map {
            match value {
                Value::Array(items) => {
                    for item in items {
                        env.push(name, value_to_mutation(item), aggressive)?;
                    }
                }
                other => env.push(name, value_to_mutation(other), aggressive)?,
            }
        }
        Ok(env)
    }

    /// Applies the environment to a set of variables.
    pub fn apply(&self, vars: &mut BTreeMap<String, Value>) -> Result<()> {
        for (name, mutations) in &self.vars {
            let current = vars.remove(name);
            if let Some(value) = super::apply_all(mutations, current)? {
                vars.insert(name.clone(), value);
            }
        }
        Ok(())
    }
}

fn fold_into(list: &mut Vec<Mutation>, mutation: Mutation, aggressive: bool) -> Result<()> {
    let Some(last) = list.pop() else {
        list.push(mutation);
        return Ok(());
    };

    let mut merged = merge(last, mutation, aggressive)?.into_iter();
    match (merged.next(), merged.next()) {
        (Some(single), None) => fold_into(list, single, aggressive),
        (Some(last), Some(incoming)) => {
            let folds_past = commutes(&last, &incoming)
                && list.last().is_some_and(|prev| {
                    merge(prev.clone(), incoming.clone(), aggressive)
                        .is_ok_and(|m| m.len() == 1)
                });
            if folds_past {
                fold_into(list, incoming, aggressive)?;
                list.push(last);
            } else {
                list.push(last);
                list.push(incoming);
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Whether applying `a, b` always equals applying `b, a`.
fn commutes(a: &Mutation, b: &Mutation) -> bool {
    match (a, b) {
        (
            Mutation::Prefix { separator: s1, .. },
            Mutation::Suffix { separator: s2, .. },
        )
        | (
            Mutation::Suffix { separator: s1, .. },
            Mutation::Prefix { separator: s2, .. },
        ) => s1 == s2,
        (Mutation::Append { .. }, Mutation::Prepend { .. })
        | (Mutation::Prepend { .. }, Mutation::Append { .. }) => true,
        _ => false,
    }
}

fn value_to_mutation(value: &Value) -> Mutation {
    match value {
        Value::Mutation(mutation) => (**mutation).clone(),
        other => Mutation::Set {
            value: other.clone(),
        },
    }
}

impl From<BTreeMap<String, Vec<Mutation>>> for Env {
    fn from(vars: BTreeMap<String, Vec<Mutation>>) -> Self {
        Self { vars }
    }
}
