//! Artifact references reachable from a manifest.
//!
//! A wrapper file must depend on every artifact its manifest mentions, or a
//! store that copies the wrapper will leave the launcher with dangling ids.

use std::collections::BTreeSet;

use crate::artifact::{ArtifactId, ArtifactPath};
use crate::manifest::{Executable, Interpreter, Manifest};
use crate::mutation::Mutation;
use crate::template::Template;
use crate::value::Value;

/// Walks a manifest and collects every artifact id it references.
#[derive(Debug, Default)]
pub struct DependencyVisitor {
    ids: Vec<ArtifactId>,
}

impl DependencyVisitor {
    /// Creates an empty visitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the collected ids in visit order, duplicates included.
    pub fn into_ids(self) -> Vec<ArtifactId> {
        self.ids
    }

    /// Visits a manifest.
    pub fn visit_manifest(&mut self, manifest: &Manifest) {
        if let Some(interpreter) = &manifest.interpreter {
            self.visit_interpreter(interpreter);
        }
        match &manifest.executable {
            Executable::Path(path) => self.visit_path(path),
            Executable::Content(template) => self.visit_template(template),
        }
        if let Some(env) = &manifest.env {
            self.visit_mutation(env);
        }
        for arg in &manifest.args {
            self.visit_template(arg);
        }
    }

    /// Visits an interpreter descriptor.
    pub fn visit_interpreter(&mut self, interpreter: &Interpreter) {
        if let Some(path) = interpreter.path() {
            self.visit_path(path);
        }
        for path in interpreter.library_paths() {
            self.visit_path(path);
        }
        for path in interpreter.preloads() {
            self.visit_path(path);
        }
        for arg in interpreter.args() {
            self.visit_template(arg);
        }
    }

    /// Visits an artifact path.
    pub fn visit_path(&mut self, path: &ArtifactPath) {
        self.ids.push(path.artifact.clone());
    }

    /// Visits a template.
    pub fn visit_template(&mut self, template: &Template) {
        self.ids.extend(template.artifacts().cloned());
    }

    /// Visits a mutation and the values it carries.
    pub fn visit_mutation(&mut self, mutation: &Mutation) {
        match mutation {
            Mutation::Unset => {}
            Mutation::Set { value } | Mutation::SetIfUnset { value } => self.visit_value(value),
            Mutation::Prefix { template, .. } | Mutation::Suffix { template, .. } => {
                self.visit_template(template)
            }
            Mutation::Prepend { values } | Mutation::Append { values } => {
                for value in values {
                    self.visit_value(value);
                }
            }
            Mutation::Merge { value } => {
                for value in value.values() {
                    self.visit_value(value);
                }
            }
        }
    }

    /// Visits a value, recursing into containers.
    pub fn visit_value(&mut self, value: &Value) {
        match value {
            Value::String(_) | Value::Number(_) | Value::Boolean(_) => {}
            Value::Artifact(id) => self.ids.push(id.clone()),
            Value::Template(template) => self.visit_template(template),
            Value::Map(map) => {
                for value in map.values() {
                    self.visit_value(value);
                }
            }
            Value::Array(values) => {
                for value in values {
                    self.visit_value(value);
                }
            }
            Value::Mutation(mutation) => self.visit_mutation(mutation),
        }
    }
}

/// Returns every artifact id referenced by `manifest`, in visit order.
pub fn dependencies(manifest: &Manifest) -> Vec<ArtifactId> {
    let mut visitor = DependencyVisitor::new();
    visitor.visit_manifest(manifest);
    visitor.into_ids()
}

/// Returns the sorted, de-duplicated set of referenced artifact ids.
pub fn dependency_set(manifest: &Manifest) -> BTreeSet<ArtifactId> {
    dependencies(manifest).into_iter().collect()
}
