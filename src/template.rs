//! Templates: strings with embedded artifact references.
//!
//! A template renders to a string once each artifact is placed somewhere on
//! disk. Adjacent string components are always coalesced and empty strings
//! dropped, so two templates that render the same text compare equal.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactId, ArtifactPath};

/// A single template component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Component {
    /// Literal text
    String(String),
    /// Reference to an artifact
    Artifact(ArtifactId),
}

#[derive(Deserialize)]
struct TemplateData {
    components: Vec<Component>,
}

/// An ordered list of string and artifact components.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "TemplateData")]
pub struct Template {
    components: Vec<Component>,
}

impl Template {
    /// Creates an empty template.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the components.
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Returns true if the template renders to the empty string.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Appends a component, coalescing adjacent strings.
    pub fn push(&mut self, component: Component) {
        match component {
            Component::String(s) => self.push_str(&s),
            Component::Artifact(id) => self.components.push(Component::Artifact(id)),
        }
    }

    /// Appends literal text.
    pub fn push_str(&mut self, s: &str) {
        if s.is_empty() {
            return;
        }
        if let Some(Component::String(last)) = self.components.last_mut() {
            last.push_str(s);
        } else {
            self.components.push(Component::String(s.to_string()));
        }
    }

    /// Appends an artifact reference.
    pub fn push_artifact(&mut self, id: ArtifactId) {
        self.components.push(Component::Artifact(id));
    }

    /// Appends every component of `other`.
    pub fn append(&mut self, other: Template) {
        for component in other.components {
            self.push(component);
        }
    }

    /// Joins templates with an optional separator between each pair.
    pub fn join<I>(separator: Option<&str>, parts: I) -> Self
    where
        I: IntoIterator<Item = Template>,
    {
        let mut out = Template::new();
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                if let Some(sep) = separator {
                    out.push_str(sep);
                }
            }
            out.append(part);
        }
        out
    }

    /// Returns the artifacts referenced by this template.
    pub fn artifacts(&self) -> impl Iterator<Item = &ArtifactId> {
        self.components.iter().filter_map(|c| match c {
            Component::Artifact(id) => Some(id),
            Component::String(_) => None,
        })
    }

    /// Renders the template, substituting each artifact with `f(id)`.
    pub fn render<F>(&self, mut f: F) -> String
    where
        F: FnMut(&ArtifactId) -> String,
    {
        let mut out = String::new();
        for component in &self.components {
            match component {
                Component::String(s) => out.push_str(s),
                Component::Artifact(id) => out.push_str(&f(id)),
            }
        }
        out
    }
}

impl From<TemplateData> for Template {
    fn from(data: TemplateData) -> Self {
        data.components.into_iter().collect()
    }
}

impl FromIterator<Component> for Template {
    fn from_iter<I: IntoIterator<Item = Component>>(iter: I) -> Self {
        let mut template = Template::new();
        for component in iter {
            template.push(component);
        }
        template
    }
}

impl From<&str> for Template {
    fn from(s: &str) -> Self {
        let mut template = Template::new();
        template.push_str(s);
        template
    }
}

impl From<String> for Template {
    fn from(s: String) -> Self {
        Template::from(s.as_str())
    }
}

impl From<ArtifactId> for Template {
    fn from(id: ArtifactId) -> Self {
        Self {
            components: vec![Component::Artifact(id)],
        }
    }
}

impl From<ArtifactPath> for Template {
    fn from(path: ArtifactPath) -> Self {
        let mut template = Template::from(path.artifact);
        if let Some(subpath) = path.subpath {
            template.push_str("/");
            template.push_str(&subpath);
        }
        template
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(|id| id.to_string()))
    }
}
