//! Content-addressed artifacts and the store interface.
//!
//! Wrapping never touches host paths. Everything a manifest points at is an
//! [`ArtifactId`] (optionally narrowed by a subpath), and every byte the
//! wrapper reads comes through an [`ArtifactStore`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Maximum number of symlinks followed while resolving a single path.
pub const MAX_SYMLINK_DEPTH: usize = 32;

// =============================================================================
// Identifiers
// =============================================================================

/// The kind of object an [`ArtifactId`] names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// A regular file
    File,
    /// A directory
    Directory,
    /// A symlink
    Symlink,
}

impl ArtifactKind {
    fn prefix(self) -> &'static str {
        match self {
            ArtifactKind::File => "fil_",
            ArtifactKind::Directory => "dir_",
            ArtifactKind::Symlink => "sym_",
        }
    }
}

/// A stable, content-derived artifact identifier such as `fil_<blake3 hex>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactId(String);

impl ArtifactId {
    fn from_hash(kind: ArtifactKind, hash: blake3::Hash) -> Self {
        Self(format!("{}{}", kind.prefix(), hash.to_hex()))
    }

    /// Returns the kind encoded in the identifier prefix.
    pub fn kind(&self) -> ArtifactKind {
        match &self.0[..4] {
            "fil_" => ArtifactKind::File,
            "dir_" => ArtifactKind::Directory,
            _ => ArtifactKind::Symlink,
        }
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ArtifactId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let valid_prefix = ["fil_", "dir_", "sym_"]
            .iter()
            .any(|prefix| s.starts_with(prefix));
        if !valid_prefix || s.len() <= 4 {
            return Err(Error::InvalidArtifactId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for ArtifactId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ArtifactId> for String {
    fn from(value: ArtifactId) -> Self {
        value.0
    }
}

/// A symlink-like reference: an artifact plus an optional path inside it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactPath {
    /// The referenced artifact
    pub artifact: ArtifactId,
    /// Path within a directory artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subpath: Option<String>,
}

impl ArtifactPath {
    /// Creates a reference to the artifact itself.
    pub fn new(artifact: ArtifactId) -> Self {
        Self {
            artifact,
            subpath: None,
        }
    }

    /// Creates a reference to a path inside a directory artifact.
    pub fn with_subpath(artifact: ArtifactId, subpath: impl Into<String>) -> Self {
        Self {
            artifact,
            subpath: Some(subpath.into()),
        }
    }
}

impl From<ArtifactId> for ArtifactPath {
    fn from(id: ArtifactId) -> Self {
        Self::new(id)
    }
}

// =============================================================================
// Artifacts
// =============================================================================

/// A file artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    /// File contents
    pub contents: Arc<[u8]>,
    /// Whether the file is marked executable
    pub executable: bool,
    /// Artifacts this file references at runtime
    pub dependencies: BTreeSet<ArtifactId>,
}

impl File {
    /// Creates a file with no declared dependencies.
    pub fn new(contents: impl Into<Arc<[u8]>>, executable: bool) -> Self {
        Self {
            contents: contents.into(),
            executable,
            dependencies: BTreeSet::new(),
        }
    }

    /// Adds declared dependencies.
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = ArtifactId>) -> Self {
        self.dependencies.extend(deps);
        self
    }
}

/// A content-addressed object.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Artifact {
    File(File),
    Directory {
        entries: BTreeMap<String, ArtifactId>,
    },
    Symlink {
        artifact: Option<ArtifactId>,
        subpath: Option<String>,
    },
}

impl Artifact {
    /// Computes the content-derived identifier of this artifact.
    pub fn id(&self) -> ArtifactId {
        let mut hasher = blake3::Hasher::new();
        match self {
            Artifact::File(file) => {
                hasher.update(b"file\0");
                hasher.update(&[file.executable as u8]);
                for dep in &file.dependencies {
                    hasher.update(dep.as_str().as_bytes());
                    hasher.update(b"\0");
                }
                hasher.update(&(file.contents.len() as u64).to_le_bytes());
                hasher.update(&file.contents);
                ArtifactId::from_hash(ArtifactKind::File, hasher.finalize())
            }
            Artifact::Directory { entries } => {
                hasher.update(b"directory\0");
                for (name, id) in entries {
                    hasher.update(name.as_bytes());
                    hasher.update(b"\0");
                    hasher.update(id.as_str().as_bytes());
                    hasher.update(b"\0");
                }
                ArtifactId::from_hash(ArtifactKind::Directory, hasher.finalize())
            }
            Artifact::Symlink { artifact, subpath } => {
                hasher.update(b"symlink\0");
                if let Some(artifact) = artifact {
                    hasher.update(artifact.as_str().as_bytes());
                }
                hasher.update(b"\0");
                if let Some(subpath) = subpath {
                    hasher.update(subpath.as_bytes());
                }
                ArtifactId::from_hash(ArtifactKind::Symlink, hasher.finalize())
            }
        }
    }

    /// Returns the artifact kind.
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Artifact::File(_) => ArtifactKind::File,
            Artifact::Directory { .. } => ArtifactKind::Directory,
            Artifact::Symlink { .. } => ArtifactKind::Symlink,
        }
    }
}

// =============================================================================
// Store
// =============================================================================

/// A content-addressed artifact store with byte-range reads.
pub trait ArtifactStore: Send + Sync {
    /// Loads an artifact.
    fn get(&self, id: &ArtifactId) -> Result<Artifact>;

    /// Stores an artifact and returns its identifier.
    fn put(&self, artifact: Artifact) -> Result<ArtifactId>;

    /// Returns the size in bytes of a file artifact.
    fn size(&self, id: &ArtifactId) -> Result<u64>;

    /// Reads `len` bytes at `offset` from a file artifact.
    fn read_range(&self, id: &ArtifactId, offset: u64, len: u64) -> Result<Vec<u8>>;

    /// Reads a whole file artifact.
    fn read_all(&self, id: &ArtifactId) -> Result<Vec<u8>> {
        let size = self.size(id)?;
        self.read_range(id, 0, size)
    }

    /// Returns the declared dependencies of a file artifact.
    fn file_dependencies(&self, id: &ArtifactId) -> Result<BTreeSet<ArtifactId>> {
        match self.get(id)? {
            Artifact::File(file) => Ok(file.dependencies),
            _ => Err(Error::NotAFile { id: id.clone() }),
        }
    }

    /// Follows directories and symlinks until `path` lands on an artifact.
    fn resolve(&self, path: &ArtifactPath) -> Result<ArtifactId> {
        let mut id = path.artifact.clone();
        let mut remaining = split_subpath(path.subpath.as_deref());
        let mut depth = 0;

        loop {
            match self.get(&id)? {
                Artifact::Symlink { artifact, subpath } => {
                    depth += 1;
                    if depth > MAX_SYMLINK_DEPTH {
                        return Err(Error::SymlinkDepth {
                            id: path.artifact.clone(),
                        });
                    }
                    let target = artifact.ok_or_else(|| Error::PathNotFound {
                        id: id.clone(),
                        subpath: subpath.clone().unwrap_or_default(),
                    })?;
                    let mut components = split_subpath(subpath.as_deref());
                    components.append(&mut remaining);
                    remaining = components;
                    id = target;
                }
                Artifact::Directory { entries } => {
                    if remaining.is_empty() {
                        return Ok(id);
                    }
                    let name = remaining.remove(0);
                    id = entries.get(&name).cloned().ok_or_else(|| Error::PathNotFound {
                        id: id.clone(),
                        subpath: name,
                    })?;
                }
                Artifact::File(_) => {
                    if let Some(name) = remaining.first() {
                        return Err(Error::PathNotFound {
                            id,
                            subpath: name.clone(),
                        });
                    }
                    return Ok(id);
                }
            }
        }
    }

    /// Resolves a path and requires that it lands on a file.
    fn resolve_file(&self, path: &ArtifactPath) -> Result<ArtifactId> {
        let id = self.resolve(path)?;
        if id.kind() != ArtifactKind::File {
            return Err(Error::NotAFile { id });
        }
        Ok(id)
    }
}

fn split_subpath(subpath: Option<&str>) -> Vec<String> {
    subpath
        .map(|s| {
            s.split('/')
                .filter(|c| !c.is_empty() && *c != ".")
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// An in-memory [`ArtifactStore`], safe to share across threads.
#[derive(Debug, Default)]
pub struct MemoryStore {
    artifacts: DashMap<ArtifactId, Artifact>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a file and returns its identifier.
    pub fn put_file(&self, contents: impl Into<Arc<[u8]>>, executable: bool) -> ArtifactId {
        self.insert(Artifact::File(File::new(contents, executable)))
    }

    /// Stores a directory and returns its identifier.
    pub fn put_directory<I, S>(&self, entries: I) -> ArtifactId
    where
        I: IntoIterator<Item = (S, ArtifactId)>,
        S: Into<String>,
    {
        let entries = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self.insert(Artifact::Directory { entries })
    }

    /// Returns the number of stored artifacts.
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    fn insert(&self, artifact: Artifact) -> ArtifactId {
        let id = artifact.id();
        self.artifacts.entry(id.clone()).or_insert(artifact);
        id
    }

    fn file(&self, id: &ArtifactId) -> Result<File> {
        match self.get(id)? {
            Artifact::File(file) => Ok(file),
            _ => Err(Error::NotAFile { id: id.clone() }),
        }
    }
}

impl ArtifactStore for MemoryStore {
    fn get(&self, id: &ArtifactId) -> Result<Artifact> {
        self.artifacts
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::ArtifactNotFound { id: id.clone() })
    }

    fn put(&self, artifact: Artifact) -> Result<ArtifactId> {
        let id = self.insert(artifact);
        debug!("stored {}", id);
        Ok(id)
    }

    fn size(&self, id: &ArtifactId) -> Result<u64> {
        Ok(self.file(id)?.contents.len() as u64)
    }

    fn read_range(&self, id: &ArtifactId, offset: u64, len: u64) -> Result<Vec<u8>> {
        let file = self.file(id)?;
        Ok(crate::util::slice_at(&file.contents, offset, len)?.to_vec())
    }
}
