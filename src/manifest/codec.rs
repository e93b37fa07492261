//! The manifest container format.
//!
//! A wrapper is its base payload with the manifest appended:
//!
//! ```text
//! [original bytes][manifest JSON][u64le length][u64le version][b"tangram\0"]
//! ```
//!
//! Decoding reads backwards from the end of the file, so a reader only needs
//! the last [`TRAILER_SIZE`] bytes to decide whether a file is a wrapper.

use tracing::debug;

use super::{Executable, Manifest};
use crate::artifact::{Artifact, ArtifactId, ArtifactStore, File};
use crate::dependencies::dependency_set;
use crate::error::{Error, Result};
use crate::template::Template;
use crate::util::{read_u64_le_at, slice_at, write_u64_le};

/// Trailing magic identifying a wrapper.
pub const MAGIC: &[u8; 8] = b"tangram\0";

/// The only container version this crate reads and writes.
pub const VERSION: u64 = 0;

/// Size of the length, version, and magic fields.
pub const TRAILER_SIZE: usize = 24;

/// Decodes a trailer into the manifest length.
///
/// `Ok(None)` means the file is not a wrapper.
fn parse_trailer(trailer: &[u8], file_size: u64) -> Result<Option<u64>> {
    if trailer.len() < TRAILER_SIZE {
        return Ok(None);
    }
    let trailer = &trailer[trailer.len() - TRAILER_SIZE..];

    if &trailer[16..] != MAGIC {
        return Ok(None);
    }
    let version = read_u64_le_at(trailer, 8)?;
    if version != VERSION {
        debug!("skipping manifest with unknown version {}", version);
        return Ok(None);
    }

    let len = read_u64_le_at(trailer, 0)?;
    let available = file_size - TRAILER_SIZE as u64;
    if len > available {
        return Err(Error::corrupt(format!(
            "manifest length {} exceeds the {} bytes before the trailer",
            len, available
        )));
    }
    Ok(Some(len))
}

fn parse_json(bytes: &[u8]) -> Result<Manifest> {
    serde_json::from_slice(bytes).map_err(|err| Error::corrupt(err.to_string()))
}

impl Manifest {
    /// Appends this manifest to `original`.
    pub fn encode(&self, original: &[u8]) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let mut out = Vec::with_capacity(original.len() + json.len() + TRAILER_SIZE);
        out.extend_from_slice(original);
        out.extend_from_slice(&json);
        write_u64_le(&mut out, json.len() as u64);
        write_u64_le(&mut out, VERSION);
        out.extend_from_slice(MAGIC);
        Ok(out)
    }

    /// Extracts a manifest from the end of `data`.
    ///
    /// Returns `Ok(None)` if `data` is not a wrapper, and an error if it looks
    /// like one but the manifest cannot be read.
    pub fn decode(data: &[u8]) -> Result<Option<Manifest>> {
        let size = data.len() as u64;
        let Some(len) = parse_trailer(data, size)? else {
            return Ok(None);
        };
        let start = size - TRAILER_SIZE as u64 - len;
        let json = slice_at(data, start, len)?;
        parse_json(json).map(Some)
    }

    /// Reads the manifest of a file artifact with two range reads.
    pub fn read<S>(store: &S, id: &ArtifactId) -> Result<Option<Manifest>>
    where
        S: ArtifactStore + ?Sized,
    {
        let size = store.size(id)?;
        if size < TRAILER_SIZE as u64 {
            return Ok(None);
        }
        let trailer = store.read_range(id, size - TRAILER_SIZE as u64, TRAILER_SIZE as u64)?;
        let Some(len) = parse_trailer(&trailer, size)? else {
            return Ok(None);
        };
        let start = size - TRAILER_SIZE as u64 - len;
        let json = store.read_range(id, start, len)?;
        parse_json(&json).map(Some)
    }

    /// Writes `original` with this manifest appended as an executable file.
    ///
    /// The file depends on everything the manifest references plus whatever
    /// `original` already depends on.
    pub fn write<S>(&self, store: &S, original: &ArtifactId) -> Result<ArtifactId>
    where
        S: ArtifactStore + ?Sized,
    {
        let bytes = store.read_all(original)?;
        let mut dependencies = dependency_set(self);
        dependencies.extend(store.file_dependencies(original)?);

        let count = dependencies.len();
        let file = File::new(self.encode(&bytes)?, true).with_dependencies(dependencies);
        let id = store.put(Artifact::File(file))?;
        debug!("wrote wrapper {} ({} dependencies)", id, count);
        Ok(id)
    }

    /// Returns the executable this manifest launches.
    pub fn unwrap<S>(&self, store: &S) -> Result<Unwrapped>
    where
        S: ArtifactStore + ?Sized,
    {
        match &self.executable {
            Executable::Content(template) => Ok(Unwrapped::Content(template.clone())),
            Executable::Path(path) => Ok(Unwrapped::File(store.resolve_file(path)?)),
        }
    }
}

/// The inner executable of a wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unwrapped {
    /// Inline script text
    Content(Template),
    /// A file artifact
    File(ArtifactId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactPath, MemoryStore};
    use crate::manifest::{Identity, Interpreter, NormalInterpreter};
    use crate::mutation::{Env, Mutation};

    fn sample(store: &MemoryStore) -> Manifest {
        let sh = store.put_file(&b"#!sh"[..], true);
        let script = store.put_file(&b"echo hi\n"[..], false);
        let mut env = Env::new();
        env.push("PATH", Mutation::prefix(script.clone(), Some(":")), false)
            .unwrap();
        Manifest {
            identity: Identity::Executable,
            interpreter: Some(Interpreter::Normal(NormalInterpreter {
                path: ArtifactPath::new(sh),
                args: vec![Template::from("-e")],
            })),
            executable: Executable::Path(ArtifactPath::new(script)),
            env: Some(env.to_mutation()),
            args: vec![Template::from("--flag")],
        }
    }

    #[test]
    fn test_encode_decode() {
        let store = MemoryStore::new();
        let manifest = sample(&store);
        let original = b"\x7FELF launcher bytes";

        let encoded = manifest.encode(original).unwrap();
        assert!(encoded.starts_with(original));
        assert!(encoded.ends_with(MAGIC));
        assert_eq!(Manifest::decode(&encoded).unwrap(), Some(manifest));
    }

    #[test]
    fn test_not_a_wrapper() {
        assert_eq!(Manifest::decode(b"").unwrap(), None);
        assert_eq!(Manifest::decode(b"short").unwrap(), None);
        assert_eq!(Manifest::decode(&[0u8; 64]).unwrap(), None);

        let store = MemoryStore::new();
        let mut encoded = sample(&store).encode(b"").unwrap();
        let n = encoded.len();
        encoded[n - 16] = 1; // version
        assert_eq!(Manifest::decode(&encoded).unwrap(), None);
    }

    #[test]
    fn test_corrupt_manifest() {
        let store = MemoryStore::new();
        let mut encoded = sample(&store).encode(b"").unwrap();
        let n = encoded.len();
        encoded[n - 24..n - 16].copy_from_slice(&(n as u64).to_le_bytes());
        assert!(matches!(
            Manifest::decode(&encoded),
            Err(Error::CorruptManifest { .. })
        ));

        let mut garbage = b"{not json".to_vec();
        write_u64_le(&mut garbage, 9);
        write_u64_le(&mut garbage, VERSION);
        garbage.extend_from_slice(MAGIC);
        assert!(matches!(
            Manifest::decode(&garbage),
            Err(Error::CorruptManifest { .. })
        ));
    }

    #[test]
    fn test_read_from_store() {
        let store = MemoryStore::new();
        let manifest = sample(&store);
        let launcher = store.put_file(&b"launcher"[..], true);

        let wrapper = manifest.write(&store, &launcher).unwrap();
        assert_eq!(Manifest::read(&store, &wrapper).unwrap(), Some(manifest.clone()));
        assert_eq!(Manifest::read(&store, &launcher).unwrap(), None);

        let deps = store.file_dependencies(&wrapper).unwrap();
        assert_eq!(deps, dependency_set(&manifest));
        assert_eq!(
            store.read_range(&wrapper, 0, 8).unwrap(),
            b"launcher"
        );
    }

    #[test]
    fn test_write_keeps_launcher_dependencies() {
        let store = MemoryStore::new();
        let manifest = sample(&store);
        let runtime = store.put_file(&b"runtime"[..], false);
        let launcher = store
            .put(Artifact::File(
                File::new(&b"launcher"[..], true).with_dependencies([runtime.clone()]),
            ))
            .unwrap();

        let wrapper = manifest.write(&store, &launcher).unwrap();
        let deps = store.file_dependencies(&wrapper).unwrap();
        assert!(deps.contains(&runtime));
        assert!(dependency_set(&manifest).is_subset(&deps));
        assert_eq!(deps.len(), dependency_set(&manifest).len() + 1);
    }

    #[test]
    fn test_unwrap() {
        let store = MemoryStore::new();
        let manifest = sample(&store);
        let Executable::Path(path) = &manifest.executable else {
            unreachable!()
        };
        assert_eq!(
            manifest.unwrap(&store).unwrap(),
            Unwrapped::File(path.artifact.clone())
        );

        let content = Manifest {
            executable: Executable::Content(Template::from("echo")),
            ..manifest
        };
        assert_eq!(
            content.unwrap(&store).unwrap(),
            Unwrapped::Content(Template::from("echo"))
        );

        let dir = store.put_directory([("x", store.put_file(&b"x"[..], false))]);
        let bad = Manifest {
            executable: Executable::Path(ArtifactPath::new(dir)),
            ..content
        };
        assert!(matches!(bad.unwrap(&store), Err(Error::NotAFile { .. })));
    }
}
