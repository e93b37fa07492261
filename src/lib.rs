//! tangram-wrap - Executable metadata and wrapper manifests.
//!
//! This library inspects executables (ELF, Mach-O, and `#!` scripts) and
//! builds wrappers for them: a launcher stub with a JSON manifest appended
//! that tells the stub which loader, library paths, environment, and
//! arguments to use when starting the real program.
//!
//! # Features
//!
//! - ELF and Mach-O (thin and universal) metadata extraction
//! - Interpreter resolution for glibc, musl, dyld, and scripts
//! - An environment mutation algebra that folds mutation chains
//! - Re-wrapping that flattens into a single manifest
//! - Dependency tracking for every artifact a manifest references
//!
//! # Example
//!
//! ```no_run
//! use tangram_wrap::{metadata, ExecutableMetadata};
//!
//! fn main() -> tangram_wrap::Result<()> {
//!     let data = std::fs::read("/bin/ls")?;
//!
//!     if let ExecutableMetadata::Elf(elf) = metadata(&data)? {
//!         println!("interpreter: {:?}", elf.interpreter);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod artifact;
pub mod build;
pub mod dependencies;
pub mod elf;
pub mod error;
pub mod interpreter;
pub mod macho;
pub mod manifest;
pub mod metadata;
pub mod mutation;
pub mod shebang;
pub mod template;
pub mod triple;
pub mod util;
pub mod value;
pub mod wrap;

#[cfg(test)]
mod testing;

// Re-export main types
pub use artifact::{Artifact, ArtifactId, ArtifactPath, ArtifactStore, MemoryStore};
pub use build::{BuildExecutor, Libc, Toolchain};
pub use dependencies::{dependencies, dependency_set};
pub use error::{Error, Result};
pub use manifest::{Executable, Identity, Interpreter, Manifest};
pub use metadata::{metadata, try_metadata, ExecutableMetadata, Format};
pub use mutation::{Env, Mutation};
pub use template::Template;
pub use triple::{Arch, Triple};
pub use value::Value;
pub use wrap::{WrapArg, WrapConfig, WrapSpec, Wrapper};
