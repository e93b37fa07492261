//! The build executor interface.
//!
//! Wrapping needs a few things it cannot make itself: libc toolchains, the
//! injection shim, a default shell, and the launcher stub. A
//! [`BuildExecutor`] realizes each of them as an artifact, typically by
//! running a cached sub-build.

use std::fmt;

use crate::artifact::{ArtifactId, ArtifactPath};
use crate::error::Result;
use crate::mutation::Env;
use crate::triple::Triple;

/// The C library a Linux toolchain is built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Libc {
    /// glibc, loaded by `ld-linux`
    Gnu,
    /// musl, loaded by `ld-musl`
    Musl,
}

impl Libc {
    /// Returns the libc name as used in triples.
    pub fn as_str(&self) -> &'static str {
        match self {
            Libc::Gnu => "gnu",
            Libc::Musl => "musl",
        }
    }

    /// Returns the target triple of a toolchain for this libc.
    pub fn triple(&self, arch: crate::triple::Arch) -> Triple {
        match self {
            Libc::Gnu => Triple::linux_gnu(arch),
            Libc::Musl => Triple::linux_musl(arch),
        }
    }
}

impl fmt::Display for Libc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A built toolchain, as far as relaunching needs it.
#[derive(Debug, Clone, PartialEq)]
pub struct Toolchain {
    /// The dynamic loader
    pub loader: ArtifactPath,
    /// Directories holding the toolchain's shared libraries, in search order
    pub library_paths: Vec<ArtifactPath>,
    /// Environment the toolchain expects
    pub env: Env,
}

/// Realizes the artifacts wrapping depends on.
pub trait BuildExecutor: Send + Sync {
    /// Builds or fetches the toolchain for `target`.
    fn toolchain(&self, target: &Triple, libc: Libc) -> Result<Toolchain>;

    /// Builds the injection shim preloaded into wrapped processes.
    fn injection(&self, target: &Triple) -> Result<ArtifactPath>;

    /// Returns the shell used to run content executables.
    fn default_shell(&self, host: &Triple) -> Result<ArtifactPath>;

    /// Maps a shebang interpreter such as `/usr/bin/env` to an artifact.
    ///
    /// `None` means the default shell should run the script.
    fn shebang_interpreter(&self, name: &str, host: &Triple) -> Result<Option<ArtifactPath>>;

    /// Returns the launcher stub that reads the manifest at run time.
    fn launcher(&self, host: &Triple) -> Result<ArtifactId>;
}
