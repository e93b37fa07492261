//! The wrapper manifest.
//!
//! A manifest tells the launcher stub what to run (`executable`), through
//! which loader (`interpreter`), with which environment and arguments. It is
//! serialized as JSON and appended to the launcher; see [`codec`] for the
//! container format.

pub mod codec;

pub use codec::{Unwrapped, MAGIC, TRAILER_SIZE, VERSION};

use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactPath;
use crate::error::{Error, Result};
use crate::metadata::Format;
use crate::mutation::{Env, Mutation};
use crate::template::Template;

/// What the wrapped process appears to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    /// The wrapper itself; `argv[0]` points at the wrapper
    Wrapper,
    /// The interpreter
    Interpreter,
    /// The wrapped executable
    Executable,
}

impl Identity {
    /// Returns the identity name used in JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            Identity::Wrapper => "wrapper",
            Identity::Interpreter => "interpreter",
            Identity::Executable => "executable",
        }
    }
}

// =============================================================================
// Interpreter
// =============================================================================

/// A plain interpreter run as `path args... executable`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalInterpreter {
    /// Interpreter executable
    pub path: ArtifactPath,
    /// Arguments placed before the executable
    #[serde(default)]
    pub args: Vec<Template>,
}

/// A Linux dynamic loader (`ld-linux` or `ld-musl`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LdInterpreter {
    /// The loader
    pub path: ArtifactPath,
    /// Library search path, highest precedence first
    #[serde(default)]
    pub library_paths: Vec<ArtifactPath>,
    /// Libraries loaded before the executable's own
    #[serde(default)]
    pub preloads: Vec<ArtifactPath>,
    /// Arguments passed to the loader
    #[serde(default)]
    pub args: Vec<Template>,
}

/// The Darwin dynamic linker, configured through the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DyldInterpreter {
    /// Library search path, highest precedence first
    #[serde(default)]
    pub library_paths: Vec<ArtifactPath>,
    /// Libraries inserted before the executable's own
    #[serde(default)]
    pub preloads: Vec<ArtifactPath>,
}

/// How the launcher starts the executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Interpreter {
    /// Any executable interpreter
    Normal(NormalInterpreter),
    /// glibc loader
    LdLinux(LdInterpreter),
    /// musl loader
    LdMusl(LdInterpreter),
    /// Darwin dyld
    Dyld(DyldInterpreter),
}

impl Interpreter {
    /// Returns the kind name used in JSON and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Interpreter::Normal(_) => "normal",
            Interpreter::LdLinux(_) => "ld-linux",
            Interpreter::LdMusl(_) => "ld-musl",
            Interpreter::Dyld(_) => "dyld",
        }
    }

    /// Returns the interpreter executable, if it has one.
    pub fn path(&self) -> Option<&ArtifactPath> {
        match self {
            Interpreter::Normal(normal) => Some(&normal.path),
            Interpreter::LdLinux(ld) | Interpreter::LdMusl(ld) => Some(&ld.path),
            Interpreter::Dyld(_) => None,
        }
    }

    /// Returns the library search path.
    pub fn library_paths(&self) -> &[ArtifactPath] {
        match self {
            Interpreter::Normal(_) => &[],
            Interpreter::LdLinux(ld) | Interpreter::LdMusl(ld) => &ld.library_paths,
            Interpreter::Dyld(dyld) => &dyld.library_paths,
        }
    }

    /// Returns the preloaded libraries.
    pub fn preloads(&self) -> &[ArtifactPath] {
        match self {
            Interpreter::Normal(_) => &[],
            Interpreter::LdLinux(ld) | Interpreter::LdMusl(ld) => &ld.preloads,
            Interpreter::Dyld(dyld) => &dyld.preloads,
        }
    }

    /// Returns the interpreter arguments.
    pub fn args(&self) -> &[Template] {
        match self {
            Interpreter::Normal(normal) => &normal.args,
            Interpreter::LdLinux(ld) | Interpreter::LdMusl(ld) => &ld.args,
            Interpreter::Dyld(_) => &[],
        }
    }

    /// Appends library paths and preloads.
    ///
    /// A `normal` interpreter has neither, so they are dropped for it.
    pub fn extend(&mut self, library_paths: &[ArtifactPath], preloads: &[ArtifactPath]) {
        match self {
            Interpreter::Normal(_) => {}
            Interpreter::LdLinux(ld) | Interpreter::LdMusl(ld) => {
                ld.library_paths.extend_from_slice(library_paths);
                ld.preloads.extend_from_slice(preloads);
            }
            Interpreter::Dyld(dyld) => {
                dyld.library_paths.extend_from_slice(library_paths);
                dyld.preloads.extend_from_slice(preloads);
            }
        }
    }

    /// Checks that this interpreter can launch an executable of `format`.
    ///
    /// `None` stands for a content executable.
    pub fn check_target(&self, format: Option<Format>) -> Result<()> {
        let ok = match self {
            Interpreter::Normal(_) => true,
            Interpreter::LdLinux(_) | Interpreter::LdMusl(_) => format == Some(Format::Elf),
            Interpreter::Dyld(_) => format == Some(Format::MachO),
        };
        if ok {
            Ok(())
        } else {
            Err(Error::InterpreterMismatch {
                kind: self.kind(),
                format: format.map_or("content", |f| f.as_str()),
            })
        }
    }
}

// =============================================================================
// Executable
// =============================================================================

/// The program a manifest launches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Executable {
    /// An executable file
    Path(ArtifactPath),
    /// Inline script text, run by the interpreter
    Content(Template),
}

// =============================================================================
// Manifest
// =============================================================================

/// A wrapper manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// What the process appears to be
    pub identity: Identity,
    /// How to start the executable; `None` executes it directly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<Interpreter>,
    /// The program to launch
    pub executable: Executable,
    /// Environment, as `set(map{NAME: array[mutation...]})`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Mutation>,
    /// Arguments placed before the caller's
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Template>,
}

impl Manifest {
    /// Decodes the manifest environment.
    pub fn env(&self, aggressive: bool) -> Result<Env> {
        match &self.env {
            None => Ok(Env::new()),
            Some(mutation) => Env::from_mutation(mutation, aggressive),
        }
    }
}
