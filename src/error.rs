//! Error types for executable inspection and wrapping.
//!
//! This module provides error handling for every stage of a wrap: format
//! detection, ELF and Mach-O parsing, manifest encoding, artifact resolution,
//! interpreter selection, and environment mutation merging.

use thiserror::Error;

use crate::artifact::ArtifactId;

/// The main error type for wrapping operations.
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ==================== Format Errors ====================
    #[error("cannot classify executable: {0}")]
    Classify(#[source] Box<Error>),

    #[error("unrecognized executable format (magic {0:#010x})")]
    UnknownFormat(u32),

    #[error("invalid ELF class: {0}")]
    InvalidElfClass(u8),

    #[error("invalid ELF data encoding: {0}")]
    InvalidElfEncoding(u8),

    #[error("unsupported ELF machine: {0:#x}")]
    UnsupportedMachine(u16),

    #[error("invalid Mach-O magic: {0:#x}")]
    InvalidMachoMagic(u32),

    #[error("unsupported Mach-O CPU type: {0:#x}")]
    UnsupportedCpuType(u32),

    #[error("fat header declares {count} architectures (max: {max})")]
    TooManyFatArches { count: u32, max: u32 },

    #[error("load command at offset {offset:#x} is malformed or extends beyond header")]
    LoadCommandOverflow { offset: usize },

    #[error("read of {len} bytes at offset {offset:#x} is out of bounds (size: {size:#x})")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    #[error("parse error at offset {offset:#x}: {reason}")]
    Parse { offset: usize, reason: String },

    #[error("shebang line names no interpreter")]
    MissingShebangInterpreter,

    // ==================== Manifest Errors ====================
    #[error("corrupt manifest: {reason}")]
    CorruptManifest { reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ==================== Artifact Errors ====================
    #[error("artifact not found: {id}")]
    ArtifactNotFound { id: ArtifactId },

    #[error("expected {id} to resolve to a file")]
    NotAFile { id: ArtifactId },

    #[error("path '{subpath}' not found under {id}")]
    PathNotFound { id: ArtifactId, subpath: String },

    #[error("symlink chain starting at {id} is too deep")]
    SymlinkDepth { id: ArtifactId },

    #[error("invalid artifact id: {0}")]
    InvalidArtifactId(String),

    // ==================== Wrap Errors ====================
    #[error("no executable was provided")]
    MissingExecutable,

    #[error(
        "a statically linked executable cannot use identity \"executable\"; \
         use identity \"wrapper\" instead"
    )]
    StaticExecutableIdentity,

    #[error("interpreter kind '{kind}' cannot launch a {format} executable")]
    InterpreterMismatch {
        kind: &'static str,
        format: &'static str,
    },

    #[error("unsupported ELF interpreter: {0}")]
    UnsupportedInterpreter(String),

    #[error("merge was requested but the executable has no manifest")]
    MergeWithoutManifest,

    #[error("invalid target triple: {0}")]
    InvalidTriple(String),

    // ==================== Mutation Errors ====================
    #[error("cannot apply {incoming} mutation to {existing}")]
    IncompatibleMutation {
        existing: &'static str,
        incoming: &'static str,
    },

    #[error("unsupported env mutation in manifest: {0}")]
    UnsupportedEnv(&'static str),

    // ==================== Build Errors ====================
    #[error("failed to build {what}: {reason}")]
    Build { what: String, reason: String },
}

/// A specialized Result type for wrapping operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true if this error came from reading an executable's headers.
    ///
    /// These are the failures `try_metadata` swallows.
    #[inline]
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Error::Classify(_)
                | Error::UnknownFormat(_)
                | Error::InvalidElfClass(_)
                | Error::InvalidElfEncoding(_)
                | Error::UnsupportedMachine(_)
                | Error::InvalidMachoMagic(_)
                | Error::UnsupportedCpuType(_)
                | Error::TooManyFatArches { .. }
                | Error::LoadCommandOverflow { .. }
                | Error::OutOfBounds { .. }
                | Error::Parse { .. }
                | Error::MissingShebangInterpreter
        )
    }

    /// Creates a parse error with a formatted message.
    #[inline]
    pub fn parse(offset: usize, reason: impl Into<String>) -> Self {
        Error::Parse {
            offset,
            reason: reason.into(),
        }
    }

    /// Creates an out of bounds error.
    #[inline]
    pub fn out_of_bounds(offset: u64, len: u64, size: u64) -> Self {
        Error::OutOfBounds { offset, len, size }
    }

    /// Creates a corrupt manifest error.
    #[inline]
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Error::CorruptManifest {
            reason: reason.into(),
        }
    }

    /// Creates a build failure for an external sub-build.
    #[inline]
    pub fn build(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Build {
            what: what.into(),
            reason: reason.into(),
        }
    }
}
