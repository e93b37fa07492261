//! Executable format detection and metadata extraction.
//!
//! Classification looks only at the first four bytes; extraction then hands
//! the buffer to the matching parser in [`crate::elf`], [`crate::macho`], or
//! [`crate::shebang`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::artifact::{ArtifactId, ArtifactStore};
use crate::elf::{ElfFile, ELF_MAGIC};
use crate::error::{Error, Result};
use crate::macho::{MachOFile, MACHO_MAGICS};
use crate::shebang::{self, MAX_SHEBANG_LEN};
use crate::triple::Arch;

/// An executable file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Format {
    /// ELF object
    Elf,
    /// Thin Mach-O image or universal binary
    MachO,
    /// Script with a `#!` line
    Shebang,
}

impl Format {
    /// Returns the format name used in messages and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Elf => "elf",
            Format::MachO => "mach-o",
            Format::Shebang => "shebang",
        }
    }
}

/// Classifies `data` by its magic bytes.
pub fn detect_format(data: &[u8]) -> Option<Format> {
    if shebang::is_shebang(data) {
        return Some(Format::Shebang);
    }
    let magic = u32::from_be_bytes(data.get(..4)?.try_into().ok()?);
    if magic == ELF_MAGIC {
        Some(Format::Elf)
    } else if MACHO_MAGICS.contains(&magic) {
        Some(Format::MachO)
    } else {
        None
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// Metadata of an ELF file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElfMetadata {
    /// Target architecture
    pub arch: Arch,
    /// Program interpreter from PT_INTERP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
    /// DT_SONAME
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soname: Option<String>,
    /// DT_NEEDED entries in first-occurrence order
    #[serde(default)]
    pub needed: Vec<String>,
}

/// Metadata of a Mach-O file, unioned across slices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachOMetadata {
    /// Architectures of all slices
    pub arches: BTreeSet<Arch>,
    /// Linked libraries of all slices
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    /// Install name of the first slice that has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_name: Option<String>,
}

/// Metadata of a shebang script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShebangMetadata {
    /// First token of the `#!` line
    pub interpreter: String,
}

/// Metadata extracted from an executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "kebab-case")]
pub enum ExecutableMetadata {
    /// ELF object
    Elf(ElfMetadata),
    /// Mach-O image
    MachO(MachOMetadata),
    /// Shebang script
    Shebang(ShebangMetadata),
}

impl ExecutableMetadata {
    /// Returns the format this metadata describes.
    pub fn format(&self) -> Format {
        match self {
            ExecutableMetadata::Elf(_) => Format::Elf,
            ExecutableMetadata::MachO(_) => Format::MachO,
            ExecutableMetadata::Shebang(_) => Format::Shebang,
        }
    }
}

impl From<ElfFile> for ElfMetadata {
    fn from(elf: ElfFile) -> Self {
        Self {
            arch: elf.arch,
            interpreter: elf.interpreter,
            soname: elf.soname,
            needed: elf.needed,
        }
    }
}

impl From<&MachOFile> for MachOMetadata {
    fn from(file: &MachOFile) -> Self {
        Self {
            arches: file.arches(),
            dependencies: file.dependencies(),
            install_name: file.install_name().map(str::to_string),
        }
    }
}

// =============================================================================
// Extraction
// =============================================================================

fn extract(data: &[u8]) -> Result<ExecutableMetadata> {
    let format = detect_format(data).ok_or_else(|| {
        let mut magic = [0u8; 4];
        let n = data.len().min(4);
        magic[..n].copy_from_slice(&data[..n]);
        Error::UnknownFormat(u32::from_be_bytes(magic))
    })?;

    match format {
        Format::Elf => Ok(ExecutableMetadata::Elf(ElfFile::parse(data)?.into())),
        Format::MachO => Ok(ExecutableMetadata::MachO(
            (&MachOFile::parse(data)?).into(),
        )),
        Format::Shebang => Ok(ExecutableMetadata::Shebang(ShebangMetadata {
            interpreter: shebang::interpreter(data)?,
        })),
    }
}

/// Extracts executable metadata.
///
/// Any failure is reported as [`Error::Classify`] wrapping the cause.
pub fn metadata(data: &[u8]) -> Result<ExecutableMetadata> {
    extract(data).map_err(|err| Error::Classify(Box::new(err)))
}

/// Extracts executable metadata, returning `None` for anything unrecognized.
pub fn try_metadata(data: &[u8]) -> Option<ExecutableMetadata> {
    match extract(data) {
        Ok(metadata) => Some(metadata),
        Err(err) => {
            debug!("not an executable: {}", err);
            None
        }
    }
}

/// Reads the metadata of a file artifact from a store.
///
/// Shebang scripts only need their first line, so only the first
/// [`MAX_SHEBANG_LEN`] bytes are fetched for them. Returns `None` if the file
/// is not a recognized executable; store failures are still errors.
pub fn read_metadata<S>(store: &S, id: &ArtifactId) -> Result<Option<ExecutableMetadata>>
where
    S: ArtifactStore + ?Sized,
{
    let size = store.size(id)?;
    let head = store.read_range(id, 0, size.min(4))?;
    let data = match detect_format(&head) {
        None => {
            debug!("{} has no executable magic", id);
            return Ok(None);
        }
        Some(Format::Shebang) => store.read_range(id, 0, size.min(MAX_SHEBANG_LEN as u64))?,
        Some(_) => store.read_all(id)?,
    };
    Ok(try_metadata(&data))
}

/// Like [`read_metadata`], but an unrecognized file is an [`Error::Classify`].
pub fn classify<S>(store: &S, id: &ArtifactId) -> Result<ExecutableMetadata>
where
    S: ArtifactStore + ?Sized,
{
    let size = store.size(id)?;
    let head = store.read_range(id, 0, size.min(4))?;
    let data = match detect_format(&head) {
        Some(Format::Shebang) => store.read_range(id, 0, size.min(MAX_SHEBANG_LEN as u64))?,
        _ => store.read_all(id)?,
    };
    metadata(&data)
}
