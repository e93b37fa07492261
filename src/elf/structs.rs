//! ELF binary structures.
//!
//! Fields are raw byte arrays decoded through [`crate::util::Endian`]; the
//! header's `EI_DATA` byte picks the order. Field names follow `<elf.h>`.

#![allow(missing_docs)]

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

// =============================================================================
// File Headers
// =============================================================================

/// ELF32 file header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Header32 {
    pub e_ident: [u8; 16],
    pub e_type: [u8; 2],
    pub e_machine: [u8; 2],
    pub e_version: [u8; 4],
    pub e_entry: [u8; 4],
    pub e_phoff: [u8; 4],
    pub e_shoff: [u8; 4],
    pub e_flags: [u8; 4],
    pub e_ehsize: [u8; 2],
    pub e_phentsize: [u8; 2],
    pub e_phnum: [u8; 2],
    pub e_shentsize: [u8; 2],
    pub e_shnum: [u8; 2],
    pub e_shstrndx: [u8; 2],
}

impl Header32 {
    /// Size of the header in bytes.
    pub const SIZE: usize = 52;
}

/// ELF64 file header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Header64 {
    pub e_ident: [u8; 16],
    pub e_type: [u8; 2],
    pub e_machine: [u8; 2],
    pub e_version: [u8; 4],
    pub e_entry: [u8; 8],
    pub e_phoff: [u8; 8],
    pub e_shoff: [u8; 8],
    pub e_flags: [u8; 4],
    pub e_ehsize: [u8; 2],
    pub e_phentsize: [u8; 2],
    pub e_phnum: [u8; 2],
    pub e_shentsize: [u8; 2],
    pub e_shnum: [u8; 2],
    pub e_shstrndx: [u8; 2],
}

impl Header64 {
    /// Size of the header in bytes.
    pub const SIZE: usize = 64;
}

// =============================================================================
// Program Headers
// =============================================================================

/// ELF32 program header. Note the field order differs from ELF64.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct ProgramHeader32 {
    pub p_type: [u8; 4],
    pub p_offset: [u8; 4],
    pub p_vaddr: [u8; 4],
    pub p_paddr: [u8; 4],
    pub p_filesz: [u8; 4],
    pub p_memsz: [u8; 4],
    pub p_flags: [u8; 4],
    pub p_align: [u8; 4],
}

impl ProgramHeader32 {
    /// Size of the record in bytes.
    pub const SIZE: usize = 32;
}

/// ELF64 program header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct ProgramHeader64 {
    pub p_type: [u8; 4],
    pub p_flags: [u8; 4],
    pub p_offset: [u8; 8],
    pub p_vaddr: [u8; 8],
    pub p_paddr: [u8; 8],
    pub p_filesz: [u8; 8],
    pub p_memsz: [u8; 8],
    pub p_align: [u8; 8],
}

impl ProgramHeader64 {
    /// Size of the record in bytes.
    pub const SIZE: usize = 56;
}

// =============================================================================
// Dynamic Entries
// =============================================================================

/// ELF32 dynamic entry.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Dyn32 {
    pub d_tag: [u8; 4],
    pub d_val: [u8; 4],
}

impl Dyn32 {
    /// Size of the record in bytes.
    pub const SIZE: usize = 8;
}

/// ELF64 dynamic entry.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Dyn64 {
    pub d_tag: [u8; 8],
    pub d_val: [u8; 8],
}

impl Dyn64 {
    /// Size of the record in bytes.
    pub const SIZE: usize = 16;
}
