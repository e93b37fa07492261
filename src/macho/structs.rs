//! Mach-O binary structures.
//!
//! These structures match the on-disk format of Mach-O files. Multi-byte
//! fields are kept as raw byte arrays and decoded through [`crate::util::Endian`], so one
//! definition serves both big- and little-endian images.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};


/// Returns a fixed-size, NUL-padded name as a string.
pub fn fixed_name(name: &[u8; 16]) -> &str {
    let end = name.iter().position(|&b| b == 0).unwrap_or(16);
    std::str::from_utf8(&name[..end]).unwrap_or("")
}

// =============================================================================
// Universal Headers
// =============================================================================

/// Universal (fat) file header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FatHeader {
    /// FAT_MAGIC or FAT_MAGIC_64
    pub magic: [u8; 4],
    /// Number of architecture records that follow
    pub nfat_arch: [u8; 4],
}

impl FatHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 8;
}

/// Architecture record with 32-bit offsets.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FatArch32 {
    /// CPU type
    pub cputype: [u8; 4],
    /// CPU subtype
    pub cpusubtype: [u8; 4],
    /// File offset of the embedded image
    pub offset: [u8; 4],
    /// Size of the embedded image
    pub size: [u8; 4],
    /// Alignment (power of 2)
    pub align: [u8; 4],
}

impl FatArch32 {
    /// Size of the record in bytes.
    pub const SIZE: usize = 20;
}

/// Architecture record with 64-bit offsets.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FatArch64 {
    /// CPU type
    pub cputype: [u8; 4],
    /// CPU subtype
    pub cpusubtype: [u8; 4],
    /// File offset of the embedded image
    pub offset: [u8; 8],
    /// Size of the embedded image
    pub size: [u8; 8],
    /// Alignment (power of 2)
    pub align: [u8; 4],
    /// Reserved
    pub reserved: [u8; 4],
}

impl FatArch64 {
    /// Size of the record in bytes.
    pub const SIZE: usize = 32;
}

// =============================================================================
// Header Structures
// =============================================================================

/// 32-bit Mach-O header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct MachHeader32 {
    /// Magic number
    pub magic: [u8; 4],
    /// CPU type
    pub cputype: [u8; 4],
    /// CPU subtype
    pub cpusubtype: [u8; 4],
    /// File type
    pub filetype: [u8; 4],
    /// Number of load commands
    pub ncmds: [u8; 4],
    /// Size of load commands
    pub sizeofcmds: [u8; 4],
    /// Flags
    pub flags: [u8; 4],
}

impl MachHeader32 {
    /// Size of the header in bytes.
    pub const SIZE: usize = 28;
}

/// 64-bit Mach-O header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct MachHeader64 {
    /// Magic number
    pub magic: [u8; 4],
    /// CPU type
    pub cputype: [u8; 4],
    /// CPU subtype
    pub cpusubtype: [u8; 4],
    /// File type
    pub filetype: [u8; 4],
    /// Number of load commands
    pub ncmds: [u8; 4],
    /// Size of load commands
    pub sizeofcmds: [u8; 4],
    /// Flags
    pub flags: [u8; 4],
    /// Reserved
    pub reserved: [u8; 4],
}

impl MachHeader64 {
    /// Size of the header in bytes.
    pub const SIZE: usize = 32;
}

// =============================================================================
// Load Command Header
// =============================================================================

/// Generic load command header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct LoadCommand {
    /// Type of load command
    pub cmd: [u8; 4],
    /// Size of load command
    pub cmdsize: [u8; 4],
}

impl LoadCommand {
    /// Size of the load command header.
    pub const SIZE: usize = 8;
}

// =============================================================================
// Segment Commands
// =============================================================================

/// 32-bit segment command.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SegmentCommand32 {
    /// LC_SEGMENT
    pub cmd: [u8; 4],
    /// Size of this load command
    pub cmdsize: [u8; 4],
    /// Segment name (16 bytes, null-padded)
    pub segname: [u8; 16],
    /// Virtual memory address
    pub vmaddr: [u8; 4],
    /// Virtual memory size
    pub vmsize: [u8; 4],
    /// File offset
    pub fileoff: [u8; 4],
    /// Amount of file to map
    pub filesize: [u8; 4],
    /// Maximum VM protection
    pub maxprot: [u8; 4],
    /// Initial VM protection
    pub initprot: [u8; 4],
    /// Number of sections
    pub nsects: [u8; 4],
    /// Flags
    pub flags: [u8; 4],
}

impl SegmentCommand32 {
    /// Size of the segment command (without sections).
    pub const SIZE: usize = 56;
}

/// 64-bit segment command.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SegmentCommand64 {
    /// LC_SEGMENT_64
    pub cmd: [u8; 4],
    /// Size of this load command
    pub cmdsize: [u8; 4],
    /// Segment name (16 bytes, null-padded)
    pub segname: [u8; 16],
    /// Virtual memory address
    pub vmaddr: [u8; 8],
    /// Virtual memory size
    pub vmsize: [u8; 8],
    /// File offset
    pub fileoff: [u8; 8],
    /// Amount of file to map
    pub filesize: [u8; 8],
    /// Maximum VM protection
    pub maxprot: [u8; 4],
    /// Initial VM protection
    pub initprot: [u8; 4],
    /// Number of sections
    pub nsects: [u8; 4],
    /// Flags
    pub flags: [u8; 4],
}

impl SegmentCommand64 {
    /// Size of the segment command (without sections).
    pub const SIZE: usize = 72;
}

// =============================================================================
// Sections
// =============================================================================

/// 32-bit section.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Section32 {
    /// Section name (16 bytes, null-padded)
    pub sectname: [u8; 16],
    /// Segment name (16 bytes, null-padded)
    pub segname: [u8; 16],
    /// Virtual memory address
    pub addr: [u8; 4],
    /// Size in bytes
    pub size: [u8; 4],
    /// File offset
    pub offset: [u8; 4],
    /// Alignment (power of 2)
    pub align: [u8; 4],
    /// File offset of relocation entries
    pub reloff: [u8; 4],
    /// Number of relocation entries
    pub nreloc: [u8; 4],
    /// Flags
    pub flags: [u8; 4],
    /// Reserved
    pub reserved1: [u8; 4],
    /// Reserved
    pub reserved2: [u8; 4],
}

impl Section32 {
    /// Size of a section entry.
    pub const SIZE: usize = 68;
}

/// 64-bit section.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Section64 {
    /// Section name (16 bytes, null-padded)
    pub sectname: [u8; 16],
    /// Segment name (16 bytes, null-padded)
    pub segname: [u8; 16],
    /// Virtual memory address
    pub addr: [u8; 8],
    /// Size in bytes
    pub size: [u8; 8],
    /// File offset
    pub offset: [u8; 4],
    /// Alignment (power of 2)
    pub align: [u8; 4],
    /// File offset of relocation entries
    pub reloff: [u8; 4],
    /// Number of relocation entries
    pub nreloc: [u8; 4],
    /// Flags
    pub flags: [u8; 4],
    /// Reserved
    pub reserved1: [u8; 4],
    /// Reserved
    pub reserved2: [u8; 4],
    /// Reserved
    pub reserved3: [u8; 4],
}

impl Section64 {
    /// Size of a section entry.
    pub const SIZE: usize = 80;
}

// =============================================================================
// Symbol Table Command
// =============================================================================

/// Symbol table command.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SymtabCommand {
    /// LC_SYMTAB
    pub cmd: [u8; 4],
    /// Size of this load command
    pub cmdsize: [u8; 4],
    /// Symbol table offset
    pub symoff: [u8; 4],
    /// Number of symbol table entries
    pub nsyms: [u8; 4],
    /// String table offset
    pub stroff: [u8; 4],
    /// String table size in bytes
    pub strsize: [u8; 4],
}

impl SymtabCommand {
    /// Size of this command.
    pub const SIZE: usize = 24;
}

// =============================================================================
// Dylib Command
// =============================================================================

/// Dylib load command (LC_LOAD_DYLIB, LC_ID_DYLIB).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DylibCommand {
    /// Load command type
    pub cmd: [u8; 4],
    /// Size of this load command, including the path string
    pub cmdsize: [u8; 4],
    /// Offset of the path string from the start of the command
    pub name_offset: [u8; 4],
    /// Library's build timestamp
    pub timestamp: [u8; 4],
    /// Library's current version number
    pub current_version: [u8; 4],
    /// Library's compatibility version number
    pub compatibility_version: [u8; 4],
}

impl DylibCommand {
    /// Size of this command without the path string.
    pub const SIZE: usize = 24;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sizes() {
        assert_eq!(std::mem::size_of::<FatHeader>(), FatHeader::SIZE);
        assert_eq!(std::mem::size_of::<FatArch32>(), FatArch32::SIZE);
        assert_eq!(std::mem::size_of::<FatArch64>(), FatArch64::SIZE);
        assert_eq!(std::mem::size_of::<MachHeader32>(), MachHeader32::SIZE);
        assert_eq!(std::mem::size_of::<MachHeader64>(), MachHeader64::SIZE);
        assert_eq!(std::mem::size_of::<LoadCommand>(), LoadCommand::SIZE);
        assert_eq!(std::mem::size_of::<SegmentCommand32>(), SegmentCommand32::SIZE);
        assert_eq!(std::mem::size_of::<SegmentCommand64>(), SegmentCommand64::SIZE);
        assert_eq!(std::mem::size_of::<Section32>(), Section32::SIZE);
        assert_eq!(std::mem::size_of::<Section64>(), Section64::SIZE);
        assert_eq!(std::mem::size_of::<SymtabCommand>(), SymtabCommand::SIZE);
        assert_eq!(std::mem::size_of::<DylibCommand>(), DylibCommand::SIZE);
    }

    #[test]
    fn test_fixed_name() {
        let mut name = [0u8; 16];
        name[..6].copy_from_slice(b"__TEXT");
        assert_eq!(fixed_name(&name), "__TEXT");
        assert_eq!(fixed_name(b"0123456789abcdef"), "0123456789abcdef");
    }
}
