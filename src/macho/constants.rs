//! Mach-O constants and flags.
//!
//! Magic values are given as they read when the first four bytes of a file
//! are interpreted big-endian.

use bitflags::bitflags;

// =============================================================================
// Magic Numbers
// =============================================================================

/// 32-bit Mach-O, big-endian image
pub const MH_MAGIC: u32 = 0xFEEDFACE;
/// 32-bit Mach-O, little-endian image
pub const MH_CIGAM: u32 = 0xCEFAEDFE;
/// 64-bit Mach-O, big-endian image
pub const MH_MAGIC_64: u32 = 0xFEEDFACF;
/// 64-bit Mach-O, little-endian image
pub const MH_CIGAM_64: u32 = 0xCFFAEDFE;

/// Universal binary with 32-bit arch records
pub const FAT_MAGIC: u32 = 0xCAFEBABE;
/// Universal binary with 32-bit arch records, byte-swapped
pub const FAT_CIGAM: u32 = 0xBEBAFECA;
/// Universal binary with 64-bit arch records
pub const FAT_MAGIC_64: u32 = 0xCAFEBABF;
/// Universal binary with 64-bit arch records, byte-swapped
pub const FAT_CIGAM_64: u32 = 0xBFBAFECA;

/// All magics that identify a Mach-O or universal file.
pub const MACHO_MAGICS: [u32; 8] = [
    FAT_MAGIC,
    FAT_CIGAM,
    FAT_MAGIC_64,
    FAT_CIGAM_64,
    MH_MAGIC,
    MH_CIGAM,
    MH_MAGIC_64,
    MH_CIGAM_64,
];

/// Upper bound on `nfat_arch`; also keeps Java class files (same magic) out.
pub const MAX_FAT_ARCHES: u32 = 64;

// =============================================================================
// File Types
// =============================================================================

/// Executable
pub const MH_EXECUTE: u32 = 0x2;
/// Dynamically bound shared library
pub const MH_DYLIB: u32 = 0x6;

// =============================================================================
// CPU Types
// =============================================================================

/// 64-bit architecture flag
pub const CPU_ARCH_ABI64: u32 = 0x0100_0000;

/// ARM64 CPU type
pub const CPU_TYPE_ARM64: u32 = 12 | CPU_ARCH_ABI64;

/// x86 CPU type
pub const CPU_TYPE_X86: u32 = 7;
/// x86_64 CPU type
pub const CPU_TYPE_X86_64: u32 = CPU_TYPE_X86 | CPU_ARCH_ABI64;

/// x86_64 all
pub const CPU_SUBTYPE_X86_64_ALL: u32 = 3;
/// ARM64 all
pub const CPU_SUBTYPE_ARM64_ALL: u32 = 0;

// =============================================================================
// Load Commands
// =============================================================================

/// Load command requiring dynamic linker
pub const LC_REQ_DYLD: u32 = 0x8000_0000;

/// Segment of this file
pub const LC_SEGMENT: u32 = 0x1;
/// Link-edit symbol table info
pub const LC_SYMTAB: u32 = 0x2;
/// Load a dynamically linked shared library
pub const LC_LOAD_DYLIB: u32 = 0xC;
/// Dynamically linked shared lib identification
pub const LC_ID_DYLIB: u32 = 0xD;
/// 64-bit segment
pub const LC_SEGMENT_64: u32 = 0x19;
/// UUID
pub const LC_UUID: u32 = 0x1B;
/// Runpath additions
pub const LC_RPATH: u32 = 0x1C | LC_REQ_DYLD;

// =============================================================================
// Header Flags
// =============================================================================

bitflags! {
    /// Mach-O header flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MachOFlags: u32 {
        /// The object file has no undefined references
        const NOUNDEFS = 0x1;
        /// The object file is input for the dynamic linker
        const DYLDLINK = 0x4;
        /// The image is using two-level name space bindings
        const TWOLEVEL = 0x80;
        /// The executable is forcing all images to use flat name space bindings
        const FORCE_FLAT = 0x100;
        /// The final linked image contains external weak symbols
        const WEAK_DEFINES = 0x8000;
        /// The final linked image uses weak symbols
        const BINDS_TO_WEAK = 0x10000;
        /// The dylib re-exports none of its dependent dylibs
        const NO_REEXPORTED_DYLIBS = 0x100000;
        /// The OS will load the main executable at a random address
        const PIE = 0x200000;
        /// Contains a section of type S_THREAD_LOCAL_VARIABLES
        const HAS_TLV_DESCRIPTORS = 0x800000;
        /// The code was linked for use in an application extension
        const APP_EXTENSION_SAFE = 0x2000000;
    }
}
