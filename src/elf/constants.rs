//! ELF constants.

// =============================================================================
// Identification
// =============================================================================

/// `\x7FELF` read big-endian
pub const ELF_MAGIC: u32 = 0x7F45_4C46;

/// Offset of the class byte in `e_ident`
pub const EI_CLASS: usize = 4;
/// Offset of the data encoding byte in `e_ident`
pub const EI_DATA: usize = 5;
/// Size of `e_ident`
pub const EI_NIDENT: usize = 16;

/// 32-bit objects
pub const ELFCLASS32: u8 = 1;
/// 64-bit objects
pub const ELFCLASS64: u8 = 2;

/// Two's complement, little-endian
pub const ELFDATA2LSB: u8 = 1;
/// Two's complement, big-endian
pub const ELFDATA2MSB: u8 = 2;

// =============================================================================
// Machines
// =============================================================================

/// AMD x86-64
pub const EM_X86_64: u16 = 0x3E;
/// ARM 64-bit
pub const EM_AARCH64: u16 = 0xB7;

// =============================================================================
// Program Header Types
// =============================================================================

/// Loadable segment
pub const PT_LOAD: u32 = 1;
/// Dynamic linking information
pub const PT_DYNAMIC: u32 = 2;
/// Program interpreter path
pub const PT_INTERP: u32 = 3;

// =============================================================================
// Dynamic Tags
// =============================================================================

/// End of the dynamic array
pub const DT_NULL: u64 = 0;
/// Name of a needed library
pub const DT_NEEDED: u64 = 1;
/// Address of the string table
pub const DT_STRTAB: u64 = 5;
/// Size of the string table
pub const DT_STRSZ: u64 = 10;
/// Shared object name
pub const DT_SONAME: u64 = 14;
