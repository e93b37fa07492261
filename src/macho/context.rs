//! Mach-O parsing for thin images and universal (fat) binaries.

use std::collections::BTreeSet;

use rayon::prelude::*;
use tracing::debug;

use super::constants::*;
use super::structs::*;
use crate::error::{Error, Result};
use crate::triple::Arch;
use crate::util::{c_str_at, read_record, slice_at, Endian};

// =============================================================================
// Segment Info
// =============================================================================

/// Parsed segment information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    /// Segment name
    pub name: String,
    /// Virtual memory address
    pub vmaddr: u64,
    /// Virtual memory size
    pub vmsize: u64,
    /// File offset
    pub fileoff: u64,
    /// Amount of file mapped
    pub filesize: u64,
    /// Sections in this segment
    pub sections: Vec<SectionInfo>,
}

impl SegmentInfo {
    /// Returns a section by name.
    pub fn section(&self, name: &str) -> Option<&SectionInfo> {
        self.sections.iter().find(|s| s.name == name)
    }
}

/// Parsed section information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionInfo {
    /// Section name
    pub name: String,
    /// Owning segment name
    pub segment_name: String,
    /// Virtual memory address
    pub addr: u64,
    /// Size in bytes
    pub size: u64,
    /// File offset
    pub offset: u32,
}

// =============================================================================
// Load Command Info
// =============================================================================

/// Parsed load command information.
///
/// Commands this crate does not interpret are kept as [`LoadCommandInfo::Unknown`]
/// with their raw payload; inspecting more command types means adding variants.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum LoadCommandInfo {
    Segment(SegmentInfo),
    Symtab {
        symoff: u32,
        nsyms: u32,
        stroff: u32,
        strsize: u32,
    },
    LoadDylib {
        name: String,
        current_version: u32,
        compatibility_version: u32,
    },
    IdDylib {
        name: String,
        current_version: u32,
        compatibility_version: u32,
    },
    Unknown {
        cmd: u32,
        payload: Vec<u8>,
    },
}

// =============================================================================
// Thin Image
// =============================================================================

/// A single-architecture Mach-O image.
#[derive(Debug, Clone)]
pub struct MachOSlice {
    /// Architecture of the image
    pub arch: Arch,
    /// Raw CPU type
    pub cputype: u32,
    /// Raw CPU subtype
    pub cpusubtype: u32,
    /// File type (MH_EXECUTE, MH_DYLIB, ...)
    pub filetype: u32,
    /// Header flags
    pub flags: MachOFlags,
    /// Whether the image uses the 64-bit header layout
    pub is_64: bool,
    /// Byte order of the image
    pub endian: Endian,
    /// Load commands in file order
    pub load_commands: Vec<LoadCommandInfo>,
}

impl MachOSlice {
    /// Parses a thin Mach-O image.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let magic = read_magic(data)?;
        let (endian, is_64) = match magic {
            MH_MAGIC => (Endian::Big, false),
            MH_CIGAM => (Endian::Little, false),
            MH_MAGIC_64 => (Endian::Big, true),
            MH_CIGAM_64 => (Endian::Little, true),
            FAT_MAGIC | FAT_CIGAM | FAT_MAGIC_64 | FAT_CIGAM_64 => {
                return Err(Error::parse(0, "nested universal header"));
            }
            other => return Err(Error::InvalidMachoMagic(other)),
        };

        let e = endian;
        let (cputype, cpusubtype, filetype, ncmds, sizeofcmds, flags, header_size) = if is_64 {
            let h: MachHeader64 = read_record(data, 0)?;
            (
                e.u32(h.cputype),
                e.u32(h.cpusubtype),
                e.u32(h.filetype),
                e.u32(h.ncmds),
                e.u32(h.sizeofcmds),
                e.u32(h.flags),
                MachHeader64::SIZE,
            )
        } else {
            let h: MachHeader32 = read_record(data, 0)?;
            (
                e.u32(h.cputype),
                e.u32(h.cpusubtype),
                e.u32(h.filetype),
                e.u32(h.ncmds),
                e.u32(h.sizeofcmds),
                e.u32(h.flags),
                MachHeader32::SIZE,
            )
        };

        let arch = arch_for_cputype(cputype)?;

        let mut slice = Self {
            arch,
            cputype,
            cpusubtype,
            filetype,
            flags: MachOFlags::from_bits_retain(flags),
            is_64,
            endian,
            load_commands: Vec::new(),
        };

        let commands = slice_at(data, header_size as u64, sizeofcmds as u64)?;
        // ncmds is untrusted; each command takes at least a LoadCommand header.
        let capacity = (ncmds as usize).min(commands.len() / LoadCommand::SIZE);
        slice.load_commands.reserve(capacity);
        slice.parse_load_commands(commands, header_size, ncmds)?;

        Ok(slice)
    }

    /// Walks the load command region.
    ///
    /// `commands` covers exactly `sizeofcmds` bytes; offsets reported in
    /// errors are relative to the start of the image.
    fn parse_load_commands(&mut self, commands: &[u8], base: usize, ncmds: u32) -> Result<()> {
        let e = self.endian;
        let mut offset = 0usize;

        for _ in 0..ncmds {
            if offset + LoadCommand::SIZE > commands.len() {
                return Err(Error::LoadCommandOverflow {
                    offset: base + offset,
                });
            }
            let lc: LoadCommand = read_record(commands, offset as u64)?;
            let cmd = e.u32(lc.cmd);
            let cmdsize = e.u32(lc.cmdsize) as usize;

            if cmdsize < LoadCommand::SIZE || offset + cmdsize > commands.len() {
                return Err(Error::LoadCommandOverflow {
                    offset: base + offset,
                });
            }

            let cmd_data = &commands[offset..offset + cmdsize];
            let info = self
                .parse_load_command(cmd, cmd_data)
                .map_err(|err| match err {
                    Error::OutOfBounds { .. } | Error::Parse { .. } => Error::parse(
                        base + offset,
                        format!("malformed load command {:#x}: {}", cmd, err),
                    ),
                    other => other,
                })?;

            self.load_commands.push(info);
            offset += cmdsize;
        }

        Ok(())
    }

    /// Parses a single load command.
    fn parse_load_command(&self, cmd: u32, data: &[u8]) -> Result<LoadCommandInfo> {
        let e = self.endian;
        match cmd {
            LC_SEGMENT => {
                let seg: SegmentCommand32 = read_record(data, 0)?;
                let nsects = e.u32(seg.nsects) as u64;
                check_sections(data, SegmentCommand32::SIZE, nsects, Section32::SIZE)?;
                let mut sections = Vec::with_capacity(nsects as usize);
                for i in 0..nsects {
                    let off = SegmentCommand32::SIZE as u64 + i * Section32::SIZE as u64;
                    let sect: Section32 = read_record(data, off)?;
                    sections.push(SectionInfo {
                        name: fixed_name(&sect.sectname).to_string(),
                        segment_name: fixed_name(&sect.segname).to_string(),
                        addr: e.u32(sect.addr) as u64,
                        size: e.u32(sect.size) as u64,
                        offset: e.u32(sect.offset),
                    });
                }
                Ok(LoadCommandInfo::Segment(SegmentInfo {
                    name: fixed_name(&seg.segname).to_string(),
                    vmaddr: e.u32(seg.vmaddr) as u64,
                    vmsize: e.u32(seg.vmsize) as u64,
                    fileoff: e.u32(seg.fileoff) as u64,
                    filesize: e.u32(seg.filesize) as u64,
                    sections,
                }))
            }

            LC_SEGMENT_64 => {
                let seg: SegmentCommand64 = read_record(data, 0)?;
                let nsects = e.u32(seg.nsects) as u64;
                check_sections(data, SegmentCommand64::SIZE, nsects, Section64::SIZE)?;
                let mut sections = Vec::with_capacity(nsects as usize);
                for i in 0..nsects {
                    let off = SegmentCommand64::SIZE as u64 + i * Section64::SIZE as u64;
                    let sect: Section64 = read_record(data, off)?;
                    sections.push(SectionInfo {
                        name: fixed_name(&sect.sectname).to_string(),
                        segment_name: fixed_name(&sect.segname).to_string(),
                        addr: e.u64(sect.addr),
                        size: e.u64(sect.size),
                        offset: e.u32(sect.offset),
                    });
                }
                Ok(LoadCommandInfo::Segment(SegmentInfo {
                    name: fixed_name(&seg.segname).to_string(),
                    vmaddr: e.u64(seg.vmaddr),
                    vmsize: e.u64(seg.vmsize),
                    fileoff: e.u64(seg.fileoff),
                    filesize: e.u64(seg.filesize),
                    sections,
                }))
            }

            LC_SYMTAB => {
                let symtab: SymtabCommand = read_record(data, 0)?;
                Ok(LoadCommandInfo::Symtab {
                    symoff: e.u32(symtab.symoff),
                    nsyms: e.u32(symtab.nsyms),
                    stroff: e.u32(symtab.stroff),
                    strsize: e.u32(symtab.strsize),
                })
            }

            LC_LOAD_DYLIB | LC_ID_DYLIB => {
                let dylib: DylibCommand = read_record(data, 0)?;
                let name = c_str_at(data, e.u32(dylib.name_offset) as u64)?;
                let current_version = e.u32(dylib.current_version);
                let compatibility_version = e.u32(dylib.compatibility_version);
                if cmd == LC_LOAD_DYLIB {
                    Ok(LoadCommandInfo::LoadDylib {
                        name,
                        current_version,
                        compatibility_version,
                    })
                } else {
                    Ok(LoadCommandInfo::IdDylib {
                        name,
                        current_version,
                        compatibility_version,
                    })
                }
            }

            _ => Ok(LoadCommandInfo::Unknown {
                cmd,
                payload: data[LoadCommand::SIZE..].to_vec(),
            }),
        }
    }

    /// Returns an iterator over all segments.
    pub fn segments(&self) -> impl Iterator<Item = &SegmentInfo> {
        self.load_commands.iter().filter_map(|lc| {
            if let LoadCommandInfo::Segment(seg) = lc {
                Some(seg)
            } else {
                None
            }
        })
    }

    /// Returns a segment by name.
    pub fn segment(&self, name: &str) -> Option<&SegmentInfo> {
        self.segments().find(|seg| seg.name == name)
    }

    /// Returns an iterator over the libraries this image loads.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.load_commands.iter().filter_map(|lc| {
            if let LoadCommandInfo::LoadDylib { name, .. } = lc {
                Some(name.as_str())
            } else {
                None
            }
        })
    }

    /// Returns the install name recorded by LC_ID_DYLIB.
    pub fn install_name(&self) -> Option<&str> {
        self.load_commands.iter().find_map(|lc| {
            if let LoadCommandInfo::IdDylib { name, .. } = lc {
                Some(name.as_str())
            } else {
                None
            }
        })
    }

    /// Returns true if this image is a dylib.
    #[inline]
    pub fn is_dylib(&self) -> bool {
        self.filetype == MH_DYLIB
    }

    /// Returns true if this image is a main executable.
    #[inline]
    pub fn is_executable(&self) -> bool {
        self.filetype == MH_EXECUTE
    }
}

// =============================================================================
// Universal Binary
// =============================================================================

/// Architecture record from a universal header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatArchInfo {
    /// CPU type
    pub cputype: u32,
    /// CPU subtype
    pub cpusubtype: u32,
    /// Offset of the embedded image
    pub offset: u64,
    /// Size of the embedded image
    pub size: u64,
    /// Alignment (power of 2)
    pub align: u32,
}

/// A parsed Mach-O file: one thin image, or every slice of a universal binary.
#[derive(Debug, Clone)]
pub struct MachOFile {
    /// Universal header records (empty for thin files)
    pub fat_arches: Vec<FatArchInfo>,
    /// Parsed images, in header order
    pub slices: Vec<MachOSlice>,
}

impl MachOFile {
    /// Parses a thin or universal Mach-O file.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let magic = read_magic(data)?;
        let fat = match magic {
            FAT_MAGIC => Some((Endian::Big, false)),
            FAT_CIGAM => Some((Endian::Little, false)),
            FAT_MAGIC_64 => Some((Endian::Big, true)),
            FAT_CIGAM_64 => Some((Endian::Little, true)),
            _ => None,
        };

        let Some((endian, wide)) = fat else {
            return Ok(Self {
                fat_arches: Vec::new(),
                slices: vec![MachOSlice::parse(data)?],
            });
        };

        let fat_arches = parse_fat_arches(data, endian, wide)?;
        debug!("universal binary with {} slices", fat_arches.len());

        // Slices are independent; parse them in parallel.
        let slices = fat_arches
            .par_iter()
            .map(|arch| MachOSlice::parse(slice_at(data, arch.offset, arch.size)?))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { fat_arches, slices })
    }

    /// Returns true if this is a universal binary.
    pub fn is_fat(&self) -> bool {
        !self.fat_arches.is_empty()
    }

    /// Returns the set of architectures across all slices.
    pub fn arches(&self) -> BTreeSet<Arch> {
        self.slices.iter().map(|s| s.arch).collect()
    }

    /// Returns the union of library dependencies across all slices.
    pub fn dependencies(&self) -> BTreeSet<String> {
        self.slices
            .iter()
            .flat_map(|s| s.dependencies())
            .map(str::to_string)
            .collect()
    }

    /// Returns the first install name found in any slice.
    pub fn install_name(&self) -> Option<&str> {
        self.slices.iter().find_map(|s| s.install_name())
    }
}

fn parse_fat_arches(data: &[u8], e: Endian, wide: bool) -> Result<Vec<FatArchInfo>> {
    let header: FatHeader = read_record(data, 0)?;
    let count = e.u32(header.nfat_arch);
    if count > MAX_FAT_ARCHES {
        return Err(Error::TooManyFatArches {
            count,
            max: MAX_FAT_ARCHES,
        });
    }

    let mut arches = Vec::with_capacity(count as usize);
    let mut offset = FatHeader::SIZE as u64;
    for _ in 0..count {
        let info = if wide {
            let a: FatArch64 = read_record(data, offset)?;
            offset += FatArch64::SIZE as u64;
            FatArchInfo {
                cputype: e.u32(a.cputype),
                cpusubtype: e.u32(a.cpusubtype),
                offset: e.u64(a.offset),
                size: e.u64(a.size),
                align: e.u32(a.align),
            }
        } else {
            let a: FatArch32 = read_record(data, offset)?;
            offset += FatArch32::SIZE as u64;
            FatArchInfo {
                cputype: e.u32(a.cputype),
                cpusubtype: e.u32(a.cpusubtype),
                offset: e.u32(a.offset) as u64,
                size: e.u32(a.size) as u64,
                align: e.u32(a.align),
            }
        };
        arches.push(info);
    }

    Ok(arches)
}

/// Fails unless `nsects` section records fit after the segment command.
fn check_sections(data: &[u8], header: usize, nsects: u64, size: usize) -> Result<()> {
    let needed = header as u64 + nsects * size as u64;
    if needed > data.len() as u64 {
        return Err(Error::parse(
            0,
            format!(
                "{} sections need {} bytes, command has {}",
                nsects,
                needed,
                data.len()
            ),
        ));
    }
    Ok(())
}

/// Reads the first four bytes as a big-endian magic number.
fn read_magic(data: &[u8]) -> Result<u32> {
    let bytes = slice_at(data, 0, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Maps a Mach-O CPU type to an architecture.
pub fn arch_for_cputype(cputype: u32) -> Result<Arch> {
    match cputype {
        CPU_TYPE_X86_64 => Ok(Arch::X86_64),
        CPU_TYPE_ARM64 => Ok(Arch::Aarch64),
        other => Err(Error::UnsupportedCpuType(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MachOBuilder;

    #[test]
    fn test_parse_thin_dylib() {
        let data = MachOBuilder::new(Arch::Aarch64)
            .filetype(MH_DYLIB)
            .segment("__TEXT", &["__text", "__stubs"])
            .id_dylib("@rpath/libfoo.dylib")
            .load_dylib("/usr/lib/libSystem.B.dylib")
            .build();

        let file = MachOFile::parse(&data).unwrap();
        assert!(!file.is_fat());
        let slice = &file.slices[0];
        assert_eq!(slice.arch, Arch::Aarch64);
        assert!(slice.is_dylib());
        assert!(slice.is_64);
        assert_eq!(slice.install_name(), Some("@rpath/libfoo.dylib"));
        assert_eq!(
            slice.dependencies().collect::<Vec<_>>(),
            vec!["/usr/lib/libSystem.B.dylib"]
        );

        let text = slice.segment("__TEXT").unwrap();
        assert_eq!(text.sections.len(), 2);
        assert!(text.section("__stubs").is_some());
    }

    #[test]
    fn test_header_flags() {
        let data = MachOBuilder::new(Arch::X86_64)
            .flags(MachOFlags::DYLDLINK | MachOFlags::TWOLEVEL | MachOFlags::PIE)
            .build();
        let slice = MachOSlice::parse(&data).unwrap();
        assert!(slice.is_executable());
        assert!(slice.flags.contains(MachOFlags::PIE));
        assert!(!slice.flags.contains(MachOFlags::FORCE_FLAT));
    }

    #[test]
    fn test_parse_32bit_big_endian() {
        let data = MachOBuilder::new(Arch::X86_64)
            .endian(Endian::Big)
            .wide(false)
            .segment("__TEXT", &["__text"])
            .load_dylib("/usr/lib/libc.dylib")
            .build();

        let slice = MachOSlice::parse(&data).unwrap();
        assert!(!slice.is_64);
        assert_eq!(slice.endian, Endian::Big);
        assert_eq!(slice.segment("__TEXT").unwrap().sections[0].name, "__text");
        assert_eq!(
            slice.dependencies().collect::<Vec<_>>(),
            vec!["/usr/lib/libc.dylib"]
        );
    }

    #[test]
    fn test_unknown_commands_keep_sync() {
        let data = MachOBuilder::new(Arch::X86_64)
            .raw_command(LC_UUID, &[0xAB; 16])
            .raw_command(LC_RPATH, b"\x0c\0\0\0@loader_path\0\0\0\0")
            .load_dylib("/usr/lib/libSystem.B.dylib")
            .build();

        let slice = MachOSlice::parse(&data).unwrap();
        assert_eq!(slice.load_commands.len(), 3);
        match &slice.load_commands[0] {
            LoadCommandInfo::Unknown { cmd, payload } => {
                assert_eq!(*cmd, LC_UUID);
                assert_eq!(payload.as_slice(), &[0xAB; 16]);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(
            slice.dependencies().collect::<Vec<_>>(),
            vec!["/usr/lib/libSystem.B.dylib"]
        );
    }

    #[test]
    fn test_parse_fat_two_arches() {
        let x86 = MachOBuilder::new(Arch::X86_64)
            .load_dylib("/usr/lib/libSystem.B.dylib")
            .build();
        let arm = MachOBuilder::new(Arch::Aarch64)
            .load_dylib("/usr/lib/libSystem.B.dylib")
            .load_dylib("/usr/lib/libobjc.A.dylib")
            .build();

        for wide in [false, true] {
            let data = MachOBuilder::fat(&[&x86, &arm], wide);
            let file = MachOFile::parse(&data).unwrap();
            assert!(file.is_fat());
            assert_eq!(
                file.arches().into_iter().collect::<Vec<_>>(),
                vec![Arch::X86_64, Arch::Aarch64]
            );
            assert_eq!(
                file.dependencies().into_iter().collect::<Vec<_>>(),
                vec!["/usr/lib/libSystem.B.dylib", "/usr/lib/libobjc.A.dylib"]
            );
        }
    }

    #[test]
    fn test_rejects_zero_cmdsize() {
        let mut data = MachOBuilder::new(Arch::X86_64)
            .raw_command(LC_UUID, &[0; 16])
            .build();
        // Zero out cmdsize of the first command.
        data[MachHeader64::SIZE + 4..MachHeader64::SIZE + 8].copy_from_slice(&[0; 4]);
        assert!(matches!(
            MachOSlice::parse(&data),
            Err(Error::LoadCommandOverflow { .. })
        ));
    }

    #[test]
    fn test_rejects_truncated_fat_slice() {
        let thin = MachOBuilder::new(Arch::X86_64).build();
        let mut data = MachOBuilder::fat(&[&thin], false);
        data.truncate(data.len() - 4);
        assert!(matches!(
            MachOFile::parse(&data),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_rejects_unsupported_cpu() {
        let mut data = MachOBuilder::new(Arch::X86_64).build();
        data[4..8].copy_from_slice(&CPU_TYPE_X86.to_le_bytes());
        assert!(matches!(
            MachOSlice::parse(&data),
            Err(Error::UnsupportedCpuType(CPU_TYPE_X86))
        ));
    }

    #[test]
    fn test_huge_command_count_is_an_error() {
        let mut data = MachOBuilder::new(Arch::X86_64).build();
        // ncmds, with sizeofcmds left at zero.
        data[16..20].copy_from_slice(&u32::MAX.to_le_bytes());
        data[20..24].copy_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            MachOSlice::parse(&data),
            Err(Error::LoadCommandOverflow { .. })
        ));
        assert!(crate::metadata::try_metadata(&data).is_none());
    }

    #[test]
    fn test_huge_section_count_is_an_error() {
        for wide in [true, false] {
            let mut data = MachOBuilder::new(Arch::X86_64)
                .wide(wide)
                .segment("__TEXT", &["__text"])
                .build();
            let (header, nsects) = if wide {
                (MachHeader64::SIZE, 64)
            } else {
                (MachHeader32::SIZE, 48)
            };
            let at = header + nsects;
            data[at..at + 4].copy_from_slice(&u32::MAX.to_le_bytes());
            assert!(matches!(
                MachOSlice::parse(&data),
                Err(Error::Parse { .. })
            ));
            assert!(crate::metadata::try_metadata(&data).is_none());
        }
    }

    #[test]
    fn test_rejects_huge_fat_count() {
        let mut data = vec![0u8; 64];
        data[..4].copy_from_slice(&FAT_MAGIC.to_be_bytes());
        data[4..8].copy_from_slice(&1000u32.to_be_bytes());
        assert!(matches!(
            MachOFile::parse(&data),
            Err(Error::TooManyFatArches { count: 1000, .. })
        ));
    }
}
