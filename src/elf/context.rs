//! ELF parsing: header, program headers, and the dynamic section.

use tracing::debug;

use super::constants::*;
use super::structs::*;
use crate::error::{Error, Result};
use crate::triple::Arch;
use crate::util::{c_str_at, read_record, slice_at, tail_at, trim_nul, Endian};

/// A decoded program header, widened to 64 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramHeader {
    /// Segment type
    pub p_type: u32,
    /// File offset of the segment
    pub offset: u64,
    /// Virtual address of the segment
    pub vaddr: u64,
    /// Bytes of the segment present in the file
    pub filesz: u64,
    /// Bytes of the segment in memory
    pub memsz: u64,
}

impl ProgramHeader {
    /// Translates a virtual address inside this segment to a file offset.
    pub fn file_offset(&self, vaddr: u64) -> Option<u64> {
        if self.p_type != PT_LOAD || vaddr < self.vaddr || vaddr - self.vaddr >= self.filesz {
            return None;
        }
        Some(vaddr - self.vaddr + self.offset)
    }
}

/// A parsed ELF file.
#[derive(Debug, Clone)]
pub struct ElfFile {
    /// Whether the file is ELFCLASS64
    pub is_64: bool,
    /// Byte order declared by `EI_DATA`
    pub endian: Endian,
    /// Target architecture
    pub arch: Arch,
    /// Program headers in file order
    pub program_headers: Vec<ProgramHeader>,
    /// Path from PT_INTERP
    pub interpreter: Option<String>,
    /// DT_SONAME, if present
    pub soname: Option<String>,
    /// DT_NEEDED entries, de-duplicated in first-occurrence order
    pub needed: Vec<String>,
}

struct HeaderFields {
    machine: u16,
    phoff: u64,
    phentsize: u16,
    phnum: u16,
}

impl ElfFile {
    /// Parses an ELF file.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let ident = slice_at(data, 0, EI_NIDENT as u64)?;
        if ident[..4] != ELF_MAGIC.to_be_bytes() {
            return Err(Error::parse(0, "missing ELF magic"));
        }

        let is_64 = match ident[EI_CLASS] {
            ELFCLASS32 => false,
            ELFCLASS64 => true,
            other => return Err(Error::InvalidElfClass(other)),
        };
        let endian = match ident[EI_DATA] {
            ELFDATA2LSB => Endian::Little,
            ELFDATA2MSB => Endian::Big,
            other => return Err(Error::InvalidElfEncoding(other)),
        };

        let header = read_header(data, is_64, endian)?;
        let arch = match header.machine {
            EM_X86_64 => Arch::X86_64,
            EM_AARCH64 => Arch::Aarch64,
            other => return Err(Error::UnsupportedMachine(other)),
        };

        let program_headers = read_program_headers(data, is_64, endian, &header)?;

        let mut file = Self {
            is_64,
            endian,
            arch,
            program_headers,
            interpreter: None,
            soname: None,
            needed: Vec::new(),
        };

        if let Some(interp) = file.find(PT_INTERP) {
            let bytes = slice_at(data, interp.offset, interp.filesz)?;
            file.interpreter = Some(String::from_utf8_lossy(trim_nul(bytes)).into_owned());
        }

        if let Some(dynamic) = file.find(PT_DYNAMIC) {
            file.read_dynamic(data, &dynamic)?;
        }

        Ok(file)
    }

    /// Returns the first program header of the given type.
    pub fn find(&self, p_type: u32) -> Option<ProgramHeader> {
        self.program_headers
            .iter()
            .find(|ph| ph.p_type == p_type)
            .copied()
    }

    /// Translates a virtual address to a file offset through the PT_LOAD segments.
    pub fn vaddr_to_offset(&self, vaddr: u64) -> Option<u64> {
        self.program_headers
            .iter()
            .find_map(|ph| ph.file_offset(vaddr))
    }

    /// Returns true if the file has no program interpreter.
    pub fn is_static(&self) -> bool {
        self.interpreter.is_none()
    }

    fn read_dynamic(&mut self, data: &[u8], dynamic: &ProgramHeader) -> Result<()> {
        let region = slice_at(data, dynamic.offset, dynamic.filesz)?;
        let entries = decode_dynamic(region, self.is_64, self.endian)?;

        // Pass 1: locate the string table.
        let mut strtab = None;
        let mut strsz = None;
        for &(tag, value) in &entries {
            match tag {
                DT_STRTAB => strtab = Some(value),
                DT_STRSZ => strsz = Some(value),
                _ => {}
            }
        }

        let Some(strtab_addr) = strtab else {
            debug!("dynamic segment has no string table");
            return Ok(());
        };
        let strtab_offset = self.vaddr_to_offset(strtab_addr).unwrap_or(strtab_addr);
        let strings = match strsz {
            Some(size) => slice_at(data, strtab_offset, size)?,
            None => tail_at(data, strtab_offset)?,
        };

        // Pass 2: resolve names.
        for &(tag, value) in &entries {
            match tag {
                DT_NEEDED => {
                    let name = c_str_at(strings, value)?;
                    if !self.needed.contains(&name) {
                        self.needed.push(name);
                    }
                }
                DT_SONAME => self.soname = Some(c_str_at(strings, value)?),
                _ => {}
            }
        }

        Ok(())
    }
}

fn read_header(data: &[u8], is_64: bool, e: Endian) -> Result<HeaderFields> {
    if is_64 {
        let h: Header64 = read_record(data, 0)?;
        Ok(HeaderFields {
            machine: e.u16(h.e_machine),
            phoff: e.u64(h.e_phoff),
            phentsize: e.u16(h.e_phentsize),
            phnum: e.u16(h.e_phnum),
        })
    } else {
        let h: Header32 = read_record(data, 0)?;
        Ok(HeaderFields {
            machine: e.u16(h.e_machine),
            phoff: e.u32(h.e_phoff) as u64,
            phentsize: e.u16(h.e_phentsize),
            phnum: e.u16(h.e_phnum),
        })
    }
}

fn read_program_headers(
    data: &[u8],
    is_64: bool,
    e: Endian,
    header: &HeaderFields,
) -> Result<Vec<ProgramHeader>> {
    if header.phnum == 0 {
        return Ok(Vec::new());
    }

    let record_size = if is_64 {
        ProgramHeader64::SIZE
    } else {
        ProgramHeader32::SIZE
    };
    if (header.phentsize as usize) < record_size {
        return Err(Error::parse(
            0,
            format!(
                "e_phentsize {} is smaller than a program header ({})",
                header.phentsize, record_size
            ),
        ));
    }

    let mut headers = Vec::with_capacity(header.phnum as usize);
    for i in 0..header.phnum as u64 {
        let offset = header
            .phoff
            .checked_add(i * header.phentsize as u64)
            .ok_or_else(|| Error::out_of_bounds(header.phoff, 0, data.len() as u64))?;
        let ph = if is_64 {
            let ph: ProgramHeader64 = read_record(data, offset)?;
            ProgramHeader {
                p_type: e.u32(ph.p_type),
                offset: e.u64(ph.p_offset),
                vaddr: e.u64(ph.p_vaddr),
                filesz: e.u64(ph.p_filesz),
                memsz: e.u64(ph.p_memsz),
            }
        } else {
            let ph: ProgramHeader32 = read_record(data, offset)?;
            ProgramHeader {
                p_type: e.u32(ph.p_type),
                offset: e.u32(ph.p_offset) as u64,
                vaddr: e.u32(ph.p_vaddr) as u64,
                filesz: e.u32(ph.p_filesz) as u64,
                memsz: e.u32(ph.p_memsz) as u64,
            }
        };
        headers.push(ph);
    }

    Ok(headers)
}

/// Decodes `(tag, value)` pairs up to DT_NULL or the end of the region.
fn decode_dynamic(region: &[u8], is_64: bool, e: Endian) -> Result<Vec<(u64, u64)>> {
    let entry_size = (if is_64 { Dyn64::SIZE } else { Dyn32::SIZE }) as u64;
    let count = region.len() as u64 / entry_size;

    let mut entries = Vec::new();
    for i in 0..count {
        let (tag, value) = if is_64 {
            let d: Dyn64 = read_record(region, i * entry_size)?;
            (e.u64(d.d_tag), e.u64(d.d_val))
        } else {
            let d: Dyn32 = read_record(region, i * entry_size)?;
            (e.u32(d.d_tag) as u64, e.u32(d.d_val) as u64)
        };
        if tag == DT_NULL {
            break;
        }
        entries.push((tag, value));
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ElfBuilder;

    #[test]
    fn test_dynamic_executable() {
        let data = ElfBuilder::new(Arch::X86_64)
            .interpreter("/lib64/ld-linux-x86-64.so.2")
            .needed("libm.so.6")
            .needed("libc.so.6")
            .needed("libm.so.6")
            .build();

        let elf = ElfFile::parse(&data).unwrap();
        assert!(elf.is_64);
        assert_eq!(elf.arch, Arch::X86_64);
        assert_eq!(
            elf.interpreter.as_deref(),
            Some("/lib64/ld-linux-x86-64.so.2")
        );
        assert_eq!(elf.needed, vec!["libm.so.6", "libc.so.6"]);
        assert_eq!(elf.soname, None);
        assert!(!elf.is_static());
    }

    #[test]
    fn test_shared_library_soname() {
        let data = ElfBuilder::new(Arch::Aarch64)
            .soname("libfoo.so.1")
            .needed("libc.so.6")
            .build();

        let elf = ElfFile::parse(&data).unwrap();
        assert_eq!(elf.arch, Arch::Aarch64);
        assert_eq!(elf.soname.as_deref(), Some("libfoo.so.1"));
        assert!(elf.is_static());
    }

    #[test]
    fn test_32bit_big_endian() {
        let data = ElfBuilder::new(Arch::Aarch64)
            .class32()
            .endian(Endian::Big)
            .interpreter("/lib/ld-musl-aarch64.so.1")
            .needed("libc.so")
            .soname("libbar.so")
            .build();

        let elf = ElfFile::parse(&data).unwrap();
        assert!(!elf.is_64);
        assert_eq!(elf.endian, Endian::Big);
        assert_eq!(elf.interpreter.as_deref(), Some("/lib/ld-musl-aarch64.so.1"));
        assert_eq!(elf.needed, vec!["libc.so"]);
        assert_eq!(elf.soname.as_deref(), Some("libbar.so"));
    }

    #[test]
    fn test_strtab_is_translated_through_load_segment() {
        let data = ElfBuilder::new(Arch::X86_64)
            .load_base(0x40_0000)
            .needed("libz.so.1")
            .build();

        let elf = ElfFile::parse(&data).unwrap();
        assert_eq!(elf.needed, vec!["libz.so.1"]);
        assert_eq!(elf.vaddr_to_offset(0x40_0010), Some(0x10));
        assert_eq!(elf.vaddr_to_offset(0x10), None);
    }

    #[test]
    fn test_static_executable() {
        let data = ElfBuilder::new(Arch::X86_64).build();
        let elf = ElfFile::parse(&data).unwrap();
        assert!(elf.is_static());
        assert!(elf.needed.is_empty());
        assert!(elf.find(PT_DYNAMIC).is_none());
    }

    #[test]
    fn test_rejects_bad_ident() {
        let mut data = ElfBuilder::new(Arch::X86_64).build();
        data[EI_CLASS] = 3;
        assert!(matches!(
            ElfFile::parse(&data),
            Err(Error::InvalidElfClass(3))
        ));

        let mut data = ElfBuilder::new(Arch::X86_64).build();
        data[EI_DATA] = 0;
        assert!(matches!(
            ElfFile::parse(&data),
            Err(Error::InvalidElfEncoding(0))
        ));
    }

    #[test]
    fn test_rejects_unknown_machine() {
        let mut data = ElfBuilder::new(Arch::X86_64).build();
        data[18..20].copy_from_slice(&0x28u16.to_le_bytes());
        assert!(matches!(
            ElfFile::parse(&data),
            Err(Error::UnsupportedMachine(0x28))
        ));
    }

    #[test]
    fn test_rejects_short_phentsize() {
        let mut data = ElfBuilder::new(Arch::X86_64)
            .interpreter("/lib64/ld-linux-x86-64.so.2")
            .build();
        // e_phentsize lives at offset 54 in ELF64.
        data[54..56].copy_from_slice(&8u16.to_le_bytes());
        assert!(matches!(ElfFile::parse(&data), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_rejects_truncated_interpreter() {
        let data = ElfBuilder::new(Arch::X86_64)
            .interpreter("/lib64/ld-linux-x86-64.so.2")
            .build();
        let truncated = &data[..data.len() - 8];
        assert!(matches!(
            ElfFile::parse(truncated),
            Err(Error::OutOfBounds { .. })
        ));
    }
}
