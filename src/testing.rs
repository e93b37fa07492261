//! Test fixtures: synthesized executables and a recording build executor.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::artifact::{ArtifactId, ArtifactPath, MemoryStore};
use crate::build::{BuildExecutor, Libc, Toolchain};
use crate::error::{Error, Result};
use crate::macho::*;
use crate::mutation::Mutation;
use crate::triple::{Arch, Triple};
use crate::util::Endian;

fn put16(out: &mut Vec<u8>, e: Endian, v: u16) {
    out.extend_from_slice(&e.u16_bytes(v));
}

fn put32(out: &mut Vec<u8>, e: Endian, v: u32) {
    out.extend_from_slice(&e.u32_bytes(v));
}

fn put64(out: &mut Vec<u8>, e: Endian, v: u64) {
    out.extend_from_slice(&e.u64_bytes(v));
}

/// Writes an address-sized field.
fn put_word(out: &mut Vec<u8>, e: Endian, wide: bool, v: u64) {
    if wide {
        put64(out, e, v);
    } else {
        put32(out, e, v as u32);
    }
}

fn put_name16(out: &mut Vec<u8>, name: &str) {
    let mut buf = [0u8; 16];
    buf[..name.len()].copy_from_slice(name.as_bytes());
    out.extend_from_slice(&buf);
}

// =============================================================================
// ELF
// =============================================================================

/// Builds a minimal ELF image.
///
/// Layout: header, program headers, string table, dynamic array, then the
/// interpreter string last so truncating the file cuts into it. A single
/// PT_LOAD maps the whole file at `load_base`.
pub struct ElfBuilder {
    arch: Arch,
    is_64: bool,
    endian: Endian,
    load_base: u64,
    interpreter: Option<String>,
    soname: Option<String>,
    needed: Vec<String>,
}

impl ElfBuilder {
    pub fn new(arch: Arch) -> Self {
        Self {
            arch,
            is_64: true,
            endian: Endian::Little,
            load_base: 0,
            interpreter: None,
            soname: None,
            needed: Vec::new(),
        }
    }

    pub fn class32(mut self) -> Self {
        self.is_64 = false;
        self
    }

    pub fn endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    pub fn load_base(mut self, base: u64) -> Self {
        self.load_base = base;
        self
    }

    pub fn interpreter(mut self, path: &str) -> Self {
        self.interpreter = Some(path.to_string());
        self
    }

    pub fn soname(mut self, name: &str) -> Self {
        self.soname = Some(name.to_string());
        self
    }

    pub fn needed(mut self, name: &str) -> Self {
        self.needed.push(name.to_string());
        self
    }

    pub fn build(self) -> Vec<u8> {
        let e = self.endian;
        let wide = self.is_64;
        let (ehsize, phentsize, dynsize) = if wide { (64u64, 56u64, 16u64) } else { (52, 32, 8) };

        // String table and dynamic entries.
        let mut strtab = vec![0u8];
        let mut dyns: Vec<(u64, u64)> = Vec::new();
        for name in &self.needed {
            dyns.push((1, strtab.len() as u64));
            strtab.extend_from_slice(name.as_bytes());
            strtab.push(0);
        }
        if let Some(soname) = &self.soname {
            dyns.push((14, strtab.len() as u64));
            strtab.extend_from_slice(soname.as_bytes());
            strtab.push(0);
        }
        let has_dynamic = !dyns.is_empty();

        let phnum = 1 + has_dynamic as u64 + self.interpreter.is_some() as u64;
        let phoff = ehsize;
        let strtab_off = phoff + phnum * phentsize;
        let dyn_off = strtab_off + if has_dynamic { strtab.len() as u64 } else { 0 };
        if has_dynamic {
            dyns.push((5, self.load_base + strtab_off));
            dyns.push((10, strtab.len() as u64));
            dyns.push((0, 0));
        }
        let dyn_len = dyns.len() as u64 * dynsize;
        let interp_off = dyn_off + dyn_len;
        let interp = self.interpreter.as_ref().map(|s| {
            let mut bytes = s.as_bytes().to_vec();
            bytes.push(0);
            bytes
        });
        let total = interp_off + interp.as_ref().map_or(0, |b| b.len() as u64);

        let mut out = Vec::new();

        // e_ident
        out.extend_from_slice(b"\x7FELF");
        out.push(if wide { 2 } else { 1 });
        out.push(if e == Endian::Little { 1 } else { 2 });
        out.push(1);
        out.extend_from_slice(&[0u8; 9]);

        let machine = match self.arch {
            Arch::X86_64 => 0x3E,
            Arch::Aarch64 => 0xB7,
        };
        put16(&mut out, e, 2); // e_type = ET_EXEC
        put16(&mut out, e, machine);
        put32(&mut out, e, 1);
        put_word(&mut out, e, wide, self.load_base); // e_entry
        put_word(&mut out, e, wide, phoff);
        put_word(&mut out, e, wide, 0); // e_shoff
        put32(&mut out, e, 0);
        put16(&mut out, e, ehsize as u16);
        put16(&mut out, e, phentsize as u16);
        put16(&mut out, e, phnum as u16);
        put16(&mut out, e, 0);
        put16(&mut out, e, 0);
        put16(&mut out, e, 0);
        assert_eq!(out.len() as u64, ehsize);

        let mut phdr = |p_type: u32, offset: u64, vaddr: u64, size: u64| {
            if wide {
                put32(&mut out, e, p_type);
                put32(&mut out, e, 5);
                put64(&mut out, e, offset);
                put64(&mut out, e, vaddr);
                put64(&mut out, e, vaddr);
                put64(&mut out, e, size);
                put64(&mut out, e, size);
                put64(&mut out, e, 8);
            } else {
                put32(&mut out, e, p_type);
                put32(&mut out, e, offset as u32);
                put32(&mut out, e, vaddr as u32);
                put32(&mut out, e, vaddr as u32);
                put32(&mut out, e, size as u32);
                put32(&mut out, e, size as u32);
                put32(&mut out, e, 5);
                put32(&mut out, e, 4);
            }
        };
        phdr(1, 0, self.load_base, total);
        if let Some(bytes) = &interp {
            phdr(3, interp_off, self.load_base + interp_off, bytes.len() as u64);
        }
        if has_dynamic {
            phdr(2, dyn_off, self.load_base + dyn_off, dyn_len);
        }

        if has_dynamic {
            out.extend_from_slice(&strtab);
            for (tag, value) in &dyns {
                put_word(&mut out, e, wide, *tag);
                put_word(&mut out, e, wide, *value);
            }
        }
        if let Some(bytes) = &interp {
            out.extend_from_slice(bytes);
        }
        assert_eq!(out.len() as u64, total);
        out
    }
}

// =============================================================================
// Mach-O
// =============================================================================

enum Command {
    Segment { name: String, sections: Vec<String> },
    Dylib { cmd: u32, name: String },
    Raw { cmd: u32, payload: Vec<u8> },
}

/// Builds a minimal thin Mach-O image, or a universal binary from several.
pub struct MachOBuilder {
    arch: Arch,
    filetype: u32,
    flags: MachOFlags,
    endian: Endian,
    wide: bool,
    commands: Vec<Command>,
}

impl MachOBuilder {
    pub fn new(arch: Arch) -> Self {
        Self {
            arch,
            filetype: MH_EXECUTE,
            flags: MachOFlags::empty(),
            endian: Endian::Little,
            wide: true,
            commands: Vec::new(),
        }
    }

    pub fn filetype(mut self, filetype: u32) -> Self {
        self.filetype = filetype;
        self
    }

    pub fn flags(mut self, flags: MachOFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    pub fn wide(mut self, wide: bool) -> Self {
        self.wide = wide;
        self
    }

    pub fn segment(mut self, name: &str, sections: &[&str]) -> Self {
        self.commands.push(Command::Segment {
            name: name.to_string(),
            sections: sections.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn load_dylib(mut self, name: &str) -> Self {
        self.commands.push(Command::Dylib {
            cmd: LC_LOAD_DYLIB,
            name: name.to_string(),
        });
        self
    }

    pub fn id_dylib(mut self, name: &str) -> Self {
        self.commands.push(Command::Dylib {
            cmd: LC_ID_DYLIB,
            name: name.to_string(),
        });
        self
    }

    pub fn raw_command(mut self, cmd: u32, payload: &[u8]) -> Self {
        self.commands.push(Command::Raw {
            cmd,
            payload: payload.to_vec(),
        });
        self
    }

    pub fn build(self) -> Vec<u8> {
        let e = self.endian;
        let wide = self.wide;

        let mut cmds = Vec::new();
        for command in &self.commands {
            let start = cmds.len();
            match command {
                Command::Segment { name, sections } => {
                    let (cmd, base, sect) = if wide {
                        (LC_SEGMENT_64, SegmentCommand64::SIZE, Section64::SIZE)
                    } else {
                        (LC_SEGMENT, SegmentCommand32::SIZE, Section32::SIZE)
                    };
                    put32(&mut cmds, e, cmd);
                    put32(&mut cmds, e, (base + sect * sections.len()) as u32);
                    put_name16(&mut cmds, name);
                    put_word(&mut cmds, e, wide, 0x1000); // vmaddr
                    put_word(&mut cmds, e, wide, 0x1000); // vmsize
                    put_word(&mut cmds, e, wide, 0); // fileoff
                    put_word(&mut cmds, e, wide, 0x1000); // filesize
                    put32(&mut cmds, e, 5);
                    put32(&mut cmds, e, 5);
                    put32(&mut cmds, e, sections.len() as u32);
                    put32(&mut cmds, e, 0);
                    for (i, section) in sections.iter().enumerate() {
                        put_name16(&mut cmds, section);
                        put_name16(&mut cmds, name);
                        put_word(&mut cmds, e, wide, 0x1000 + 0x100 * i as u64);
                        put_word(&mut cmds, e, wide, 0x100);
                        put32(&mut cmds, e, 0x100 * i as u32);
                        cmds.extend_from_slice(&[0u8; 24]);
                        if wide {
                            cmds.extend_from_slice(&[0u8; 4]);
                        }
                    }
                }
                Command::Dylib { cmd, name } => {
                    let align = if wide { 8 } else { 4 };
                    let raw = DylibCommand::SIZE + name.len() + 1;
                    let size = raw.div_ceil(align) * align;
                    put32(&mut cmds, e, *cmd);
                    put32(&mut cmds, e, size as u32);
                    put32(&mut cmds, e, DylibCommand::SIZE as u32);
                    put32(&mut cmds, e, 2);
                    put32(&mut cmds, e, 0x1_0000);
                    put32(&mut cmds, e, 0x1_0000);
                    cmds.extend_from_slice(name.as_bytes());
                    cmds.resize(start + size, 0);
                }
                Command::Raw { cmd, payload } => {
                    put32(&mut cmds, e, *cmd);
                    put32(&mut cmds, e, (LoadCommand::SIZE + payload.len()) as u32);
                    cmds.extend_from_slice(payload);
                }
            }
        }

        let cputype = match self.arch {
            Arch::X86_64 => CPU_TYPE_X86_64,
            Arch::Aarch64 => CPU_TYPE_ARM64,
        };
        let cpusubtype = match self.arch {
            Arch::X86_64 => CPU_SUBTYPE_X86_64_ALL,
            Arch::Aarch64 => CPU_SUBTYPE_ARM64_ALL,
        };

        let mut out = Vec::new();
        put32(&mut out, e, if wide { MH_MAGIC_64 } else { MH_MAGIC });
        put32(&mut out, e, cputype);
        put32(&mut out, e, cpusubtype);
        put32(&mut out, e, self.filetype);
        put32(&mut out, e, self.commands.len() as u32);
        put32(&mut out, e, cmds.len() as u32);
        put32(&mut out, e, self.flags.bits());
        if wide {
            put32(&mut out, e, 0);
        }
        out.extend_from_slice(&cmds);
        out
    }

    /// Packs thin images into a universal binary with 16-byte slice alignment.
    pub fn fat<S: AsRef<[u8]>>(slices: &[S], wide: bool) -> Vec<u8> {
        let be = Endian::Big;
        let record = if wide { FatArch64::SIZE } else { FatArch32::SIZE };
        let mut offset = (FatHeader::SIZE + record * slices.len()).div_ceil(16) * 16;

        let mut out = Vec::new();
        put32(&mut out, be, if wide { FAT_MAGIC_64 } else { FAT_MAGIC });
        put32(&mut out, be, slices.len() as u32);

        let mut placements = Vec::new();
        for slice in slices {
            let slice = slice.as_ref();
            let magic = u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]);
            let e = if magic == MH_CIGAM || magic == MH_CIGAM_64 {
                Endian::Little
            } else {
                Endian::Big
            };
            let cputype = e.u32([slice[4], slice[5], slice[6], slice[7]]);
            let cpusubtype = e.u32([slice[8], slice[9], slice[10], slice[11]]);

            put32(&mut out, be, cputype);
            put32(&mut out, be, cpusubtype);
            put_word(&mut out, be, wide, offset as u64);
            put_word(&mut out, be, wide, slice.len() as u64);
            put32(&mut out, be, 4);
            if wide {
                put32(&mut out, be, 0);
            }

            placements.push(offset);
            offset = (offset + slice.len()).div_ceil(16) * 16;
        }

        for (slice, at) in slices.iter().zip(placements) {
            out.resize(at, 0);
            out.extend_from_slice(slice.as_ref());
        }
        out
    }
}

// =============================================================================
// Build Executor
// =============================================================================

/// A build executor that fabricates toolchains in a [`MemoryStore`].
///
/// Every product is a small file whose contents name what was built, so tests
/// can assert on artifact ids without a real build system.
pub struct FakeExecutor {
    store: std::sync::Arc<MemoryStore>,
    shebangs: BTreeMap<String, ArtifactPath>,
    pub built: Mutex<Vec<String>>,
}

impl FakeExecutor {
    pub fn new(store: std::sync::Arc<MemoryStore>) -> Self {
        Self {
            store,
            shebangs: BTreeMap::new(),
            built: Mutex::new(Vec::new()),
        }
    }

    /// Registers an artifact for a shebang interpreter name.
    pub fn with_shebang(mut self, name: &str, path: ArtifactPath) -> Self {
        self.shebangs.insert(name.to_string(), path);
        self
    }

    fn product(&self, what: String, executable: bool) -> ArtifactId {
        let id = self.store.put_file(what.clone().into_bytes(), executable);
        self.built.lock().unwrap().push(what);
        id
    }

    /// The artifact a given product would have.
    pub fn expected(&self, what: &str, executable: bool) -> ArtifactId {
        self.store.put_file(what.as_bytes().to_vec(), executable)
    }
}

impl BuildExecutor for FakeExecutor {
    fn toolchain(&self, target: &Triple, libc: Libc) -> Result<Toolchain> {
        let lib = self.product(format!("lib:{}", target), false);
        let loader = self.product(format!("loader:{}:{}", libc, target), true);
        let dir = self.store.put_directory([("ld.so", loader), ("libc.so", lib)]);
        let mut env = BTreeMap::new();
        env.insert(
            "TOOLCHAIN".to_string(),
            vec![Mutation::set("1")],
        );
        Ok(Toolchain {
            loader: ArtifactPath::with_subpath(dir.clone(), "ld.so"),
            library_paths: vec![ArtifactPath::new(dir)],
            env: env.into(),
        })
    }

    fn injection(&self, target: &Triple) -> Result<ArtifactPath> {
        Ok(self.product(format!("injection:{}", target), false).into())
    }

    fn default_shell(&self, host: &Triple) -> Result<ArtifactPath> {
        Ok(self.product(format!("sh:{}", host), true).into())
    }

    fn shebang_interpreter(&self, name: &str, _host: &Triple) -> Result<Option<ArtifactPath>> {
        Ok(self.shebangs.get(name).cloned())
    }

    /// A static binary for the host, so wrappers themselves can be wrapped.
    fn launcher(&self, host: &Triple) -> Result<ArtifactId> {
        let image = if host.is_darwin() {
            MachOBuilder::new(host.arch).build()
        } else if host.os == "linux" {
            ElfBuilder::new(host.arch).build()
        } else {
            return Err(Error::build(
                format!("launcher:{}", host),
                format!("no launcher for {}", host.os),
            ));
        };
        let id = self.store.put_file(image, true);
        self.built.lock().unwrap().push(format!("launcher:{}", host));
        Ok(id)
    }
}
