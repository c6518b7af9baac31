//! ELF32 header parsing.
//!
//! Reads the ELF32 file header and the program-header table from any
//! `Read + Seek` source, decoding fields with `from_le_bytes()`.

use std::io::{self, Read, Seek, SeekFrom};

use crate::error::LoadError;
use crate::loader::LoadOptions;

/// ELF magic bytes: `\x7fELF`.
const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// ELF class: 32-bit.
const ELFCLASS32: u8 = 1;

/// ELF data encoding: little-endian.
const ELFDATA2LSB: u8 = 1;

/// Program header type: loadable segment.
pub const PT_LOAD: u32 = 1;

/// Segment flag: executable.
pub const PF_X: u32 = 0x1;

/// Segment flag: writable.
pub const PF_W: u32 = 0x2;

/// Segment flag: readable.
pub const PF_R: u32 = 0x4;

/// Size of an ELF32 file header (52 bytes).
pub const ELF32_EHDR_SIZE: usize = 52;

/// Size of an ELF32 program header entry (32 bytes).
pub const ELF32_PHDR_SIZE: usize = 32;

/// Read a little-endian `u16` from `data` at byte offset `off`.
///
/// # Panics
///
/// Panics if `off + 2 > data.len()`. Callers must bounds-check first.
pub(crate) fn le_u16(data: &[u8], off: usize) -> u16 {
    u16::from_le_bytes(*data[off..].first_chunk().unwrap())
}

/// Read a little-endian `u32` from `data` at byte offset `off`.
pub(crate) fn le_u32(data: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(*data[off..].first_chunk().unwrap())
}

/// Parsed ELF32 file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elf32Header {
    /// `EI_CLASS` identification byte.
    pub class: u8,
    /// `EI_DATA` identification byte.
    pub data_encoding: u8,
    /// ELF type. SCE modules use the `0xFE00` range.
    pub e_type: u16,
    /// Target machine architecture.
    pub e_machine: u16,
    /// Byte offset of the module-info record inside segment 0.
    ///
    /// SELF modules do not store a code entry point here.
    pub e_entry: u32,
    /// Offset of the program header table in the file.
    pub e_phoff: u32,
    /// Offset of the section header table in the file.
    pub e_shoff: u32,
    /// Processor-specific flags.
    pub e_flags: u32,
    /// Size of each program header entry.
    pub e_phentsize: u16,
    /// Number of program header entries.
    pub e_phnum: u16,
    /// Size of each section header entry.
    pub e_shentsize: u16,
    /// Number of section header entries.
    pub e_shnum: u16,
    /// Section header string table index.
    pub e_shstrndx: u16,
}

impl Elf32Header {
    /// Parse an ELF32 file header from its raw 52 bytes.
    ///
    /// When `verify_ident` is set, the magic, class and data encoding are
    /// checked. `e_phentsize` is taken as-is: every entry is read as a full
    /// 32-byte record at its computed offset.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if validation fails.
    pub fn parse(data: &[u8; ELF32_EHDR_SIZE], verify_ident: bool) -> Result<Self, LoadError> {
        if verify_ident {
            if data[..4] != ELF_MAGIC {
                return Err(LoadError::BadMagic);
            }
            if data[4] != ELFCLASS32 {
                return Err(LoadError::UnsupportedClass);
            }
            if data[5] != ELFDATA2LSB {
                return Err(LoadError::UnsupportedEncoding);
            }
        }

        Ok(Self {
            class: data[4],
            data_encoding: data[5],
            e_type: le_u16(data, 16),
            e_machine: le_u16(data, 18),
            e_entry: le_u32(data, 24),
            e_phoff: le_u32(data, 28),
            e_shoff: le_u32(data, 32),
            e_flags: le_u32(data, 36),
            e_phentsize: le_u16(data, 42),
            e_phnum: le_u16(data, 44),
            e_shentsize: le_u16(data, 46),
            e_shnum: le_u16(data, 48),
            e_shstrndx: le_u16(data, 50),
        })
    }

    /// File offset of program header `index`.
    #[must_use]
    pub fn phdr_offset(&self, index: u16) -> u64 {
        u64::from(self.e_phoff) + u64::from(index) * u64::from(self.e_phentsize)
    }
}

/// Parsed ELF32 program header entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elf32ProgramHeader {
    /// Segment type.
    pub p_type: u32,
    /// Offset of the segment data in the file.
    pub p_offset: u32,
    /// Virtual address of the segment.
    pub p_vaddr: u32,
    /// Physical address (unused by the loader).
    pub p_paddr: u32,
    /// Size of the segment data in the file.
    pub p_filesz: u32,
    /// Size of the segment in memory.
    pub p_memsz: u32,
    /// Segment flags (`PF_R`, `PF_W`, `PF_X`).
    pub p_flags: u32,
    /// Requested alignment.
    pub p_align: u32,
}

impl Elf32ProgramHeader {
    /// Parse a program header from its raw 32 bytes.
    #[must_use]
    pub fn parse(b: &[u8; ELF32_PHDR_SIZE]) -> Self {
        Self {
            p_type: le_u32(b, 0),
            p_offset: le_u32(b, 4),
            p_vaddr: le_u32(b, 8),
            p_paddr: le_u32(b, 12),
            p_filesz: le_u32(b, 16),
            p_memsz: le_u32(b, 20),
            p_flags: le_u32(b, 24),
            p_align: le_u32(b, 28),
        }
    }

    /// Returns `true` for `PT_LOAD` segments.
    #[must_use]
    pub fn is_load(&self) -> bool {
        self.p_type == PT_LOAD
    }
}

/// The file header together with its program-header table, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Headers {
    /// The ELF32 file header.
    pub header: Elf32Header,
    /// Program headers, indexed as stored in the file.
    pub program_headers: Vec<Elf32ProgramHeader>,
}

impl Headers {
    /// Read the file header and every program header from `source`.
    ///
    /// Program headers are read one by one at `e_phoff + i * e_phentsize`,
    /// so the table does not need to be contiguous with anything else.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::TruncatedHeader`] or
    /// [`LoadError::TruncatedProgramHeader`] on short reads, header
    /// validation errors, and [`LoadError::Io`] for other I/O failures.
    pub fn read<R: Read + Seek>(source: &mut R, options: &LoadOptions) -> Result<Self, LoadError> {
        let mut raw = [0u8; ELF32_EHDR_SIZE];
        source.seek(SeekFrom::Start(0))?;
        read_record(source, &mut raw, LoadError::TruncatedHeader)?;
        let header = Elf32Header::parse(&raw, options.verify_ident)?;

        let mut program_headers = Vec::with_capacity(usize::from(header.e_phnum));
        for i in 0..header.e_phnum {
            let mut raw = [0u8; ELF32_PHDR_SIZE];
            source.seek(SeekFrom::Start(header.phdr_offset(i)))?;
            read_record(
                source,
                &mut raw,
                LoadError::TruncatedProgramHeader(usize::from(i)),
            )?;
            program_headers.push(Elf32ProgramHeader::parse(&raw));
        }

        log::debug!(
            "read ELF header: type={:#x} machine={} entry={:#x} phnum={}",
            header.e_type,
            header.e_machine,
            header.e_entry,
            header.e_phnum
        );

        Ok(Self {
            header,
            program_headers,
        })
    }

    /// Iterate over `(index, header)` for `PT_LOAD` entries only.
    pub fn load_segments(&self) -> impl Iterator<Item = (usize, &Elf32ProgramHeader)> {
        self.program_headers
            .iter()
            .enumerate()
            .filter(|(_, phdr)| phdr.is_load())
    }
}

/// Fill `buf`, reporting a short read as `truncated`.
fn read_record<R: Read>(source: &mut R, buf: &mut [u8], truncated: LoadError) -> Result<(), LoadError> {
    match source.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(truncated),
        Err(e) => Err(LoadError::Io(e)),
    }
}
