//! Builders for synthetic SELF images used by the integration tests.

#![allow(dead_code)]

use std::io::Write;

use tempfile::NamedTempFile;

/// File offset at which segment data starts. Segment `i` lives at
/// `DATA_BASE + (vaddr - lowest vaddr)`, which keeps file offsets and
/// virtual addresses congruent for any page size up to 64 KiB.
pub const DATA_BASE: u32 = 0x1_0000;

/// Virtual address of segment 0 in images built by [`module`].
pub const SEG0_VADDR: u32 = 0x8100_0000;

/// Offset of the module-info record inside segment 0.
pub const MODULE_INFO_OFFSET: u32 = 0x40;

/// Offset of the import descriptor table inside segment 0.
pub const IMPORT_TOP: u32 = 0x100;

/// Offset of the first import name inside segment 0.
pub const NAMES_OFFSET: u32 = 0x800;

const PT_LOAD: u32 = 1;
const PT_NOTE: u32 = 4;
const EHDR_SIZE: usize = 52;
const PHDR_SIZE: usize = 32;
const DESCRIPTOR_SIZE: u32 = 0x34;

/// One program header plus its file contents.
#[derive(Debug, Clone)]
pub struct Segment {
    pub p_type: u32,
    pub vaddr: u32,
    pub data: Vec<u8>,
    pub memsz: u32,
    pub flags: u32,
}

impl Segment {
    pub fn load(vaddr: u32, data: Vec<u8>, memsz: u32) -> Self {
        Self {
            p_type: PT_LOAD,
            vaddr,
            data,
            memsz,
            flags: 0x4 | 0x2,
        }
    }

    pub fn note() -> Self {
        Self {
            p_type: PT_NOTE,
            vaddr: 0,
            data: Vec::new(),
            memsz: 0,
            flags: 0x4,
        }
    }
}

/// A whole image: `e_entry` plus program headers in file order.
#[derive(Debug, Clone)]
pub struct SelfImage {
    pub entry: u32,
    pub segments: Vec<Segment>,
}

impl SelfImage {
    /// Serialize to ELF32 bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let min_vaddr = self
            .segments
            .iter()
            .filter(|s| s.p_type == PT_LOAD)
            .map(|s| s.vaddr)
            .min()
            .unwrap_or(0);

        let mut buf = vec![0u8; EHDR_SIZE];
        buf[0..4].copy_from_slice(b"\x7fELF");
        buf[4] = 1; // ELFCLASS32
        buf[5] = 1; // ELFDATA2LSB
        buf[6] = 1;
        buf[16..18].copy_from_slice(&0xFE04u16.to_le_bytes());
        buf[18..20].copy_from_slice(&40u16.to_le_bytes());
        buf[20..24].copy_from_slice(&1u32.to_le_bytes());
        buf[24..28].copy_from_slice(&self.entry.to_le_bytes());
        buf[28..32].copy_from_slice(&(EHDR_SIZE as u32).to_le_bytes());
        buf[40..42].copy_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
        buf[42..44].copy_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
        buf[44..46].copy_from_slice(&(self.segments.len() as u16).to_le_bytes());

        let mut placed = Vec::new();
        for seg in &self.segments {
            let offset = if seg.p_type == PT_LOAD {
                DATA_BASE + (seg.vaddr - min_vaddr)
            } else {
                0
            };
            let mut phdr = [0u8; PHDR_SIZE];
            phdr[0..4].copy_from_slice(&seg.p_type.to_le_bytes());
            phdr[4..8].copy_from_slice(&offset.to_le_bytes());
            phdr[8..12].copy_from_slice(&seg.vaddr.to_le_bytes());
            phdr[12..16].copy_from_slice(&seg.vaddr.to_le_bytes());
            phdr[16..20].copy_from_slice(&(seg.data.len() as u32).to_le_bytes());
            phdr[20..24].copy_from_slice(&seg.memsz.to_le_bytes());
            phdr[24..28].copy_from_slice(&seg.flags.to_le_bytes());
            phdr[28..32].copy_from_slice(&0x10u32.to_le_bytes());
            buf.extend_from_slice(&phdr);
            placed.push((offset as usize, &seg.data));
        }

        for (offset, data) in placed {
            if data.is_empty() {
                continue;
            }
            if buf.len() < offset + data.len() {
                buf.resize(offset + data.len(), 0);
            }
            buf[offset..offset + data.len()].copy_from_slice(data);
        }
        buf
    }

    /// Write the image to a temporary file.
    pub fn write_temp(&self) -> NamedTempFile {
        write_temp(&self.to_bytes())
    }
}

/// Write raw bytes to a temporary file.
pub fn write_temp(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(bytes).expect("write temp file");
    file.flush().expect("flush temp file");
    file
}

/// Overwrite a `u32` field of program header `index` in serialized bytes.
pub fn patch_phdr(bytes: &mut [u8], index: usize, field: usize, value: u32) {
    let at = EHDR_SIZE + index * PHDR_SIZE + field;
    bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// Field offsets inside an ELF32 program header.
pub mod phdr {
    pub const OFFSET: usize = 4;
    pub const VADDR: usize = 8;
    pub const FILESZ: usize = 16;
    pub const MEMSZ: usize = 20;
}

/// Build segment 0 contents for a module named `name` importing `imports`.
///
/// Module-info `import_*` offsets are relative to the segment start; each
/// descriptor's name pointer is `SEG0_VADDR + offset`.
pub fn module_segment(name: &str, imports: &[&str]) -> Vec<u8> {
    let mut seg = vec![0u8; 0x1000];

    let info = MODULE_INFO_OFFSET as usize;
    seg[info..info + 2].copy_from_slice(&0u16.to_le_bytes());
    seg[info + 2..info + 4].copy_from_slice(&0x0101u16.to_le_bytes());
    seg[info + 4..info + 4 + name.len()].copy_from_slice(name.as_bytes());
    seg[info + 31] = 6;
    let import_end = IMPORT_TOP + DESCRIPTOR_SIZE * imports.len() as u32;
    seg[info + 44..info + 48].copy_from_slice(&IMPORT_TOP.to_le_bytes());
    seg[info + 48..info + 52].copy_from_slice(&import_end.to_le_bytes());
    seg[info + 52..info + 56].copy_from_slice(&0x1234_5678u32.to_le_bytes());

    let mut name_off = NAMES_OFFSET as usize;
    for (k, import) in imports.iter().enumerate() {
        let d = (IMPORT_TOP + DESCRIPTOR_SIZE * k as u32) as usize;
        seg[d..d + 2].copy_from_slice(&(DESCRIPTOR_SIZE as u16).to_le_bytes());
        seg[d + 2..d + 4].copy_from_slice(&1u16.to_le_bytes());
        seg[d + 6..d + 8].copy_from_slice(&(k as u16 + 1).to_le_bytes());
        seg[d + 16..d + 20].copy_from_slice(&(0xA000_0000u32 + k as u32).to_le_bytes());
        let name_vaddr = SEG0_VADDR + name_off as u32;
        seg[d + 20..d + 24].copy_from_slice(&name_vaddr.to_le_bytes());

        seg[name_off..name_off + import.len()].copy_from_slice(import.as_bytes());
        name_off += import.len() + 1;
    }
    seg
}

/// Overwrite the name pointer of descriptor `k` in a segment built by [`module_segment`].
pub fn patch_import_name(seg: &mut [u8], k: usize, vaddr: u32) {
    let d = IMPORT_TOP as usize + DESCRIPTOR_SIZE as usize * k + 20;
    seg[d..d + 4].copy_from_slice(&vaddr.to_le_bytes());
}

/// A two-segment module: segment 0 holds the metadata, segment 1 is data+bss.
pub fn module(name: &str, imports: &[&str]) -> SelfImage {
    module_with_segment0(module_segment(name, imports))
}

/// Like [`module`] but with caller-supplied segment 0 contents.
pub fn module_with_segment0(seg0: Vec<u8>) -> SelfImage {
    let memsz = seg0.len() as u32;
    SelfImage {
        entry: MODULE_INFO_OFFSET,
        segments: vec![
            Segment::load(SEG0_VADDR, seg0, memsz),
            Segment::load(SEG0_VADDR + 0x1_0000, vec![0x5A; 0x80], 0x3000),
        ],
    }
}
