//! SCE module-info and import descriptor walking.
//!
//! The module-info record sits in segment 0 at the offset stored in
//! `e_entry`. Its `import_top..import_end` range (mapped-base relative)
//! holds fixed-size import descriptors whose name pointers are file
//! virtual addresses.

use std::iter::FusedIterator;

use crate::addr::{FileVaddr, MappedOffset, Segment0};
use crate::error::LoadError;
use crate::header::{le_u16, le_u32};
use crate::mapper::MappedImage;

/// Size of `sce_module_info_raw` (0x5C bytes).
pub const MODULE_INFO_SIZE: usize = 0x5C;

/// Size of `sce_module_imports_raw` and the stride of the import table (0x34 bytes).
pub const IMPORT_DESCRIPTOR_SIZE: usize = 0x34;

/// Length of the inline, NUL-padded module name.
const MODULE_NAME_LEN: usize = 27;

/// Parsed module-info record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    /// Module attributes.
    pub attributes: u16,
    /// Module version (major in the high byte).
    pub version: u16,
    /// Module name, up to the first NUL of the inline field.
    pub name: String,
    /// Module type.
    pub module_type: u8,
    /// Global pointer value.
    pub gp_value: u32,
    /// Start of the export table.
    pub export_top: MappedOffset,
    /// End of the export table.
    pub export_end: MappedOffset,
    /// Start of the import descriptor table.
    pub import_top: MappedOffset,
    /// End of the import descriptor table.
    pub import_end: MappedOffset,
    /// Module NID.
    pub module_nid: u32,
    /// TLS template start.
    pub tls_start: u32,
    /// TLS template size in the file.
    pub tls_filesz: u32,
    /// TLS size in memory.
    pub tls_memsz: u32,
    /// `module_start` entry offset.
    pub module_start: u32,
    /// `module_stop` entry offset.
    pub module_stop: u32,
    /// Start of the ARM exception index table.
    pub exidx_top: u32,
    /// End of the ARM exception index table.
    pub exidx_end: u32,
    /// Start of the ARM exception table.
    pub extab_top: u32,
    /// End of the ARM exception table.
    pub extab_end: u32,
    origin: Segment0,
}

impl ModuleInfo {
    /// Read the module-info record at `entry` bytes into segment 0.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::ModuleInfoOutOfRange`] if segment 0 is not mapped
    /// or the record does not fit inside it.
    pub fn read(image: &MappedImage, entry: u32) -> Result<Self, LoadError> {
        let origin = Segment0::of(image).ok_or(LoadError::ModuleInfoOutOfRange)?;
        let seg0 = image
            .segment_bytes(0)
            .ok_or(LoadError::ModuleInfoOutOfRange)?;
        let start = entry as usize;
        let raw = start
            .checked_add(MODULE_INFO_SIZE)
            .and_then(|end| seg0.get(start..end))
            .and_then(|b| b.first_chunk::<MODULE_INFO_SIZE>())
            .ok_or(LoadError::ModuleInfoOutOfRange)?;

        let info = Self::parse(raw, origin);
        log::debug!(
            "module info at {:#x}: imports {}..{}",
            origin.mapped_base() + start,
            info.import_top,
            info.import_end
        );
        Ok(info)
    }

    /// Decode a raw record whose offsets are relative to `origin`.
    #[must_use]
    pub fn parse(b: &[u8; MODULE_INFO_SIZE], origin: Segment0) -> Self {
        let name = &b[4..4 + MODULE_NAME_LEN];
        let name = name.split(|&c| c == 0).next().unwrap_or_default();

        Self {
            attributes: le_u16(b, 0),
            version: le_u16(b, 2),
            name: String::from_utf8_lossy(name).into_owned(),
            module_type: b[31],
            gp_value: le_u32(b, 32),
            export_top: MappedOffset(le_u32(b, 36)),
            export_end: MappedOffset(le_u32(b, 40)),
            import_top: MappedOffset(le_u32(b, 44)),
            import_end: MappedOffset(le_u32(b, 48)),
            module_nid: le_u32(b, 52),
            tls_start: le_u32(b, 56),
            tls_filesz: le_u32(b, 60),
            tls_memsz: le_u32(b, 64),
            module_start: le_u32(b, 68),
            module_stop: le_u32(b, 72),
            exidx_top: le_u32(b, 76),
            exidx_end: le_u32(b, 80),
            extab_top: le_u32(b, 84),
            extab_end: le_u32(b, 88),
            origin,
        }
    }

    /// Number of descriptor records in `import_top..import_end`.
    ///
    /// A trailing partial record counts; reading it fails bounds checks
    /// unless the image actually holds a full record there.
    #[must_use]
    pub fn import_count(&self) -> usize {
        let bytes = self.import_end.0.saturating_sub(self.import_top.0) as usize;
        bytes.div_ceil(IMPORT_DESCRIPTOR_SIZE)
    }

    /// Walk the import descriptor table of `image` in storage order.
    ///
    /// Each call starts a fresh walk.
    #[must_use]
    pub fn imports<'a>(&self, image: &'a MappedImage) -> Imports<'a> {
        Imports {
            image,
            origin: self.origin,
            top: self.import_top,
            count: self.import_count(),
            index: 0,
            failed: false,
        }
    }
}

/// A parsed import descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDescriptor {
    /// Position in the import table.
    pub index: usize,
    /// Record size as stored in the descriptor.
    pub size: u16,
    /// Descriptor version.
    pub version: u16,
    /// Descriptor flags.
    pub flags: u16,
    /// Number of imported functions.
    pub num_functions: u16,
    /// Number of imported variables.
    pub num_variables: u16,
    /// Number of imported TLS variables.
    pub num_tls_variables: u16,
    /// NID of the imported library.
    pub module_nid: u32,
    /// Where the name lives in the file's address space.
    pub module_name_addr: FileVaddr,
    /// Name of the imported library.
    pub module_name: String,
    /// Function NID table.
    pub func_nid_table: FileVaddr,
    /// Function stub table.
    pub func_entry_table: FileVaddr,
    /// Variable NID table.
    pub var_nid_table: FileVaddr,
    /// Variable reference table.
    pub var_entry_table: FileVaddr,
    /// TLS variable NID table.
    pub tls_nid_table: FileVaddr,
    /// TLS variable reference table.
    pub tls_entry_table: FileVaddr,
}

/// Iterator over the import descriptors of a mapped module.
///
/// Yields records in storage order and stops after the first error.
#[derive(Debug, Clone)]
pub struct Imports<'a> {
    image: &'a MappedImage,
    origin: Segment0,
    top: MappedOffset,
    count: usize,
    index: usize,
    failed: bool,
}

impl Imports<'_> {
    fn read(&self, index: usize) -> Result<ImportDescriptor, LoadError> {
        let invalid = || LoadError::InvalidImportDescriptor(index);

        let rel = index
            .checked_mul(IMPORT_DESCRIPTOR_SIZE)
            .and_then(|off| u32::try_from(off).ok())
            .and_then(|off| self.top.0.checked_add(off))
            .ok_or_else(invalid)?;
        let addr = self.origin.resolve(MappedOffset(rel)).ok_or_else(invalid)?;
        let b = self
            .image
            .bytes(addr, IMPORT_DESCRIPTOR_SIZE)
            .ok_or_else(invalid)?;

        let module_name_addr = FileVaddr(le_u32(b, 20));
        let name_addr = self
            .origin
            .resolve_vaddr(module_name_addr)
            .ok_or_else(invalid)?;
        let module_name = self
            .image
            .c_str(name_addr)
            .ok_or_else(invalid)?
            .to_string_lossy()
            .into_owned();

        Ok(ImportDescriptor {
            index,
            size: le_u16(b, 0),
            version: le_u16(b, 2),
            flags: le_u16(b, 4),
            num_functions: le_u16(b, 6),
            num_variables: le_u16(b, 8),
            num_tls_variables: le_u16(b, 10),
            module_nid: le_u32(b, 16),
            module_name_addr,
            module_name,
            func_nid_table: FileVaddr(le_u32(b, 28)),
            func_entry_table: FileVaddr(le_u32(b, 32)),
            var_nid_table: FileVaddr(le_u32(b, 36)),
            var_entry_table: FileVaddr(le_u32(b, 40)),
            tls_nid_table: FileVaddr(le_u32(b, 44)),
            tls_entry_table: FileVaddr(le_u32(b, 48)),
        })
    }
}

impl Iterator for Imports<'_> {
    type Item = Result<ImportDescriptor, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.index >= self.count {
            return None;
        }
        let result = self.read(self.index);
        self.index += 1;
        self.failed = result.is_err();
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            (0, Some(0))
        } else {
            (0, Some(self.count - self.index))
        }
    }
}

impl FusedIterator for Imports<'_> {}
