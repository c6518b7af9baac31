//! Text and JSON rendering of a loaded module.

use std::io::{self, Write};

use sce_elf::SelfLibrary;
use serde::Serialize;

/// What `selfload` reports about a module.
#[derive(Debug, Serialize)]
pub struct Report {
    /// Module name from the module-info record.
    pub module: String,
    /// Module NID.
    pub module_nid: u32,
    /// Module version.
    pub version: u16,
    /// Mapped `PT_LOAD` segments.
    pub segments: Vec<SegmentReport>,
    /// Imported modules in table order.
    pub imports: Vec<ImportReport>,
}

/// One mapped segment.
#[derive(Debug, Serialize)]
pub struct SegmentReport {
    /// Program-header index.
    pub index: usize,
    /// Virtual address recorded in the file.
    pub vaddr: u32,
    /// Host address the segment was mapped at.
    pub base: usize,
    /// Size in memory.
    pub memsz: u32,
    /// `PF_*` flags.
    pub flags: u32,
}

/// One import descriptor.
#[derive(Debug, Serialize)]
pub struct ImportReport {
    /// Position in the import table.
    pub index: usize,
    /// Imported module name.
    pub name: String,
    /// Imported module NID.
    pub nid: u32,
    /// Number of imported functions.
    pub functions: u16,
    /// Number of imported variables.
    pub variables: u16,
}

impl Report {
    /// Collect the reportable parts of `lib`.
    pub fn new(lib: &SelfLibrary) -> Self {
        let info = lib.module_info();
        Self {
            module: info.name.clone(),
            module_nid: info.module_nid,
            version: info.version,
            segments: lib
                .image()
                .segments()
                .map(|(index, seg)| SegmentReport {
                    index,
                    vaddr: seg.vaddr,
                    base: seg.base,
                    memsz: seg.memsz,
                    flags: seg.flags,
                })
                .collect(),
            imports: lib
                .imports()
                .iter()
                .map(|import| ImportReport {
                    index: import.index,
                    name: import.module_name.clone(),
                    nid: import.module_nid,
                    functions: import.num_functions,
                    variables: import.num_variables,
                })
                .collect(),
        }
    }

    /// Write `module: <name>` and one `import[<k>]: <name>` line per import.
    pub fn write_text(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "module: {}", self.module)?;
        for import in &self.imports {
            writeln!(out, "import[{}]: {}", import.index, import.name)?;
        }
        Ok(())
    }

    /// Write the report as pretty-printed JSON.
    pub fn write_json(&self, out: &mut impl Write) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut *out, self)?;
        writeln!(out)
    }
}
