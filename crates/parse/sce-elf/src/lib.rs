//! Loader for ELF32 SCE ("SELF") shared-library modules.
//!
//! Reads the ELF32 header and program headers, maps every `PT_LOAD` segment
//! into one contiguous reservation of this process's address space, and walks
//! the module-info record to list the modules the library imports. Nothing is
//! relocated, resolved or executed.
//!
//! # Usage
//!
//! ```no_run
//! use sce_elf::{LoadOptions, SelfLibrary};
//!
//! let lib = SelfLibrary::load("libfoo.suprx", &LoadOptions::default()).expect("valid module");
//! println!("{}", lib.module_info().name);
//! for name in lib.import_names() {
//!     println!("  imports {name}");
//! }
//! ```

#![deny(unsafe_op_in_unsafe_fn)]

pub mod addr;
pub mod error;
pub mod header;
pub mod loader;
pub mod mapper;
pub mod module_info;
pub mod page;

pub use addr::{FileVaddr, MappedOffset, Segment0};
pub use error::LoadError;
pub use header::{
    ELF32_EHDR_SIZE, ELF32_PHDR_SIZE, Elf32Header, Elf32ProgramHeader, Headers, PF_R, PF_W, PF_X,
    PT_LOAD,
};
pub use loader::{LoadOptions, SelfLibrary};
pub use mapper::{MappedImage, MappedSegment};
pub use module_info::{
    IMPORT_DESCRIPTOR_SIZE, ImportDescriptor, Imports, MODULE_INFO_SIZE, ModuleInfo,
};
pub use page::page_size;
