//! The two address kinds embedded in SCE module metadata.
//!
//! Module-info fields such as `import_top` are offsets from segment 0's
//! *mapped* base, while pointers inside import descriptors are addresses in
//! the file's virtual address space. The two are separate types with no
//! conversion between them; only [`Segment0`] can turn either into a host
//! address.

use core::fmt;

use crate::mapper::MappedImage;

/// Offset from the mapped base of segment 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MappedOffset(pub u32);

/// Address in the file's virtual address space, resolved against segment 0's
/// `p_vaddr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileVaddr(pub u32);

impl fmt::Display for MappedOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg0+{:#x}", self.0)
    }
}

impl fmt::Display for FileVaddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vaddr {:#x}", self.0)
    }
}

/// Both origins of segment 0: where it was mapped and where the file says it lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment0 {
    mapped_base: usize,
    file_vaddr: u32,
}

impl Segment0 {
    /// Build the origins directly.
    #[must_use]
    pub fn new(mapped_base: usize, file_vaddr: u32) -> Self {
        Self {
            mapped_base,
            file_vaddr,
        }
    }

    /// Take the origins from segment 0 of `image`, if it is mapped.
    #[must_use]
    pub fn of(image: &MappedImage) -> Option<Self> {
        image
            .segment(0)
            .map(|seg| Self::new(seg.base, seg.vaddr))
    }

    /// Host address of segment 0's first byte.
    #[must_use]
    pub fn mapped_base(&self) -> usize {
        self.mapped_base
    }

    /// Segment 0's `p_vaddr`.
    #[must_use]
    pub fn file_vaddr(&self) -> u32 {
        self.file_vaddr
    }

    /// Host address of a mapped-base-relative offset.
    #[must_use]
    pub fn resolve(&self, offset: MappedOffset) -> Option<usize> {
        self.mapped_base.checked_add(offset.0 as usize)
    }

    /// Host address of a file virtual address. `None` below segment 0.
    #[must_use]
    pub fn resolve_vaddr(&self, vaddr: FileVaddr) -> Option<usize> {
        let delta = vaddr.0.checked_sub(self.file_vaddr)?;
        self.mapped_base.checked_add(delta as usize)
    }
}
