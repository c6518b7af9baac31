//! Segment mapping.
//!
//! [`MappedImage::map`] reserves one contiguous, inaccessible address range
//! covering every `PT_LOAD` segment, then maps each segment's file pages into
//! it with `MAP_FIXED`. The reservation is released when the image (or a
//! partially built one, on error) is dropped.

use std::ffi::CStr;
use std::fs::File;
use std::io;
use std::ops::Range;
use std::os::fd::AsRawFd;
use std::ptr;

use crate::error::LoadError;
use crate::header::{Elf32ProgramHeader, Headers};
use crate::page::{page_ceil, page_floor, page_offset, page_size};

/// An anonymous `PROT_NONE` address range owned by this process.
///
/// Fixed mappings placed inside it are released together with it.
#[derive(Debug)]
struct Reservation {
    base: usize,
    len: usize,
}

impl Reservation {
    fn new(len: usize) -> Result<Self, LoadError> {
        // SAFETY: anonymous mapping at an address chosen by the kernel; it
        // cannot alias any existing allocation.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(LoadError::ReserveFailed(io::Error::last_os_error()));
        }
        Ok(Self {
            base: ptr as usize,
            len,
        })
    }

    fn range(&self) -> Range<usize> {
        self.base..self.base + self.len
    }

    fn contains(&self, start: usize, len: usize) -> bool {
        start >= self.base && start.checked_add(len).is_some_and(|end| end <= self.base + self.len)
    }

    /// Replace `[addr, addr + len)` with a private read/write mapping, backed
    /// by `file` at `offset` or anonymous zero pages when `file` is `None`.
    fn map_fixed(
        &mut self,
        addr: usize,
        len: usize,
        file: Option<(&File, u64)>,
    ) -> io::Result<()> {
        debug_assert!(self.contains(addr, len), "fixed mapping escapes reservation");

        let (fd, offset, flags) = match file {
            Some((file, offset)) => {
                let offset = libc::off_t::try_from(offset)
                    .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
                (file.as_raw_fd(), offset, libc::MAP_PRIVATE | libc::MAP_FIXED)
            }
            None => (
                -1,
                0,
                libc::MAP_PRIVATE | libc::MAP_FIXED | libc::MAP_ANONYMOUS,
            ),
        };

        // SAFETY: the range lies inside our own reservation and nothing
        // borrows it while `&mut self` is held, so `MAP_FIXED` only replaces
        // pages this reservation owns.
        let ptr = unsafe {
            libc::mmap(
                addr as *mut libc::c_void,
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                flags,
                fd,
                offset,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        // SAFETY: `base..base + len` was returned by `mmap` and every slice
        // handed out borrows the owning image, so none outlive this call.
        let rc = unsafe { libc::munmap(self.base as *mut libc::c_void, self.len) };
        if rc != 0 {
            log::warn!(
                "failed to release reservation at {:#x}: {}",
                self.base,
                io::Error::last_os_error()
            );
        }
    }
}

/// A `PT_LOAD` segment placed inside a [`MappedImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedSegment {
    /// Address of the segment's first byte (`p_offset`'s sub-page offset preserved).
    pub base: usize,
    /// Virtual address recorded in the file.
    pub vaddr: u32,
    /// File offset of the segment data.
    pub offset: u32,
    /// Bytes backed by the file.
    pub filesz: u32,
    /// Bytes in memory; `[filesz, memsz)` is zero.
    pub memsz: u32,
    /// Segment permission flags as stored in the file.
    pub flags: u32,
    map_start: usize,
    map_end: usize,
}

impl MappedSegment {
    /// Logical extent `[base, base + memsz)`.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.base..self.base + self.memsz as usize
    }

    /// Page-aligned extent covered by this segment's mappings.
    #[must_use]
    pub fn mapped_range(&self) -> Range<usize> {
        self.map_start..self.map_end
    }

    fn contains(&self, addr: usize, len: usize) -> bool {
        let range = self.range();
        addr >= range.start && addr.checked_add(len).is_some_and(|end| end <= range.end)
    }
}

/// A module image mapped into this process.
///
/// Segments are keyed by program-header index; entries that are not
/// `PT_LOAD` have no mapping. Memory is only read after [`MappedImage::map`]
/// returns.
#[derive(Debug)]
pub struct MappedImage {
    reservation: Reservation,
    segments: Vec<Option<MappedSegment>>,
    load_bias: u64,
}

impl MappedImage {
    /// Reserve address space for every `PT_LOAD` segment in `headers` and map
    /// them from `file`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::NoLoadableSegments`] if there is nothing to map,
    /// [`LoadError::MisalignedSegment`] or [`LoadError::SegmentOutOfBounds`]
    /// for segments that cannot be mapped faithfully, and
    /// [`LoadError::ReserveFailed`] or [`LoadError::MappingFailed`] when the
    /// OS refuses. Nothing stays mapped on error.
    pub fn map(headers: &Headers, file: &File) -> Result<Self, LoadError> {
        let page = page_size() as u64;
        let file_len = file.metadata()?.len();

        let mut min_addr = u64::MAX;
        let mut max_addr = 0u64;
        for (i, phdr) in headers.load_segments() {
            check_segment(i, phdr, page, file_len)?;
            min_addr = min_addr.min(u64::from(phdr.p_vaddr));
            max_addr = max_addr.max(u64::from(phdr.p_vaddr) + u64::from(phdr.p_memsz));
        }
        if min_addr > max_addr {
            return Err(LoadError::NoLoadableSegments);
        }

        // Anchor at the page containing the lowest segment so that sub-page
        // offsets carry over from vaddr to host address unchanged.
        let load_bias = page_floor(min_addr, page);
        let span = page_ceil(max_addr - load_bias, page)
            .filter(|&span| span > 0)
            .unwrap_or(page);
        let span = usize::try_from(span).map_err(|_| {
            LoadError::ReserveFailed(io::Error::new(
                io::ErrorKind::OutOfMemory,
                "image span exceeds the address space",
            ))
        })?;

        let mut reservation = Reservation::new(span)?;
        log::debug!(
            "reserved {span:#x} bytes at {:#x} for vaddr {min_addr:#x}..{max_addr:#x}",
            reservation.base
        );

        let mut segments = vec![None; headers.program_headers.len()];
        for (i, phdr) in headers.load_segments() {
            let segment = map_segment(&mut reservation, i, phdr, load_bias, page, file)?;
            log::info!("mapped segment {i} at {:#x}", segment.base);
            segments[i] = Some(segment);
        }

        Ok(Self {
            reservation,
            segments,
            load_bias,
        })
    }

    /// Start of the reserved region.
    #[must_use]
    pub fn base(&self) -> usize {
        self.reservation.base
    }

    /// Size of the reserved region in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reservation.len
    }

    /// Always `false`: a reservation spans at least one page.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reservation.len == 0
    }

    /// The reserved region `[base, base + len)`.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.reservation.range()
    }

    /// Page-aligned file virtual address that maps to [`MappedImage::base`].
    #[must_use]
    pub fn load_bias(&self) -> u64 {
        self.load_bias
    }

    /// Returns the mapped segment for program header `index`, or `None` if
    /// that entry is not `PT_LOAD` (or does not exist).
    #[must_use]
    pub fn segment(&self, index: usize) -> Option<&MappedSegment> {
        self.segments.get(index).and_then(Option::as_ref)
    }

    /// Iterate over `(index, segment)` for every mapped segment.
    pub fn segments(&self) -> impl Iterator<Item = (usize, &MappedSegment)> {
        self.segments
            .iter()
            .enumerate()
            .filter_map(|(i, seg)| seg.as_ref().map(|seg| (i, seg)))
    }

    /// Borrow `len` bytes at `addr` if they lie inside one segment's logical
    /// extent.
    #[must_use]
    pub fn bytes(&self, addr: usize, len: usize) -> Option<&[u8]> {
        self.segments().find(|(_, seg)| seg.contains(addr, len))?;
        debug_assert!(self.reservation.contains(addr, len));
        // SAFETY: the range is inside a segment mapped read/write for the
        // lifetime of `self`, and it is never written after `map` returns.
        Some(unsafe { std::slice::from_raw_parts(addr as *const u8, len) })
    }

    /// Borrow the NUL-terminated string at `addr`.
    ///
    /// The terminator must appear before the end of the containing segment.
    #[must_use]
    pub fn c_str(&self, addr: usize) -> Option<&CStr> {
        let (_, seg) = self.segments().find(|(_, seg)| seg.contains(addr, 1))?;
        let tail = self.bytes(addr, seg.range().end - addr)?;
        CStr::from_bytes_until_nul(tail).ok()
    }

    /// Borrow the whole logical extent of segment `index`.
    #[must_use]
    pub fn segment_bytes(&self, index: usize) -> Option<&[u8]> {
        let seg = self.segment(index)?;
        self.bytes(seg.base, seg.memsz as usize)
    }
}

/// Reject segments whose file range or alignment cannot be mapped as-is.
fn check_segment(
    index: usize,
    phdr: &Elf32ProgramHeader,
    page: u64,
    file_len: u64,
) -> Result<(), LoadError> {
    if page_offset(u64::from(phdr.p_offset), page) != page_offset(u64::from(phdr.p_vaddr), page) {
        return Err(LoadError::MisalignedSegment(index));
    }
    // Pure-BSS segments may point their offset anywhere, even past EOF.
    if phdr.p_filesz > phdr.p_memsz
        || (phdr.p_filesz > 0
            && u64::from(phdr.p_offset) + u64::from(phdr.p_filesz) > file_len)
    {
        return Err(LoadError::SegmentOutOfBounds(index));
    }
    Ok(())
}

/// Map one validated `PT_LOAD` segment into `reservation`.
#[expect(
    clippy::cast_possible_truncation,
    reason = "span was checked to fit in usize before reserving"
)]
fn map_segment(
    reservation: &mut Reservation,
    index: usize,
    phdr: &Elf32ProgramHeader,
    load_bias: u64,
    page: u64,
    file: &File,
) -> Result<MappedSegment, LoadError> {
    let page_us = page as usize;
    let rel = (u64::from(phdr.p_vaddr) - load_bias) as usize;
    let start = reservation.base + rel;
    let map_start = page_floor(start as u64, page) as usize;
    let in_page = page_offset(u64::from(phdr.p_offset), page) as usize;
    let base = map_start + in_page;
    debug_assert_eq!(base, start);

    let file_end = base + phdr.p_filesz as usize;
    let mem_end = base + phdr.p_memsz as usize;
    let map_end = mem_end.next_multiple_of(page_us);

    if phdr.p_filesz > 0 {
        let file_page = page_floor(u64::from(phdr.p_offset), page);
        let len = file_end.next_multiple_of(page_us) - map_start;
        reservation
            .map_fixed(map_start, len, Some((file, file_page)))
            .map_err(|source| LoadError::MappingFailed {
                segment: index,
                source,
            })?;

        // File bytes past `p_filesz` share the last page; clear them.
        let zero_end = mem_end.min(file_end.next_multiple_of(page_us));
        if zero_end > file_end {
            // SAFETY: `[file_end, zero_end)` lies in the page just mapped
            // read/write above, and no references into it exist yet.
            unsafe { ptr::write_bytes(file_end as *mut u8, 0, zero_end - file_end) };
        }
    }

    let anon_start = if phdr.p_filesz > 0 {
        file_end.next_multiple_of(page_us)
    } else {
        map_start
    };
    if map_end > anon_start {
        reservation
            .map_fixed(anon_start, map_end - anon_start, None)
            .map_err(|source| LoadError::MappingFailed {
                segment: index,
                source,
            })?;
    }

    Ok(MappedSegment {
        base,
        vaddr: phdr.p_vaddr,
        offset: phdr.p_offset,
        filesz: phdr.p_filesz,
        memsz: phdr.p_memsz,
        flags: phdr.p_flags,
        map_start,
        map_end,
    })
}
