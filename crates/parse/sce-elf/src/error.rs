//! Error type shared by every load step.

use std::io;

use thiserror::Error;

/// Errors that can occur while loading a SELF module.
///
/// Every variant is terminal for the current load attempt. Indices refer to
/// the program-header table (segments) or the import descriptor array.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Opening or reading the file failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The file is shorter than the ELF32 file header.
    #[error("file is too short for an ELF32 header")]
    TruncatedHeader,
    /// Program header `i` could not be fully read.
    #[error("program header {0} is truncated")]
    TruncatedProgramHeader(usize),
    /// The file does not start with the ELF magic bytes.
    #[error("invalid ELF magic bytes")]
    BadMagic,
    /// The ELF file is not 32-bit (`ELFCLASS32`).
    #[error("unsupported ELF class (expected ELFCLASS32)")]
    UnsupportedClass,
    /// The ELF file is not little-endian.
    #[error("unsupported data encoding (expected little-endian)")]
    UnsupportedEncoding,
    /// No `PT_LOAD` segment exists, so there is nothing to map.
    #[error("image has no loadable segments")]
    NoLoadableSegments,
    /// Segment `i` has a file offset and virtual address that disagree modulo the page size.
    #[error("segment {0}: file offset and virtual address are not congruent modulo the page size")]
    MisalignedSegment(usize),
    /// Segment `i` has inconsistent sizes or extends past the end of the file.
    #[error("segment {0} lies outside the file or has filesz > memsz")]
    SegmentOutOfBounds(usize),
    /// Reserving the contiguous address range failed.
    #[error("failed to reserve address space")]
    ReserveFailed(#[source] io::Error),
    /// Mapping segment `i` into the reservation failed.
    #[error("failed to map segment {segment}")]
    MappingFailed {
        /// Program-header index of the segment.
        segment: usize,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// The module-info record does not fit inside segment 0.
    #[error("module info lies outside segment 0")]
    ModuleInfoOutOfRange,
    /// Import descriptor `k` or the name it references lies outside the image.
    #[error("import descriptor {0} is invalid")]
    InvalidImportDescriptor(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_errors() {
        let errors = [
            LoadError::TruncatedHeader,
            LoadError::TruncatedProgramHeader(3),
            LoadError::BadMagic,
            LoadError::UnsupportedClass,
            LoadError::UnsupportedEncoding,
            LoadError::NoLoadableSegments,
            LoadError::MisalignedSegment(1),
            LoadError::SegmentOutOfBounds(2),
            LoadError::ModuleInfoOutOfRange,
            LoadError::InvalidImportDescriptor(0),
        ];
        for err in &errors {
            let msg = format!("{err}");
            assert!(!msg.is_empty());
        }
    }

    #[test]
    fn mapping_failure_keeps_os_error() {
        use std::error::Error as _;

        let err = LoadError::MappingFailed {
            segment: 4,
            source: io::Error::from_raw_os_error(libc::ENOMEM),
        };
        assert_eq!(err.to_string(), "failed to map segment 4");
        assert!(err.source().is_some());

        let err = LoadError::ReserveFailed(io::Error::from_raw_os_error(libc::ENOMEM));
        assert!(err.source().is_some());
    }
}
