//! Page-granularity address arithmetic.

use std::sync::OnceLock;

/// Fallback when `sysconf` cannot report a page size.
const DEFAULT_PAGE_SIZE: usize = 4096;

/// Returns the platform memory-mapping granularity.
#[must_use]
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        // SAFETY: `sysconf` has no preconditions.
        let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        usize::try_from(raw)
            .ok()
            .filter(|size| size.is_power_of_two())
            .unwrap_or(DEFAULT_PAGE_SIZE)
    })
}

/// Round `addr` down to a multiple of `page`.
///
/// `page` must be a power of two.
#[must_use]
pub const fn page_floor(addr: u64, page: u64) -> u64 {
    addr & !(page - 1)
}

/// Offset of `addr` within its page.
#[must_use]
pub const fn page_offset(addr: u64, page: u64) -> u64 {
    addr & (page - 1)
}

/// Round `size` up to a multiple of `page`, or `None` on overflow.
#[must_use]
pub const fn page_ceil(size: u64, page: u64) -> Option<u64> {
    match size.checked_add(page - 1) {
        Some(v) => Some(page_floor(v, page)),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_power_of_two() {
        assert!(page_size().is_power_of_two());
        assert!(page_size() >= 4096);
    }

    #[test]
    fn rounding() {
        assert_eq!(page_floor(0x1234, 0x1000), 0x1000);
        assert_eq!(page_floor(0x2000, 0x1000), 0x2000);
        assert_eq!(page_offset(0x1234, 0x1000), 0x234);
        assert_eq!(page_offset(0x2000, 0x1000), 0);
        assert_eq!(page_ceil(0, 0x1000), Some(0));
        assert_eq!(page_ceil(1, 0x1000), Some(0x1000));
        assert_eq!(page_ceil(0x1050, 0x1000), Some(0x2000));
        assert_eq!(page_ceil(0x4000, 0x4000), Some(0x4000));
        assert_eq!(page_ceil(u64::MAX, 0x1000), None);
    }
}
