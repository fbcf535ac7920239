pub mod comment;
pub mod post;
pub mod user;

/// Offset for 1-based pagination. Saturates so hostile page numbers cannot
/// overflow, and stays within what SQLite accepts as an integer.
pub(crate) fn page_offset(page: u64, limit: u64) -> u64 {
    page.saturating_sub(1)
        .saturating_mul(limit)
        .min(i64::MAX as u64)
}

#[cfg(test)]
mod tests {
    use super::page_offset;

    #[test]
    fn page_offset_handles_extreme_pages() {
        assert_eq!(page_offset(1, 10), 0);
        assert_eq!(page_offset(3, 10), 20);
        assert_eq!(page_offset(0, 10), 0);
        assert_eq!(page_offset(u64::MAX, 100), i64::MAX as u64);
        assert_eq!(page_offset(u64::MAX, u64::MAX), i64::MAX as u64);
    }
}
