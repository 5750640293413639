#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

impl Pagination {
    /// Out-of-range pages are clamped rather than rejected.
    pub fn new(page: Option<u32>, per_page: u32, total: i64) -> Self {
        let per_page = per_page.max(1);
        let mut pagination = Self { page: page.unwrap_or(1).max(1), per_page, total: total.max(0) };
        pagination.page = pagination.page.min(pagination.pages().max(1));
        pagination
    }

    pub fn pages(&self) -> u32 {
        let total = self.total as u64;
        let per_page = self.per_page as u64;
        total.div_ceil(per_page).min(u32::MAX as u64) as u32
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.pages()
    }

    pub fn prev_page(&self) -> u32 {
        self.page.saturating_sub(1).max(1)
    }

    pub fn next_page(&self) -> u32 {
        self.page + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_pages_and_offsets() {
        let p = Pagination::new(Some(2), 20, 45);
        assert_eq!(p.pages(), 3);
        assert_eq!(p.offset(), 20);
        assert_eq!(p.limit(), 20);
        assert!(p.has_prev());
        assert!(p.has_next());
        assert_eq!((p.prev_page(), p.next_page()), (1, 3));
    }

    #[test]
    fn clamps_out_of_range_pages() {
        assert_eq!(Pagination::new(Some(9), 20, 45).page, 3);
        assert_eq!(Pagination::new(Some(0), 20, 45).page, 1);
        assert_eq!(Pagination::new(None, 20, 0).page, 1);
    }

    #[test]
    fn empty_result_has_no_neighbours() {
        let p = Pagination::new(None, 20, 0);
        assert_eq!(p.pages(), 0);
        assert_eq!(p.offset(), 0);
        assert!(!p.has_prev());
        assert!(!p.has_next());
    }
}
