use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: u32 = 10;
pub const MAX_PER_PAGE: u32 = 50;

/// Normalized `page` / `per_page` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        Self::with_default(page, per_page, DEFAULT_PER_PAGE)
    }

    pub fn with_default(page: Option<i64>, per_page: Option<i64>, default_per_page: u32) -> Self {
        let page = page.unwrap_or(1).max(1).min(u32::MAX as i64) as u32;
        let per_page = per_page
            .unwrap_or(default_per_page as i64)
            .clamp(1, MAX_PER_PAGE as i64) as u32;
        Page { page, per_page }
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }

    pub fn meta(&self, total: i64) -> PageMeta {
        PageMeta {
            total,
            pages: pages(total, self.per_page),
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// Pagination block included in list responses.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PageMeta {
    pub total: i64,
    pub pages: i64,
    pub page: u32,
    pub per_page: u32,
}

pub fn pages(total: i64, per_page: u32) -> i64 {
    if total <= 0 {
        0
    } else {
        (total + per_page as i64 - 1) / per_page as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let p = Page::new(None, None);
        assert_eq!(p, Page { page: 1, per_page: 10 });
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn per_page_is_clamped() {
        assert_eq!(Page::new(Some(1), Some(500)).per_page, MAX_PER_PAGE);
        assert_eq!(Page::new(Some(1), Some(0)).per_page, 1);
        assert_eq!(Page::new(Some(-3), Some(-1)).page, 1);
    }

    #[test]
    fn offset_and_pages() {
        let p = Page::new(Some(3), Some(20));
        assert_eq!(p.offset(), 40);
        assert_eq!(p.limit(), 20);

        assert_eq!(pages(0, 10), 0);
        assert_eq!(pages(10, 10), 1);
        assert_eq!(pages(11, 10), 2);

        let meta = Page::with_default(None, None, 5).meta(12);
        assert_eq!(meta.per_page, 5);
        assert_eq!(meta.pages, 3);
    }
}
