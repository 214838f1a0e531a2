//! Pagination
//!
//! Listings are cut into pages of [`PAGE_SIZE`] records. The requested page
//! number comes straight from the query string, so it is resolved leniently:
//! anything non-numeric means the first page and out-of-range numbers are
//! clamped to the first or last page.

use serde::Serialize;

/// Number of posts per listing page
pub const PAGE_SIZE: usize = 10;

/// One page of an ordered sequence
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based page number
    pub number: usize,
    /// Always at least 1, even for an empty sequence
    pub num_pages: usize,
    /// Total number of records across all pages
    pub total: usize,
    pub per_page: usize,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_page_number: Option<usize>,
    pub previous_page_number: Option<usize>,
}

impl<T> Page<T> {
    /// Resolve a raw page parameter against `total` records.
    ///
    /// Returns the page number and the offset of its first record.
    pub fn locate(raw: Option<&str>, total: usize, per_page: usize) -> (usize, usize) {
        let per_page = per_page.max(1);
        let number = resolve_number(raw, num_pages(total, per_page));
        (number, (number - 1) * per_page)
    }

    /// Wrap an already-sliced page of records.
    pub fn new(items: Vec<T>, number: usize, total: usize, per_page: usize) -> Self {
        let per_page = per_page.max(1);
        let num_pages = num_pages(total, per_page);
        let number = number.clamp(1, num_pages);
        Self {
            items,
            number,
            num_pages,
            total,
            per_page,
            has_next: number < num_pages,
            has_previous: number > 1,
            next_page_number: (number < num_pages).then_some(number + 1),
            previous_page_number: (number > 1).then_some(number - 1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Slice an in-memory ordered sequence into the requested page.
pub fn paginate<T>(items: Vec<T>, raw_page: Option<&str>, per_page: usize) -> Page<T> {
    let total = items.len();
    let (number, offset) = Page::<T>::locate(raw_page, total, per_page);
    let slice = items
        .into_iter()
        .skip(offset)
        .take(per_page.max(1))
        .collect();
    Page::new(slice, number, total, per_page)
}

fn num_pages(total: usize, per_page: usize) -> usize {
    total.div_ceil(per_page).max(1)
}

fn resolve_number(raw: Option<&str>, num_pages: usize) -> usize {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return 1;
    };

    match raw.parse::<i64>() {
        Ok(n) if n < 1 => 1,
        Ok(n) => usize::try_from(n).map_or(num_pages, |n| n.min(num_pages)),
        Err(_) => {
            // Integers too large for i64 are still out of range, not garbage.
            let digits = raw.strip_prefix(['+', '-']).unwrap_or(raw);
            let is_integer = !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit());
            if is_integer && !raw.starts_with('-') {
                num_pages
            } else {
                1
            }
        }
    }
}
