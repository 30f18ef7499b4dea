//! Accumulation of paged list results into one running list.

use serde::Serialize;
use std::collections::HashSet;

/// Records that have a stable identity key within a list.
pub trait Identified {
    fn identity(&self) -> u64;
}

/// Items accumulated across `load more` calls within one query session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub total_pages: u32,
    pub total_count: u64,
}

impl<T> Default for PaginatedResult<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            page: 0,
            total_pages: 0,
            total_count: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Paginator<T> {
    result: PaginatedResult<T>,
    seen: HashSet<u64>,
    page_ceiling: Option<u32>,
}

impl<T> Default for Paginator<T> {
    fn default() -> Self {
        Self {
            result: PaginatedResult::default(),
            seen: HashSet::new(),
            page_ceiling: None,
        }
    }
}

impl<T: Identified + Clone> Paginator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never report more pages beyond `ceiling`, whatever upstream claims.
    pub fn with_page_ceiling(ceiling: u32) -> Self {
        Self {
            page_ceiling: Some(ceiling),
            ..Self::default()
        }
    }

    /// Forget everything accumulated; the next append starts a new session.
    pub fn reset(&mut self) {
        self.result = PaginatedResult::default();
        self.seen.clear();
    }

    /// Merge one page. Page 1 replaces the list; later pages are appended,
    /// skipping any item whose identity is already present. Returns how many
    /// items were actually added.
    pub fn append_page(
        &mut self,
        items: impl IntoIterator<Item = T>,
        page: u32,
        total_pages: u32,
        total_count: u64,
    ) -> usize {
        if page <= 1 {
            self.reset();
        }

        let before = self.result.items.len();
        for item in items {
            if self.seen.insert(item.identity()) {
                self.result.items.push(item);
            }
        }

        self.result.page = page.max(1);
        self.result.total_pages = total_pages;
        self.result.total_count = total_count;
        self.result.items.len() - before
    }

    pub fn items(&self) -> &[T] {
        &self.result.items
    }

    pub fn page(&self) -> u32 {
        self.result.page
    }

    pub fn total_pages(&self) -> u32 {
        self.result.total_pages
    }

    pub fn total_count(&self) -> u64 {
        self.result.total_count
    }

    pub fn is_empty(&self) -> bool {
        self.result.items.is_empty()
    }

    pub fn contains(&self, identity: u64) -> bool {
        self.seen.contains(&identity)
    }

    pub fn has_more(&self) -> bool {
        let below_ceiling = self.page_ceiling.is_none_or(|c| self.result.page < c);
        self.result.page < self.result.total_pages && below_ceiling
    }

    /// The page a `load more` should request, if there is one.
    pub fn next_page(&self) -> Option<u32> {
        self.has_more().then_some(self.result.page + 1)
    }

    pub fn snapshot(&self) -> PaginatedResult<T> {
        self.result.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item(u64);

    impl Identified for Item {
        fn identity(&self) -> u64 {
            self.0
        }
    }

    fn items(ids: &[u64]) -> Vec<Item> {
        ids.iter().copied().map(Item).collect()
    }

    #[test]
    fn first_page_replaces() {
        let mut p = Paginator::new();
        p.append_page(items(&[1, 2, 3]), 1, 3, 55);
        p.append_page(items(&[4, 5]), 2, 3, 55);
        p.append_page(items(&[9]), 1, 1, 1);
        assert_eq!(p.items(), items(&[9]).as_slice());
        assert_eq!(p.page(), 1);
        assert!(!p.has_more());
    }

    #[test]
    fn appending_same_page_twice_is_idempotent() {
        let mut once = Paginator::new();
        once.append_page(items(&[1, 2]), 1, 3, 6);
        once.append_page(items(&[3, 4]), 2, 3, 6);

        let mut twice = Paginator::new();
        twice.append_page(items(&[1, 2]), 1, 3, 6);
        twice.append_page(items(&[3, 4]), 2, 3, 6);
        assert_eq!(twice.append_page(items(&[3, 4]), 2, 3, 6), 0);

        assert_eq!(once.snapshot(), twice.snapshot());
    }

    #[test]
    fn overlapping_pages_collapse_duplicates() {
        let mut p = Paginator::new();
        p.append_page(items(&[1, 2, 3]), 1, 2, 5);
        let added = p.append_page(items(&[3, 4, 5]), 2, 2, 5);
        assert_eq!(added, 2);
        assert_eq!(p.items(), items(&[1, 2, 3, 4, 5]).as_slice());
    }

    #[test]
    fn has_more_respects_ceiling() {
        let mut p = Paginator::with_page_ceiling(2);
        p.append_page(items(&[1]), 1, 500, 10_000);
        assert_eq!(p.next_page(), Some(2));
        p.append_page(items(&[2]), 2, 500, 10_000);
        assert!(!p.has_more());
        assert_eq!(p.next_page(), None);
    }

    #[test]
    fn reset_clears_session() {
        let mut p = Paginator::new();
        p.append_page(items(&[1, 2]), 1, 2, 4);
        p.reset();
        assert!(p.is_empty());
        assert_eq!(p.page(), 0);
        assert!(!p.contains(1));
        assert!(!p.has_more());
    }
}
