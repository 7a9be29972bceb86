//! Bookmark map driving the navigation menu.
//!
//! Bookmarks come from an injected [`BookmarkSource`], so the viewer does not
//! care whether they are placeholder data or read from the document outline.

use crate::pdf::OutlineEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named jump target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Page index (0-based)
    pub page: u32,
    pub label: String,
}

/// Page index → label, ordered by page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookmarkMap {
    entries: BTreeMap<u32, String>,
}

impl BookmarkMap {
    /// Build a map, keeping only entries that point inside the document.
    /// The first label for a page wins.
    pub fn new<I>(entries: I, page_count: u32) -> Self
    where
        I: IntoIterator<Item = (u32, String)>,
    {
        let mut map = BTreeMap::new();
        for (page, label) in entries {
            if page < page_count {
                map.entry(page).or_insert(label);
            }
        }
        Self { entries: map }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, page: u32) -> bool {
        self.entries.contains_key(&page)
    }

    pub fn label(&self, page: u32) -> Option<&str> {
        self.entries.get(&page).map(String::as_str)
    }

    /// The bookmark whose section contains `page`.
    pub fn section_for(&self, page: u32) -> Option<Bookmark> {
        self.entries
            .range(..=page)
            .next_back()
            .map(|(&page, label)| Bookmark {
                page,
                label: label.clone(),
            })
    }

    pub fn to_vec(&self) -> Vec<Bookmark> {
        self.entries
            .iter()
            .map(|(&page, label)| Bookmark {
                page,
                label: label.clone(),
            })
            .collect()
    }
}

/// Produces the bookmark map once the document is open.
pub trait BookmarkSource: Send {
    fn bookmarks(&self, outline: &[OutlineEntry], page_count: u32) -> BookmarkMap;
}

/// Fixed bookmarks, independent of document content.
#[derive(Debug, Clone)]
pub struct StaticBookmarks {
    entries: BTreeMap<u32, String>,
}

impl StaticBookmarks {
    pub fn new(entries: BTreeMap<u32, String>) -> Self {
        Self { entries }
    }

    /// Placeholder sections shipped with the demo document.
    pub fn placeholder() -> BTreeMap<u32, String> {
        [
            (0, "Home"),
            (4, "Technical Specifications"),
            (9, "Connectivity"),
            (13, "Design"),
        ]
        .into_iter()
        .map(|(page, label)| (page, label.to_string()))
        .collect()
    }
}

impl Default for StaticBookmarks {
    fn default() -> Self {
        Self::new(Self::placeholder())
    }
}

impl BookmarkSource for StaticBookmarks {
    fn bookmarks(&self, _outline: &[OutlineEntry], page_count: u32) -> BookmarkMap {
        BookmarkMap::new(self.entries.clone(), page_count)
    }
}

/// Bookmarks read from the document's own outline.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutlineBookmarks;

impl BookmarkSource for OutlineBookmarks {
    fn bookmarks(&self, outline: &[OutlineEntry], page_count: u32) -> BookmarkMap {
        BookmarkMap::new(
            outline
                .iter()
                .filter(|entry| !entry.title.trim().is_empty())
                .map(|entry| (entry.page, entry.title.trim().to_string())),
            page_count,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_bookmarks() {
        let map = StaticBookmarks::default().bookmarks(&[], 15);
        let pages: Vec<u32> = map.to_vec().iter().map(|b| b.page).collect();
        assert_eq!(pages, vec![0, 4, 9, 13]);
        assert_eq!(map.label(9), Some("Connectivity"));
    }

    #[test]
    fn test_out_of_range_bookmarks_dropped() {
        let map = StaticBookmarks::default().bookmarks(&[], 10);
        assert_eq!(map.len(), 3);
        assert!(!map.contains(13));

        assert!(StaticBookmarks::default().bookmarks(&[], 0).is_empty());
    }

    #[test]
    fn test_section_for_page() {
        let map = StaticBookmarks::default().bookmarks(&[], 15);
        assert_eq!(map.section_for(0).unwrap().label, "Home");
        assert_eq!(map.section_for(3).unwrap().label, "Home");
        assert_eq!(map.section_for(9).unwrap().page, 9);
        assert_eq!(map.section_for(14).unwrap().label, "Design");

        let sparse = BookmarkMap::new([(5, "Late".to_string())], 10);
        assert!(sparse.section_for(2).is_none());
    }

    #[test]
    fn test_outline_bookmarks_first_title_wins() {
        let outline = vec![
            OutlineEntry { page: 2, title: "Intro".into() },
            OutlineEntry { page: 2, title: "Duplicate".into() },
            OutlineEntry { page: 5, title: "  ".into() },
            OutlineEntry { page: 40, title: "Beyond".into() },
        ];
        let map = OutlineBookmarks.bookmarks(&outline, 10);
        assert_eq!(map.to_vec(), vec![Bookmark { page: 2, label: "Intro".into() }]);
    }
}
