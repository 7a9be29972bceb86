//! Current-page tracking for the page strip.
//!
//! The navigator is the only owner of the current index. Button and bookmark
//! actions produce a [`ScrollRequest`] for the strip; scroll callbacks feed the
//! visible page back without producing one.

use serde::Serialize;

/// Ask the page strip to scroll to `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScrollRequest {
    pub index: u32,
    pub smooth: bool,
}

impl ScrollRequest {
    fn smooth(index: u32) -> Self {
        Self {
            index,
            smooth: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigator {
    current: u32,
    page_count: u32,
}

impl Navigator {
    pub fn new(page_count: u32) -> Self {
        Self {
            current: 0,
            page_count,
        }
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn can_go_previous(&self) -> bool {
        self.page_count > 0 && self.current > 0
    }

    pub fn can_go_next(&self) -> bool {
        self.current.saturating_add(1) < self.page_count
    }

    pub fn previous(&mut self) -> Option<ScrollRequest> {
        if !self.can_go_previous() {
            return None;
        }
        self.current -= 1;
        Some(ScrollRequest::smooth(self.current))
    }

    pub fn next(&mut self) -> Option<ScrollRequest> {
        if !self.can_go_next() {
            return None;
        }
        self.current += 1;
        Some(ScrollRequest::smooth(self.current))
    }

    /// Jump to `index`. Targets outside the document are ignored.
    pub fn jump_to(&mut self, index: u32) -> Option<ScrollRequest> {
        if index >= self.page_count {
            return None;
        }
        self.current = index;
        Some(ScrollRequest::smooth(index))
    }

    /// Record the page the strip reports as visible.
    ///
    /// Returns whether the current page changed.
    pub fn sync_from_scroll(&mut self, visible: u32) -> bool {
        if visible >= self.page_count || visible == self.current {
            return false;
        }
        self.current = visible;
        true
    }
}
