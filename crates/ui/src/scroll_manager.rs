use gpui::{Pixels, ScrollHandle, point};

/// Keeps the transcript pinned to its newest entry.
///
/// The list reports the controller revision on every update; any change schedules
/// one scroll to the bottom on the next render.
pub struct ScrollManager {
    scroll_handle: ScrollHandle,
    last_revision: Option<u64>,
    pending_scroll_to_bottom: bool,
}

impl ScrollManager {
    pub fn new() -> Self {
        Self {
            scroll_handle: ScrollHandle::new(),
            last_revision: None,
            pending_scroll_to_bottom: false,
        }
    }

    pub fn handle(&self) -> &ScrollHandle {
        &self.scroll_handle
    }

    /// Returns true when the revision moved and a scroll was scheduled.
    pub fn observe_revision(&mut self, revision: u64) -> bool {
        if self.last_revision == Some(revision) {
            return false;
        }

        self.last_revision = Some(revision);
        self.pending_scroll_to_bottom = true;
        true
    }

    pub fn request_scroll_to_bottom(&mut self) {
        self.pending_scroll_to_bottom = true;
    }

    pub fn apply_pending_scroll(&mut self) -> bool {
        if !self.pending_scroll_to_bottom {
            return false;
        }

        // Layout may not have run yet; scroll_to_bottom also covers content added this frame.
        let max_offset = self.scroll_handle.max_offset().height;
        if max_offset > Pixels::ZERO {
            let current_x = self.scroll_handle.offset().x;
            self.scroll_handle.set_offset(point(current_x, -max_offset));
        }
        self.scroll_handle.scroll_to_bottom();

        self.pending_scroll_to_bottom = false;
        true
    }
}

impl Default for ScrollManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[::core::prelude::v1::test]
    fn revision_change_schedules_one_scroll() {
        let mut manager = ScrollManager::new();

        assert!(manager.observe_revision(0));
        assert!(manager.apply_pending_scroll());
        assert!(!manager.apply_pending_scroll());

        assert!(!manager.observe_revision(0));
        assert!(!manager.apply_pending_scroll());

        assert!(manager.observe_revision(3));
        assert!(manager.apply_pending_scroll());
    }
}
