//! Link-layer availability flags.
//!
//! Availability notifications arrive from outside the supervisor's control
//! loop and must never touch the transport; they only flip these flags. The
//! supervisor's retry loop and the publisher observe and clear the change
//! marker from their own contexts. Readers tolerate eventual observation, so
//! atomic loads and stores are the only synchronization used here.

use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide link availability state.
#[derive(Debug)]
pub struct LinkState {
    available: AtomicBool,
    changed: AtomicBool,
}

impl LinkState {
    /// Starts available with no pending change, matching a device that boots
    /// with its link already negotiated.
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            changed: AtomicBool::new(false),
        }
    }

    /// Record a link-availability notification.
    ///
    /// Safe to call from any task or thread; never blocks.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        self.changed.store(true, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Observe and clear the change marker in a single step, so a flip can
    /// never be cleared without having been seen.
    pub fn take_changed(&self) -> bool {
        self.changed.swap(false, Ordering::SeqCst)
    }

    /// Force a reconnect on the next publish without a new notification.
    pub fn mark_changed(&self) {
        self.changed.store(true, Ordering::SeqCst)
    }
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let link = LinkState::new();
        assert!(link.is_available());
        assert!(!link.take_changed());
    }

    #[test]
    fn test_notification_sets_both_flags() {
        let link = LinkState::new();
        link.set_available(false);
        assert!(!link.is_available());
        assert!(link.take_changed());
    }

    #[test]
    fn test_take_changed_clears_marker() {
        let link = LinkState::new();
        link.set_available(true);
        assert!(link.take_changed());
        assert!(!link.take_changed());
    }

    #[test]
    fn test_mark_changed_without_notification() {
        let link = LinkState::new();
        link.mark_changed();
        assert!(link.is_available());
        assert!(link.take_changed());
    }
}
