//! Input controller contract
//!
//! Clicking, scrolling and capturing frames are delegated to a platform
//! controller (ADB, scrcpy, a desktop window). The core assumes every call
//! is synchronous and succeeds; controller errors are the controller's
//! concern.

use crate::vision::{BBox, Frame};

/// Direction of a list scroll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    /// Reveal entries further down the list
    Down,
    /// Reveal entries further up the list
    Up,
}

/// Low-level input and window controller
pub trait InputController {
    /// Capture the current screen
    fn capture_frame(&self) -> Frame;

    /// Click a point in frame coordinates
    fn click(&self, x: i32, y: i32);

    /// Scroll the list occupying `region` by roughly one page
    fn scroll(&self, region: &BBox, direction: ScrollDirection);
}
