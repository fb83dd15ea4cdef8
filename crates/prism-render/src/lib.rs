// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Drawable size of a window surface, in physical pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn is_zero_area(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// What happened to one `Renderer::render` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame was recorded, submitted and queued for presentation.
    Presented,
    /// The presentation chain no longer matches the surface. Nothing was
    /// submitted for this frame; the chain has to be rebuilt by the owner.
    RebuildRequired,
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Records the new drawable size. Backends that cannot rebuild their
    /// presentation chain only note it; `render` then reports the mismatch.
    fn resize(&mut self, size: RenderSize) -> Result<()>;
    fn render(&mut self) -> Result<FrameStatus>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);
}

#[cfg(test)]
mod tests {
    use super::RenderSize;

    #[test]
    fn zero_area_on_either_axis() {
        assert!(RenderSize { width: 0, height: 600 }.is_zero_area());
        assert!(RenderSize { width: 800, height: 0 }.is_zero_area());
        assert!(!RenderSize { width: 800, height: 600 }.is_zero_area());
    }
}
