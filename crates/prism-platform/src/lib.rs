// SPDX-License-Identifier: CEPL-1.0
//! Window provider. `winit` is re-exported so downstream crates share one
//! version of it.
pub use winit;

use prism_render::RenderSize;
use winit::dpi::PhysicalSize;
use winit::window::Window;

/// Current drawable size of `window` in physical pixels.
pub fn drawable_size(window: &Window) -> RenderSize {
    to_render_size(window.inner_size())
}

pub fn to_render_size(size: PhysicalSize<u32>) -> RenderSize {
    RenderSize {
        width: size.width,
        height: size.height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_size_maps_axis_for_axis() {
        let s = to_render_size(PhysicalSize::new(1280, 720));
        assert_eq!(s, RenderSize { width: 1280, height: 720 });
    }
}
