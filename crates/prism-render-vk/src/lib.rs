// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend: one window, one triangle, two frames in flight.

use std::path::PathBuf;

use anyhow::{Context, Result};
use prism_render::{FrameStatus, RenderSize, Renderer};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{info, trace, warn};

pub mod backend;
pub mod caps;
pub mod device;
pub mod error;
pub mod frame;
pub mod instance;
pub mod pass;
pub mod pipeline;
pub mod select;
pub mod shader;
pub mod swapchain;

use backend::SwapchainBackend;
use caps::AshQuery;
use device::LogicalDevice;
use frame::FrameScheduler;
use instance::{Surface, VkInstance};
use pass::RenderPass;
use pipeline::GraphicsPipeline;
use select::{select_device, REQUIRED_EXTENSIONS};
use shader::{ShaderModule, ShaderSource};
use swapchain::PresentationChain;

pub use error::{VkError, VkResult};

pub const DEFAULT_CLEAR_COLOR: [f32; 4] = [0.02, 0.02, 0.04, 1.0];

/// Startup knobs. Shader paths replace the embedded triangle stages.
#[derive(Clone, Debug)]
pub struct VkOptions {
    pub vertex_shader: Option<PathBuf>,
    pub fragment_shader: Option<PathBuf>,
    pub clear_color: [f32; 4],
}

impl Default for VkOptions {
    fn default() -> Self {
        VkOptions {
            vertex_shader: None,
            fragment_shader: None,
            clear_color: DEFAULT_CLEAR_COLOR,
        }
    }
}

impl VkOptions {
    fn vertex_source(&self) -> ShaderSource {
        self.vertex_shader
            .clone()
            .map_or_else(ShaderSource::triangle_vertex, ShaderSource::File)
    }

    fn fragment_source(&self) -> ShaderSource {
        self.fragment_shader
            .clone()
            .map_or_else(ShaderSource::triangle_fragment, ShaderSource::File)
    }
}

/// True when the chain was built for a different size than `drawable`.
fn chain_is_stale(drawable: RenderSize, extent: ash::vk::Extent2D) -> bool {
    drawable.width != extent.width || drawable.height != extent.height
}

// Field order is teardown order.
pub struct VkRenderer {
    frames: FrameScheduler<SwapchainBackend>,
    device: LogicalDevice,
    _surface: Surface,
    _instance: VkInstance,
    device_name: String,
    drawable: RenderSize,
    stale: bool,
}

impl VkRenderer {
    pub fn with_options(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        options: &VkOptions,
    ) -> Result<Self> {
        let raw_display = display
            .display_handle()
            .map_err(VkError::from)?
            .as_raw();
        let raw_window = window.window_handle().map_err(VkError::from)?.as_raw();

        unsafe {
            let instance =
                VkInstance::new(raw_display).context("creating Vulkan instance")?;
            let surface = Surface::new(&instance, raw_display, raw_window)
                .context("creating window surface")?;

            let devices = instance.enumerate_devices()?;
            let query = AshQuery {
                instance: instance.handle(),
                surface_loader: surface.loader(),
            };
            let cap = select_device(&query, &devices, Some(surface.handle()), REQUIRED_EXTENSIONS)
                .context("selecting a graphics device")?;
            info!("Selected {} ({:?})", cap.name, cap.class);

            let device = LogicalDevice::create(instance.handle(), &cap, REQUIRED_EXTENSIONS)
                .context("creating logical device")?;

            let mut chain = PresentationChain::create(
                instance.handle(),
                &device,
                surface.loader(),
                surface.handle(),
                &cap,
                size,
            )
            .context("creating presentation chain")?;

            let pass = RenderPass::new(device.handle(), chain.format().format)?;
            let vert = ShaderModule::new(device.handle(), &options.vertex_source())?;
            let frag = ShaderModule::new(device.handle(), &options.fragment_source())?;
            let pipeline = GraphicsPipeline::new(device.handle(), &pass, &vert, &frag)
                .context("creating graphics pipeline")?;
            chain.attach_render_pass(pass.handle())?;

            let backend =
                SwapchainBackend::new(&device, chain, pass, pipeline, options.clear_color)?;
            let frames = FrameScheduler::new(backend).context("creating frame slots")?;

            Ok(VkRenderer {
                frames,
                device,
                _surface: surface,
                _instance: instance,
                device_name: cap.name,
                drawable: size,
                stale: false,
            })
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn frame_number(&self) -> u64 {
        self.frames.frame_number()
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
    ) -> Result<Self> {
        Self::with_options(window, display, size, &VkOptions::default())
    }

    fn resize(&mut self, size: RenderSize) -> Result<()> {
        if size == self.drawable {
            return Ok(());
        }
        let extent = self.frames.backend().chain().extent();
        self.drawable = size;
        self.stale = chain_is_stale(size, extent);
        if self.stale {
            info!(
                "drawable now {}x{}, chain still {}x{}",
                size.width, size.height, extent.width, extent.height
            );
        }
        Ok(())
    }

    fn render(&mut self) -> Result<FrameStatus> {
        match self.frames.render_frame() {
            Ok(report) => {
                if report.suboptimal {
                    trace!("image {} presented suboptimally", report.image_index);
                }
                Ok(FrameStatus::Presented)
            }
            Err(e) if e.is_recoverable() => {
                if self.stale {
                    warn!(
                        "{e} (drawable resized to {}x{})",
                        self.drawable.width, self.drawable.height
                    );
                } else {
                    warn!("{e}");
                }
                Ok(FrameStatus::RebuildRequired)
            }
            Err(e) => Err(e).context("rendering frame"),
        }
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.frames.backend_mut().set_clear_color(rgba);
    }
}

impl Drop for VkRenderer {
    fn drop(&mut self) {
        info!("Shutting down renderer after {} frames", self.frames.frame_number());
        // presentation has no fence; the scheduler's own wait covers only submissions
        self.device.wait_idle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_goes_stale_only_on_size_change() {
        let extent = ash::vk::Extent2D {
            width: 800,
            height: 600,
        };
        let size = |width, height| RenderSize { width, height };
        assert!(!chain_is_stale(size(800, 600), extent));
        assert!(chain_is_stale(size(801, 600), extent));
        assert!(chain_is_stale(size(800, 599), extent));
    }

    #[test]
    fn default_options_use_embedded_triangle() {
        let opts = VkOptions::default();
        assert!(matches!(opts.vertex_source(), ShaderSource::Embedded { name: "tri.vert", .. }));
        assert!(matches!(opts.fragment_source(), ShaderSource::Embedded { name: "tri.frag", .. }));
        assert_eq!(opts.clear_color, DEFAULT_CLEAR_COLOR);
    }

    #[test]
    fn shader_paths_override_embedded_stages() {
        let opts = VkOptions {
            fragment_shader: Some(PathBuf::from("shaders/flat.frag.spv")),
            ..VkOptions::default()
        };
        assert!(matches!(opts.vertex_source(), ShaderSource::Embedded { .. }));
        match opts.fragment_source() {
            ShaderSource::File(p) => assert!(p.ends_with("flat.frag.spv")),
            other => panic!("expected file source, got {other:?}"),
        }
    }
}
