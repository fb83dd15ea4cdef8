// SPDX-License-Identifier: CEPL-1.0
//! The presentation chain: planning (pure, from capability data) and the
//! live swapchain with one view and framebuffer per image.

use ash::khr::{surface, swapchain};
use ash::vk;
use prism_render::RenderSize;
use tracing::{debug, error, info};

use crate::caps::DeviceCapability;
use crate::device::LogicalDevice;
use crate::error::{VkError, VkResult, VkResultExt};

/// Strict vsync queue. Not negotiated; see `ChainPlan::new`.
pub const PRESENT_MODE: vk::PresentModeKHR = vk::PresentModeKHR::FIFO;

/// First format the surface reports. No further negotiation.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> VkResult<vk::SurfaceFormatKHR> {
    formats.first().copied().ok_or(VkError::NoSurfaceFormat)
}

/// Drawable size clamped per axis into the surface's extent range.
pub fn clamp_extent(drawable: RenderSize, caps: &vk::SurfaceCapabilitiesKHR) -> vk::Extent2D {
    let clamp = |v: u32, lo: u32, hi: u32| v.max(lo).min(hi);
    vk::Extent2D {
        width: clamp(
            drawable.width,
            caps.min_image_extent.width,
            caps.max_image_extent.width,
        ),
        height: clamp(
            drawable.height,
            caps.min_image_extent.height,
            caps.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by the maximum unless it is 0
/// (unbounded).
pub fn image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        want
    } else {
        want.min(caps.max_image_count)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SharingPolicy {
    Exclusive,
    /// Images usable from both families without ownership transfers.
    Concurrent([u32; 2]),
}

pub fn sharing_policy(graphics: u32, present: u32) -> SharingPolicy {
    if graphics == present {
        SharingPolicy::Exclusive
    } else {
        SharingPolicy::Concurrent([graphics, present])
    }
}

/// Every parameter of the swapchain, derived once from capability data.
#[derive(Clone, Copy, Debug)]
pub struct ChainPlan {
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub sharing: SharingPolicy,
    pub present_mode: vk::PresentModeKHR,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl ChainPlan {
    pub fn new(
        cap: &DeviceCapability,
        surface_caps: &vk::SurfaceCapabilitiesKHR,
        drawable: RenderSize,
    ) -> VkResult<Self> {
        let format = choose_surface_format(&cap.surface_formats)?;
        if !cap.present_modes.contains(&PRESENT_MODE) {
            return Err(VkError::PresentModeUnsupported(PRESENT_MODE));
        }
        let graphics = cap.graphics_family.unwrap_or(0);
        let present = cap.present_family.unwrap_or(graphics);

        Ok(ChainPlan {
            format,
            extent: clamp_extent(drawable, surface_caps),
            image_count: image_count(surface_caps),
            sharing: sharing_policy(graphics, present),
            present_mode: PRESENT_MODE,
            pre_transform: surface_caps.current_transform,
        })
    }
}

/// `index` as a slot into a chain of `count` images.
pub fn checked_index(index: u32, count: usize) -> VkResult<usize> {
    let i = index as usize;
    if i < count {
        Ok(i)
    } else {
        Err(VkError::ImageIndexOutOfRange { index, count })
    }
}

/// Maps `vkAcquireNextImageKHR`'s result. The index is passed through
/// unchecked.
pub fn acquire_outcome(result: Result<(u32, bool), vk::Result>) -> VkResult<Acquired> {
    match result {
        Ok((index, suboptimal)) => Ok(Acquired::Ready { index, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::OutOfDate),
        Err(result) => Err(VkError::Call {
            call: "vkAcquireNextImageKHR",
            result,
        }),
    }
}

/// One chain image. `image` belongs to the swapchain and is never destroyed
/// here; `view` and `framebuffer` are owned by the chain.
#[derive(Debug)]
pub struct PresentableImage {
    index: u32,
    image: vk::Image,
    view: vk::ImageView,
    framebuffer: Option<vk::Framebuffer>,
}

impl PresentableImage {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn image(&self) -> vk::Image {
        self.image
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn framebuffer(&self) -> Option<vk::Framebuffer> {
        self.framebuffer
    }
}

/// Result of one acquisition. `index` is whatever the driver returned; once
/// it is here the signal semaphore is pending, so range checks belong to the
/// caller that can also consume that semaphore.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquired {
    Ready { index: u32, suboptimal: bool },
    /// The chain no longer matches the surface. Nothing was acquired and the
    /// signal semaphore stays unsignaled.
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presented {
    Ok,
    Suboptimal,
    OutOfDate,
}

pub struct PresentationChain {
    device: ash::Device,
    loader: swapchain::Device,
    swapchain: vk::SwapchainKHR,
    plan: ChainPlan,
    images: Vec<PresentableImage>,
}

impl PresentationChain {
    /// Builds the swapchain and a colour view per image. Framebuffers come
    /// later from `attach_render_pass`. Any failure releases what was built.
    pub unsafe fn create(
        instance: &ash::Instance,
        device: &LogicalDevice,
        surface_loader: &surface::Instance,
        surface: vk::SurfaceKHR,
        cap: &DeviceCapability,
        drawable: RenderSize,
    ) -> VkResult<Self> {
        let surface_caps = surface_loader
            .get_physical_device_surface_capabilities(cap.phys, surface)
            .vk("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;
        let plan = ChainPlan::new(cap, &surface_caps, drawable)?;
        debug!("swapchain plan: {plan:?}");

        let family_indices: &[u32] = match &plan.sharing {
            SharingPolicy::Exclusive => &[],
            SharingPolicy::Concurrent(families) => families,
        };
        let sharing_mode = match plan.sharing {
            SharingPolicy::Exclusive => vk::SharingMode::EXCLUSIVE,
            SharingPolicy::Concurrent(_) => vk::SharingMode::CONCURRENT,
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(plan.image_count)
            .image_format(plan.format.format)
            .image_color_space(plan.format.color_space)
            .image_extent(plan.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_indices)
            .pre_transform(plan.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(plan.present_mode)
            .clipped(true);

        let loader = swapchain::Device::new(instance, device.handle());

        info!("Creating swapchain");
        let swapchain = loader
            .create_swapchain(&create_info, None)
            .vk("vkCreateSwapchainKHR")
            .inspect_err(|e| error!("Failed to create Vulkan swapchain: {e}"))?;

        let mut chain = PresentationChain {
            device: device.handle().clone(),
            loader,
            swapchain,
            plan,
            images: Vec::new(),
        };

        info!("Acquiring swapchain images");
        let raw_images = chain
            .loader
            .get_swapchain_images(swapchain)
            .vk("vkGetSwapchainImagesKHR")?;
        chain.images.reserve(raw_images.len());

        for (i, image) in raw_images.into_iter().enumerate() {
            let view_info = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format: plan.format.format,
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            };
            let view = chain
                .device
                .create_image_view(&view_info, None)
                .vk("vkCreateImageView")?;
            chain.images.push(PresentableImage {
                index: i as u32,
                image,
                view,
                framebuffer: None,
            });
        }

        info!(
            "Swapchain ready ({}x{}, {:?}, {} images)",
            plan.extent.width,
            plan.extent.height,
            plan.format.format,
            chain.images.len()
        );
        Ok(chain)
    }

    /// (Re)creates one single-attachment framebuffer per image for `pass`.
    /// The pass must have been built for `self.format()`.
    pub unsafe fn attach_render_pass(&mut self, pass: vk::RenderPass) -> VkResult<()> {
        self.destroy_framebuffers();
        let extent = self.plan.extent;
        for img in &mut self.images {
            let attachments = [img.view];
            let fb_info = vk::FramebufferCreateInfo::default()
                .render_pass(pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            img.framebuffer = Some(
                self.device
                    .create_framebuffer(&fb_info, None)
                    .vk("vkCreateFramebuffer")?,
            );
        }
        Ok(())
    }

    /// Next presentable image, waiting without bound. `signal` is signaled
    /// once the image may be written.
    pub unsafe fn acquire(&self, signal: vk::Semaphore) -> VkResult<Acquired> {
        acquire_outcome(self.loader.acquire_next_image(
            self.swapchain,
            u64::MAX,
            signal,
            vk::Fence::null(),
        ))
    }

    /// Queues image `index` for display once `wait` is signaled.
    pub unsafe fn present(
        &self,
        queue: vk::Queue,
        wait: vk::Semaphore,
        index: u32,
    ) -> VkResult<Presented> {
        checked_index(index, self.images.len())?;
        let waits = [wait];
        let swapchains = [self.swapchain];
        let indices = [index];
        let present = vk::PresentInfoKHR::default()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);

        match self.loader.queue_present(queue, &present) {
            Ok(false) => Ok(Presented::Ok),
            Ok(true) => Ok(Presented::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Presented::OutOfDate),
            Err(result) => Err(VkError::Call {
                call: "vkQueuePresentKHR",
                result,
            }),
        }
    }

    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.plan.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.plan.extent
    }

    pub fn plan(&self) -> &ChainPlan {
        &self.plan
    }

    pub fn images(&self) -> &[PresentableImage] {
        &self.images
    }

    pub fn image(&self, index: u32) -> VkResult<&PresentableImage> {
        checked_index(index, self.images.len()).map(|i| &self.images[i])
    }

    unsafe fn destroy_framebuffers(&mut self) {
        for img in &mut self.images {
            if let Some(fb) = img.framebuffer.take() {
                self.device.destroy_framebuffer(fb, None);
            }
        }
    }
}

impl Drop for PresentationChain {
    fn drop(&mut self) {
        info!("Destroying swapchain");
        unsafe {
            self.destroy_framebuffers();
            for img in &self.images {
                self.device.destroy_image_view(img.view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::fake::{test_surface, FakeDevice, FakeQuery};
    use crate::caps::{probe, DeviceClass};

    fn surface_caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 16384,
                height: 16384,
            },
            max_image_array_layers: 1,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        }
    }

    fn capability(dev: FakeDevice) -> DeviceCapability {
        let q = FakeQuery::new(vec![dev]);
        probe(&q, q.handles()[0], Some(test_surface()))
    }

    #[test]
    fn standard_window_plan() {
        let mut dev = FakeDevice::capable("gpu", DeviceClass::Discrete, 1 << 30);
        dev.formats = vec![vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        let cap = capability(dev);

        let plan = ChainPlan::new(
            &cap,
            &surface_caps(2, 0),
            RenderSize {
                width: 800,
                height: 600,
            },
        )
        .unwrap();

        assert_eq!((plan.extent.width, plan.extent.height), (800, 600));
        assert_eq!(plan.image_count, 3);
        assert_eq!(plan.format.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(plan.format.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        assert_eq!(plan.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(plan.sharing, SharingPolicy::Exclusive);
        assert_eq!(plan.pre_transform, vk::SurfaceTransformFlagsKHR::IDENTITY);
    }

    #[test]
    fn first_reported_format_is_taken() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R16G16B16A16_SFLOAT,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R16G16B16A16_SFLOAT);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT);
        assert!(matches!(
            choose_surface_format(&[]),
            Err(VkError::NoSurfaceFormat)
        ));
    }

    #[test]
    fn image_count_bounds() {
        for min in 1..6 {
            for max in [0, 1, 2, 3, 4, 8] {
                if max != 0 && max < min {
                    continue;
                }
                let n = image_count(&surface_caps(min, max));
                if max == 0 {
                    assert_eq!(n, min + 1);
                } else {
                    assert!(n <= max, "min {min} max {max} -> {n}");
                    assert_eq!(n, (min + 1).min(max));
                }
            }
        }
    }

    #[test]
    fn extent_always_lands_in_bounds() {
        let bounds = [(1, 1, 4096, 4096), (640, 480, 640, 480), (200, 100, 1920, 1080)];
        let sizes = [(0, 0), (1, 1), (800, 600), (5000, 100), (100, 5000), (u32::MAX, 7)];
        for (min_w, min_h, max_w, max_h) in bounds {
            let mut caps = surface_caps(2, 0);
            caps.min_image_extent = vk::Extent2D {
                width: min_w,
                height: min_h,
            };
            caps.max_image_extent = vk::Extent2D {
                width: max_w,
                height: max_h,
            };
            for (w, h) in sizes {
                let e = clamp_extent(
                    RenderSize {
                        width: w,
                        height: h,
                    },
                    &caps,
                );
                assert!((min_w..=max_w).contains(&e.width), "{w}x{h} -> {e:?}");
                assert!((min_h..=max_h).contains(&e.height), "{w}x{h} -> {e:?}");
            }
        }
    }

    #[test]
    fn split_families_share_concurrently() {
        assert_eq!(sharing_policy(1, 1), SharingPolicy::Exclusive);
        assert_eq!(sharing_policy(0, 2), SharingPolicy::Concurrent([0, 2]));

        let mut dev = FakeDevice::capable("gpu", DeviceClass::Discrete, 1 << 30);
        dev.families = vec![vk::QueueFlags::GRAPHICS, vk::QueueFlags::TRANSFER];
        dev.present = vec![1];
        let plan = ChainPlan::new(
            &capability(dev),
            &surface_caps(2, 3),
            RenderSize {
                width: 64,
                height: 64,
            },
        )
        .unwrap();
        assert_eq!(plan.sharing, SharingPolicy::Concurrent([0, 1]));
    }

    #[test]
    fn fixed_present_mode_must_be_supported() {
        let mut dev = FakeDevice::capable("gpu", DeviceClass::Discrete, 1 << 30);
        dev.modes = vec![vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE];
        let err = ChainPlan::new(
            &capability(dev),
            &surface_caps(2, 0),
            RenderSize {
                width: 64,
                height: 64,
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            VkError::PresentModeUnsupported(vk::PresentModeKHR::FIFO)
        ));
    }

    #[test]
    fn acquired_index_passes_through_unchecked() {
        // out of range for any chain here; still Ready so the frame loop can
        // consume the signaled semaphore before failing
        assert_eq!(
            acquire_outcome(Ok((7, false))).unwrap(),
            Acquired::Ready {
                index: 7,
                suboptimal: false
            }
        );
        assert_eq!(
            acquire_outcome(Ok((1, true))).unwrap(),
            Acquired::Ready {
                index: 1,
                suboptimal: true
            }
        );
        assert_eq!(
            acquire_outcome(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            Acquired::OutOfDate
        );
        assert!(matches!(
            acquire_outcome(Err(vk::Result::ERROR_SURFACE_LOST_KHR)),
            Err(VkError::Call {
                call: "vkAcquireNextImageKHR",
                result: vk::Result::ERROR_SURFACE_LOST_KHR
            })
        ));
    }

    #[test]
    fn index_outside_chain_is_rejected() {
        assert_eq!(checked_index(2, 3).unwrap(), 2);
        assert!(matches!(
            checked_index(3, 3),
            Err(VkError::ImageIndexOutOfRange { index: 3, count: 3 })
        ));
    }
}
