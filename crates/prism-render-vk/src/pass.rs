// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::info;

use crate::error::{VkResult, VkResultExt};

/// The single colour attachment: cleared on load, stored, and left ready
/// for presentation.
pub fn color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..Default::default()
    }
}

/// Orders the layout transition after the acquire-semaphore wait, which
/// happens at COLOR_ATTACHMENT_OUTPUT.
fn acquire_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ..Default::default()
    }
}

pub struct RenderPass {
    device: ash::Device,
    pass: vk::RenderPass,
    format: vk::Format,
}

impl RenderPass {
    pub unsafe fn new(device: &ash::Device, format: vk::Format) -> VkResult<Self> {
        let attachments = [color_attachment(format)];
        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)];
        let dependencies = [acquire_dependency()];

        let info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        info!("Creating render pass");
        let pass = device
            .create_render_pass(&info, None)
            .vk("vkCreateRenderPass")?;
        Ok(RenderPass {
            device: device.clone(),
            pass,
            format,
        })
    }

    pub fn handle(&self) -> vk::RenderPass {
        self.pass
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        info!("Destroying render pass");
        unsafe {
            self.device.destroy_render_pass(self.pass, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_clears_and_ends_presentable() {
        let a = color_attachment(vk::Format::B8G8R8A8_SRGB);
        assert_eq!(a.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(a.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(a.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(a.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(a.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(a.samples, vk::SampleCountFlags::TYPE_1);
    }

    #[test]
    fn dependency_waits_on_colour_output() {
        let d = acquire_dependency();
        assert_eq!(d.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(d.dst_subpass, 0);
        assert!(d
            .dst_stage_mask
            .contains(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT));
        assert!(d
            .dst_access_mask
            .contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
    }
}
