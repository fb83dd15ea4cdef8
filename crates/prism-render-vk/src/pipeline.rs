// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::info;

use crate::error::{VkError, VkResult, VkResultExt};
use crate::pass::RenderPass;
use crate::shader::ShaderModule;

/// Viewport and scissor are set per frame from the chain extent.
pub const DYNAMIC_STATES: [vk::DynamicState; 2] =
    [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

/// Fixed-function state for the vertex-input-free triangle.
pub fn rasterization_state() -> vk::PipelineRasterizationStateCreateInfo<'static> {
    vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false)
        .line_width(1.0)
}

pub struct GraphicsPipeline {
    device: ash::Device,
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
}

impl GraphicsPipeline {
    pub unsafe fn new(
        device: &ash::Device,
        pass: &RenderPass,
        vertex: &ShaderModule,
        fragment: &ShaderModule,
    ) -> VkResult<Self> {
        let entry = c"main";
        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex.handle())
                .name(entry),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment.handle())
                .name(entry),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);
        // counts only; the rectangles are dynamic
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let raster = rasterization_state();
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let blend_attachments = [vk::PipelineColorBlendAttachmentState {
            color_write_mask: vk::ColorComponentFlags::RGBA,
            blend_enable: vk::FALSE,
            ..Default::default()
        }];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&DYNAMIC_STATES);

        info!("Creating pipeline layout");
        let layout = device
            .create_pipeline_layout(&vk::PipelineLayoutCreateInfo::default(), None)
            .vk("vkCreatePipelineLayout")?;

        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&raster)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(pass.handle())
            .subpass(0);

        info!("Creating graphics pipeline");
        let pipeline = match device.create_graphics_pipelines(
            vk::PipelineCache::null(),
            std::slice::from_ref(&info),
            None,
        ) {
            Ok(pipelines) => pipelines[0],
            Err((_, result)) => {
                device.destroy_pipeline_layout(layout, None);
                return Err(VkError::Call {
                    call: "vkCreateGraphicsPipelines",
                    result,
                });
            }
        };

        Ok(GraphicsPipeline {
            device: device.clone(),
            layout,
            pipeline,
        })
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        info!("Destroying graphics pipeline");
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_and_scissor_are_dynamic() {
        assert!(DYNAMIC_STATES.contains(&vk::DynamicState::VIEWPORT));
        assert!(DYNAMIC_STATES.contains(&vk::DynamicState::SCISSOR));
    }

    #[test]
    fn triangle_is_culled_clockwise_front() {
        let r = rasterization_state();
        assert_eq!(r.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(r.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(r.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(r.line_width, 1.0);
    }
}
