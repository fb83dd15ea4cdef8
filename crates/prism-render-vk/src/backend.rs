// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::info;

use crate::device::{LogicalDevice, QueueHandle};
use crate::error::{VkError, VkResult, VkResultExt};
use crate::frame::{AcquireStatus, FrameBackend, FrameSlot, Submission};
use crate::pass::RenderPass;
use crate::pipeline::GraphicsPipeline;
use crate::swapchain::{Acquired, PresentationChain, Presented};

pub fn clear_value(rgba: [f32; 4]) -> vk::ClearValue {
    vk::ClearValue {
        color: vk::ClearColorValue { float32: rgba },
    }
}

impl From<Acquired> for AcquireStatus {
    fn from(acquired: Acquired) -> Self {
        match acquired {
            Acquired::Ready { index, suboptimal } => AcquireStatus::Ready { index, suboptimal },
            Acquired::OutOfDate => AcquireStatus::OutOfDate,
        }
    }
}

/// Frame operations against the live device, chain, pass and pipeline.
///
/// Must be dropped before the `LogicalDevice` it was built from.
pub struct SwapchainBackend {
    device: ash::Device,
    graphics: QueueHandle,
    present: QueueHandle,
    pool: vk::CommandPool,
    clear: vk::ClearValue,
    // drop order: framebuffers before the pass they were made for
    chain: PresentationChain,
    pipeline: GraphicsPipeline,
    pass: RenderPass,
}

impl SwapchainBackend {
    /// Takes ownership of the render objects. The chain must already have
    /// framebuffers for `pass`.
    pub unsafe fn new(
        device: &LogicalDevice,
        chain: PresentationChain,
        pass: RenderPass,
        pipeline: GraphicsPipeline,
        clear_color: [f32; 4],
    ) -> VkResult<Self> {
        let graphics = device.graphics();
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(
                vk::CommandPoolCreateFlags::TRANSIENT
                    | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )
            .queue_family_index(graphics.family);

        info!("Creating command pool");
        let pool = device
            .handle()
            .create_command_pool(&pool_info, None)
            .vk("vkCreateCommandPool")?;

        Ok(SwapchainBackend {
            device: device.handle().clone(),
            graphics,
            present: device.present(),
            pool,
            clear: clear_value(clear_color),
            chain,
            pipeline,
            pass,
        })
    }

    pub fn chain(&self) -> &PresentationChain {
        &self.chain
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear = clear_value(rgba);
    }

    unsafe fn build_slot(&self, slot: &mut FrameSlot) -> VkResult<()> {
        let sem_info = vk::SemaphoreCreateInfo::default();
        slot.acquire = self
            .device
            .create_semaphore(&sem_info, None)
            .vk("vkCreateSemaphore")?;
        slot.release = self
            .device
            .create_semaphore(&sem_info, None)
            .vk("vkCreateSemaphore")?;
        // signaled so the first wait on each slot returns at once
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
        slot.fence = self
            .device
            .create_fence(&fence_info, None)
            .vk("vkCreateFence")?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        slot.commands = self
            .device
            .allocate_command_buffers(&alloc_info)
            .vk("vkAllocateCommandBuffers")?[0];
        Ok(())
    }

    /// Null handles are skipped, so this also cleans up half-built slots.
    unsafe fn release_slot(&self, slot: FrameSlot) {
        if slot.commands != vk::CommandBuffer::null() {
            self.device
                .free_command_buffers(self.pool, &[slot.commands]);
        }
        if slot.fence != vk::Fence::null() {
            self.device.destroy_fence(slot.fence, None);
        }
        for sem in [slot.acquire, slot.release] {
            if sem != vk::Semaphore::null() {
                self.device.destroy_semaphore(sem, None);
            }
        }
    }
}

impl FrameBackend for SwapchainBackend {
    fn create_slot(&mut self) -> VkResult<FrameSlot> {
        let mut slot = FrameSlot {
            acquire: vk::Semaphore::null(),
            release: vk::Semaphore::null(),
            fence: vk::Fence::null(),
            commands: vk::CommandBuffer::null(),
        };
        unsafe {
            if let Err(e) = self.build_slot(&mut slot) {
                self.release_slot(slot);
                return Err(e);
            }
        }
        Ok(slot)
    }

    fn destroy_slot(&mut self, slot: FrameSlot) {
        unsafe { self.release_slot(slot) }
    }

    fn wait_for_fences(&mut self, fences: &[vk::Fence]) -> VkResult<()> {
        unsafe {
            self.device
                .wait_for_fences(fences, true, u64::MAX)
                .vk("vkWaitForFences")
        }
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]).vk("vkResetFences") }
    }

    fn begin_commands(&mut self, commands: vk::CommandBuffer) -> VkResult<()> {
        let begin = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .reset_command_buffer(commands, vk::CommandBufferResetFlags::empty())
                .vk("vkResetCommandBuffer")?;
            self.device
                .begin_command_buffer(commands, &begin)
                .vk("vkBeginCommandBuffer")
        }
    }

    fn acquire(&mut self, signal: vk::Semaphore) -> VkResult<AcquireStatus> {
        unsafe { self.chain.acquire(signal) }.map(AcquireStatus::from)
    }

    fn image_count(&self) -> usize {
        self.chain.images().len()
    }

    fn record_draw(&mut self, cmd: vk::CommandBuffer, image_index: u32) -> VkResult<()> {
        let framebuffer = self
            .chain
            .image(image_index)?
            .framebuffer()
            .ok_or(VkError::RenderPassMissing)?;
        let extent = self.chain.extent();
        let area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let clears = [self.clear];
        let begin = vk::RenderPassBeginInfo::default()
            .render_pass(self.pass.handle())
            .framebuffer(framebuffer)
            .render_area(area)
            .clear_values(&clears);
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            let d = &self.device;
            d.cmd_begin_render_pass(cmd, &begin, vk::SubpassContents::INLINE);
            d.cmd_set_viewport(cmd, 0, &[viewport]);
            d.cmd_set_scissor(cmd, 0, &[area]);
            d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());
            d.cmd_draw(cmd, 3, 1, 0, 0);
            d.cmd_end_render_pass(cmd);
            d.end_command_buffer(cmd).vk("vkEndCommandBuffer")
        }
    }

    fn submit(&mut self, s: &Submission) -> VkResult<()> {
        let waits = [s.wait];
        let stages = [s.wait_stage];
        let commands: Vec<vk::CommandBuffer> = s.commands.into_iter().collect();
        let signals: Vec<vk::Semaphore> = s.signal.into_iter().collect();
        let info = vk::SubmitInfo::default()
            .wait_semaphores(&waits)
            .wait_dst_stage_mask(&stages)
            .command_buffers(&commands)
            .signal_semaphores(&signals);
        unsafe {
            self.device
                .queue_submit(self.graphics.queue, std::slice::from_ref(&info), s.fence)
                .vk("vkQueueSubmit")
        }
    }

    fn present(&mut self, wait: vk::Semaphore, image_index: u32) -> VkResult<Presented> {
        unsafe { self.chain.present(self.present.queue, wait, image_index) }
    }

    fn renew_sync(&mut self, slot: &mut FrameSlot) -> VkResult<()> {
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
        unsafe {
            // the old semaphore may still be signaled; nothing on our queues
            // may reference it when it goes
            self.device.device_wait_idle().vk("vkDeviceWaitIdle")?;
            let fence = self
                .device
                .create_fence(&fence_info, None)
                .vk("vkCreateFence")?;
            let acquire = match self
                .device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
            {
                Ok(s) => s,
                Err(result) => {
                    self.device.destroy_fence(fence, None);
                    return Err(VkError::Call {
                        call: "vkCreateSemaphore",
                        result,
                    });
                }
            };
            self.device.destroy_fence(slot.fence, None);
            self.device.destroy_semaphore(slot.acquire, None);
            slot.fence = fence;
            slot.acquire = acquire;
        }
        Ok(())
    }
}

impl Drop for SwapchainBackend {
    fn drop(&mut self) {
        info!("Destroying command pool");
        unsafe {
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_acquisition_reaches_the_scheduler() {
        assert_eq!(
            AcquireStatus::from(Acquired::Ready {
                index: 9,
                suboptimal: false
            }),
            AcquireStatus::Ready {
                index: 9,
                suboptimal: false
            }
        );
        assert_eq!(
            AcquireStatus::from(Acquired::OutOfDate),
            AcquireStatus::OutOfDate
        );
    }

    #[test]
    fn clear_value_carries_rgba() {
        let v = clear_value([0.1, 0.2, 0.3, 1.0]);
        assert_eq!(unsafe { v.color.float32 }, [0.1, 0.2, 0.3, 1.0]);
    }
}
