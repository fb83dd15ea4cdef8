// SPDX-License-Identifier: CEPL-1.0
//! Double-buffered frame loop.
//!
//! Each of the two slots owns an acquire semaphore, a release semaphore, a
//! completion fence (created signaled) and one primary command buffer. Per
//! frame, strictly in order:
//!
//! ```text
//! 1. wait     slot fence (the only CPU backpressure: at most 2 frames in flight)
//! 2. begin    reset + begin the slot's command buffer (one-time submit)
//! 3. acquire  next chain image, signaling the acquire semaphore
//!             OutOfDate => stop here, report rebuild-required
//! 4. record   render pass, viewport/scissor, pipeline, draw(3, 1)
//! 5. submit   reset fence; wait acquire @ COLOR_ATTACHMENT_OUTPUT,
//!             signal release + fence
//! 6. present  wait release
//! 7. advance  current = (current + 1) % 2
//! ```
//!
//! Dropping the scheduler waits on every slot fence before any slot object
//! is destroyed.

use ash::vk;
use tracing::{error, trace, warn};

use crate::error::{VkError, VkResult};
use crate::swapchain::{checked_index, Presented};

pub const FRAMES_IN_FLIGHT: usize = 2;

/// Synchronisation and command state for one in-flight frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameSlot {
    /// Signaled by acquisition; submission waits on it.
    pub acquire: vk::Semaphore,
    /// Signaled by submission; presentation waits on it.
    pub release: vk::Semaphore,
    /// Signaled when the slot's last submission retired.
    pub fence: vk::Fence,
    pub commands: vk::CommandBuffer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireStatus {
    Ready { index: u32, suboptimal: bool },
    OutOfDate,
}

/// One graphics-queue batch. Recovery batches carry no commands and no
/// signal semaphore; they only consume `wait` and signal `fence`.
#[derive(Clone, Copy, Debug)]
pub struct Submission {
    pub commands: Option<vk::CommandBuffer>,
    pub wait: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub signal: Option<vk::Semaphore>,
    pub fence: vk::Fence,
}

/// GPU operations the scheduler sequences.
pub trait FrameBackend {
    fn create_slot(&mut self) -> VkResult<FrameSlot>;
    /// Only called once the slot's fence is known to be signaled.
    fn destroy_slot(&mut self, slot: FrameSlot);
    /// Blocks without timeout until every fence is signaled.
    fn wait_for_fences(&mut self, fences: &[vk::Fence]) -> VkResult<()>;
    fn reset_fence(&mut self, fence: vk::Fence) -> VkResult<()>;
    fn begin_commands(&mut self, commands: vk::CommandBuffer) -> VkResult<()>;
    fn acquire(&mut self, signal: vk::Semaphore) -> VkResult<AcquireStatus>;
    fn image_count(&self) -> usize;
    /// Records the frame into `commands` and ends the buffer.
    fn record_draw(&mut self, commands: vk::CommandBuffer, image_index: u32) -> VkResult<()>;
    fn submit(&mut self, submission: &Submission) -> VkResult<()>;
    fn present(&mut self, wait: vk::Semaphore, image_index: u32) -> VkResult<Presented>;
    /// Replaces the slot's fence (with a signaled one) and its acquire
    /// semaphore (with an unsignaled one). On error `slot` is left untouched.
    fn renew_sync(&mut self, slot: &mut FrameSlot) -> VkResult<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameReport {
    pub slot: usize,
    pub image_index: u32,
    pub suboptimal: bool,
}

pub struct FrameScheduler<B: FrameBackend> {
    slots: Vec<FrameSlot>,
    current: usize,
    frame_number: u64,
    /// Set when a slot's sync objects could not be restored; waiting on
    /// them could block forever.
    lost: bool,
    backend: B,
}

impl<B: FrameBackend> FrameScheduler<B> {
    pub fn new(backend: B) -> VkResult<Self> {
        let mut this = FrameScheduler {
            slots: Vec::with_capacity(FRAMES_IN_FLIGHT),
            current: 0,
            frame_number: 0,
            lost: false,
            backend,
        };
        tracing::info!("Creating frame data for {FRAMES_IN_FLIGHT} frames");
        for _ in 0..FRAMES_IN_FLIGHT {
            let slot = this.backend.create_slot()?;
            this.slots.push(slot);
        }
        Ok(this)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// Frames presented (or at least submitted) so far.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Runs one iteration of the loop. `Err(VkError::OutOfDate)` means the
    /// chain must be rebuilt; slot state stays consistent either way.
    pub fn render_frame(&mut self) -> VkResult<FrameReport> {
        if self.lost {
            return Err(VkError::FrameSlotLost);
        }
        let slot_index = self.current;
        let slot = self.slots[slot_index];

        self.backend.wait_for_fences(&[slot.fence])?;
        self.backend.begin_commands(slot.commands)?;

        let (image_index, suboptimal) = match self.backend.acquire(slot.acquire)? {
            AcquireStatus::Ready { index, suboptimal } => (index, suboptimal),
            AcquireStatus::OutOfDate => {
                warn!("presentation chain out of date at frame {}", self.frame_number);
                return Err(VkError::OutOfDate);
            }
        };
        trace!("frame {} slot {slot_index} image {image_index}", self.frame_number);

        // The acquire semaphore is now pending; from here every exit consumes it.
        if let Err(e) = checked_index(image_index, self.backend.image_count()) {
            self.release_acquired(slot_index, true);
            return Err(e);
        }
        if let Err(e) = self.backend.record_draw(slot.commands, image_index) {
            self.release_acquired(slot_index, true);
            return Err(e);
        }
        if let Err(e) = self.backend.reset_fence(slot.fence) {
            self.release_acquired(slot_index, true);
            return Err(e);
        }
        let submission = Submission {
            commands: Some(slot.commands),
            wait: slot.acquire,
            wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            signal: Some(slot.release),
            fence: slot.fence,
        };
        if let Err(e) = self.backend.submit(&submission) {
            self.release_acquired(slot_index, false);
            return Err(e);
        }

        let presented = self.backend.present(slot.release, image_index);
        self.advance();

        match presented? {
            Presented::Ok => Ok(FrameReport {
                slot: slot_index,
                image_index,
                suboptimal,
            }),
            Presented::Suboptimal => {
                trace!("presentation suboptimal for image {image_index}");
                Ok(FrameReport {
                    slot: slot_index,
                    image_index,
                    suboptimal: true,
                })
            }
            Presented::OutOfDate => {
                warn!("presentation chain out of date at present");
                Err(VkError::OutOfDate)
            }
        }
    }

    /// Blocks until no slot has work in flight.
    pub fn wait_idle(&mut self) -> VkResult<()> {
        if self.lost {
            return Err(VkError::FrameSlotLost);
        }
        let fences: Vec<vk::Fence> = self.slots.iter().map(|s| s.fence).collect();
        self.backend.wait_for_fences(&fences)
    }

    fn advance(&mut self) {
        self.current = (self.current + 1) % FRAMES_IN_FLIGHT;
        self.frame_number += 1;
    }

    /// Consumes a signaled-but-unused acquire semaphore with an empty batch
    /// that also re-arms the slot fence for the next wait. If that batch
    /// cannot be queued the slot's fence and acquire semaphore are replaced,
    /// so the slot never holds a reset fence with nothing pending.
    fn release_acquired(&mut self, slot_index: usize, fence_signaled: bool) {
        let slot = self.slots[slot_index];
        let reset = if fence_signaled {
            self.backend.reset_fence(slot.fence)
        } else {
            Ok(())
        };
        let drain = Submission {
            commands: None,
            wait: slot.acquire,
            wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            signal: None,
            fence: slot.fence,
        };
        let Err(e) = reset.and_then(|()| self.backend.submit(&drain)) else {
            return;
        };

        warn!("could not release acquire semaphore ({e}); renewing slot {slot_index} sync");
        let mut renewed = slot;
        match self.backend.renew_sync(&mut renewed) {
            Ok(()) => self.slots[slot_index] = renewed,
            Err(e) => {
                error!("frame slot {slot_index} lost: {e}");
                self.lost = true;
            }
        }
    }
}

impl<B: FrameBackend> Drop for FrameScheduler<B> {
    fn drop(&mut self) {
        if self.lost {
            warn!("a frame slot was lost; leaking frame slots");
            return;
        }
        tracing::info!("Waiting for rendering commands to finish");
        if let Err(e) = self.wait_idle() {
            // Destroying objects a submission may still reference is worse
            // than leaking them.
            warn!("frame drain failed ({e}); leaking frame slots");
            return;
        }
        for slot in self.slots.drain(..) {
            self.backend.destroy_slot(slot);
        }
    }
}
