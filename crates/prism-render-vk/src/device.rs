// SPDX-License-Identifier: CEPL-1.0
use std::ffi::CStr;

use ash::vk;
use tracing::{error, info};

use crate::caps::DeviceCapability;
use crate::error::{VkError, VkResult, VkResultExt};

const DEFAULT_QUEUE_PRIORITY: [f32; 1] = [1.0];

/// A queue retrieved from the logical device. Two handles naming the same
/// family and index refer to the same queue even if `queue` differs.
#[derive(Clone, Copy, Debug)]
pub struct QueueHandle {
    pub family: u32,
    pub index: u32,
    pub queue: vk::Queue,
}

impl QueueHandle {
    pub fn same_queue(&self, other: &QueueHandle) -> bool {
        self.family == other.family && self.index == other.index
    }
}

/// Families to request queues from: graphics first, presentation only when
/// it differs.
pub fn unique_families(graphics: u32, present: u32) -> Vec<u32> {
    if graphics == present {
        vec![graphics]
    } else {
        vec![graphics, present]
    }
}

/// Owns the `VkDevice`. Every object created from it must be dropped first.
pub struct LogicalDevice {
    device: ash::Device,
    graphics: QueueHandle,
    present: QueueHandle,
}

impl LogicalDevice {
    /// Creates the device for `cap` with one queue per distinct family and
    /// `extensions` enabled. Failure is fatal; there is no retry.
    pub unsafe fn create(
        instance: &ash::Instance,
        cap: &DeviceCapability,
        extensions: &[&CStr],
    ) -> VkResult<Self> {
        let (graphics_family, present_family) = match (cap.graphics_family, cap.present_family) {
            (Some(g), Some(p)) if cap.is_eligible(extensions) => (g, p),
            _ => {
                error!(
                    "Cannot create logical device for {} - does not support required features",
                    cap.name
                );
                return Err(VkError::NoCompatibleDevice { candidates: 1 });
            }
        };

        let queue_infos: Vec<vk::DeviceQueueCreateInfo> =
            unique_families(graphics_family, present_family)
                .into_iter()
                .map(|family| {
                    vk::DeviceQueueCreateInfo::default()
                        .queue_family_index(family)
                        .queue_priorities(&DEFAULT_QUEUE_PRIORITY)
                })
                .collect();

        let ext_ptrs: Vec<*const std::ffi::c_char> =
            extensions.iter().map(|e| e.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&ext_ptrs);

        info!("Creating Vulkan device for {}", cap.name);
        let device = instance
            .create_device(cap.phys, &create_info, None)
            .vk("vkCreateDevice")
            .inspect_err(|e| error!("Failed to create Vulkan device: {e}"))?;

        info!("Acquiring queues");
        let graphics = QueueHandle {
            family: graphics_family,
            index: 0,
            queue: device.get_device_queue(graphics_family, 0),
        };
        let present = QueueHandle {
            family: present_family,
            index: 0,
            queue: device.get_device_queue(present_family, 0),
        };

        Ok(LogicalDevice {
            device,
            graphics,
            present,
        })
    }

    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    pub fn graphics(&self) -> QueueHandle {
        self.graphics
    }

    pub fn present(&self) -> QueueHandle {
        self.present
    }

    pub fn wait_idle(&self) {
        unsafe {
            self.device.device_wait_idle().ok();
        }
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        info!("Destroying Vulkan logical device");
        unsafe {
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn shared_family_requests_one_queue() {
        assert_eq!(unique_families(0, 0), vec![0]);
        assert_eq!(unique_families(2, 2), vec![2]);
    }

    #[test]
    fn split_families_request_both_graphics_first() {
        assert_eq!(unique_families(0, 1), vec![0, 1]);
        assert_eq!(unique_families(3, 1), vec![3, 1]);
    }

    #[test]
    fn queue_identity_is_family_and_index() {
        let a = QueueHandle {
            family: 0,
            index: 0,
            queue: vk::Queue::from_raw(10),
        };
        let b = QueueHandle {
            family: 0,
            index: 0,
            queue: vk::Queue::from_raw(11),
        };
        let c = QueueHandle {
            family: 1,
            index: 0,
            queue: vk::Queue::from_raw(10),
        };
        assert!(a.same_queue(&b));
        assert!(!a.same_queue(&c));
    }
}
