// SPDX-License-Identifier: CEPL-1.0
use std::cmp::Ordering;
use std::ffi::CStr;

use ash::vk;
use tracing::{debug, error, info};

use crate::caps::{probe, DeviceCapability, DeviceClass, DeviceQuery};
use crate::error::{VkError, VkResult};

/// Device extensions every selected device must expose and gets enabled.
pub const REQUIRED_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Ranking between two devices: discrete before anything else, then the
/// larger total heap first. `Equal` keys keep enumeration order because the
/// caller sorts stably.
pub fn selection_order(a: &DeviceCapability, b: &DeviceCapability) -> Ordering {
    let a_discrete = a.class == DeviceClass::Discrete;
    let b_discrete = b.class == DeviceClass::Discrete;
    match (a_discrete, b_discrete) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => b.total_heap_size.cmp(&a.total_heap_size),
    }
}

/// Probes every device, drops the ineligible ones, and returns the best of
/// the rest. Runs once at startup.
pub fn select_device(
    query: &dyn DeviceQuery,
    devices: &[vk::PhysicalDevice],
    surface: Option<vk::SurfaceKHR>,
    required: &[&CStr],
) -> VkResult<DeviceCapability> {
    if devices.is_empty() {
        error!("No graphics devices with Vulkan support");
        return Err(VkError::NoCompatibleDevice { candidates: 0 });
    }
    info!("{} graphics devices with Vulkan support found", devices.len());

    let mut eligible: Vec<DeviceCapability> = devices
        .iter()
        .map(|&phys| probe(query, phys, surface))
        .filter(|cap| {
            let ok = cap.is_eligible(required);
            if !ok {
                debug!("{} lacks required features", cap.name);
            }
            ok
        })
        .collect();

    if eligible.is_empty() {
        return Err(VkError::NoCompatibleDevice {
            candidates: devices.len(),
        });
    }
    info!(
        "{} graphics devices with required Vulkan features found",
        eligible.len()
    );

    // slice::sort_by is stable
    eligible.sort_by(selection_order);

    debug!("Vulkan devices in order of estimated performance:");
    for cap in &eligible {
        debug!(
            "\t{} ({:?}, {} MiB)",
            cap.name,
            cap.class,
            cap.total_heap_size >> 20
        );
    }

    Ok(eligible.swap_remove(0))
}
