// SPDX-License-Identifier: CEPL-1.0
//! Instance and surface bootstrap.
//!
//! Order is fixed: the instance first (with the window system's surface
//! extensions), then the surface from that instance. Devices are probed
//! against this surface afterwards.

use std::ffi::{c_char, CStr, CString};

#[cfg(debug_assertions)]
use ash::ext::debug_utils;
use ash::khr::surface;
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::{debug, error, info, trace, warn};

use crate::error::{VkResult, VkResultExt};

const APP_NAME: &CStr = c"prism";

#[cfg(debug_assertions)]
const VALIDATION_LAYERS: &[&CStr] = &[c"VK_LAYER_KHRONOS_validation"];

/// The subset of `requested` (layers or extensions) that the loader
/// reports, in request order.
pub fn supported_names<'a>(requested: &[&'a CStr], available: &[CString]) -> Vec<&'a CStr> {
    requested
        .iter()
        .copied()
        .filter(|want| available.iter().any(|have| have.as_c_str() == *want))
        .collect()
}

#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!("Vulkan: {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("Vulkan: {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!("Vulkan: {msg}");
    } else {
        trace!("Vulkan: {msg}");
    }
    vk::FALSE
}

#[cfg(debug_assertions)]
struct DebugMessenger {
    loader: debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

pub struct VkInstance {
    entry: Entry,
    instance: ash::Instance,
    #[cfg(debug_assertions)]
    debug: Option<DebugMessenger>,
}

impl VkInstance {
    pub unsafe fn new(display: RawDisplayHandle) -> VkResult<Self> {
        let entry = Entry::linked();

        let supported: Vec<CString> = entry
            .enumerate_instance_extension_properties(None)
            .unwrap_or_default()
            .iter()
            .filter_map(|e| e.extension_name_as_c_str().ok().map(CStr::to_owned))
            .collect();
        info!("{} Vulkan instance extensions supported", supported.len());

        #[allow(unused_mut)]
        let mut extensions: Vec<*const c_char> = ash_window::enumerate_required_extensions(display)
            .vk("enumerate_required_extensions")?
            .to_vec();

        #[allow(unused_mut)]
        let mut layers: Vec<&CStr> = Vec::new();

        #[cfg(debug_assertions)]
        let debug_utils_enabled = !supported_names(&[debug_utils::NAME], &supported).is_empty();

        #[cfg(debug_assertions)]
        {
            if debug_utils_enabled {
                extensions.push(debug_utils::NAME.as_ptr());
            } else {
                warn!("VK_EXT_debug_utils unavailable; validation messages will not be logged");
            }
            let available: Vec<CString> = entry
                .enumerate_instance_layer_properties()
                .unwrap_or_default()
                .iter()
                .filter_map(|l| l.layer_name_as_c_str().ok().map(CStr::to_owned))
                .collect();
            layers = supported_names(VALIDATION_LAYERS, &available);
            info!(
                "{} of {} requested Vulkan validation layers supported",
                layers.len(),
                VALIDATION_LAYERS.len()
            );
        }
        let layer_ptrs: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

        let app_info = vk::ApplicationInfo::default()
            .application_name(APP_NAME)
            .application_version(0)
            .engine_name(APP_NAME)
            .engine_version(0)
            .api_version(vk::API_VERSION_1_2);
        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_ptrs);

        info!("Creating Vulkan instance");
        let instance = entry
            .create_instance(&create_info, None)
            .vk("vkCreateInstance")
            .inspect_err(|e| error!("Failed to create Vulkan instance: {e}"))?;

        #[allow(unused_mut)]
        let mut this = VkInstance {
            entry,
            instance,
            #[cfg(debug_assertions)]
            debug: None,
        };

        #[cfg(debug_assertions)]
        {
            if debug_utils_enabled {
                info!("Creating Vulkan debug messenger");
                let loader = debug_utils::Instance::new(&this.entry, &this.instance);
                let info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                    .message_severity(
                        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                            | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
                    )
                    .message_type(
                        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                    )
                    .pfn_user_callback(Some(debug_callback));
                let messenger = loader
                    .create_debug_utils_messenger(&info, None)
                    .vk("vkCreateDebugUtilsMessengerEXT")?;
                this.debug = Some(DebugMessenger { loader, messenger });
            }
        }

        Ok(this)
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn enumerate_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        unsafe {
            self.instance
                .enumerate_physical_devices()
                .vk("vkEnumeratePhysicalDevices")
        }
    }
}

impl Drop for VkInstance {
    fn drop(&mut self) {
        unsafe {
            #[cfg(debug_assertions)]
            {
                if let Some(d) = self.debug.take() {
                    d.loader.destroy_debug_utils_messenger(d.messenger, None);
                }
            }
            info!("Destroying Vulkan instance");
            self.instance.destroy_instance(None);
        }
    }
}

/// A window surface. The window it came from must outlive it.
pub struct Surface {
    loader: surface::Instance,
    surface: vk::SurfaceKHR,
}

impl Surface {
    pub unsafe fn new(
        instance: &VkInstance,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> VkResult<Self> {
        info!("Creating Vulkan surface for window");
        let surface =
            ash_window::create_surface(instance.entry(), instance.handle(), display, window, None)
                .vk("ash_window::create_surface")?;
        Ok(Surface {
            loader: surface::Instance::new(instance.entry(), instance.handle()),
            surface,
        })
    }

    pub fn loader(&self) -> &surface::Instance {
        &self.loader
    }

    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.surface, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_reported_names_are_enabled() {
        let available = vec![
            CString::new("VK_LAYER_MESA_overlay").unwrap(),
            CString::new("VK_LAYER_KHRONOS_validation").unwrap(),
        ];
        let want: &[&CStr] = &[c"VK_LAYER_KHRONOS_validation", c"VK_LAYER_LUNARG_api_dump"];
        assert_eq!(
            supported_names(want, &available),
            vec![c"VK_LAYER_KHRONOS_validation"]
        );
        assert!(supported_names(want, &[]).is_empty());
    }

    #[test]
    fn debug_utils_is_gated_on_loader_support() {
        let without = vec![
            CString::new("VK_KHR_surface").unwrap(),
            CString::new("VK_KHR_xcb_surface").unwrap(),
        ];
        assert!(supported_names(&[ash::ext::debug_utils::NAME], &without).is_empty());

        let mut with = without.clone();
        with.push(CString::new("VK_EXT_debug_utils").unwrap());
        assert_eq!(
            supported_names(&[ash::ext::debug_utils::NAME], &with),
            vec![ash::ext::debug_utils::NAME]
        );
    }
}
