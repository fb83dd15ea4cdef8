// SPDX-License-Identifier: CEPL-1.0
//! Physical-device capability probing.
//!
//! `probe` turns one physical device (and optionally the surface it has to
//! present to) into a `DeviceCapability` snapshot. All driver access goes
//! through `DeviceQuery`, so ranking and eligibility can be exercised without
//! a Vulkan driver.

use std::ffi::{CStr, CString};

use ash::khr::surface;
use ash::vk;
use tracing::debug;

/// Coarse device class used for ranking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceClass {
    Discrete,
    Integrated,
    Other,
}

impl From<vk::PhysicalDeviceType> for DeviceClass {
    fn from(ty: vk::PhysicalDeviceType) -> Self {
        match ty {
            vk::PhysicalDeviceType::DISCRETE_GPU => DeviceClass::Discrete,
            vk::PhysicalDeviceType::INTEGRATED_GPU => DeviceClass::Integrated,
            _ => DeviceClass::Other,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub name: String,
    pub class: DeviceClass,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamily {
    pub flags: vk::QueueFlags,
    pub count: u32,
}

/// Read-only view of the driver, one call per table.
pub trait DeviceQuery {
    fn identity(&self, phys: vk::PhysicalDevice) -> DeviceIdentity;
    fn memory_heaps(&self, phys: vk::PhysicalDevice) -> Vec<vk::MemoryHeap>;
    fn queue_families(&self, phys: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties>;
    fn extensions(&self, phys: vk::PhysicalDevice) -> Vec<CString>;
    fn present_support(
        &self,
        phys: vk::PhysicalDevice,
        family: u32,
        surface: vk::SurfaceKHR,
    ) -> bool;
    fn surface_formats(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Vec<vk::SurfaceFormatKHR>;
    fn present_modes(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Vec<vk::PresentModeKHR>;
}

/// Immutable snapshot of what a physical device offers.
#[derive(Clone, Debug)]
pub struct DeviceCapability {
    pub phys: vk::PhysicalDevice,
    pub name: String,
    pub class: DeviceClass,
    pub heap_sizes: Vec<vk::DeviceSize>,
    pub total_heap_size: vk::DeviceSize,
    pub queue_families: Vec<QueueFamily>,
    pub extensions: Vec<CString>,
    /// Empty unless probed against a surface.
    pub surface_formats: Vec<vk::SurfaceFormatKHR>,
    /// Empty unless probed against a surface.
    pub present_modes: Vec<vk::PresentModeKHR>,
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
    pub surface_aware: bool,
}

impl DeviceCapability {
    pub fn supports_extension(&self, name: &CStr) -> bool {
        self.extensions.iter().any(|e| e.as_c_str() == name)
    }

    /// Eligible devices have both a graphics and a presentation family and
    /// every extension in `required`. When probed against a surface they
    /// also need at least one surface format and present mode.
    ///
    /// A surfaceless probe never finds a presentation family, so it never
    /// yields an eligible device.
    pub fn is_eligible(&self, required: &[&CStr]) -> bool {
        if self.graphics_family.is_none() || self.present_family.is_none() {
            return false;
        }
        if self.surface_aware
            && (self.surface_formats.is_empty() || self.present_modes.is_empty())
        {
            return false;
        }
        required.iter().all(|name| self.supports_extension(name))
    }

    pub fn shares_queue_family(&self) -> bool {
        self.graphics_family == self.present_family
    }
}

/// Snapshots `phys`. Never fails: a missing queue family is recorded as
/// `None` and judged later by `DeviceCapability::is_eligible`.
pub fn probe(
    query: &dyn DeviceQuery,
    phys: vk::PhysicalDevice,
    surface: Option<vk::SurfaceKHR>,
) -> DeviceCapability {
    let identity = query.identity(phys);
    let heap_sizes: Vec<vk::DeviceSize> =
        query.memory_heaps(phys).iter().map(|h| h.size).collect();
    let total_heap_size = heap_sizes.iter().sum();

    let queue_families: Vec<QueueFamily> = query
        .queue_families(phys)
        .iter()
        .map(|q| QueueFamily {
            flags: q.queue_flags,
            count: q.queue_count,
        })
        .collect();

    debug!(
        "{} has {} queue families",
        identity.name,
        queue_families.len()
    );
    for q in &queue_families {
        debug!("\t{} queues - {:?}", q.count, q.flags);
    }

    let graphics_family = queue_families
        .iter()
        .position(|q| q.flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|i| i as u32);
    if let Some(i) = graphics_family {
        debug!("\tgraphics queue family {i}");
    }

    let (present_family, surface_formats, present_modes) = match surface {
        Some(surface) => {
            let present_family = (0..queue_families.len() as u32)
                .find(|&i| query.present_support(phys, i, surface));
            if let Some(i) = present_family {
                debug!("\tpresentation queue family {i}");
            }
            (
                present_family,
                query.surface_formats(phys, surface),
                query.present_modes(phys, surface),
            )
        }
        None => (None, Vec::new(), Vec::new()),
    };

    DeviceCapability {
        phys,
        name: identity.name,
        class: identity.class,
        heap_sizes,
        total_heap_size,
        queue_families,
        extensions: query.extensions(phys),
        surface_formats,
        present_modes,
        graphics_family,
        present_family,
        surface_aware: surface.is_some(),
    }
}

/// `DeviceQuery` backed by a live instance.
pub struct AshQuery<'a> {
    pub instance: &'a ash::Instance,
    pub surface_loader: &'a surface::Instance,
}

impl DeviceQuery for AshQuery<'_> {
    fn identity(&self, phys: vk::PhysicalDevice) -> DeviceIdentity {
        let props = unsafe { self.instance.get_physical_device_properties(phys) };
        let name = props
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|_| String::from("<unnamed device>"));
        DeviceIdentity {
            name,
            class: props.device_type.into(),
        }
    }

    fn memory_heaps(&self, phys: vk::PhysicalDevice) -> Vec<vk::MemoryHeap> {
        let mem = unsafe { self.instance.get_physical_device_memory_properties(phys) };
        mem.memory_heaps[..mem.memory_heap_count as usize].to_vec()
    }

    fn queue_families(&self, phys: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        unsafe {
            self.instance
                .get_physical_device_queue_family_properties(phys)
        }
    }

    fn extensions(&self, phys: vk::PhysicalDevice) -> Vec<CString> {
        let props = unsafe { self.instance.enumerate_device_extension_properties(phys) }
            .unwrap_or_default();
        props
            .iter()
            .filter_map(|e| e.extension_name_as_c_str().ok().map(CStr::to_owned))
            .collect()
    }

    fn present_support(
        &self,
        phys: vk::PhysicalDevice,
        family: u32,
        surface: vk::SurfaceKHR,
    ) -> bool {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(phys, family, surface)
                .unwrap_or(false)
        }
    }

    fn surface_formats(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Vec<vk::SurfaceFormatKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(phys, surface)
                .unwrap_or_default()
        }
    }

    fn present_modes(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Vec<vk::PresentModeKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(phys, surface)
                .unwrap_or_default()
        }
    }
}
