//! Device capability detection.

use ash::vk;
use std::ffi::CStr;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Detected capabilities relevant to command submission and synchronization.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    pub vendor: GpuVendor,
    pub device_name: String,
    pub api_version: u32,
    pub device_type: vk::PhysicalDeviceType,

    /// Timeline semaphores (Vulkan 1.2 core feature bit).
    pub supports_timeline_semaphore: bool,
    /// Synchronization2 (Vulkan 1.3 core feature bit).
    pub supports_synchronization2: bool,

    /// Queue family count exposed by the device.
    pub queue_family_count: u32,
    /// Maximum compute workgroup count per dispatch dimension.
    pub max_compute_workgroup_count: [u32; 3],
    /// Maximum push constant block size in bytes.
    pub max_push_constants_size: u32,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

        let mut vulkan_1_2_features = vk::PhysicalDeviceVulkan12Features::default();
        let mut vulkan_1_3_features = vk::PhysicalDeviceVulkan13Features::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut vulkan_1_2_features)
            .push_next(&mut vulkan_1_3_features);
        unsafe { instance.get_physical_device_features2(physical_device, &mut features2) };

        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name,
            api_version: properties.api_version,
            device_type: properties.device_type,
            supports_timeline_semaphore: vulkan_1_2_features.timeline_semaphore == vk::TRUE,
            supports_synchronization2: vulkan_1_3_features.synchronization2 == vk::TRUE,
            queue_family_count: u32::try_from(queue_families.len()).unwrap_or(u32::MAX),
            max_compute_workgroup_count: properties.limits.max_compute_work_group_count,
            max_push_constants_size: properties.limits.max_push_constants_size,
        }
    }

    /// Check if the device can run the command layer.
    pub fn meets_requirements(&self) -> bool {
        let api_major = vk::api_version_major(self.api_version);
        let api_minor = vk::api_version_minor(self.api_version);

        if api_major < 1 || (api_major == 1 && api_minor < 3) {
            return false;
        }

        self.supports_timeline_semaphore && self.supports_synchronization2
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}, {:?}) - Vulkan {}.{}.{} - {} queue families",
            self.device_name,
            self.vendor,
            self.device_type,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.queue_family_count,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(api_version: u32, timeline: bool) -> GpuCapabilities {
        GpuCapabilities {
            vendor: GpuVendor::Other(0),
            device_name: "test".to_string(),
            api_version,
            device_type: vk::PhysicalDeviceType::CPU,
            supports_timeline_semaphore: timeline,
            supports_synchronization2: true,
            queue_family_count: 1,
            max_compute_workgroup_count: [65535; 3],
            max_push_constants_size: 128,
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
    }

    #[test]
    fn requires_vulkan_1_3_and_timelines() {
        assert!(caps(vk::API_VERSION_1_3, true).meets_requirements());
        assert!(!caps(vk::API_VERSION_1_2, true).meets_requirements());
        assert!(!caps(vk::API_VERSION_1_3, false).meets_requirements());
    }
}
