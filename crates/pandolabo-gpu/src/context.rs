//! GPU context management.

use crate::capabilities::GpuCapabilities;
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, select_physical_device};
use crate::memory::GpuAllocator;
use crate::surface::SurfaceContext;
use crate::swapchain::{Swapchain, SwapchainDesc};
use crate::types::QueueFamilyType;
use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::collections::HashSet;
use std::ffi::CStr;
use std::sync::Arc;

/// Main GPU context holding Vulkan resources.
///
/// Every object created from the context keeps a clone of the device function
/// table and destroys its own handles on drop. Those objects must be dropped
/// before the context, which waits for the device to go idle and then tears
/// down the allocator, swapchain, surface, device, and instance.
pub struct GpuContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: Arc<ash::Device>,
    capabilities: GpuCapabilities,
    allocator: Arc<Mutex<GpuAllocator>>,

    queue_families: QueueFamilyIndices,
    graphics_queue: vk::Queue,
    compute_queue: vk::Queue,
    transfer_queue: vk::Queue,

    surface: Option<SurfaceContext>,
    swapchain: Option<Swapchain>,
    vsync: bool,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Shared device function table for objects that outlive a borrow.
    pub fn device_arc(&self) -> Arc<ash::Device> {
        Arc::clone(&self.device)
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    pub(crate) fn allocator_arc(&self) -> Arc<Mutex<GpuAllocator>> {
        Arc::clone(&self.allocator)
    }

    /// Queue family index resolved for a role.
    pub fn queue_family_index(&self, role: QueueFamilyType) -> u32 {
        match role {
            QueueFamilyType::Graphics => self.queue_families.graphics,
            QueueFamilyType::Compute => self.queue_families.compute,
            QueueFamilyType::Transfer => self.queue_families.transfer,
        }
    }

    /// Queue resolved for a role.
    pub fn queue(&self, role: QueueFamilyType) -> vk::Queue {
        match role {
            QueueFamilyType::Graphics => self.graphics_queue,
            QueueFamilyType::Compute => self.compute_queue,
            QueueFamilyType::Transfer => self.transfer_queue,
        }
    }

    /// The device handle is live.
    pub fn is_initialized(&self) -> bool {
        self.device.handle() != vk::Device::null()
    }

    pub fn has_swapchain(&self) -> bool {
        self.swapchain.is_some()
    }

    pub fn swapchain(&self) -> Result<&Swapchain> {
        self.swapchain.as_ref().ok_or(GpuError::SwapchainNotInitialized)
    }

    pub fn swapchain_mut(&mut self) -> Result<&mut Swapchain> {
        self.swapchain.as_mut().ok_or(GpuError::SwapchainNotInitialized)
    }

    /// Wait for device to be idle.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }

    /// Rebuild the swapchain for a new window size.
    ///
    /// Waits for the device to go idle first. Render kits and anything else
    /// holding swapchain image views must be rebuilt afterwards.
    pub fn recreate_swapchain(&mut self, width: u32, height: u32) -> Result<()> {
        let surface = self.surface.as_ref().ok_or(GpuError::SwapchainNotInitialized)?;
        self.wait_idle()?;

        let old = self.swapchain.take();
        let caps = surface.capabilities(self.physical_device)?;
        let desc = SwapchainDesc {
            surface: surface.handle(),
            width,
            height,
            vsync: self.vsync,
            present_family: self.queue_families.graphics,
        };
        let swapchain = unsafe {
            Swapchain::new(
                &self.instance,
                &self.device,
                &caps,
                &desc,
                old.as_ref().map(Swapchain::handle),
            )?
        };
        drop(old);

        tracing::info!(width, height, "Recreated swapchain");
        self.swapchain = Some(swapchain);
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // Free all device memory before the device goes away.
            self.allocator.lock().shutdown();

            drop(self.swapchain.take());
            if let Some(surface) = self.surface.take() {
                surface.destroy();
            }

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

enum Target<'w> {
    Headless,
    Window(&'w dyn WindowHandles),
}

/// Object-safe view of a window's raw handles.
trait WindowHandles {
    unsafe fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<SurfaceContext>;
}

impl<W: HasDisplayHandle + HasWindowHandle> WindowHandles for W {
    unsafe fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<SurfaceContext> {
        unsafe { SurfaceContext::new(entry, instance, self) }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder<'w> {
    app_name: String,
    enable_validation: bool,
    target: Target<'w>,
    width: u32,
    height: u32,
    vsync: bool,
}

impl Default for GpuContextBuilder<'_> {
    fn default() -> Self {
        Self {
            app_name: "Pandolabo".to_string(),
            enable_validation: cfg!(debug_assertions),
            target: Target::Headless,
            width: 1280,
            height: 720,
            vsync: true,
        }
    }
}

impl<'w> GpuContextBuilder<'w> {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// No surface, no swapchain.
    pub fn headless(mut self) -> Self {
        self.target = Target::Headless;
        self
    }

    /// Present to `window`.
    pub fn window<W: HasDisplayHandle + HasWindowHandle>(mut self, window: &'w W) -> Self {
        self.target = Target::Window(window);
        self
    }

    /// Initial swapchain size, used when the surface does not dictate one.
    pub fn extent(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Build the GPU context.
    pub fn build(self) -> Result<GpuContext> {
        let headless = matches!(self.target, Target::Headless);

        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Other(format!("Failed to load Vulkan: {e}")))?;

        let instance =
            unsafe { create_instance(&entry, &self.app_name, self.enable_validation, headless) }?;

        let surface = match self.target {
            Target::Headless => None,
            Target::Window(window) => Some(unsafe { window.create_surface(&entry, &instance) }?),
        };

        let physical_device = unsafe { select_physical_device(&instance) }?;
        let capabilities = unsafe { GpuCapabilities::query(&instance, physical_device) };
        if !capabilities.meets_requirements() {
            return Err(GpuError::NoSuitableDevice);
        }

        tracing::info!("Selected GPU: {}", capabilities.summary());

        let queue_families =
            unsafe { find_queue_families(&instance, physical_device, surface.as_ref()) }?;

        tracing::info!(
            graphics = queue_families.graphics,
            compute = queue_families.compute,
            transfer = queue_families.transfer,
            "Resolved queue families"
        );

        let (device, graphics_queue, compute_queue, transfer_queue) =
            unsafe { create_device(&instance, physical_device, &queue_families, headless)? };
        let device = Arc::new(device);

        let allocator = unsafe { GpuAllocator::new(&instance, &device, physical_device) }?;

        let swapchain = match &surface {
            Some(surface) => {
                let caps = surface.capabilities(physical_device)?;
                let desc = SwapchainDesc {
                    surface: surface.handle(),
                    width: self.width,
                    height: self.height,
                    vsync: self.vsync,
                    present_family: queue_families.graphics,
                };
                Some(unsafe { Swapchain::new(&instance, &device, &caps, &desc, None)? })
            }
            None => None,
        };

        Ok(GpuContext {
            entry,
            instance,
            physical_device,
            device,
            capabilities,
            allocator: Arc::new(Mutex::new(allocator)),
            queue_families,
            graphics_queue,
            compute_queue,
            transfer_queue,
            surface,
            swapchain,
            vsync: self.vsync,
        })
    }
}

/// Queue family indices.
#[derive(Debug, Clone, Copy)]
struct QueueFamilyIndices {
    graphics: u32,
    compute: u32,
    transfer: u32,
}

/// Find queue families for graphics, compute, and transfer.
///
/// With a surface, the graphics family must also support presentation.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn find_queue_families(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    surface: Option<&SurfaceContext>,
) -> Result<QueueFamilyIndices> {
    let queue_families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    let mut graphics_family = None;
    let mut compute_family = None;
    let mut transfer_family = None;

    for (i, family) in (0_u32..).zip(queue_families.iter()) {
        let flags = family.queue_flags;

        if flags.contains(vk::QueueFlags::COMPUTE)
            && !flags.contains(vk::QueueFlags::GRAPHICS)
            && compute_family.is_none()
        {
            compute_family = Some(i);
        }

        if flags.contains(vk::QueueFlags::TRANSFER)
            && !flags.contains(vk::QueueFlags::GRAPHICS)
            && !flags.contains(vk::QueueFlags::COMPUTE)
            && transfer_family.is_none()
        {
            transfer_family = Some(i);
        }

        if flags.contains(vk::QueueFlags::GRAPHICS) && graphics_family.is_none() {
            let presents = match surface {
                Some(surface) => surface.supports_present(physical_device, i)?,
                None => true,
            };
            if presents {
                graphics_family = Some(i);
            }
        }
    }

    let graphics = graphics_family.ok_or(GpuError::NoSuitableDevice)?;
    let compute = compute_family.unwrap_or(graphics);
    let transfer = transfer_family.unwrap_or(compute);

    Ok(QueueFamilyIndices {
        graphics,
        compute,
        transfer,
    })
}

fn required_device_extensions(headless: bool) -> Vec<&'static CStr> {
    if headless {
        Vec::new()
    } else {
        vec![ash::khr::swapchain::NAME]
    }
}

/// Create the logical device and retrieve queues.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_families: &QueueFamilyIndices,
    headless: bool,
) -> Result<(ash::Device, vk::Queue, vk::Queue, vk::Queue)> {
    let unique_families: HashSet<u32> = [
        queue_families.graphics,
        queue_families.compute,
        queue_families.transfer,
    ]
    .into_iter()
    .collect();

    let queue_priority = 1.0_f32;
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    let extensions = required_device_extensions(headless);
    let extension_names: Vec<*const i8> = extensions.iter().map(|ext| ext.as_ptr()).collect();

    let mut vulkan_1_3_features =
        vk::PhysicalDeviceVulkan13Features::default().synchronization2(true);
    let mut vulkan_1_2_features =
        vk::PhysicalDeviceVulkan12Features::default().timeline_semaphore(true);

    let mut features2 = vk::PhysicalDeviceFeatures2::default()
        .push_next(&mut vulkan_1_3_features)
        .push_next(&mut vulkan_1_2_features);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .push_next(&mut features2);

    let device = unsafe { instance.create_device(physical_device, &device_create_info, None) }
        .map_err(GpuError::from)?;

    let (graphics_queue, compute_queue, transfer_queue) = unsafe {
        (
            device.get_device_queue(queue_families.graphics, 0),
            device.get_device_queue(queue_families.compute, 0),
            device.get_device_queue(queue_families.transfer, 0),
        )
    };

    Ok((device, graphics_queue, compute_queue, transfer_queue))
}
