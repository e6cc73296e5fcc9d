//! Swapchain and per-frame-slot synchronization.
//!
//! Each frame slot owns an image-available semaphore, a render-finished
//! semaphore, and an in-flight fence. The slot index rotates independently of
//! the acquired image index; slot count is capped by both the image count and
//! [`MAX_FRAMES_IN_FLIGHT`].
//!
//! A slot's fence is reset only when a batch that signals it is about to be
//! submitted. A frame that was acquired but will not be submitted must be
//! given back with [`Swapchain::abandon_frame`].

use crate::error::{GpuError, Result};
use crate::semaphore::{BinarySemaphore, Fence};
use crate::surface::SurfaceCapabilities;
use ash::vk;
use pandolabo_core::constants::{MAX_FRAMES_IN_FLIGHT, WAIT_FOREVER};
use std::sync::Arc;

/// Parameters for swapchain creation.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc {
    pub surface: vk::SurfaceKHR,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    pub present_family: u32,
}

/// Swapchain wrapper.
pub struct Swapchain {
    swapchain: vk::SwapchainKHR,
    loader: ash::khr::swapchain::Device,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,

    image_available: Vec<BinarySemaphore>,
    render_finished: Vec<BinarySemaphore>,
    in_flight: Vec<Fence>,
    slots: FrameSlots,

    image_index: u32,
    device: Arc<ash::Device>,
}

impl Swapchain {
    /// Create a swapchain and its frame-slot sync objects.
    ///
    /// # Safety
    /// The surface in `desc` must be valid and `old_swapchain`, if given,
    /// must not be in use.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: &Arc<ash::Device>,
        caps: &SurfaceCapabilities,
        desc: &SwapchainDesc,
        old_swapchain: Option<vk::SwapchainKHR>,
    ) -> Result<Self> {
        let loader = ash::khr::swapchain::Device::new(instance, device);
        let surface_caps = &caps.capabilities;

        let surface_format = select_surface_format(&caps.formats);
        let present_mode = select_present_mode(&caps.present_modes, desc.vsync);
        let extent = calculate_extent(surface_caps, desc.width, desc.height);

        let mut image_count = surface_caps.min_image_count + 1;
        if surface_caps.max_image_count > 0 && image_count > surface_caps.max_image_count {
            image_count = surface_caps.max_image_count;
        }

        let queue_families = [desc.present_family];
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(desc.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .queue_family_indices(&queue_families)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain.unwrap_or(vk::SwapchainKHR::null()));

        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        let images = unsafe { loader.get_swapchain_images(swapchain)? };

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .level_count(1)
                        .layer_count(1),
                );
            image_views.push(unsafe { device.create_image_view(&view_info, None)? });
        }

        let slot_count = images.len().clamp(1, MAX_FRAMES_IN_FLIGHT);
        let mut image_available = Vec::with_capacity(slot_count);
        let mut render_finished = Vec::with_capacity(slot_count);
        let mut in_flight = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            image_available.push(BinarySemaphore::new(device)?);
            render_finished.push(BinarySemaphore::new(device)?);
            in_flight.push(Fence::new(device, true)?);
        }

        tracing::debug!(
            images = images.len(),
            slots = slot_count,
            width = extent.width,
            height = extent.height,
            ?present_mode,
            "Created swapchain"
        );

        Ok(Self {
            swapchain,
            loader,
            slots: FrameSlots::new(slot_count, images.len()),
            images,
            image_views,
            format: surface_format.format,
            extent,
            image_available,
            render_finished,
            in_flight,
            image_index: 0,
            device: Arc::clone(device),
        })
    }

    /// Wait for the current slot and acquire the next image.
    ///
    /// Returns whether the swapchain is suboptimal. An out-of-date swapchain is
    /// reported as `GpuError::Vulkan(ERROR_OUT_OF_DATE_KHR)` with the slot left
    /// untouched. Fails with a validation error while the previous acquired
    /// frame is neither submitted nor abandoned.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn update_image_index(&mut self) -> Result<bool> {
        if self.slots.is_pending() {
            return Err(GpuError::Validation(
                "Previous frame was neither submitted nor abandoned".to_string(),
            ));
        }

        let slot = self.slots.current();
        self.in_flight[slot].wait(WAIT_FOREVER)?;

        let (index, suboptimal) = unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                WAIT_FOREVER,
                self.image_available[slot].handle(),
                vk::Fence::null(),
            )
        }?;

        if let Some(owner) = self.slots.acquire(index as usize) {
            self.in_flight[owner].wait(WAIT_FOREVER)?;
        }
        self.image_index = index;
        Ok(suboptimal)
    }

    /// Reset the current slot's fence ahead of the submission that signals it.
    pub fn prepare_submit(&self) -> Result<()> {
        self.fence().reset()
    }

    /// Advance to the next frame slot, closing the current frame.
    pub fn update_frame_sync_index(&mut self) {
        self.slots.finish();
    }

    /// Give back an acquired image whose frame will not be submitted.
    ///
    /// Submits an empty batch on `queue` that consumes the slot's
    /// image-available semaphore and signals its render-finished semaphore and
    /// fence, presents the image, and advances the slot. Present failures are
    /// returned after the slot has advanced.
    pub fn abandon_frame(&mut self, queue: vk::Queue) -> Result<bool> {
        if !self.slots.is_pending() {
            return Ok(false);
        }
        let slot = self.slots.current();
        tracing::debug!(slot, image = self.image_index, "Abandoning frame");

        let waits = [self.image_available[slot].handle()];
        let stages = [vk::PipelineStageFlags::ALL_COMMANDS];
        let signals = [self.render_finished[slot].handle()];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&waits)
            .wait_dst_stage_mask(&stages)
            .signal_semaphores(&signals);

        self.prepare_submit()?;
        unsafe {
            self.device
                .queue_submit(queue, &[submit_info], self.in_flight[slot].handle())?;
        }

        let presented = self.present(queue, &signals);
        self.slots.finish();
        presented
    }

    /// Present the current image on `queue` after `wait_semaphores`.
    ///
    /// Returns whether the swapchain is suboptimal. Failures, including
    /// out-of-date, are returned as errors.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn present(&self, queue: vk::Queue, wait_semaphores: &[vk::Semaphore]) -> Result<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [self.image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        Ok(unsafe { self.loader.queue_present(queue, &present_info)? })
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn frame_sync_index(&self) -> usize {
        self.slots.current()
    }

    pub fn frame_slot_count(&self) -> usize {
        self.slots.slot_count()
    }

    /// Whether an image has been acquired and not yet submitted or abandoned.
    pub fn frame_pending(&self) -> bool {
        self.slots.is_pending()
    }

    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// The currently acquired image.
    pub fn image(&self) -> vk::Image {
        self.images[self.image_index as usize]
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    pub fn image_available_semaphore(&self) -> &BinarySemaphore {
        &self.image_available[self.slots.current()]
    }

    pub fn finished_semaphore(&self) -> &BinarySemaphore {
        &self.render_finished[self.slots.current()]
    }

    /// In-flight fence of the current slot.
    pub fn fence(&self) -> &Fence {
        &self.in_flight[self.slots.current()]
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Host-side frame-slot rotation and image ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSlots {
    slot_count: usize,
    current: usize,
    // Frame slot that last rendered into each image.
    image_owners: Vec<Option<usize>>,
    pending: bool,
}

impl FrameSlots {
    pub fn new(slot_count: usize, image_count: usize) -> Self {
        Self {
            slot_count: slot_count.max(1),
            current: 0,
            image_owners: vec![None; image_count],
            pending: false,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Mark `image` as acquired by the current slot.
    ///
    /// Returns the other slot that last rendered into it, whose fence has to
    /// be waited before the image is reused.
    pub fn acquire(&mut self, image: usize) -> Option<usize> {
        self.pending = true;
        let previous = self
            .image_owners
            .get_mut(image)
            .and_then(|owner| owner.replace(self.current));
        previous.filter(|&owner| owner != self.current)
    }

    /// Close the current frame and rotate to the next slot.
    pub fn finish(&mut self) {
        self.pending = false;
        self.current = (self.current + 1) % self.slot_count;
    }
}

/// Select the best surface format, preferring 8-bit sRGB.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    available
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| available.first())
        .copied()
        .unwrap_or(vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        })
}

/// Select the best present mode.
pub fn select_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }

    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Calculate swapchain extent.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_rotate_and_report_previous_owner() {
        let mut slots = FrameSlots::new(2, 3);
        assert_eq!(slots.acquire(0), None);
        assert!(slots.is_pending());
        slots.finish();
        assert_eq!(slots.current(), 1);
        assert!(!slots.is_pending());

        // Slot 1 takes image 0, last rendered by slot 0.
        assert_eq!(slots.acquire(0), Some(0));
        slots.finish();
        assert_eq!(slots.current(), 0);

        // Same slot reacquiring its own image needs no extra wait.
        assert_eq!(slots.acquire(2), None);
        slots.finish();
        slots.finish();
        assert_eq!(slots.acquire(2), None);
    }

    #[test]
    fn unfinished_frame_stays_pending_on_its_slot() {
        let mut slots = FrameSlots::new(3, 3);
        slots.acquire(1);
        assert!(slots.is_pending());
        assert_eq!(slots.current(), 0);

        slots.finish();
        assert!(!slots.is_pending());
        assert_eq!(slots.current(), 1);
        assert_eq!(FrameSlots::new(0, 2).slot_count(), 1);
    }

    #[test]
    fn prefers_srgb_format() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(select_surface_format(&formats).format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(
            select_surface_format(&formats[..1]).format,
            vk::Format::R8G8B8A8_UNORM
        );
    }

    #[test]
    fn present_mode_fallbacks() {
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(select_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
        assert_eq!(select_present_mode(&modes, false), vk::PresentModeKHR::IMMEDIATE);
        assert_eq!(select_present_mode(&[], false), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn extent_is_clamped_when_surface_is_flexible() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            ..Default::default()
        };
        let extent = calculate_extent(&caps, 1920, 100);
        assert_eq!((extent.width, extent.height), (800, 100));
    }
}
