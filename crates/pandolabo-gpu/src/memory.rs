//! GPU memory management.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::types::{BufferUsage, ImageViewInfo, MemoryUsage, TransferType};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use std::sync::Arc;

/// GPU memory allocator wrapper.
pub struct GpuAllocator {
    allocator: Option<Allocator>,
}

impl GpuAllocator {
    /// Create a new allocator.
    ///
    /// # Safety
    /// The instance, device, and physical device must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        Ok(Self {
            allocator: Some(allocator),
        })
    }

    fn inner(&mut self) -> Result<&mut Allocator> {
        self.allocator
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator not initialized".to_string()))
    }

    fn allocate(
        &mut self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation> {
        self.inner()?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| GpuError::AllocationFailed(e.to_string()))
    }

    fn free(&mut self, allocation: Allocation) -> Result<()> {
        self.inner()?
            .free(allocation)
            .map_err(|e| GpuError::AllocationFailed(e.to_string()))
    }

    /// Shutdown the allocator, freeing all GPU memory.
    ///
    /// This must be called before the Vulkan device is destroyed.
    /// Any remaining allocations will be freed (and logged as leaks).
    pub fn shutdown(&mut self) {
        if let Some(allocator) = self.allocator.take() {
            drop(allocator);
        }
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A device buffer with its allocation. Freed on drop.
pub struct Buffer {
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: u64,
    usage: BufferUsage,
    transfer: TransferType,
    device: Arc<ash::Device>,
    allocator: Arc<Mutex<GpuAllocator>>,
}

impl Buffer {
    /// Allocate a buffer.
    pub fn new(
        ctx: &GpuContext,
        size: u64,
        usage: BufferUsage,
        transfer: TransferType,
        memory: MemoryUsage,
        name: &str,
    ) -> Result<Self> {
        if size == 0 {
            return Err(GpuError::Validation(format!(
                "Buffer '{name}' must have a non-zero size"
            )));
        }

        let device = ctx.device_arc();
        let usage_flags = vk::BufferUsageFlags::from(usage) | vk::BufferUsageFlags::from(transfer);
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage_flags)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let allocator = ctx.allocator_arc();
        let allocation = match allocator
            .lock()
            .allocate(name, requirements, memory.into(), true)
        {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) =
            unsafe { device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) }
        {
            let _ = allocator.lock().free(allocation);
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(e.into());
        }

        Ok(Self {
            buffer,
            allocation: Some(allocation),
            size,
            usage,
            transfer,
            device,
            allocator,
        })
    }

    /// Device-local storage buffer.
    pub fn storage(ctx: &GpuContext, size: u64, transfer: TransferType) -> Result<Self> {
        Self::new(ctx, size, BufferUsage::Storage, transfer, MemoryUsage::GpuOnly, "storage")
    }

    /// Device-local vertex buffer filled by transfers.
    pub fn vertex(ctx: &GpuContext, size: u64) -> Result<Self> {
        Self::new(
            ctx,
            size,
            BufferUsage::Vertex,
            TransferType::TransferDst,
            MemoryUsage::GpuOnly,
            "vertex",
        )
    }

    /// Device-local index buffer filled by transfers.
    pub fn index(ctx: &GpuContext, size: u64) -> Result<Self> {
        Self::new(
            ctx,
            size,
            BufferUsage::Index,
            TransferType::TransferDst,
            MemoryUsage::GpuOnly,
            "index",
        )
    }

    /// Host-visible uniform buffer.
    pub fn uniform(ctx: &GpuContext, size: u64) -> Result<Self> {
        Self::new(
            ctx,
            size,
            BufferUsage::Uniform,
            TransferType::TransferDst,
            MemoryUsage::CpuToGpu,
            "uniform",
        )
    }

    /// Host-visible staging buffer used as a copy source.
    pub fn staging_to_gpu(ctx: &GpuContext, size: u64) -> Result<Self> {
        Self::new(
            ctx,
            size,
            BufferUsage::Staging,
            TransferType::TransferSrc,
            MemoryUsage::CpuToGpu,
            "staging_upload",
        )
    }

    /// Host-visible staging buffer used as a copy destination.
    pub fn staging_from_gpu(ctx: &GpuContext, size: u64) -> Result<Self> {
        Self::new(
            ctx,
            size,
            BufferUsage::Staging,
            TransferType::TransferDst,
            MemoryUsage::GpuToCpu,
            "staging_readback",
        )
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn transfer_type(&self) -> TransferType {
        self.transfer
    }

    /// Host pointer to the mapped memory, if host-visible.
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .map(|p| p.as_ptr().cast::<u8>())
    }

    fn checked_range(&self, offset: u64, len: usize) -> Result<usize> {
        let end = offset
            .checked_add(len as u64)
            .ok_or_else(|| GpuError::Validation("Offset overflow".to_string()))?;
        if end > self.size {
            return Err(GpuError::Validation(format!(
                "Range {offset}..{end} exceeds buffer size {}",
                self.size
            )));
        }
        usize::try_from(offset).map_err(|_| GpuError::Validation("Offset overflow".to_string()))
    }

    /// Write raw bytes at the given offset (must be host-visible).
    pub fn write_bytes(&self, offset: u64, data: &[u8]) -> Result<()> {
        let ptr = self
            .mapped_ptr()
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))?;
        let offset = self.checked_range(offset, data.len())?;

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset), data.len());
        }

        Ok(())
    }

    /// Write typed data at offset zero (must be host-visible).
    pub fn write<T: bytemuck::Pod>(&self, data: &[T]) -> Result<()> {
        self.write_bytes(0, bytemuck::cast_slice(data))
    }

    /// Read raw bytes at the given offset (must be host-visible).
    pub fn read_bytes(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        let ptr = self
            .mapped_ptr()
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))?;
        let offset = self.checked_range(offset, out.len())?;

        unsafe {
            std::ptr::copy_nonoverlapping(ptr.add(offset), out.as_mut_ptr(), out.len());
        }

        Ok(())
    }

    /// Read typed data from offset zero (must be host-visible).
    pub fn read<T: bytemuck::Pod>(&self, out: &mut [T]) -> Result<()> {
        self.read_bytes(0, bytemuck::cast_slice_mut(out))
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.allocator.lock().free(allocation) {
                tracing::warn!("Failed to free buffer allocation: {e}");
            }
        }
        unsafe { self.device.destroy_buffer(self.buffer, None) };
    }
}

/// Creation parameters for an [`Image`].
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    pub extent: vk::Extent3D,
    pub format: vk::Format,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub usage: vk::ImageUsageFlags,
    pub transfer: TransferType,
    pub memory: MemoryUsage,
}

impl ImageDesc {
    /// Single-level 2D sampled image that can be filled and read back by transfers.
    pub fn new_2d(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            format,
            mip_levels: 1,
            array_layers: 1,
            usage: vk::ImageUsageFlags::SAMPLED,
            transfer: TransferType::TransferSrcDst,
            memory: MemoryUsage::GpuOnly,
        }
    }

    #[must_use]
    pub fn mip_levels(mut self, levels: u32) -> Self {
        self.mip_levels = levels.max(1);
        self
    }

    /// Use the full mip chain down to 1x1.
    #[must_use]
    pub fn full_mip_chain(mut self) -> Self {
        self.mip_levels = max_mip_levels(self.extent);
        self
    }

    #[must_use]
    pub fn array_layers(mut self, layers: u32) -> Self {
        self.array_layers = layers.max(1);
        self
    }

    #[must_use]
    pub fn usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    #[must_use]
    pub fn transfer(mut self, transfer: TransferType) -> Self {
        self.transfer = transfer;
        self
    }
}

/// Number of levels in a full mip chain for `extent`.
pub fn max_mip_levels(extent: vk::Extent3D) -> u32 {
    let largest = extent.width.max(extent.height).max(extent.depth).max(1);
    u32::BITS - largest.leading_zeros()
}

/// A device image with its allocation. Freed on drop.
pub struct Image {
    image: vk::Image,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent3D,
    mip_levels: u32,
    array_layers: u32,
    device: Arc<ash::Device>,
    allocator: Arc<Mutex<GpuAllocator>>,
}

impl Image {
    /// Allocate an image.
    pub fn new(ctx: &GpuContext, desc: &ImageDesc, name: &str) -> Result<Self> {
        let device = ctx.device_arc();
        let image_type = if desc.extent.depth > 1 {
            vk::ImageType::TYPE_3D
        } else {
            vk::ImageType::TYPE_2D
        };

        let create_info = vk::ImageCreateInfo::default()
            .image_type(image_type)
            .format(desc.format)
            .extent(desc.extent)
            .mip_levels(desc.mip_levels)
            .array_layers(desc.array_layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage | vk::ImageUsageFlags::from(desc.transfer))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.create_image(&create_info, None)? };
        let requirements = unsafe { device.get_image_memory_requirements(image) };

        let allocator = ctx.allocator_arc();
        let allocation = match allocator
            .lock()
            .allocate(name, requirements, desc.memory.into(), false)
        {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        if let Err(e) =
            unsafe { device.bind_image_memory(image, allocation.memory(), allocation.offset()) }
        {
            let _ = allocator.lock().free(allocation);
            unsafe { device.destroy_image(image, None) };
            return Err(e.into());
        }

        Ok(Self {
            image,
            allocation: Some(allocation),
            format: desc.format,
            extent: desc.extent,
            mip_levels: desc.mip_levels,
            array_layers: desc.array_layers,
            device,
            allocator,
        })
    }

    pub fn handle(&self) -> vk::Image {
        self.image
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn array_layers(&self) -> u32 {
        self.array_layers
    }

    /// View covering every mip level and layer of the color aspect.
    pub fn full_view(&self) -> ImageViewInfo {
        ImageViewInfo {
            mip_levels: self.mip_levels,
            array_layers: self.array_layers,
            ..ImageViewInfo::default()
        }
    }

    /// Tightly packed byte size of mip 0 for a format with `texel_size` bytes per texel.
    pub fn level0_byte_size(&self, texel_size: u64) -> u64 {
        u64::from(self.extent.width)
            * u64::from(self.extent.height)
            * u64::from(self.extent.depth)
            * u64::from(self.array_layers)
            * texel_size
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.allocator.lock().free(allocation) {
                tracing::warn!("Failed to free image allocation: {e}");
            }
        }
        unsafe { self.device.destroy_image(self.image, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_chain_length() {
        let extent = |w, h| vk::Extent3D {
            width: w,
            height: h,
            depth: 1,
        };
        assert_eq!(max_mip_levels(extent(1, 1)), 1);
        assert_eq!(max_mip_levels(extent(256, 256)), 9);
        assert_eq!(max_mip_levels(extent(300, 17)), 9);
    }

    #[test]
    fn desc_builder_clamps_levels() {
        let desc = ImageDesc::new_2d(64, 32, vk::Format::R8G8B8A8_UNORM)
            .mip_levels(0)
            .array_layers(0);
        assert_eq!(desc.mip_levels, 1);
        assert_eq!(desc.array_layers, 1);
        assert_eq!(desc.full_mip_chain().mip_levels, 7);
    }
}
