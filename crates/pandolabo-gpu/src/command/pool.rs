//! Command pools.

use crate::error::{GpuError, Result};
use ash::vk;
use std::sync::Arc;

/// A command pool bound to one queue family.
///
/// Created with `RESET_COMMAND_BUFFER` so buffers can be reset one at a time
/// as well as all at once through [`CommandPool::reset`]. Destroying the pool
/// frees every buffer allocated from it.
pub struct CommandPool {
    pool: vk::CommandPool,
    queue_family: u32,
    device: Arc<ash::Device>,
}

impl CommandPool {
    pub fn new(device: &Arc<ash::Device>, queue_family: u32) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.create_command_pool(&create_info, None)? };

        Ok(Self {
            pool,
            queue_family,
            device: Arc::clone(device),
        })
    }

    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate a single command buffer.
    pub fn allocate(&self, level: vk::CommandBufferLevel) -> Result<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(level)
            .command_buffer_count(1);

        let buffers = unsafe { self.device.allocate_command_buffers(&alloc_info)? };
        buffers
            .into_iter()
            .next()
            .ok_or_else(|| {
                GpuError::Other("Command buffer allocation returned nothing".to_string())
            })
    }

    /// Return buffers to the pool.
    ///
    /// # Safety
    /// The buffers must come from this pool and must not be pending execution.
    pub unsafe fn free(&self, buffers: &[vk::CommandBuffer]) {
        if !buffers.is_empty() {
            unsafe { self.device.free_command_buffers(self.pool, buffers) };
        }
    }

    /// Reset every buffer allocated from this pool.
    ///
    /// No buffer from the pool may be pending execution.
    pub fn reset(&self) -> Result<()> {
        tracing::trace!(queue_family = self.queue_family, "Resetting command pool");
        unsafe {
            self.device
                .reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())?;
        }
        Ok(())
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy_command_pool(self.pool, None) };
    }
}
