//! Command pool and command buffer management

use crate::error::{VulkanError, VulkanResult};
use ash::{vk, Device};

/// Command pool bound to a single queue family
pub struct CommandPool {
    device: Device,
    pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a command pool whose buffers can be individually reset
    pub fn new(device: Device, queue_family: u32) -> VulkanResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family);

        let pool = unsafe {
            device
                .create_command_pool(&pool_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, pool })
    }

    /// Allocate `count` primary command buffers from this pool
    pub fn allocate(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)
        }
    }

    /// Return command buffers to the pool
    pub fn free(&self, buffers: &[vk::CommandBuffer]) {
        if buffers.is_empty() {
            return;
        }
        unsafe {
            self.device.free_command_buffers(self.pool, buffers);
        }
    }

    /// Get the pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}

/// Single-use command buffer already in the recording state.
///
/// Record into `buffer()`, then call [`submit_and_wait`](Self::submit_and_wait).
/// Dropping without submitting returns the buffer to its pool, which keeps
/// early-error paths in the transfer engine leak-free.
pub struct OneShotCommands {
    device: Device,
    pool: vk::CommandPool,
    buffer: vk::CommandBuffer,
}

impl OneShotCommands {
    /// Allocate a command buffer and begin recording with one-time-submit
    pub fn begin(device: Device, pool: &CommandPool) -> VulkanResult<Self> {
        let buffers = pool.allocate(1)?;
        let buffer = buffers[0];

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        if let Err(e) = unsafe { device.begin_command_buffer(buffer, &begin_info) } {
            pool.free(&buffers);
            return Err(VulkanError::Api(e));
        }

        Ok(Self {
            device,
            pool: pool.handle(),
            buffer,
        })
    }

    /// Get the recording command buffer
    pub fn buffer(&self) -> vk::CommandBuffer {
        self.buffer
    }

    /// End recording, submit to `queue`, and block until the queue drains
    pub fn submit_and_wait(self, queue: vk::Queue) -> VulkanResult<()> {
        unsafe {
            self.device
                .end_command_buffer(self.buffer)
                .map_err(VulkanError::Api)?;

            let command_buffers = [self.buffer];
            let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

            self.device
                .queue_submit(queue, &[submit_info.build()], vk::Fence::null())
                .map_err(VulkanError::Api)?;

            self.device
                .queue_wait_idle(queue)
                .map_err(VulkanError::Api)?;
        }

        Ok(())
    }
}

impl Drop for OneShotCommands {
    fn drop(&mut self) {
        unsafe {
            self.device.free_command_buffers(self.pool, &[self.buffer]);
        }
    }
}
