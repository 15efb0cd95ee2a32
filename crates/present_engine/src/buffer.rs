//! Buffer management with RAII resource cleanup

use crate::error::{VulkanError, VulkanResult};
use crate::memory;
use ash::{vk, Device};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Number of staging buffers currently alive in the process. Uploads are
/// expected to return this to its previous value before they return.
static LIVE_STAGING: AtomicUsize = AtomicUsize::new(0);

/// General-purpose GPU buffer with bound memory
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
}

impl Buffer {
    /// Create a buffer and bind freshly allocated memory to it
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        if size == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "Buffer size must be nonzero".to_string(),
            });
        }

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .create_buffer(&buffer_info, None)
                .map_err(VulkanError::Api)?
        };

        let memory = match memory::allocate_buffer_memory(
            &device,
            memory_properties,
            buffer,
            properties,
        ) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        Ok(Self {
            device,
            buffer,
            memory,
            size,
            usage,
        })
    }

    /// Get the buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get the buffer size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Get the usage flags the buffer was created with
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    /// Copy bytes into the buffer through a transient mapping.
    ///
    /// Requires host-visible, host-coherent memory: coherence is what lets
    /// the write skip an explicit flush.
    pub fn write_bytes(&self, data: &[u8]) -> VulkanResult<()> {
        if data.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "Write of {} bytes exceeds buffer size {}",
                    data.len(),
                    self.size
                ),
            });
        }

        unsafe {
            let mapped = self
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;

            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped as *mut u8, data.len());

            self.device.unmap_memory(self.memory);
        }

        Ok(())
    }

    /// Read the buffer's contents back through a transient mapping.
    ///
    /// Only valid on host-visible memory; used by transfer readback.
    pub fn read_bytes(&self) -> VulkanResult<Vec<u8>> {
        let mut out = vec![0u8; self.size as usize];

        unsafe {
            let mapped = self
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;

            std::ptr::copy_nonoverlapping(mapped as *const u8, out.as_mut_ptr(), out.len());

            self.device.unmap_memory(self.memory);
        }

        Ok(out)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Short-lived host-visible buffer that shuttles data into device-local
/// memory. Created already filled with the payload; destroyed by the
/// uploader immediately after the copy completes, on every exit path.
pub struct StagingBuffer {
    buffer: Buffer,
    _ticket: StagingTicket,
}

impl StagingBuffer {
    /// Create a staging buffer containing `data`
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        data: &[u8],
    ) -> VulkanResult<Self> {
        let buffer = Buffer::new(
            device,
            memory_properties,
            data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        buffer.write_bytes(data)?;

        Ok(Self {
            buffer,
            _ticket: StagingTicket::issue(),
        })
    }

    /// Get the underlying buffer
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Number of staging buffers currently alive
    pub fn live_count() -> usize {
        LIVE_STAGING.load(Ordering::SeqCst)
    }
}

/// Accounting guard: one ticket exists per live staging buffer
struct StagingTicket;

impl StagingTicket {
    fn issue() -> Self {
        LIVE_STAGING.fetch_add(1, Ordering::SeqCst);
        Self
    }
}

impl Drop for StagingTicket {
    fn drop(&mut self) {
        LIVE_STAGING.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Host-visible uniform buffer with a fixed byte size.
///
/// One of these exists per swapchain image; each is written only while its
/// image is owned by the host, so the writes need no extra synchronization.
pub struct UniformBuffer {
    buffer: Buffer,
}

impl UniformBuffer {
    /// Create a uniform buffer of `size` bytes
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
    ) -> VulkanResult<Self> {
        let buffer = Buffer::new(
            device,
            memory_properties,
            size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        Ok(Self { buffer })
    }

    /// Overwrite the buffer with a payload of exactly its size
    pub fn write(&self, bytes: &[u8]) -> VulkanResult<()> {
        if bytes.len() as vk::DeviceSize != self.buffer.size() {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "Uniform payload is {} bytes, buffer holds {}",
                    bytes.len(),
                    self.buffer.size()
                ),
            });
        }
        self.buffer.write_bytes(bytes)
    }

    /// Descriptor info covering the whole buffer
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer.handle(),
            offset: 0,
            range: self.buffer.size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_accounting_balances_on_drop() {
        let baseline = StagingBuffer::live_count();

        let first = StagingTicket::issue();
        let second = StagingTicket::issue();
        assert_eq!(StagingBuffer::live_count(), baseline + 2);

        drop(first);
        assert_eq!(StagingBuffer::live_count(), baseline + 1);

        drop(second);
        assert_eq!(StagingBuffer::live_count(), baseline);
    }
}
