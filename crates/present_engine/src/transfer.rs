//! Staging-based transfers into device-local memory
//!
//! Every upload is synchronous: stage the payload in host-visible memory,
//! record a one-shot command buffer, submit, and block until the queue
//! drains. The staging buffer is released on every exit path, success or
//! not, before the call returns.

use crate::buffer::{Buffer, StagingBuffer};
use crate::commands::{CommandPool, OneShotCommands};
use crate::context::DeviceContext;
use crate::error::{VulkanError, VulkanResult};
use crate::texture::TextureImage;
use ash::{vk, Device};

/// Access masks and pipeline stages for one image layout transition:
/// `(src_access, dst_access, src_stage, dst_stage)`.
///
/// Only the two transitions the upload path performs are supported; any
/// other pair is a caller bug and is rejected.
fn transition_masks(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> VulkanResult<(
    vk::AccessFlags,
    vk::AccessFlags,
    vk::PipelineStageFlags,
    vk::PipelineStageFlags,
)> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok((
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        )),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok((
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ))
        }
        (old, new) => Err(VulkanError::UnsupportedLayoutTransition { old, new }),
    }
}

/// Tightly packed byte size of a `width` x `height` RGBA8 image, or
/// `None` when the product overflows `usize`
fn rgba_image_size(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|texels| texels.checked_mul(4))
}

/// Uploads application data into device-local buffers and images
pub struct TransferEngine {
    device: Device,
    queue: vk::Queue,
    pool: CommandPool,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl TransferEngine {
    /// Create a transfer engine with its own command pool on the graphics
    /// family
    pub fn new(context: &DeviceContext) -> VulkanResult<Self> {
        let device = context.raw_device();
        let pool = CommandPool::new(device.clone(), context.device().graphics_family)?;

        Ok(Self {
            device,
            queue: context.graphics_queue(),
            pool,
            memory_properties: *context.memory_properties(),
        })
    }

    /// Upload `data` into a new device-local buffer with the given usage.
    ///
    /// `TRANSFER_DST` is added to `usage` automatically.
    pub fn upload_buffer(
        &self,
        data: &[u8],
        usage: vk::BufferUsageFlags,
    ) -> VulkanResult<Buffer> {
        if data.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: "Cannot upload an empty buffer".to_string(),
            });
        }

        let staging = StagingBuffer::new(self.device.clone(), &self.memory_properties, data)?;

        let dest = Buffer::new(
            self.device.clone(),
            &self.memory_properties,
            data.len() as vk::DeviceSize,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let commands = OneShotCommands::begin(self.device.clone(), &self.pool)?;

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size: data.len() as vk::DeviceSize,
        };
        unsafe {
            self.device.cmd_copy_buffer(
                commands.buffer(),
                staging.buffer().handle(),
                dest.handle(),
                &[region],
            );
        }

        commands.submit_and_wait(self.queue)?;
        drop(staging);

        log::debug!("Uploaded {} bytes to device-local buffer", data.len());
        Ok(dest)
    }

    /// Upload a slice of plain-old-data values as raw bytes
    pub fn upload_slice<T: bytemuck::Pod>(
        &self,
        data: &[T],
        usage: vk::BufferUsageFlags,
    ) -> VulkanResult<Buffer> {
        self.upload_buffer(bytemuck::cast_slice(data), usage)
    }

    /// Upload tightly packed RGBA8 pixels into a new sampled image.
    ///
    /// The image is left in `SHADER_READ_ONLY_OPTIMAL`.
    pub fn upload_image(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        format: vk::Format,
    ) -> VulkanResult<TextureImage> {
        if pixels.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: "Cannot upload an empty image".to_string(),
            });
        }
        let expected =
            rgba_image_size(width, height).ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!(
                    "Image dimensions {}x{} overflow addressable memory",
                    width, height
                ),
            })?;
        if pixels.len() != expected {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "Image payload is {} bytes, {}x{} at 4 bytes per texel needs {}",
                    pixels.len(),
                    width,
                    height,
                    expected
                ),
            });
        }

        let staging = StagingBuffer::new(self.device.clone(), &self.memory_properties, pixels)?;

        let image = TextureImage::new_device_local(
            self.device.clone(),
            &self.memory_properties,
            width,
            height,
            format,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        )?;

        // Transition, copy, and transition again in a single submission.
        let commands = OneShotCommands::begin(self.device.clone(), &self.pool)?;

        self.record_layout_transition(
            commands.buffer(),
            image.handle(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;

        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
        };
        unsafe {
            self.device.cmd_copy_buffer_to_image(
                commands.buffer(),
                staging.buffer().handle(),
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }

        self.record_layout_transition(
            commands.buffer(),
            image.handle(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;

        commands.submit_and_wait(self.queue)?;
        drop(staging);

        log::debug!("Uploaded {}x{} image ({} bytes)", width, height, pixels.len());
        Ok(image)
    }

    /// Copy a device-local buffer back to host memory.
    ///
    /// The source must have been created with `TRANSFER_SRC` usage.
    pub fn download_buffer(&self, buffer: &Buffer) -> VulkanResult<Vec<u8>> {
        if !buffer.usage().contains(vk::BufferUsageFlags::TRANSFER_SRC) {
            return Err(VulkanError::InvalidOperation {
                reason: "Buffer was not created with TRANSFER_SRC usage".to_string(),
            });
        }

        let readback = Buffer::new(
            self.device.clone(),
            &self.memory_properties,
            buffer.size(),
            vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let commands = OneShotCommands::begin(self.device.clone(), &self.pool)?;

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size: buffer.size(),
        };
        unsafe {
            self.device.cmd_copy_buffer(
                commands.buffer(),
                buffer.handle(),
                readback.handle(),
                &[region],
            );
        }

        commands.submit_and_wait(self.queue)?;

        readback.read_bytes()
    }

    fn record_layout_transition(
        &self,
        command_buffer: vk::CommandBuffer,
        image: vk::Image,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> VulkanResult<()> {
        let (src_access, dst_access, src_stage, dst_stage) = transition_masks(old, new)?;

        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(old)
            .new_layout(new)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_access_mask(src_access)
            .dst_access_mask(dst_access);

        unsafe {
            self.device.cmd_pipeline_barrier(
                command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier.build()],
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_into_transfer_dst_uses_transfer_write() {
        let (src_access, dst_access, src_stage, dst_stage) = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();

        assert_eq!(src_access, vk::AccessFlags::empty());
        assert_eq!(dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn transition_into_shader_read_waits_on_transfer() {
        let (src_access, dst_access, src_stage, dst_stage) = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();

        assert_eq!(src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn oversized_image_dimensions_are_rejected() {
        assert_eq!(rgba_image_size(64, 64), Some(64 * 64 * 4));
        assert_eq!(rgba_image_size(0, 0), Some(0));

        // 2^31 x 2^31 texels wraps to zero bytes in unchecked release
        // arithmetic, which would match an empty payload.
        assert_eq!(rgba_image_size(1 << 31, 1 << 31), None);
    }

    #[test]
    fn unsupported_transitions_are_rejected() {
        let err = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap_err();

        match err {
            VulkanError::UnsupportedLayoutTransition { old, new } => {
                assert_eq!(old, vk::ImageLayout::UNDEFINED);
                assert_eq!(new, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(transition_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .is_err());
    }
}
