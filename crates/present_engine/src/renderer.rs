//! Top-level renderer tying device, swapchain, and frame pacing together
//!
//! [`Renderer`] owns the full presentation stack. Per frame it hands a
//! Vulkan-backed [`FrameContext`] to the [`FrameLoop`]; when the loop or a
//! window event reports the swapchain stale, it coordinates the rebuild of
//! everything derived from swapchain images while the frames-in-flight
//! synchronization objects stay put.

use crate::buffer::{Buffer, UniformBuffer};
use crate::commands::CommandPool;
use crate::config::RendererConfig;
use crate::context::DeviceContext;
use crate::descriptor::DescriptorResources;
use crate::device::LogicalDevice;
use crate::error::{VulkanError, VulkanResult};
use crate::frame::{AcquireResult, FrameContext, FrameLoop, FrameOutcome, PresentResult};
use crate::framebuffer::Framebuffer;
use crate::render_pass::RenderPass;
use crate::swapchain::Swapchain;
use crate::sync::FrameSync;
use crate::texture::TextureImage;
use crate::transfer::TransferEngine;
use crate::window::Window;
use ash::{vk, Device};

/// Renderer presenting cleared frames to a window surface.
///
/// Uniform data flows in as raw bytes of the size fixed at construction;
/// one uniform buffer and one prerecorded command buffer exist per
/// swapchain image.
pub struct Renderer {
    // Field order is drop order: per-image resources first, the swapchain
    // they derive from after them, and the device context last.
    command_buffers: Vec<vk::CommandBuffer>,
    descriptors: DescriptorResources,
    uniforms: Vec<UniformBuffer>,
    framebuffers: Vec<Framebuffer>,
    render_pass: RenderPass,
    swapchain: Swapchain,
    frame_syncs: Vec<FrameSync>,
    command_pool: CommandPool,
    transfer: TransferEngine,
    context: DeviceContext,
    config: RendererConfig,
    frame_loop: FrameLoop,
    uniform_size: vk::DeviceSize,
    resize_requested: bool,
}

impl Renderer {
    /// Bring up the device and presentation stack for `window`.
    ///
    /// `uniform_size` fixes the byte size every later
    /// [`draw_frame`](Self::draw_frame) payload must match.
    pub fn new(
        window: &mut Window,
        config: &RendererConfig,
        uniform_size: vk::DeviceSize,
    ) -> VulkanResult<Self> {
        if uniform_size == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "Uniform size must be nonzero".to_string(),
            });
        }

        let context = DeviceContext::new(window, config)?;
        let transfer = TransferEngine::new(&context)?;
        let command_pool =
            CommandPool::new(context.raw_device(), context.device().graphics_family)?;

        let frame_syncs = (0..config.frames_in_flight())
            .map(|_| FrameSync::new(context.raw_device()))
            .collect::<VulkanResult<Vec<_>>>()?;

        let (width, height) = window.get_framebuffer_size();
        let swapchain = Swapchain::new(
            &context,
            vk::Extent2D { width, height },
            config.preferred_present_mode.to_vk(),
        )?;

        let render_pass =
            RenderPass::new_present_pass(context.raw_device(), swapchain.format().format)?;
        let framebuffers = Self::build_framebuffers(&context, &swapchain, &render_pass)?;
        let uniforms =
            Self::build_uniforms(&context, swapchain.image_count(), uniform_size)?;
        let descriptors = DescriptorResources::new(context.raw_device(), &uniforms)?;

        let command_buffers = command_pool.allocate(swapchain.image_count() as u32)?;
        Self::record_command_buffers(
            &context.raw_device(),
            &command_buffers,
            &render_pass,
            &framebuffers,
            swapchain.extent(),
            config.clear_color,
        )?;

        log::info!(
            "Renderer ready: {} swapchain images, {} frames in flight",
            swapchain.image_count(),
            config.frames_in_flight()
        );

        Ok(Self {
            command_buffers,
            descriptors,
            uniforms,
            framebuffers,
            render_pass,
            swapchain,
            frame_syncs,
            command_pool,
            transfer,
            context,
            config: config.clone(),
            frame_loop: FrameLoop::new(),
            uniform_size,
            resize_requested: false,
        })
    }

    /// Upload `data` into a device-local buffer
    pub fn upload_buffer(
        &self,
        data: &[u8],
        usage: vk::BufferUsageFlags,
    ) -> VulkanResult<Buffer> {
        self.transfer.upload_buffer(data, usage)
    }

    /// Upload a slice of plain-old-data values into a device-local buffer
    pub fn upload_slice<T: bytemuck::Pod>(
        &self,
        data: &[T],
        usage: vk::BufferUsageFlags,
    ) -> VulkanResult<Buffer> {
        self.transfer.upload_slice(data, usage)
    }

    /// Upload tightly packed RGBA8 pixels into a sampled image
    pub fn upload_texture(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        format: vk::Format,
    ) -> VulkanResult<TextureImage> {
        self.transfer.upload_image(pixels, width, height, format)
    }

    /// Copy a device-local buffer back to host memory
    pub fn download_buffer(&self, buffer: &Buffer) -> VulkanResult<Vec<u8>> {
        self.transfer.download_buffer(buffer)
    }

    /// Note a window resize; the swapchain is rebuilt at the next frame
    /// boundary. Repeated calls coalesce into a single rebuild.
    pub fn notify_resize(&mut self) {
        self.resize_requested = true;
    }

    /// Render and present one frame carrying `uniform_bytes`.
    ///
    /// Stale-swapchain reports from acquire or present are absorbed here:
    /// the swapchain is rebuilt and the next call resumes presenting.
    pub fn draw_frame(&mut self, window: &mut Window, uniform_bytes: &[u8]) -> VulkanResult<()> {
        let mut frame = VulkanFrame {
            device: self.context.device(),
            swapchain: &self.swapchain,
            frame_syncs: &self.frame_syncs,
            command_buffers: &self.command_buffers,
            uniforms: &self.uniforms,
            uniform_bytes,
            frames_in_flight: self.config.frames_in_flight(),
        };

        match self.frame_loop.advance(&mut frame)? {
            FrameOutcome::Presented { needs_rebuild } => {
                if needs_rebuild || self.resize_requested {
                    self.rebuild_swapchain(window)?;
                }
            }
            FrameOutcome::RebuildRequired => {
                self.rebuild_swapchain(window)?;
            }
        }

        Ok(())
    }

    /// Block until the device finishes all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.context.wait_idle()
    }

    /// Number of swapchain images currently in rotation
    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    /// Current swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Negotiated surface format
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.swapchain.format()
    }

    /// Number of frame slots being cycled
    pub fn frames_in_flight(&self) -> usize {
        self.config.frames_in_flight()
    }

    /// Layout of the per-image uniform descriptor sets
    pub fn descriptor_layout(&self) -> vk::DescriptorSetLayout {
        self.descriptors.layout()
    }

    /// Tear down and recreate everything derived from swapchain images.
    ///
    /// Blocks first while the window reports a degenerate extent, then
    /// idles the device so retired resources are safe to destroy. The
    /// [`FrameSync`] objects are deliberately left alone; slots keep their
    /// fences and semaphores across the rebuild.
    fn rebuild_swapchain(&mut self, window: &mut Window) -> VulkanResult<()> {
        let (width, height) = window.wait_for_valid_extent();
        self.context.wait_idle()?;

        // Per-image resources go first, while their images still exist.
        self.command_pool.free(&self.command_buffers);
        self.command_buffers.clear();
        self.framebuffers.clear();

        let new_swapchain = Swapchain::recreate(
            &self.context,
            vk::Extent2D { width, height },
            self.config.preferred_present_mode.to_vk(),
            self.swapchain.handle(),
        )?;
        // Assignment drops the retired swapchain now that its replacement
        // exists.
        self.swapchain = new_swapchain;

        self.render_pass = RenderPass::new_present_pass(
            self.context.raw_device(),
            self.swapchain.format().format,
        )?;
        self.framebuffers =
            Self::build_framebuffers(&self.context, &self.swapchain, &self.render_pass)?;

        // The image count can change across recreation; per-image
        // resources track it.
        self.uniforms = Self::build_uniforms(
            &self.context,
            self.swapchain.image_count(),
            self.uniform_size,
        )?;
        self.descriptors = DescriptorResources::new(self.context.raw_device(), &self.uniforms)?;

        self.command_buffers = self
            .command_pool
            .allocate(self.swapchain.image_count() as u32)?;
        Self::record_command_buffers(
            &self.context.raw_device(),
            &self.command_buffers,
            &self.render_pass,
            &self.framebuffers,
            self.swapchain.extent(),
            self.config.clear_color,
        )?;

        self.resize_requested = false;

        log::info!(
            "Swapchain rebuilt: {}x{}, {} images",
            self.swapchain.extent().width,
            self.swapchain.extent().height,
            self.swapchain.image_count()
        );
        Ok(())
    }

    fn build_framebuffers(
        context: &DeviceContext,
        swapchain: &Swapchain,
        render_pass: &RenderPass,
    ) -> VulkanResult<Vec<Framebuffer>> {
        swapchain
            .image_views()
            .iter()
            .map(|&view| {
                Framebuffer::new(
                    context.raw_device(),
                    render_pass.handle(),
                    &[view],
                    swapchain.extent(),
                )
            })
            .collect()
    }

    fn build_uniforms(
        context: &DeviceContext,
        count: usize,
        size: vk::DeviceSize,
    ) -> VulkanResult<Vec<UniformBuffer>> {
        (0..count)
            .map(|_| UniformBuffer::new(context.raw_device(), context.memory_properties(), size))
            .collect()
    }

    /// Record one clear-and-present pass per swapchain image.
    ///
    /// `SIMULTANEOUS_USE` lets a buffer be resubmitted while an earlier
    /// submission of it is still in flight, which happens whenever acquire
    /// returns the same image for two nearby frames.
    fn record_command_buffers(
        device: &Device,
        command_buffers: &[vk::CommandBuffer],
        render_pass: &RenderPass,
        framebuffers: &[Framebuffer],
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    ) -> VulkanResult<()> {
        for (&command_buffer, framebuffer) in command_buffers.iter().zip(framebuffers) {
            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);

            unsafe {
                device
                    .begin_command_buffer(command_buffer, &begin_info)
                    .map_err(VulkanError::Api)?;
            }

            let clear_values = [vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear_color,
                },
            }];
            let pass_info = vk::RenderPassBeginInfo::builder()
                .render_pass(render_pass.handle())
                .framebuffer(framebuffer.handle())
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .clear_values(&clear_values);

            unsafe {
                device.cmd_begin_render_pass(
                    command_buffer,
                    &pass_info,
                    vk::SubpassContents::INLINE,
                );
                device.cmd_end_render_pass(command_buffer);
                device
                    .end_command_buffer(command_buffer)
                    .map_err(VulkanError::Api)?;
            }
        }

        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.context.wait_idle() {
            log::error!("Device wait failed during renderer teardown: {e}");
        }
    }
}

/// Vulkan-backed [`FrameContext`] borrowing the renderer's resources for
/// the duration of one frame
struct VulkanFrame<'a> {
    device: &'a LogicalDevice,
    swapchain: &'a Swapchain,
    frame_syncs: &'a [FrameSync],
    command_buffers: &'a [vk::CommandBuffer],
    uniforms: &'a [UniformBuffer],
    uniform_bytes: &'a [u8],
    frames_in_flight: usize,
}

impl FrameContext for VulkanFrame<'_> {
    fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    fn wait_for_fence(&mut self, slot: usize) -> VulkanResult<()> {
        self.frame_syncs[slot].in_flight.wait(u64::MAX)
    }

    fn reset_fence(&mut self, slot: usize) -> VulkanResult<()> {
        self.frame_syncs[slot].in_flight.reset()
    }

    fn acquire_image(&mut self, slot: usize) -> VulkanResult<AcquireResult> {
        let sync = &self.frame_syncs[slot];

        match unsafe {
            self.device.swapchain_loader.acquire_next_image(
                self.swapchain.handle(),
                u64::MAX,
                sync.image_available.handle(),
                vk::Fence::null(),
            )
        } {
            Ok((image_index, suboptimal)) => {
                if suboptimal {
                    // Still renderable; presentation will report it too
                    // and trigger the rebuild.
                    log::debug!("Acquired image {image_index} from a suboptimal swapchain");
                }
                Ok(AcquireResult::Ready { image_index })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireResult::OutOfDate),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    fn update_frame_data(&mut self, image_index: u32) -> VulkanResult<()> {
        self.uniforms[image_index as usize].write(self.uniform_bytes)
    }

    fn submit_commands(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
        let sync = &self.frame_syncs[slot];

        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffers[image_index as usize]];
        let signal_semaphores = [sync.render_finished.handle()];

        let submit = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        self.device
            .submit(&[submit.build()], sync.in_flight.handle())
    }

    fn present_image(
        &mut self,
        slot: usize,
        image_index: u32,
    ) -> VulkanResult<PresentResult> {
        let sync = &self.frame_syncs[slot];

        let wait_semaphores = [sync.render_finished.handle()];
        let swapchains = [self.swapchain.handle()];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe {
            self.device
                .swapchain_loader
                .queue_present(self.device.present_queue, &present_info)
        } {
            Ok(suboptimal) => Ok(PresentResult::Presented { suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentResult::OutOfDate),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }
}
