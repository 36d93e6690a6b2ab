// Command pool and per-frame recording

use super::buffer::VertexBuffer;
use super::device::Device;
use super::error::{InitError, InitResult};
use ash::vk;

pub struct Commands {
    pub pool: vk::CommandPool,
    pub buffer: vk::CommandBuffer,
}

impl Commands {
    pub fn new(device: &Device) -> InitResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.queue_family)
            // Re-recorded every frame
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.handle.create_command_pool(&pool_info, None) }
            .map_err(InitError::CreateCommandPool)?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        match unsafe { device.handle.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => Ok(Self {
                pool,
                buffer: buffers[0],
            }),
            Err(e) => {
                unsafe { device.handle.destroy_command_pool(pool, None) };
                Err(InitError::AllocateCommandBuffers(e))
            }
        }
    }

    /// Frees the command buffer with the pool
    pub fn destroy(&self, device: &Device) {
        unsafe { device.handle.destroy_command_pool(self.pool, None) };
    }
}

/// Everything one draw needs
pub struct DrawTarget<'a> {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    pub vertices: &'a VertexBuffer,
    pub clear_color: [f32; 4],
}

/// Record: begin render pass (clear), bind pipeline and vertex buffer,
/// draw, end. The render pass moves the image to PRESENT_SRC.
pub fn record_draw(device: &ash::Device, cmd: vk::CommandBuffer, target: &DrawTarget<'_>) -> Result<(), vk::Result> {
    unsafe {
        device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;

        let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        device.begin_command_buffer(cmd, &begin_info)?;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: target.clear_color,
            },
        }];
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: target.extent,
        };
        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(target.render_pass)
            .framebuffer(target.framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);

        device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, target.pipeline);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: target.extent.width as f32,
            height: target.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        device.cmd_set_viewport(cmd, 0, &[viewport]);
        device.cmd_set_scissor(cmd, 0, &[render_area]);

        device.cmd_bind_vertex_buffers(cmd, 0, &[target.vertices.buffer], &[0]);
        device.cmd_draw(cmd, target.vertices.vertex_count, 1, 0, 0);

        device.cmd_end_render_pass(cmd);
        device.end_command_buffer(cmd)?;
    }
    Ok(())
}
