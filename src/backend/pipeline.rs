// Render pass, framebuffers and the triangle pipeline
//
// Viewport and scissor are dynamic so the pipeline survives swapchain
// recreation; only the framebuffers follow the swapchain.

use super::device::Device;
use super::error::{InitError, InitResult};
use super::shader;
use crate::vertex::Vertex;
use ash::vk;
use std::path::Path;

/// Single color attachment: cleared on load, stored, handed to presentation
pub fn create_render_pass(device: &Device, format: vk::Format) -> InitResult<vk::RenderPass> {
    let color_attachment = vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build();

    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let color_attachments = [color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_attachments)
        .build();

    // Color output must wait until the acquire semaphore has released the image
    let dependency = vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .build();

    let attachments = [color_attachment];
    let subpasses = [subpass];
    let dependencies = [dependency];

    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    unsafe { device.handle.create_render_pass(&render_pass_info, None) }.map_err(InitError::CreateRenderPass)
}

/// One framebuffer per swapchain image view. On failure the ones already
/// created are destroyed before returning.
pub fn create_framebuffers(
    device: &Device,
    image_views: &[vk::ImageView],
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
) -> InitResult<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(image_views.len());
    for &image_view in image_views {
        let attachments = [image_view];
        let framebuffer_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        match unsafe { device.handle.create_framebuffer(&framebuffer_info, None) } {
            Ok(fb) => framebuffers.push(fb),
            Err(e) => {
                destroy_framebuffers(device, &mut framebuffers);
                return Err(InitError::CreateFramebuffer(e));
            }
        }
    }
    Ok(framebuffers)
}

pub fn destroy_framebuffers(device: &Device, framebuffers: &mut Vec<vk::Framebuffer>) {
    for fb in framebuffers.drain(..) {
        unsafe { device.handle.destroy_framebuffer(fb, None) };
    }
}

pub struct TrianglePipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl TrianglePipeline {
    /// Load both shader stages and build the pipeline. Shader modules only
    /// live for the duration of this call.
    pub fn new(device: &Device, render_pass: vk::RenderPass, vertex: &Path, fragment: &Path) -> InitResult<Self> {
        let vert_code = shader::load_spirv(vertex)?;
        let frag_code = shader::load_spirv(fragment)?;

        let vert_module = shader::create_shader_module(device, &vert_code)?;
        let frag_module = match shader::create_shader_module(device, &frag_code) {
            Ok(m) => m,
            Err(e) => {
                unsafe { device.handle.destroy_shader_module(vert_module, None) };
                return Err(e);
            }
        };

        let result = Self::build(device, render_pass, vert_module, frag_module);

        unsafe {
            device.handle.destroy_shader_module(vert_module, None);
            device.handle.destroy_shader_module(frag_module, None);
        }
        result
    }

    fn build(
        device: &Device,
        render_pass: vk::RenderPass,
        vert_module: vk::ShaderModule,
        frag_module: vk::ShaderModule,
    ) -> InitResult<Self> {
        let entry_point = c"main";

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_module)
                .name(entry_point)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_module)
                .name(entry_point)
                .build(),
        ];

        let bindings = [Vertex::binding_description()];
        let attributes = Vertex::attribute_descriptions();
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Counts only; the values are set per frame
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        // Opaque, no blending
        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build();

        let color_blend_attachments = [color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let layout_info = vk::PipelineLayoutCreateInfo::builder();
        let layout = unsafe { device.handle.create_pipeline_layout(&layout_info, None) }
            .map_err(InitError::CreatePipelineLayout)?;

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0)
            .build();

        let pipelines = unsafe {
            device
                .handle
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };

        match pipelines {
            Ok(pipelines) => Ok(Self {
                pipeline: pipelines[0],
                layout,
            }),
            Err((_, e)) => {
                unsafe { device.handle.destroy_pipeline_layout(layout, None) };
                Err(InitError::CreatePipeline(e))
            }
        }
    }

    pub fn destroy(&self, device: &Device) {
        unsafe {
            device.handle.destroy_pipeline(self.pipeline, None);
            device.handle.destroy_pipeline_layout(self.layout, None);
        }
    }
}
