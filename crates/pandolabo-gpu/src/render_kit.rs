//! Render pass plus framebuffer selection for `begin_renderpass`.

use crate::context::GpuContext;
use crate::error::Result;
use ash::vk;
use std::sync::Arc;

/// What a graphics recorder needs to begin a render pass.
pub trait RenderKit {
    fn render_pass(&self) -> vk::RenderPass;

    /// Framebuffer for the current image.
    fn framebuffer(&self) -> vk::Framebuffer;

    fn clear_values(&self) -> &[vk::ClearValue];

    fn extent(&self) -> vk::Extent2D;

    /// Select the framebuffer for a newly acquired swapchain image.
    fn update_index(&mut self, image_index: u32);
}

/// Single colour attachment, cleared on load and left ready to present.
pub struct SwapchainRenderKit {
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    clear_values: [vk::ClearValue; 1],
    extent: vk::Extent2D,
    index: usize,
    device: Arc<ash::Device>,
}

impl SwapchainRenderKit {
    /// Build a render pass and one framebuffer per swapchain image.
    ///
    /// Must be rebuilt after the swapchain is recreated.
    pub fn new(ctx: &GpuContext, clear_color: [f32; 4]) -> Result<Self> {
        let swapchain = ctx.swapchain()?;
        let device = ctx.device_arc();

        let attachments = [vk::AttachmentDescription::default()
            .format(swapchain.format())
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)];

        let color_refs = [vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];

        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)];

        let dependencies = [vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)];

        let render_pass_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.create_render_pass(&render_pass_info, None)? };

        let mut kit = Self {
            render_pass,
            framebuffers: Vec::with_capacity(swapchain.image_count()),
            clear_values: [vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear_color,
                },
            }],
            extent: swapchain.extent(),
            index: 0,
            device,
        };

        for &view in swapchain.image_views() {
            let views = [view];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(kit.render_pass)
                .attachments(&views)
                .width(kit.extent.width)
                .height(kit.extent.height)
                .layers(1);
            // On failure the partially built kit cleans up in Drop.
            let framebuffer = unsafe { kit.device.create_framebuffer(&framebuffer_info, None)? };
            kit.framebuffers.push(framebuffer);
        }

        Ok(kit)
    }

    pub fn set_clear_color(&mut self, clear_color: [f32; 4]) {
        self.clear_values[0] = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        };
    }

    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }
}

impl RenderKit for SwapchainRenderKit {
    fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    fn framebuffer(&self) -> vk::Framebuffer {
        self.framebuffers[self.index]
    }

    fn clear_values(&self) -> &[vk::ClearValue] {
        &self.clear_values
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn update_index(&mut self, image_index: u32) {
        self.index = image_index as usize;
    }
}

impl Drop for SwapchainRenderKit {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.destroy_framebuffer(framebuffer, None);
            }
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}
