//! Frame orchestration
//!
//! [`Renderer`] drives one frame at a time:
//! `begin_frame` -> `begin_swapchain_render_pass` -> (systems record) ->
//! `end_swapchain_render_pass` -> `end_frame`.
//!
//! A stale swapchain is never an error for callers: `begin_frame` returns
//! `None` after recreating it and the frame is skipped, `end_frame` recreates
//! it after presenting.

use ash::vk;
use std::rc::Rc;

use crate::render::vulkan::{
    wait_for_nonzero_extent, AcquireStatus, SwapchainManager, VulkanContext, VulkanError, VulkanResult, Window,
    MAX_FRAMES_IN_FLIGHT,
};

/// Clear colour of the main pass
pub const CLEAR_COLOR: [f32; 4] = [0.01, 0.01, 0.01, 1.0];

/// Frame slot index, advancing modulo [`MAX_FRAMES_IN_FLIGHT`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCounter {
    index: usize,
}

impl FrameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Move to the next slot and return it
    pub fn advance(&mut self) -> usize {
        self.index = (self.index + 1) % MAX_FRAMES_IN_FLIGHT;
        self.index
    }
}

/// Whether a frame is being recorded, and for which swapchain image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameState {
    image_index: Option<u32>,
}

impl FrameState {
    pub fn begin(&mut self, image_index: u32) -> VulkanResult<()> {
        if self.image_index.is_some() {
            return Err(VulkanError::invalid("Can't call begin_frame while already in progress"));
        }
        self.image_index = Some(image_index);
        Ok(())
    }

    /// Finish the frame, returning its image index
    pub fn end(&mut self) -> VulkanResult<u32> {
        self.image_index
            .take()
            .ok_or_else(|| VulkanError::invalid("Can't call end_frame while frame is not in progress"))
    }

    pub fn is_started(&self) -> bool {
        self.image_index.is_some()
    }

    pub fn image_index(&self) -> VulkanResult<u32> {
        self.image_index
            .ok_or_else(|| VulkanError::invalid("Cannot get image index when frame not in progress"))
    }
}

/// Owns the swapchain generation and the per-slot command buffers
pub struct Renderer {
    command_buffers: Vec<vk::CommandBuffer>,
    swapchain: Option<SwapchainManager>,
    context: Rc<VulkanContext>,
    image_count: usize,
    frame: FrameState,
    counter: FrameCounter,
}

impl Renderer {
    pub fn new(context: Rc<VulkanContext>, window: &mut Window) -> VulkanResult<Self> {
        let extent = wait_for_nonzero_extent(window);
        let swapchain = SwapchainManager::new(&context, extent)?;
        let image_count = swapchain.image_count();
        let command_buffers = context
            .command_pool()
            .allocate_command_buffers(MAX_FRAMES_IN_FLIGHT as u32)?;

        log::info!(
            "[RENDERER] Ready with {} swapchain image(s), {} frame(s) in flight",
            image_count,
            MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            command_buffers,
            swapchain: Some(swapchain),
            context,
            image_count,
            frame: FrameState::default(),
            counter: FrameCounter::new(),
        })
    }

    fn swapchain(&self) -> VulkanResult<&SwapchainManager> {
        self.swapchain
            .as_ref()
            .ok_or_else(|| VulkanError::invalid("Swapchain unavailable after failed recreation"))
    }

    /// Replace the swapchain generation for the current window extent
    ///
    /// Blocks while the window is minimized.
    pub fn recreate_swapchain(&mut self, window: &mut Window) -> VulkanResult<()> {
        let extent = wait_for_nonzero_extent(window);
        self.context.wait_idle()?;

        let next = match self.swapchain.take() {
            Some(previous) => SwapchainManager::recreate(&self.context, extent, previous)?,
            None => SwapchainManager::new(&self.context, extent)?,
        };

        if next.image_count() != self.image_count {
            log::debug!(
                "[RENDERER] Image count changed {} -> {}, reallocating command buffers",
                self.image_count,
                next.image_count()
            );
            let pool = self.context.command_pool();
            pool.free_command_buffers(&self.command_buffers);
            self.command_buffers = pool.allocate_command_buffers(MAX_FRAMES_IN_FLIGHT as u32)?;
            self.image_count = next.image_count();
        }

        self.swapchain = Some(next);
        Ok(())
    }

    /// Acquire an image and start recording
    ///
    /// Returns `None` when the swapchain was out of date; it has been
    /// recreated and the caller should skip this frame.
    pub fn begin_frame(&mut self, window: &mut Window) -> VulkanResult<Option<vk::CommandBuffer>> {
        if self.frame.is_started() {
            return Err(VulkanError::invalid("Can't call begin_frame while already in progress"));
        }

        let status = self.swapchain()?.acquire_next_image(self.counter.index())?;
        let image_index = match status {
            AcquireStatus::OutOfDate => {
                self.recreate_swapchain(window)?;
                return Ok(None);
            }
            AcquireStatus::Ready(index) | AcquireStatus::Suboptimal(index) => index,
        };

        self.frame.begin(image_index)?;

        let command_buffer = self.command_buffers[self.counter.index()];
        let begin_info = vk::CommandBufferBeginInfo::builder();
        unsafe {
            self.context
                .device()
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }
        Ok(Some(command_buffer))
    }

    /// Finish recording, submit and present
    ///
    /// The frame counts as ended and the slot advances even when submission
    /// fails.
    pub fn end_frame(&mut self, window: &mut Window) -> VulkanResult<()> {
        let image_index = self.frame.end()?;
        let frame = self.counter.index();
        let result = self.submit_and_present(window, image_index, frame);
        self.counter.advance();
        result
    }

    fn submit_and_present(&mut self, window: &mut Window, image_index: u32, frame: usize) -> VulkanResult<()> {
        let command_buffer = self.command_buffers[frame];
        unsafe {
            self.context
                .device()
                .end_command_buffer(command_buffer)
                .map_err(VulkanError::Api)?;
        }

        let status = self
            .swapchain
            .as_mut()
            .ok_or_else(|| VulkanError::invalid("Swapchain unavailable after failed recreation"))?
            .submit_command_buffers(command_buffer, image_index, frame)?;

        if status.needs_recreation() || window.was_resized() {
            window.reset_resized_flag();
            self.recreate_swapchain(window)?;
        }
        Ok(())
    }

    fn check_recording(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        if !self.frame.is_started() {
            return Err(VulkanError::invalid("Render pass commands require a frame in progress"));
        }
        if command_buffer != self.command_buffers[self.counter.index()] {
            return Err(VulkanError::invalid(
                "Can't record a render pass on a command buffer from a different frame",
            ));
        }
        Ok(())
    }

    /// Begin the main pass, clearing colour and depth and setting a
    /// full-extent viewport and scissor
    pub fn begin_swapchain_render_pass(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        self.check_recording(command_buffer)?;
        let swapchain = self.swapchain()?;
        let image_index = self.frame.image_index()?;
        let framebuffer = swapchain
            .framebuffer(image_index as usize)
            .ok_or_else(|| VulkanError::invalid(format!("No framebuffer for image {}", image_index)))?;
        let extent = swapchain.extent();

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: CLEAR_COLOR },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ];

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(swapchain.render_pass())
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        let device = self.context.device();
        unsafe {
            device.cmd_begin_render_pass(command_buffer, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            device.cmd_set_scissor(command_buffer, 0, &[scissor]);
        }
        Ok(())
    }

    pub fn end_swapchain_render_pass(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        self.check_recording(command_buffer)?;
        unsafe {
            self.context.device().cmd_end_render_pass(command_buffer);
        }
        Ok(())
    }

    /// Render pass of the current generation; formats never change, so
    /// pipelines built against it stay compatible across recreations
    pub fn swapchain_render_pass(&self) -> vk::RenderPass {
        self.swapchain
            .as_ref()
            .map_or(vk::RenderPass::null(), SwapchainManager::render_pass)
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.swapchain
            .as_ref()
            .map_or(1.0, SwapchainManager::extent_aspect_ratio)
    }

    pub fn frame_index(&self) -> usize {
        self.counter.index()
    }

    pub fn is_frame_in_progress(&self) -> bool {
        self.frame.is_started()
    }

    pub fn current_command_buffer(&self) -> VulkanResult<vk::CommandBuffer> {
        if !self.frame.is_started() {
            return Err(VulkanError::invalid("Cannot get command buffer when frame not in progress"));
        }
        Ok(self.command_buffers[self.counter.index()])
    }

    pub fn context(&self) -> &Rc<VulkanContext> {
        &self.context
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let _ = self.context.wait_idle();
        self.context.command_pool().free_command_buffers(&self.command_buffers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::ImagesInFlight;
    use std::collections::VecDeque;

    #[test]
    fn test_frame_index_advances_modulo_frames_in_flight() {
        let mut counter = FrameCounter::new();
        let sequence: Vec<usize> = (0..5).map(|_| counter.advance()).collect();
        assert_eq!(sequence, vec![1, 0, 1, 0, 1]);
        assert!(sequence.iter().all(|&i| i < MAX_FRAMES_IN_FLIGHT));
    }

    #[test]
    fn test_frame_state_rejects_out_of_order_calls() {
        let mut state = FrameState::default();
        assert!(state.end().is_err());
        assert!(state.image_index().is_err());

        state.begin(2).expect("first begin");
        assert!(state.is_started());
        assert!(matches!(state.begin(0), Err(VulkanError::InvalidOperation { .. })));
        assert_eq!(state.image_index().ok(), Some(2));

        assert_eq!(state.end().ok(), Some(2));
        assert!(!state.is_started());
        assert!(state.end().is_err());
    }

    /// Host-side model of the in-flight fences. Each submission stays
    /// outstanding until a fence covering it is waited on: the slot fence in
    /// acquire, or the fence of the frame that last rendered the image.
    /// Returns the largest number of outstanding submissions seen.
    fn max_outstanding(frames: usize, image_count: usize, wait_slot_fence: bool) -> usize {
        let mut counter = FrameCounter::new();
        let mut images = ImagesInFlight::new(image_count);
        let mut outstanding: VecDeque<usize> = VecDeque::new();
        let mut max = 0;

        for frame_number in 0..frames {
            let slot = counter.index();
            if wait_slot_fence {
                outstanding.retain(|&s| s != slot);
            }

            let image = (frame_number * 2 + frame_number / 3) % image_count;
            if let Some(owner) = images.claim(image, slot) {
                outstanding.retain(|&s| s != owner);
            }

            outstanding.push_back(slot);
            max = max.max(outstanding.len());
            counter.advance();
        }
        max
    }

    #[test]
    fn test_frames_in_flight_never_exceed_limit() {
        for image_count in 2..=4 {
            let max = max_outstanding(50, image_count, true);
            assert!(max <= MAX_FRAMES_IN_FLIGHT, "{} outstanding with {} images", max, image_count);
            assert_eq!(max, MAX_FRAMES_IN_FLIGHT);
        }
    }

    #[test]
    fn test_skipping_slot_fence_wait_breaks_frame_limit() {
        assert!(max_outstanding(50, 3, false) > MAX_FRAMES_IN_FLIGHT);
    }
}
