//! Vulkan synchronization primitives for GPU/CPU coordination
//!
//! Semaphores order GPU work (acquire -> render -> present), fences let the
//! CPU wait for a frame slot's previous submission. One [`FrameSync`] exists
//! per frame in flight.
//!
//! A slot goes through the same cycle every frame:
//!
//! 1. wait on `in_flight`, so the slot's last submission has retired
//! 2. acquire an image, signalling `image_available`
//! 3. if another slot last rendered that image, wait on that slot's fence
//! 4. reset `in_flight` and submit, waiting on `image_available` at the
//!    colour output stage and signalling `render_finished` plus `in_flight`
//! 5. present, waiting on `render_finished`
//!
//! The fence is reset only right before the submit that signals it again, so
//! an acquire that fails part way never leaves a fence nobody will signal.
//! All objects are destroyed with the [`Device`] they were created from and
//! must outlive any GPU work that references them.

use ash::{vk, Device};

use super::{VulkanError, VulkanResult};

/// Binary semaphore ordering two queue operations, destroyed on drop
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new binary semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe { device.create_semaphore(&create_info, None).map_err(VulkanError::Api)? };

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence the host waits on for queue work to finish, destroyed on drop
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    ///
    /// `signaled` fences satisfy their first [`Fence::wait`] immediately,
    /// which is what a frame slot with no prior submission needs.
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe { device.create_fence(&create_info, None).map_err(VulkanError::Api)? };

        Ok(Self { device, fence })
    }

    /// Wait for the fence to be signaled
    ///
    /// `timeout` is in nanoseconds; `u64::MAX` waits indefinitely. An
    /// expired timeout surfaces as `VulkanError::Api(vk::Result::TIMEOUT)`.
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.fence], true, timeout)
                .map_err(VulkanError::Api)
        }
    }

    /// Reset to the unsignaled state
    ///
    /// Must not be called while a pending submission still references the
    /// fence.
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]).map_err(VulkanError::Api) }
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization objects owned by one frame slot
pub struct FrameSync {
    /// Signalled by acquire, waited on by the slot's submit
    pub image_available: Semaphore,
    /// Signalled by the slot's submit, waited on by present
    pub render_finished: Semaphore,
    /// Signalled when the slot's submission retires
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create the slot's objects, with the fence already signaled so the
    /// first wait returns immediately
    pub fn new(device: Device) -> VulkanResult<Self> {
        let image_available = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device, true)?;

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }
}
