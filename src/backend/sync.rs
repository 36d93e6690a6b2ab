// Synchronization primitives
//
// One set per frame: the acquire semaphore gates color output, the render
// semaphore gates presentation, and the fence tells the CPU the command
// buffer can be re-recorded.

use super::device::Device;
use super::error::{InitError, InitResult};
use ash::vk;

/// What the CPU knows about `in_flight_fence`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceState {
    Signaled,
    /// Reset, and no submission will signal it
    Unsignaled,
    /// A successful submit will signal it
    Pending,
}

impl FenceState {
    /// Waiting on an unsignaled fence with nothing submitted never returns
    pub fn needs_wait(self) -> bool {
        self == FenceState::Pending
    }

    pub fn waited(self) -> Self {
        match self {
            FenceState::Pending => FenceState::Signaled,
            other => other,
        }
    }

    pub fn reset(self) -> Self {
        FenceState::Unsignaled
    }

    pub fn submitted(self) -> Self {
        FenceState::Pending
    }
}

pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &Device) -> InitResult<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Signaled so the first frame does not wait forever
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        let mut sync = Self {
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight_fence: vk::Fence::null(),
        };

        let result: Result<(), vk::Result> = (|| unsafe {
            sync.image_available = device.handle.create_semaphore(&semaphore_info, None)?;
            sync.render_finished = device.handle.create_semaphore(&semaphore_info, None)?;
            sync.in_flight_fence = device.handle.create_fence(&fence_info, None)?;
            Ok(())
        })();

        match result {
            Ok(()) => Ok(sync),
            Err(e) => {
                sync.destroy(device);
                Err(InitError::CreateSyncObjects(e))
            }
        }
    }

    pub fn destroy(&self, device: &Device) {
        unsafe {
            // Destroying a null handle is a no-op
            device.handle.destroy_semaphore(self.image_available, None);
            device.handle.destroy_semaphore(self.render_finished, None);
            device.handle.destroy_fence(self.in_flight_fence, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_submitted_work_is_waited_on() {
        assert!(!FenceState::Signaled.needs_wait());
        assert!(!FenceState::Unsignaled.needs_wait());
        assert!(FenceState::Pending.needs_wait());
    }

    #[test]
    fn failed_submit_does_not_block_the_next_frame() {
        // reset, then the submit errors out before `submitted`
        let state = FenceState::Signaled.waited().reset();
        assert_eq!(state, FenceState::Unsignaled);
        assert!(!state.needs_wait());

        // the next frame resets and submits normally
        let state = state.waited().reset().submitted();
        assert!(state.needs_wait());
        assert_eq!(state.waited(), FenceState::Signaled);
    }
}
