// Bring-up state machine
//
// Each stage is reached by exactly one creation step. `Progress` remembers the
// stage that is currently being entered so teardown can also release the
// partial results of a step that failed halfway.

use super::error::InitResult;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Uninitialized,
    LayersQueried,
    InstanceCreated,
    WindowCreated,
    SurfaceCreated,
    DeviceSelected,
    DeviceCreated,
    SwapChainCreated,
    ImagesAcquired,
    PipelineReady,
    Renderable,
}

impl Stage {
    pub const ALL: [Stage; 11] = [
        Stage::Uninitialized,
        Stage::LayersQueried,
        Stage::InstanceCreated,
        Stage::WindowCreated,
        Stage::SurfaceCreated,
        Stage::DeviceSelected,
        Stage::DeviceCreated,
        Stage::SwapChainCreated,
        Stage::ImagesAcquired,
        Stage::PipelineReady,
        Stage::Renderable,
    ];

    pub fn next(self) -> Option<Stage> {
        Self::ALL.get(self as usize + 1).copied()
    }

    /// Human-readable name of the step that leads into this stage
    pub fn step(self) -> &'static str {
        match self {
            Stage::Uninitialized => "nothing",
            Stage::LayersQueried => "querying instance layers and extensions",
            Stage::InstanceCreated => "creating the instance",
            Stage::WindowCreated => "creating the window",
            Stage::SurfaceCreated => "creating the surface",
            Stage::DeviceSelected => "selecting a physical device",
            Stage::DeviceCreated => "creating the logical device",
            Stage::SwapChainCreated => "creating the swapchain",
            Stage::ImagesAcquired => "creating swapchain image views",
            Stage::PipelineReady => "building the render pass and pipeline",
            Stage::Renderable => "creating the vertex buffer and frame resources",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How far bring-up got
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    reached: Stage,
    entered: Stage,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            reached: Stage::Uninitialized,
            entered: Stage::Uninitialized,
        }
    }
}

impl Progress {
    pub fn reached(&self) -> Stage {
        self.reached
    }

    /// Stage whose step is running or last failed
    pub fn entered(&self) -> Stage {
        self.entered
    }

    pub fn is_renderable(&self) -> bool {
        self.reached == Stage::Renderable
    }

    /// Mark the step into the next stage as started and return that stage
    pub fn begin(&mut self) -> Option<Stage> {
        if self.entered != self.reached {
            // The previous step never completed
            return None;
        }
        let next = self.reached.next()?;
        self.entered = next;
        Some(next)
    }

    /// Mark the step started by `begin` as finished
    pub fn complete(&mut self) {
        self.reached = self.entered;
    }

    /// Stages to release, most recent first. Includes a stage whose step
    /// started but never completed.
    pub fn unwind(&self) -> impl Iterator<Item = Stage> {
        (1..=self.entered as usize).rev().map(|i| Stage::ALL[i])
    }

    /// Forget everything; used once teardown has released the handles
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Run `step` for every stage after the one already reached, stopping at the
/// first failure. On error `progress.entered()` is the failing stage.
pub fn drive<F>(progress: &mut Progress, mut step: F) -> InitResult<()>
where
    F: FnMut(Stage) -> InitResult<()>,
{
    while let Some(stage) = progress.begin() {
        log::debug!("Bring-up: {}", stage.step());
        step(stage)?;
        progress.complete();
        log::debug!("Bring-up: reached {}", stage);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::error::InitError;
    use ash::vk;

    #[test]
    fn drive_reaches_renderable_when_every_step_succeeds() {
        let mut progress = Progress::default();
        let mut calls = 0;
        drive(&mut progress, |_| {
            calls += 1;
            Ok(())
        })
        .unwrap();

        assert!(progress.is_renderable());
        assert_eq!(calls, Stage::ALL.len() - 1);
    }

    #[test]
    fn drive_stops_at_first_failing_step() {
        let mut progress = Progress::default();
        let mut ran = vec![];
        let err = drive(&mut progress, |stage| {
            ran.push(stage);
            match stage {
                Stage::SurfaceCreated => Err(InitError::CreateSurface(vk::Result::ERROR_SURFACE_LOST_KHR)),
                // Must never run once the surface failed
                Stage::DeviceCreated => Err(InitError::CreateDevice(vk::Result::ERROR_DEVICE_LOST)),
                _ => Ok(()),
            }
        })
        .unwrap_err();

        assert_eq!(err.stage(), Stage::SurfaceCreated);
        assert_eq!(ran.last(), Some(&Stage::SurfaceCreated));
        assert_eq!(progress.reached(), Stage::WindowCreated);
        assert_eq!(progress.entered(), Stage::SurfaceCreated);

        // A second drive refuses to continue past the broken step
        drive(&mut progress, |_| panic!("step ran after failure")).unwrap();
    }

    fn advance_to(progress: &mut Progress, target: Stage) {
        while progress.reached() < target {
            progress.begin().unwrap();
            progress.complete();
        }
    }

    #[test]
    fn stages_advance_in_declared_order() {
        let mut progress = Progress::default();
        let mut seen = vec![];
        while let Some(stage) = progress.begin() {
            seen.push(stage);
            progress.complete();
        }
        assert_eq!(seen, Stage::ALL[1..].to_vec());
        assert!(progress.is_renderable());
        assert_eq!(Stage::Renderable.next(), None);
    }

    #[test]
    fn failed_step_blocks_further_progress() {
        let mut progress = Progress::default();
        advance_to(&mut progress, Stage::InstanceCreated);

        assert_eq!(progress.begin(), Some(Stage::WindowCreated));
        // no complete(): the window could not be created
        assert_eq!(progress.begin(), None);
        assert_eq!(progress.reached(), Stage::InstanceCreated);
        assert_eq!(progress.entered(), Stage::WindowCreated);
    }

    #[test]
    fn unwind_from_nothing_is_empty() {
        assert_eq!(Progress::default().unwind().count(), 0);
    }

    #[test]
    fn unwind_releases_completed_stages_newest_first() {
        let mut progress = Progress::default();
        advance_to(&mut progress, Stage::SurfaceCreated);

        let order: Vec<_> = progress.unwind().collect();
        assert_eq!(
            order,
            vec![
                Stage::SurfaceCreated,
                Stage::WindowCreated,
                Stage::InstanceCreated,
                Stage::LayersQueried,
            ]
        );
    }

    #[test]
    fn unwind_includes_half_finished_stage() {
        let mut progress = Progress::default();
        advance_to(&mut progress, Stage::ImagesAcquired);
        progress.begin();

        let order: Vec<_> = progress.unwind().collect();
        assert_eq!(order.first(), Some(&Stage::PipelineReady));
        assert_eq!(order.last(), Some(&Stage::LayersQueried));
        assert_eq!(order.len(), 9);
    }

    #[test]
    fn reset_returns_to_uninitialized() {
        let mut progress = Progress::default();
        advance_to(&mut progress, Stage::Renderable);
        progress.reset();
        assert_eq!(progress.reached(), Stage::Uninitialized);
        assert_eq!(progress.unwind().count(), 0);
    }
}
