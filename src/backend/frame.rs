// Frame scheduler - the per-frame state machine
//
// WaitPrevious -> AcquireImage -> RecordCommands -> Submit -> Present
//
// The fence is only reset right before a submit that will signal it again.
// An out-of-date acquire or a failed recording therefore never leaves the
// fence unsignalled with nothing in flight, and the next wait cannot hang.

use super::error::{RenderError, Result};

/// Result of a present call that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Optimal,
    /// Presented, but the swapchain no longer matches the surface exactly
    Suboptimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// The swapchain must be recreated before the next frame
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    WaitPrevious,
    AcquireImage,
    RecordCommands,
    Submit,
    Present,
}

/// GPU operations one frame is built from
pub trait FrameBackend {
    /// Block until the previous frame's work is complete
    fn wait_for_frame(&mut self) -> Result<()>;
    fn reset_frame_fence(&mut self) -> Result<()>;
    /// Index of the acquired image and whether the swapchain is suboptimal.
    /// Out-of-date is reported as `RenderError::SurfaceInvalidated`.
    fn acquire_image(&mut self) -> Result<(u32, bool)>;
    fn record_commands(&mut self, image_index: u32) -> Result<()>;
    /// Submit the recorded commands, signalling the fence
    fn submit(&mut self) -> Result<()>;
    /// Submit nothing but the acquire wait; signals the fence only when asked
    fn submit_empty(&mut self, signal_fence: bool) -> Result<()>;
    fn present(&mut self, image_index: u32) -> Result<PresentStatus>;
    /// Wait for the device and replace the fence and both semaphores with
    /// fresh ones, the fence signaled
    fn rebuild_sync(&mut self) -> Result<()>;
}

pub struct FrameScheduler {
    state: FrameState,
    /// False while the fence is reset and no submitted work will signal it
    fence_armed: bool,
    /// A recovery step failed; fence and semaphore state are unknown
    sync_stale: bool,
    frames: u64,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self {
            state: FrameState::WaitPrevious,
            fence_armed: true,
            sync_stale: false,
            frames: 0,
        }
    }

    /// Stage the last frame reached; names the failing stage after an error
    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames
    }

    pub fn draw_frame<B: FrameBackend>(&mut self, backend: &mut B) -> Result<FrameStatus> {
        self.state = FrameState::WaitPrevious;
        if self.sync_stale {
            log::warn!("Rebuilding frame synchronization objects");
            backend.rebuild_sync()?;
            self.sync_stale = false;
            self.fence_armed = true;
        }
        if self.fence_armed {
            backend.wait_for_frame()?;
        }

        self.state = FrameState::AcquireImage;
        let (image_index, suboptimal) = match backend.acquire_image() {
            Ok(acquired) => acquired,
            Err(RenderError::SurfaceInvalidated) => {
                log::debug!("Swapchain out of date on acquire");
                return Ok(FrameStatus::Stale);
            }
            Err(e) => return Err(e),
        };

        self.state = FrameState::RecordCommands;
        if let Err(e) = backend.record_commands(image_index) {
            self.release_acquired_image(backend);
            return Err(e);
        }

        self.state = FrameState::Submit;
        if let Err(e) = backend.reset_frame_fence() {
            // The fence may be in any state now
            self.sync_stale = true;
            self.release_acquired_image(backend);
            return Err(e);
        }
        self.fence_armed = false;
        if let Err(e) = backend.submit() {
            self.release_acquired_image(backend);
            return Err(e);
        }
        self.fence_armed = true;

        self.state = FrameState::Present;
        let status = match backend.present(image_index) {
            Ok(PresentStatus::Optimal) if !suboptimal => FrameStatus::Presented,
            Ok(_) => FrameStatus::Stale,
            Err(RenderError::SurfaceInvalidated) => {
                log::debug!("Swapchain out of date on present");
                return Ok(FrameStatus::Stale);
            }
            Err(e) => return Err(e),
        };

        self.frames += 1;
        log::trace!("Frame {} on image {}: {:?}", self.frames, image_index, status);
        Ok(status)
    }

    // Consume the acquire signal with an empty batch so the semaphore and the
    // fence are both usable again next frame. Failures here are logged and
    // leave `sync_stale` set; the caller reports the error that started it.
    fn release_acquired_image<B: FrameBackend>(&mut self, backend: &mut B) {
        if self.fence_armed && !self.sync_stale {
            match backend.reset_frame_fence() {
                Ok(()) => self.fence_armed = false,
                Err(e) => {
                    log::error!("Fence reset failed while releasing the acquired image: {}", e);
                    self.sync_stale = true;
                }
            }
        }

        // Only a fence known to be unsignaled may be handed to the queue
        let signal_fence = !self.fence_armed;
        match backend.submit_empty(signal_fence) {
            Ok(()) => self.fence_armed = true,
            Err(e) => {
                log::error!("Empty submit failed while releasing the acquired image: {}", e);
                self.sync_stale = true;
            }
        }
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    /// Scripted backend modelling the fence and the acquire semaphore
    #[derive(Default)]
    struct MockBackend {
        calls: Vec<&'static str>,
        fence_signaled: bool,
        work_pending: bool,
        semaphore_signaled: bool,
        acquire_out_of_date: bool,
        acquire_suboptimal: bool,
        fail_record: bool,
        fail_reset: bool,
        fail_submit: bool,
        fail_submit_empty: bool,
        present_out_of_date: bool,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                fence_signaled: true,
                ..Default::default()
            }
        }
    }

    impl FrameBackend for MockBackend {
        fn wait_for_frame(&mut self) -> Result<()> {
            self.calls.push("wait");
            if self.work_pending {
                self.work_pending = false;
                self.fence_signaled = true;
            }
            assert!(self.fence_signaled, "waiting on a fence nothing will signal");
            Ok(())
        }

        fn reset_frame_fence(&mut self) -> Result<()> {
            self.calls.push("reset");
            if self.fail_reset {
                return Err(RenderError::SubmissionFailed(vk::Result::ERROR_OUT_OF_HOST_MEMORY));
            }
            self.fence_signaled = false;
            Ok(())
        }

        fn acquire_image(&mut self) -> Result<(u32, bool)> {
            self.calls.push("acquire");
            if self.acquire_out_of_date {
                return Err(RenderError::SurfaceInvalidated);
            }
            assert!(!self.semaphore_signaled, "acquire semaphore already signaled");
            self.semaphore_signaled = true;
            Ok((1, self.acquire_suboptimal))
        }

        fn record_commands(&mut self, _image_index: u32) -> Result<()> {
            self.calls.push("record");
            assert!(self.fence_signaled && !self.work_pending, "command buffer still in use");
            if self.fail_record {
                return Err(RenderError::CommandRecordingFailed(vk::Result::ERROR_OUT_OF_HOST_MEMORY));
            }
            Ok(())
        }

        fn submit(&mut self) -> Result<()> {
            self.calls.push("submit");
            if self.fail_submit {
                return Err(RenderError::SubmissionFailed(vk::Result::ERROR_OUT_OF_HOST_MEMORY));
            }
            assert!(!self.fence_signaled, "submitting with a signaled fence");
            self.semaphore_signaled = false;
            self.work_pending = true;
            Ok(())
        }

        fn submit_empty(&mut self, signal_fence: bool) -> Result<()> {
            self.calls.push(if signal_fence { "submit_empty" } else { "submit_empty_unfenced" });
            if self.fail_submit_empty {
                return Err(RenderError::SubmissionFailed(vk::Result::ERROR_DEVICE_LOST));
            }
            if signal_fence {
                assert!(!self.fence_signaled, "submitting with a signaled fence");
                self.work_pending = true;
            }
            self.semaphore_signaled = false;
            Ok(())
        }

        fn present(&mut self, _image_index: u32) -> Result<PresentStatus> {
            self.calls.push("present");
            if self.present_out_of_date {
                return Err(RenderError::SurfaceInvalidated);
            }
            Ok(PresentStatus::Optimal)
        }

        fn rebuild_sync(&mut self) -> Result<()> {
            self.calls.push("rebuild_sync");
            self.fence_signaled = true;
            self.work_pending = false;
            self.semaphore_signaled = false;
            Ok(())
        }
    }

    #[test]
    fn steady_state_cycle_order() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new();

        for _ in 0..3 {
            assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameStatus::Presented);
        }

        assert_eq!(
            &backend.calls[..6],
            &["wait", "acquire", "record", "reset", "submit", "present"]
        );
        assert_eq!(backend.calls.len(), 18);
        assert_eq!(scheduler.frames_presented(), 3);
        assert_eq!(scheduler.state(), FrameState::Present);
    }

    #[test]
    fn out_of_date_acquire_leaves_fence_signaled() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new();
        backend.acquire_out_of_date = true;

        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameStatus::Stale);
        assert!(backend.fence_signaled);
        assert_eq!(backend.calls, vec!["wait", "acquire"]);

        // After recreation the next frame waits without hanging
        backend.acquire_out_of_date = false;
        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameStatus::Presented);
    }

    #[test]
    fn failed_recording_skips_present_and_rearms_the_fence() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new();
        backend.fail_record = true;

        let err = scheduler.draw_frame(&mut backend).unwrap_err();

        assert!(matches!(err, RenderError::CommandRecordingFailed(_)));
        assert_eq!(scheduler.state(), FrameState::RecordCommands);
        assert_eq!(backend.calls, vec!["wait", "acquire", "record", "reset", "submit_empty"]);
        assert!(!backend.semaphore_signaled);

        backend.fail_record = false;
        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameStatus::Presented);
    }

    #[test]
    fn failed_submission_skips_present() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new();
        backend.fail_submit = true;

        let err = scheduler.draw_frame(&mut backend).unwrap_err();

        assert!(matches!(err, RenderError::SubmissionFailed(_)));
        assert_eq!(scheduler.state(), FrameState::Submit);
        assert!(!backend.calls.contains(&"present"));
        // The fence was already reset for the real submit
        assert_eq!(backend.calls.iter().filter(|c| **c == "reset").count(), 1);
        assert_eq!(backend.calls.last(), Some(&"submit_empty"));

        backend.fail_submit = false;
        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameStatus::Presented);
    }

    #[test]
    fn failed_fence_reset_still_consumes_the_acquire_signal() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new();
        backend.fail_reset = true;

        let err = scheduler.draw_frame(&mut backend).unwrap_err();

        assert!(matches!(err, RenderError::SubmissionFailed(_)));
        assert_eq!(scheduler.state(), FrameState::Submit);
        // The fence state is unknown, so the empty batch does not touch it
        assert_eq!(
            backend.calls,
            vec!["wait", "acquire", "record", "reset", "submit_empty_unfenced"]
        );
        assert!(!backend.semaphore_signaled);

        backend.fail_reset = false;
        backend.calls.clear();
        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameStatus::Presented);
        assert_eq!(backend.calls[..2], ["rebuild_sync", "wait"]);
    }

    #[test]
    fn failed_recovery_reports_the_original_error_and_rebuilds_sync() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new();
        backend.fail_record = true;
        backend.fail_submit_empty = true;

        let err = scheduler.draw_frame(&mut backend).unwrap_err();

        assert!(matches!(err, RenderError::CommandRecordingFailed(_)));
        assert_eq!(scheduler.state(), FrameState::RecordCommands);
        // Nothing consumed the signal and nothing will signal the fence
        assert!(backend.semaphore_signaled);
        assert!(!backend.fence_signaled && !backend.work_pending);

        backend.fail_record = false;
        backend.fail_submit_empty = false;
        backend.calls.clear();
        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameStatus::Presented);
        assert_eq!(backend.calls.first(), Some(&"rebuild_sync"));
    }

    #[test]
    fn suboptimal_acquire_still_presents_but_requests_recreation() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new();
        backend.acquire_suboptimal = true;

        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameStatus::Stale);
        assert_eq!(backend.calls.last(), Some(&"present"));
        assert_eq!(scheduler.frames_presented(), 1);
    }

    #[test]
    fn out_of_date_present_is_stale_and_not_counted() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new();
        backend.present_out_of_date = true;

        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameStatus::Stale);
        // Submitted work still signals the fence
        assert!(backend.work_pending);
        assert_eq!(scheduler.frames_presented(), 0);

        backend.present_out_of_date = false;
        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameStatus::Presented);
        assert_eq!(scheduler.frames_presented(), 1);
    }
}
