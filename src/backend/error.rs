// Rendering errors
//
// Every fallible step of bring-up and of the frame loop reports one of these.
// `kind()` sorts them into the four classes the driver reacts to.

use ash::vk;
use thiserror::Error;

/// How the driver must react to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Device, queue or surface negotiation failed. Fatal.
    InitializationFailure,
    /// A Vulkan object could not be created. Fatal at startup.
    ResourceCreationFailure,
    /// One cycle's record/submit/present failed. The next cycle retries.
    FrameOperationFailure,
    /// The swapchain no longer matches the surface. Recreate, then continue.
    SurfaceInvalidated,
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to load the Vulkan library: {0}")]
    LibraryLoad(#[from] ash::LoadingError),

    #[error("Instance extension not available: {0}")]
    MissingInstanceExtension(String),

    #[error("Instance creation failed: {0}")]
    InstanceCreationFailed(vk::Result),

    #[error("Surface creation failed: {0}")]
    SurfaceCreationFailed(String),

    #[error("No suitable GPU found")]
    NoSuitableDevice,

    #[error("Device {device} lacks required extension {extension}")]
    MissingDeviceExtension { device: String, extension: String },

    #[error("Could not find queue families with graphics and present support")]
    QueueFamilyNotFound,

    #[error("Surface does not offer B8G8R8A8_SRGB / SRGB_NONLINEAR")]
    NoSuitableFormat,

    #[error("Surface capability query failed: {0}")]
    SurfaceQueryFailed(vk::Result),

    #[error("Logical device creation failed: {0}")]
    DeviceCreationFailed(vk::Result),

    #[error("Swapchain creation failed: {0}")]
    SwapchainCreationFailed(vk::Result),

    #[error("Image view creation failed for swapchain image {index}: {result}")]
    ImageViewCreationFailed { index: usize, result: vk::Result },

    #[error("Framebuffer creation failed for swapchain image {index}: {result}")]
    FramebufferCreationFailed { index: usize, result: vk::Result },

    #[error("Failed to read shader {path}: {source}")]
    ShaderLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Pipeline creation failed ({stage}): {result}")]
    PipelineCreationFailed { stage: &'static str, result: vk::Result },

    #[error("Synchronization object creation failed: {0}")]
    SyncCreationFailed(vk::Result),

    #[error("Waiting on the frame fence failed: {0}")]
    FenceWaitFailed(vk::Result),

    #[error("Acquiring a swapchain image failed: {0}")]
    AcquireFailed(vk::Result),

    #[error("Command recording failed: {0}")]
    CommandRecordingFailed(vk::Result),

    #[error("Queue submission failed: {0}")]
    SubmissionFailed(vk::Result),

    #[error("Presentation failed: {0}")]
    PresentationFailed(vk::Result),

    #[error("Swapchain is out of date with the surface")]
    SurfaceInvalidated,
}

impl RenderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LibraryLoad(_)
            | Self::MissingInstanceExtension(_)
            | Self::InstanceCreationFailed(_)
            | Self::SurfaceCreationFailed(_)
            | Self::NoSuitableDevice
            | Self::MissingDeviceExtension { .. }
            | Self::QueueFamilyNotFound
            | Self::NoSuitableFormat
            | Self::SurfaceQueryFailed(_)
            | Self::DeviceCreationFailed(_) => ErrorKind::InitializationFailure,

            Self::SwapchainCreationFailed(_)
            | Self::ImageViewCreationFailed { .. }
            | Self::FramebufferCreationFailed { .. }
            | Self::ShaderLoad { .. }
            | Self::PipelineCreationFailed { .. }
            | Self::SyncCreationFailed(_) => ErrorKind::ResourceCreationFailure,

            Self::FenceWaitFailed(_)
            | Self::AcquireFailed(_)
            | Self::CommandRecordingFailed(_)
            | Self::SubmissionFailed(_)
            | Self::PresentationFailed(_) => ErrorKind::FrameOperationFailure,

            Self::SurfaceInvalidated => ErrorKind::SurfaceInvalidated,
        }
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_failures_are_fatal_initialization_errors() {
        assert_eq!(RenderError::NoSuitableDevice.kind(), ErrorKind::InitializationFailure);
        assert_eq!(RenderError::QueueFamilyNotFound.kind(), ErrorKind::InitializationFailure);
        assert_eq!(RenderError::NoSuitableFormat.kind(), ErrorKind::InitializationFailure);
    }

    #[test]
    fn per_image_failures_name_the_image() {
        let err = RenderError::FramebufferCreationFailed {
            index: 2,
            result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
        };
        assert_eq!(err.kind(), ErrorKind::ResourceCreationFailure);
        assert!(err.to_string().contains("image 2"));
    }

    #[test]
    fn frame_failures_and_invalidation_are_distinct() {
        let submit = RenderError::SubmissionFailed(vk::Result::ERROR_DEVICE_LOST);
        assert_eq!(submit.kind(), ErrorKind::FrameOperationFailure);
        assert_eq!(RenderError::SurfaceInvalidated.kind(), ErrorKind::SurfaceInvalidated);
    }
}
