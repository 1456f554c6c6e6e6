// Backend module - Vulkan abstraction layer
//
// Thin wrapper around ash. Bring-up lives in `context`, per-frame work is
// driven by `frame` through the `FrameBackend` trait.

pub mod context;
pub mod device;
pub mod error;
pub mod frame;
pub mod instance;
pub mod pipeline;
pub mod queue;
pub mod report;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use context::RenderingContext;
pub use error::{ErrorKind, RenderError, Result};
pub use frame::{FrameBackend, FrameScheduler, FrameStatus, PresentStatus};
pub use pipeline::FixedPipeline;
pub use shader::ShaderBinaries;
pub use swapchain::SwapchainManager;
pub use sync::FrameSync;
