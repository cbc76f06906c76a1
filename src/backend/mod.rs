//!
//! Capabilities the pacing core consumes from the native graphics API.
//!
//! Implement these traits to run the proxy swapchain on top of a real API.
//! The `headless` backend implements them on the CPU.
//!

#[cfg(feature = "headless")]
pub mod headless;

use std::{any::Any, fmt::Debug, sync::Arc, time::Duration};

use crate::{
    queue::{PresentError, PresentFlags, QueueKind},
    resource::{Format, Pipeline, PipelineKind, Resource, ResourceDesc},
    surface::{ColorSpace, HdrMetadata, SurfaceInfo},
    swapchain::SwapchainDesc,
    DeviceLost, OutOfMemory,
};

/// Failure reported by a backend call.
#[derive(Clone, Copy, Debug, thiserror::Error, PartialEq, Eq)]
pub enum BackendError {
    #[error(transparent)]
    OutOfMemory {
        #[from]
        source: OutOfMemory,
    },

    #[error(transparent)]
    DeviceLost {
        #[from]
        source: DeviceLost,
    },

    #[error("Surface was lost")]
    SurfaceLost,

    #[error("Operation is not supported by the backend")]
    Unsupported,
}

/// Monotonic timeline shared between queues and host threads.
pub trait Fence: Debug + Send + Sync {
    /// Name used in diagnostics.
    fn label(&self) -> &str;

    /// Largest value the timeline has reached.
    fn completed_value(&self) -> u64;

    /// Signals the timeline from the host.
    ///
    /// Values lower than the completed one are ignored.
    fn signal(&self, value: u64) -> Result<(), DeviceLost>;

    /// Blocks until the timeline reaches `value` or `timeout` elapses.
    /// Returns `true` if the value was reached.
    fn wait_blocking(&self, value: u64, timeout: Duration) -> bool;
}

/// Queue of GPU work.
///
/// All operations are enqueued and executed in submission order.
/// None of them blocks the calling thread except `wait_idle`.
pub trait Queue: Debug + Send + Sync {
    fn kind(&self) -> QueueKind;

    /// Creates command list that can be executed on this queue.
    fn create_command_list(&self) -> Result<Box<dyn CommandList>, BackendError>;

    fn execute(&self, list: Box<dyn CommandList>) -> Result<(), BackendError>;

    /// Signals `fence` with `value` once all previously submitted work completes.
    fn signal(&self, fence: &Arc<dyn Fence>, value: u64) -> Result<(), BackendError>;

    /// Makes all subsequently submitted work wait for `fence` to reach `value`.
    fn wait(&self, fence: &Arc<dyn Fence>, value: u64) -> Result<(), BackendError>;

    /// Blocks until all submitted work completes.
    fn wait_idle(&self) -> Result<(), BackendError>;
}

/// Recorded GPU commands.
pub trait CommandList: Debug + Send {
    fn copy_resource(&mut self, src: &Resource, dst: &Resource);

    /// Blends `ui` over `frame` writing result into `target`.
    fn composite_ui(
        &mut self,
        pipeline: &Pipeline,
        frame: &Resource,
        ui: &Resource,
        target: &Resource,
        premultiplied_alpha: bool,
    );

    /// Draws pacing bars over `target` at position derived from `present_index`.
    fn draw_pacing_lines(&mut self, pipeline: &Pipeline, target: &Resource, present_index: u64);

    /// Finishes recording.
    fn close(&mut self) -> Result<(), BackendError>;

    /// Access to backend-specific recording.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

pub trait Device: Debug + Send + Sync {
    fn create_fence(&self, label: &str, initial: u64) -> Result<Arc<dyn Fence>, BackendError>;

    fn create_queue(&self, kind: QueueKind) -> Result<Arc<dyn Queue>, BackendError>;

    fn create_resource(&self, desc: &ResourceDesc, name: &str) -> Result<Resource, BackendError>;

    fn create_pipeline(&self, kind: PipelineKind, format: Format) -> Result<Pipeline, BackendError>;
}

/// Creates native swapchains.
pub trait Factory: Debug + Send + Sync {
    /// Whether presenting with tearing is supported by the display stack.
    fn supports_tearing(&self) -> bool;

    fn create_swapchain(
        &self,
        surface: &SurfaceInfo,
        desc: &SwapchainDesc,
        queue: &Arc<dyn Queue>,
    ) -> Result<Box<dyn NativeSwapchain>, BackendError>;
}

/// Swapchain of the native API.
pub trait NativeSwapchain: Debug + Send {
    fn desc(&self) -> SwapchainDesc;

    fn buffer(&self, index: u32) -> Result<Resource, BackendError>;

    fn current_back_buffer_index(&self) -> u32;

    fn present(&mut self, sync_interval: u32, flags: PresentFlags) -> Result<(), PresentError>;

    /// Recreates buffers. All of them must be released by the caller and
    /// no GPU work may reference them.
    fn resize(&mut self, desc: &SwapchainDesc) -> Result<(), BackendError>;

    fn set_color_space(&mut self, color_space: ColorSpace) -> Result<(), BackendError>;

    fn set_hdr_metadata(&mut self, metadata: HdrMetadata) -> Result<(), BackendError>;
}
