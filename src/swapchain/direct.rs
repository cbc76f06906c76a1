use std::{any::Any, fmt::Debug, sync::Arc};

use parking_lot::Mutex;

use crate::{
    backend::{Factory, NativeSwapchain, Queue},
    queue::PresentFlags,
    resource::{Format, Resource},
    surface::SurfaceInfo,
};

use super::{FrameInterpolationSwapchain, SwapchainDesc, SwapchainError, SwapchainFlags};

/// Operations common to proxy and plain swapchains.
pub trait Swapchain: Debug + Send + Sync {
    fn present(&self, sync_interval: u32, flags: PresentFlags) -> Result<(), SwapchainError>;

    fn resize_buffers(
        &self,
        buffer_count: u32,
        width: u32,
        height: u32,
        format: Option<Format>,
        flags: SwapchainFlags,
    ) -> Result<(), SwapchainError>;

    fn buffer(&self, index: u32) -> Result<Resource, SwapchainError>;

    fn desc(&self) -> SwapchainDesc;

    fn current_back_buffer_index(&self) -> u32;

    fn as_any(&self) -> &dyn Any;
}

/// Swapchain presenting application buffers directly, without interpolation.
#[derive(Debug)]
pub struct DirectSwapchain {
    native: Mutex<Box<dyn NativeSwapchain>>,
}

impl DirectSwapchain {
    pub fn new(
        factory: &dyn Factory,
        surface: &SurfaceInfo,
        desc: &SwapchainDesc,
        queue: &Arc<dyn Queue>,
    ) -> Result<Self, SwapchainError> {
        let native = factory.create_swapchain(surface, desc, queue)?;
        Ok(DirectSwapchain {
            native: Mutex::new(native),
        })
    }
}

impl Swapchain for DirectSwapchain {
    fn present(&self, sync_interval: u32, flags: PresentFlags) -> Result<(), SwapchainError> {
        self.native.lock().present(sync_interval, flags)?;
        Ok(())
    }

    fn resize_buffers(
        &self,
        buffer_count: u32,
        width: u32,
        height: u32,
        format: Option<Format>,
        flags: SwapchainFlags,
    ) -> Result<(), SwapchainError> {
        let mut native = self.native.lock();
        let current = native.desc();
        let desc = SwapchainDesc {
            buffer_count: if buffer_count == 0 { current.buffer_count } else { buffer_count },
            width: if width == 0 { current.width } else { width },
            height: if height == 0 { current.height } else { height },
            format: format.unwrap_or(current.format),
            flags,
            ..current
        };
        native.resize(&desc)?;
        Ok(())
    }

    fn buffer(&self, index: u32) -> Result<Resource, SwapchainError> {
        Ok(self.native.lock().buffer(index)?)
    }

    fn desc(&self) -> SwapchainDesc {
        self.native.lock().desc()
    }

    fn current_back_buffer_index(&self) -> u32 {
        self.native.lock().current_back_buffer_index()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Returns proxy swapchain behind `swapchain`.
///
/// Fails with [`SwapchainError::InvalidArgument`] if it is not a [`FrameInterpolationSwapchain`].
pub fn frame_interpolation_swapchain(
    swapchain: &dyn Swapchain,
) -> Result<&FrameInterpolationSwapchain, SwapchainError> {
    swapchain
        .as_any()
        .downcast_ref()
        .ok_or(SwapchainError::InvalidArgument {
            reason: "swapchain is not a frame interpolation swapchain",
        })
}
