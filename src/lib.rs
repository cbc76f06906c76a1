//! Framepace is a frame-interpolation present pipeline.
//!
//! It wraps a native swapchain into a proxy that looks like an ordinary
//! swapchain to the application, while internally generating an interpolated
//! frame for every real one and handing both to a dedicated presenter thread
//! that paces them to the display.
//!
//! The native graphics API is reached only through the capability traits in [`backend`].
//! A CPU-simulated implementation lives in `backend::headless` (feature `headless`).
//!
//! Synchronization between the application thread, the interpolation scheduler
//! and the presenter is done purely with monotonic fences and auto-reset events.

#![warn(missing_debug_implementations)]
#![warn(missing_copy_implementations)]

use std::{error::Error, fmt::Debug};

#[cfg(feature = "tracing")]
#[macro_export]
macro_rules! trace {
    ($($tokens:tt)*) => {
        tracing::trace!($($tokens)*)
    };
}

#[cfg(feature = "tracing")]
#[macro_export]
macro_rules! debug {
    ($($tokens:tt)*) => {
        tracing::debug!($($tokens)*)
    };
}

#[cfg(feature = "tracing")]
#[macro_export]
macro_rules! info {
    ($($tokens:tt)*) => {
        tracing::info!($($tokens)*)
    };
}

#[cfg(feature = "tracing")]
#[macro_export]
macro_rules! warn {
    ($($tokens:tt)*) => {
        tracing::warn!($($tokens)*)
    };
}

#[cfg(feature = "tracing")]
#[macro_export]
macro_rules! error {
    ($($tokens:tt)*) => {
        tracing::error!($($tokens)*)
    };
}

#[cfg(not(feature = "tracing"))]
#[macro_export]
macro_rules! trace {
    ($($e:expr),*) => {{ $(let _ = &$e;)* }};
}

#[cfg(not(feature = "tracing"))]
#[macro_export]
macro_rules! debug {
    ($($e:expr),*) => {{ $( let _ = &$e;)* }};
}

#[cfg(not(feature = "tracing"))]
#[macro_export]
macro_rules! info {
    ($($e:expr),*) => {{ $(let _ = &$e;)* }};
}

#[cfg(not(feature = "tracing"))]
#[macro_export]
macro_rules! warn {
    ($($e:expr),*) => {{ $(let _ = &$e;)* }};
}

#[cfg(not(feature = "tracing"))]
#[macro_export]
macro_rules! error {
    ($($e:expr),*) => {{ $(let _ = &$e;)* }};
}

pub mod backend;

mod clock;
mod composite;
mod config;
mod estimator;
mod event;
mod fence;
mod pacing;
mod queue;
mod resource;
mod surface;
mod swapchain;

pub use self::{
    backend::{BackendError, CommandList, Device, Factory, Fence, NativeSwapchain, Queue},
    clock::*,
    composite::*,
    config::*,
    estimator::*,
    event::FrameLatencyWaitable,
    fence::*,
    pacing::*,
    queue::*,
    resource::*,
    surface::*,
    swapchain::*,
};

/// Error that may occur when allocation fails because of either
/// device memory is exhausted.
///
/// Deallocation of device memory or other resources may increase chance
/// that operation would succeed.
#[derive(Clone, Copy, Debug, thiserror::Error, PartialEq, Eq)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[error("Out of device memory")]
pub struct OutOfMemory;

/// Error that may occur during execution on the device
/// and then signalled on command submission or waiting operations.
///
/// This error is unrecoverable. Lost device state cannot be changed to not-lost.
/// Proxy swapchain and everything created from the device must be recreated.
#[derive(Clone, Copy, Debug, thiserror::Error, PartialEq, Eq)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[error("Device lost")]
pub struct DeviceLost;

fn assert_object<T: Debug + Send + Sync + 'static>() {}
fn assert_error<T: Error + Send + Sync + 'static>() {}

#[allow(dead_code)]
fn check_objects() {
    assert_object::<FrameInterpolationSwapchain>();
    assert_object::<Resource>();
    assert_error::<SwapchainError>();
    assert_error::<BackendError>();
    assert_error::<PresentError>();
}
