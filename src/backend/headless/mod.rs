//!
//! CPU-simulated backend.
//!
//! Queues are worker threads executing recorded commands in submission order,
//! fences are counters guarded by a condition variable and resources carry a single
//! `u64` content marker instead of texels. Native swapchain records every present
//! so pacing and ordering can be observed.
//!

mod device;
mod encode;
mod fence;
mod queue;
mod swapchain;

pub use self::{
    device::{HeadlessDevice, HeadlessResource, PresentRecord},
    encode::{Command, HeadlessCommandList},
    fence::HeadlessFence,
    queue::HeadlessQueue,
    swapchain::HeadlessSwapchain,
};
