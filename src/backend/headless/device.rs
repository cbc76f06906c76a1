use std::{
    fmt::{self, Debug},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use parking_lot::Mutex;
use slab::Slab;

use crate::{
    backend::{BackendError, Device, Factory, Fence, NativeSwapchain, Queue},
    queue::{PresentFlags, QueueKind},
    resource::{Format, Pipeline, PipelineKind, Resource, ResourceDesc},
    surface::SurfaceInfo,
    swapchain::SwapchainDesc,
};

use super::{fence::HeadlessFence, queue::HeadlessQueue, swapchain::HeadlessSwapchain};

/// Single call to the native present recorded by the headless swapchain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresentRecord {
    /// Performance counter when present was issued.
    pub qpc: u64,
    pub sync_interval: u32,
    pub flags: PresentFlags,
    pub buffer_index: u32,

    /// Marker the presented buffer contained.
    pub contents: u64,
}

pub(super) struct Inner {
    resources: Mutex<Slab<u64>>,
    presents: Mutex<Vec<PresentRecord>>,
    tearing: bool,
}

/// CPU-simulated device and factory.
///
/// Cloning yields handle to the same device.
#[derive(Clone)]
#[repr(transparent)]
pub struct HeadlessDevice {
    inner: Arc<Inner>,
}

impl Debug for HeadlessDevice {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if fmt.alternate() {
            fmt.debug_struct("HeadlessDevice")
                .field("resources", &self.inner.resources.lock().len())
                .field("presents", &self.inner.presents.lock().len())
                .field("tearing", &self.inner.tearing)
                .finish()
        } else {
            write!(fmt, "HeadlessDevice({:p})", &*self.inner)
        }
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        HeadlessDevice::new()
    }
}

impl HeadlessDevice {
    pub fn new() -> Self {
        HeadlessDevice::with_tearing(false)
    }

    /// Creates device whose factory reports tearing support.
    pub fn with_tearing(tearing: bool) -> Self {
        HeadlessDevice {
            inner: Arc::new(Inner {
                resources: Mutex::new(Slab::with_capacity(64)),
                presents: Mutex::new(Vec::new()),
                tearing,
            }),
        }
    }

    /// Total size of all live resources.
    pub fn allocated_bytes(&self) -> u64 {
        self.inner.resources.lock().iter().map(|(_, &size)| size).sum()
    }

    pub fn live_resources(&self) -> usize {
        self.inner.resources.lock().len()
    }

    /// Presents issued by all swapchains of this device so far.
    pub fn presents(&self) -> Vec<PresentRecord> {
        self.inner.presents.lock().clone()
    }

    pub(super) fn record_present(&self, record: PresentRecord) {
        self.inner.presents.lock().push(record);
    }

    fn downgrade(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }
}

/// Backend payload of resources created by [`HeadlessDevice`].
pub struct HeadlessResource {
    contents: AtomicU64,
    device: Weak<Inner>,
    key: usize,
}

impl Debug for HeadlessResource {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "HeadlessResource({})", self.contents())
    }
}

impl HeadlessResource {
    /// Marker written by the last command that wrote this resource.
    pub fn contents(&self) -> u64 {
        self.contents.load(Ordering::Acquire)
    }

    pub fn write(&self, value: u64) {
        self.contents.store(value, Ordering::Release);
    }
}

impl Drop for HeadlessResource {
    fn drop(&mut self) {
        if let Some(device) = self.device.upgrade() {
            device.resources.lock().remove(self.key);
        }
    }
}

impl Device for HeadlessDevice {
    fn create_fence(&self, label: &str, initial: u64) -> Result<Arc<dyn Fence>, BackendError> {
        Ok(Arc::new(HeadlessFence::new(label, initial)))
    }

    fn create_queue(&self, kind: QueueKind) -> Result<Arc<dyn Queue>, BackendError> {
        Ok(Arc::new(HeadlessQueue::new(kind)?))
    }

    fn create_resource(&self, desc: &ResourceDesc, name: &str) -> Result<Resource, BackendError> {
        let key = self.inner.resources.lock().insert(desc.size_in_bytes());
        trace!("Resource {} created: {:?}", name, desc);

        Ok(Resource::new(
            *desc,
            name,
            HeadlessResource {
                contents: AtomicU64::new(0),
                device: self.downgrade(),
                key,
            },
        ))
    }

    fn create_pipeline(&self, kind: PipelineKind, format: Format) -> Result<Pipeline, BackendError> {
        Ok(Pipeline::new(kind, format, ()))
    }
}

impl Factory for HeadlessDevice {
    fn supports_tearing(&self) -> bool {
        self.inner.tearing
    }

    fn create_swapchain(
        &self,
        _surface: &SurfaceInfo,
        desc: &SwapchainDesc,
        _queue: &Arc<dyn Queue>,
    ) -> Result<Box<dyn NativeSwapchain>, BackendError> {
        Ok(Box::new(HeadlessSwapchain::new(self.clone(), desc)?))
    }
}
