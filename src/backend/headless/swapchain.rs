use arrayvec::ArrayVec;

use crate::{
    backend::{BackendError, Device as _, NativeSwapchain},
    clock::performance_counter,
    queue::{PresentError, PresentFlags},
    resource::{Resource, ResourceDesc},
    surface::{ColorSpace, HdrMetadata},
    swapchain::{SwapchainDesc, MAX_BUFFER_COUNT},
};

use super::device::{HeadlessDevice, HeadlessResource, PresentRecord};

/// Native swapchain that records presents instead of displaying them.
#[derive(Debug)]
pub struct HeadlessSwapchain {
    device: HeadlessDevice,
    desc: SwapchainDesc,
    buffers: ArrayVec<Resource, { MAX_BUFFER_COUNT as usize }>,
    index: u32,
    color_space: ColorSpace,
    hdr_metadata: Option<HdrMetadata>,
}

impl HeadlessSwapchain {
    pub(super) fn new(device: HeadlessDevice, desc: &SwapchainDesc) -> Result<Self, BackendError> {
        let mut swapchain = HeadlessSwapchain {
            device,
            desc: *desc,
            buffers: ArrayVec::new(),
            index: 0,
            color_space: ColorSpace::default(),
            hdr_metadata: None,
        };
        swapchain.create_buffers()?;
        Ok(swapchain)
    }

    fn create_buffers(&mut self) -> Result<(), BackendError> {
        if self.desc.buffer_count == 0 || self.desc.buffer_count > MAX_BUFFER_COUNT {
            return Err(BackendError::Unsupported);
        }

        self.buffers.clear();
        for index in 0..self.desc.buffer_count {
            let buffer = self.device.create_resource(
                &ResourceDesc {
                    width: self.desc.width,
                    height: self.desc.height,
                    format: self.desc.format,
                    usage: self.desc.usage,
                },
                &format!("native-back-buffer-{}", index),
            )?;
            self.buffers.push(buffer);
        }
        self.index = 0;
        Ok(())
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    pub fn hdr_metadata(&self) -> Option<HdrMetadata> {
        self.hdr_metadata
    }
}

impl NativeSwapchain for HeadlessSwapchain {
    fn desc(&self) -> SwapchainDesc {
        self.desc
    }

    fn buffer(&self, index: u32) -> Result<Resource, BackendError> {
        self.buffers
            .get(index as usize)
            .cloned()
            .ok_or(BackendError::Unsupported)
    }

    fn current_back_buffer_index(&self) -> u32 {
        self.index
    }

    fn present(&mut self, sync_interval: u32, flags: PresentFlags) -> Result<(), PresentError> {
        if flags.contains(PresentFlags::TEST) {
            return Ok(());
        }

        let contents = self.buffers[self.index as usize]
            .raw::<HeadlessResource>()
            .map_or(0, HeadlessResource::contents);

        self.device.record_present(PresentRecord {
            qpc: performance_counter(),
            sync_interval,
            flags,
            buffer_index: self.index,
            contents,
        });

        self.index = (self.index + 1) % self.desc.buffer_count;
        Ok(())
    }

    fn resize(&mut self, desc: &SwapchainDesc) -> Result<(), BackendError> {
        self.desc = *desc;
        self.create_buffers()
    }

    fn set_color_space(&mut self, color_space: ColorSpace) -> Result<(), BackendError> {
        self.color_space = color_space;
        Ok(())
    }

    fn set_hdr_metadata(&mut self, metadata: HdrMetadata) -> Result<(), BackendError> {
        self.hdr_metadata = Some(metadata);
        Ok(())
    }
}
