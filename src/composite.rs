use std::fmt::{self, Debug};

use once_cell::sync::OnceCell;

use crate::{
    backend::{BackendError, Device, Queue},
    config::{PresentCallbackDescription, UiCompositionFlags},
    pacing::{FrameKind, PacingData},
    resource::{Format, Pipeline, PipelineKind, Resource},
};

/// Pipelines used to composite presented frames.
///
/// Owned by a single swapchain and shared with its presenter through `Arc`.
/// Pipelines are created on first use for the back buffer format,
/// swapchain replaces the whole object when format changes.
pub struct CompositeResources {
    format: Format,
    ui_composite: OnceCell<Pipeline>,
    pacing_lines: OnceCell<Pipeline>,
}

impl Debug for CompositeResources {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("CompositeResources")
            .field("format", &self.format)
            .field("ui_composite", &self.ui_composite.get().is_some())
            .field("pacing_lines", &self.pacing_lines.get().is_some())
            .finish()
    }
}

impl CompositeResources {
    pub fn new(format: Format) -> Self {
        CompositeResources {
            format,
            ui_composite: OnceCell::new(),
            pacing_lines: OnceCell::new(),
        }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Returns pipeline of specified kind, creating it if necessary.
    pub fn pipeline(&self, device: &dyn Device, kind: PipelineKind) -> Result<&Pipeline, BackendError> {
        let cell = match kind {
            PipelineKind::UiComposite => &self.ui_composite,
            PipelineKind::DebugPacingLines => &self.pacing_lines,
        };
        cell.get_or_try_init(|| {
            debug!("Creating {:?} pipeline for {:?}", kind, self.format);
            device.create_pipeline(kind, self.format)
        })
    }

    /// Built-in present callback.
    ///
    /// Blends UI over the frame when UI surface is registered,
    /// otherwise copies the frame as is.
    pub(crate) fn compose_ui(
        &self,
        device: &dyn Device,
        desc: &mut PresentCallbackDescription<'_>,
    ) -> Result<(), BackendError> {
        match desc.ui {
            Some(ui) => {
                let pipeline = self.pipeline(device, PipelineKind::UiComposite)?;
                desc.command_list.composite_ui(
                    pipeline,
                    desc.frame,
                    ui,
                    desc.target,
                    desc.usage_flags.contains(UiCompositionFlags::USE_PREMUL_ALPHA),
                );
            }
            None => desc.command_list.copy_resource(desc.frame, desc.target),
        }
        Ok(())
    }
}

/// Records and submits composition of one frame of `window` into `target`.
///
/// Completion is not awaited here.
pub(crate) fn composite_frame(
    device: &dyn Device,
    queue: &dyn Queue,
    resources: &CompositeResources,
    target: &Resource,
    frame: &Resource,
    window: &PacingData,
    kind: FrameKind,
) -> Result<(), BackendError> {
    let mut list = queue.create_command_list()?;

    let mut desc = PresentCallbackDescription {
        command_list: &mut *list,
        target,
        frame,
        ui: window.ui_surface.as_ref(),
        usage_flags: window.usage_flags,
        is_interpolated_frame: kind == FrameKind::Interpolated,
        frame_id: window.frame_id,
    };

    match &window.present_callback {
        Some(callback) => callback.call(&mut desc)?,
        None => resources.compose_ui(device, &mut desc)?,
    }

    if window.draw_debug_pacing_lines {
        let pipeline = resources.pipeline(device, PipelineKind::DebugPacingLines)?;
        list.draw_pacing_lines(pipeline, target, window.frame(kind).present_index);
    }

    list.close()?;
    queue.execute(list)
}
