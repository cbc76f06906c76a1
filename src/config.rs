use std::{
    fmt::{self, Debug},
    sync::Arc,
};

use crate::{
    backend::{BackendError, CommandList},
    resource::{Rect, Resource},
    surface::TransferFunction,
};

/// Knobs of the pacing algorithm.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-1", serde(default))]
pub struct FramePacingTuning {
    /// Subtracted from every computed present delay.
    pub safety_margin_ms: f32,

    /// Weight of frame time deviation subtracted from the delay.
    pub variance_factor: f32,

    /// Sleep for the bulk of a present delay before spinning.
    /// When disabled the presenter spins for the whole delay.
    pub allow_hybrid_spin: bool,

    /// Number of timer resolution units spent spinning at the end of a hybrid wait.
    pub hybrid_spin_time: u32,

    /// Allow parking the scheduler on the interpolation fence
    /// when the next present is far enough away.
    pub allow_blocking_fence_wait: bool,
}

impl Default for FramePacingTuning {
    fn default() -> Self {
        FramePacingTuning {
            safety_margin_ms: 0.1,
            variance_factor: 0.1,
            allow_hybrid_spin: false,
            hybrid_spin_time: 2,
            allow_blocking_fence_wait: false,
        }
    }
}

bitflags::bitflags! {
    /// Opaque options forwarded to the frame generation callback.
    #[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
    pub struct FrameGenerationFlags: u32 {
        const DRAW_DEBUG_TEAR_LINES =       0x1;
        const DRAW_DEBUG_RESET_INDICATORS = 0x2;
        const DRAW_DEBUG_VIEW =             0x4;
    }
}

bitflags::bitflags! {
    /// How the UI surface is combined with presented frames.
    #[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
    pub struct UiCompositionFlags: u32 {
        /// UI color is premultiplied by its alpha.
        const USE_PREMUL_ALPHA =                    0x1;

        /// Copy UI surface every frame so the application may
        /// overwrite it while previous frames are still pending.
        const ENABLE_INTERNAL_UI_DOUBLE_BUFFERING = 0x2;
    }
}

/// Reported by frame generation callback when no interpolated frame was produced.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameGenerationError {
    #[error(transparent)]
    Backend {
        #[from]
        source: BackendError,
    },

    #[error("Frame generation skipped: {reason}")]
    Skipped { reason: String },
}

/// Inputs of a single frame generation dispatch.
#[derive(Debug)]
pub struct FrameGenerationDispatch<'a> {
    /// Command list on the interpolation queue to record into.
    pub command_list: &'a mut dyn CommandList,

    /// Resource that receives the interpolated frame.
    pub output: &'a Resource,

    /// Real frame the application has just finished.
    pub present_color: &'a Resource,

    /// Real frame presented before `present_color`.
    /// `None` when history is reset.
    pub previous_present_color: Option<&'a Resource>,

    /// Temporal history must not be used.
    pub reset: bool,

    pub num_generated_frames: u32,
    pub transfer_function: TransferFunction,
    pub min_max_luminance: [f32; 2],

    /// Region to interpolate. Never empty.
    pub interpolation_rect: Rect,

    pub flags: FrameGenerationFlags,
    pub frame_id: u64,
}

/// Inputs of a presentation composite pass.
#[derive(Debug)]
pub struct PresentCallbackDescription<'a> {
    /// Command list on the present queue.
    pub command_list: &'a mut dyn CommandList,

    /// Native back buffer to write.
    pub target: &'a Resource,

    /// Frame being presented, either real or interpolated.
    pub frame: &'a Resource,

    pub ui: Option<&'a Resource>,
    pub usage_flags: UiCompositionFlags,
    pub is_interpolated_frame: bool,
    pub frame_id: u64,
}

/// Records interpolation work.
#[derive(Clone)]
pub struct FrameGenerationCallback(
    Arc<dyn Fn(&mut FrameGenerationDispatch<'_>) -> Result<(), FrameGenerationError> + Send + Sync>,
);

impl FrameGenerationCallback {
    pub fn new(
        f: impl Fn(&mut FrameGenerationDispatch<'_>) -> Result<(), FrameGenerationError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        FrameGenerationCallback(Arc::new(f))
    }

    pub fn call(&self, dispatch: &mut FrameGenerationDispatch<'_>) -> Result<(), FrameGenerationError> {
        (self.0)(dispatch)
    }
}

impl Debug for FrameGenerationCallback {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "FrameGenerationCallback({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

impl PartialEq for FrameGenerationCallback {
    fn eq(&self, rhs: &Self) -> bool {
        std::ptr::eq(Arc::as_ptr(&self.0) as *const (), Arc::as_ptr(&rhs.0) as *const ())
    }
}

impl Eq for FrameGenerationCallback {}

/// Composites a frame into the native back buffer.
/// Replaces the built-in UI composition.
#[derive(Clone)]
pub struct PresentCallback(
    Arc<dyn Fn(&mut PresentCallbackDescription<'_>) -> Result<(), BackendError> + Send + Sync>,
);

impl PresentCallback {
    pub fn new(
        f: impl Fn(&mut PresentCallbackDescription<'_>) -> Result<(), BackendError> + Send + Sync + 'static,
    ) -> Self {
        PresentCallback(Arc::new(f))
    }

    pub fn call(&self, desc: &mut PresentCallbackDescription<'_>) -> Result<(), BackendError> {
        (self.0)(desc)
    }
}

impl Debug for PresentCallback {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "PresentCallback({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

impl PartialEq for PresentCallback {
    fn eq(&self, rhs: &Self) -> bool {
        std::ptr::eq(Arc::as_ptr(&self.0) as *const (), Arc::as_ptr(&rhs.0) as *const ())
    }
}

impl Eq for PresentCallback {}

/// Frame generation settings.
///
/// Staged by [`FrameInterpolationSwapchain::set_frame_generation_config`]
/// and applied at the start of the next present.
///
/// [`FrameInterpolationSwapchain::set_frame_generation_config`]: crate::FrameInterpolationSwapchain::set_frame_generation_config
#[derive(Clone, Debug, PartialEq)]
pub struct FrameGenerationConfig {
    pub frame_generation_enabled: bool,

    /// Records interpolation work unless a command list was registered for the frame.
    pub frame_generation_callback: Option<FrameGenerationCallback>,

    /// `None` selects built-in UI composition.
    pub present_callback: Option<PresentCallback>,

    /// Run interpolation on a dedicated compute queue instead of the game queue.
    pub allow_async_workloads: bool,

    pub draw_debug_pacing_lines: bool,

    /// Empty rectangle stands for the whole back buffer.
    pub interpolation_rect: Rect,

    /// Skip presenting real frames while interpolating.
    pub only_present_interpolated: bool,

    pub flags: FrameGenerationFlags,

    /// Application frame counter. Discontinuities reset interpolation history.
    pub frame_id: u64,

    pub tuning: FramePacingTuning,
}

impl Default for FrameGenerationConfig {
    fn default() -> Self {
        FrameGenerationConfig {
            frame_generation_enabled: false,
            frame_generation_callback: None,
            present_callback: None,
            allow_async_workloads: false,
            draw_debug_pacing_lines: false,
            interpolation_rect: Rect::default(),
            only_present_interpolated: false,
            flags: FrameGenerationFlags::empty(),
            frame_id: 0,
            tuning: FramePacingTuning::default(),
        }
    }
}

impl FrameGenerationConfig {
    /// Whether switching from `self` to `next` requires draining presentation.
    pub(crate) fn requires_drain(&self, next: &FrameGenerationConfig) -> bool {
        self.frame_generation_enabled != next.frame_generation_enabled
            || self.allow_async_workloads != next.allow_async_workloads
            || self.frame_generation_callback != next.frame_generation_callback
            || self.present_callback != next.present_callback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callbacks_compare_by_identity() {
        let a = FrameGenerationCallback::new(|_| Ok(()));
        let b = FrameGenerationCallback::new(|_| Ok(()));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn drain_only_on_structural_changes() {
        let base = FrameGenerationConfig::default();

        let mut next = base.clone();
        next.frame_id = 42;
        next.draw_debug_pacing_lines = true;
        next.tuning.safety_margin_ms = 1.0;
        assert!(!base.requires_drain(&next));

        next.allow_async_workloads = true;
        assert!(base.requires_drain(&next));

        let mut next = base.clone();
        next.frame_generation_callback = Some(FrameGenerationCallback::new(|_| Ok(())));
        assert!(base.requires_drain(&next));
    }
}
