use std::fmt::{self, Debug};

use parking_lot::Mutex;

use crate::{
    config::{FramePacingTuning, PresentCallback, UiCompositionFlags},
    resource::Resource,
};

/// Frame delta above which frame time history is discarded.
pub const RESET_THRESHOLD_MS: f64 = 100.0;

/// Remaining time before the next present above which
/// the scheduler may park on the interpolation fence instead of polling.
pub const BLOCKING_WAIT_THRESHOLD_MS: f64 = 2.0;

/// Slot of a pacing window.
///
/// Slots are presented in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Interpolated = 0,
    Real = 1,
}

impl FrameKind {
    pub const ALL: [FrameKind; 2] = [FrameKind::Interpolated, FrameKind::Real];
}

/// Single frame of a pacing window.
#[derive(Clone, Debug, Default)]
pub struct FrameInfo {
    pub do_present: bool,

    /// Frame to composite into the native back buffer.
    pub resource: Option<Resource>,

    /// Value of interpolation fence at which this frame is ready.
    pub interpolation_completed_fence_value: u64,

    /// Value present fence reaches once this frame is presented.
    pub present_index: u64,

    /// Ticks to wait after previous physical present.
    pub present_qpc_delta: u64,
}

/// Everything the presenter needs to present one window.
///
/// Built by the application thread, completed by the scheduler
/// and consumed by the presenter. Never mutated after publishing.
#[derive(Clone)]
pub struct PacingData {
    pub frames: [FrameInfo; 2],

    pub tuning: FramePacingTuning,
    pub vsync: bool,
    pub tearing_supported: bool,
    pub draw_debug_pacing_lines: bool,
    pub usage_flags: UiCompositionFlags,

    /// Present fence value before this window.
    pub num_frames_sent_for_presentation_base: u64,
    pub num_frames_to_present: u32,

    /// Present index at which the replacement buffer of this window is released.
    pub replacement_buffer_fence_signal: u64,

    pub ui_surface: Option<Resource>,
    pub present_callback: Option<PresentCallback>,

    pub frame_id: u64,

    /// Frame time history must be discarded.
    pub reset: bool,
}

impl Default for PacingData {
    fn default() -> Self {
        PacingData {
            frames: Default::default(),
            tuning: FramePacingTuning::default(),
            vsync: false,
            tearing_supported: false,
            draw_debug_pacing_lines: false,
            usage_flags: UiCompositionFlags::empty(),
            num_frames_sent_for_presentation_base: 0,
            num_frames_to_present: 0,
            replacement_buffer_fence_signal: 0,
            ui_surface: None,
            present_callback: None,
            frame_id: 0,
            reset: false,
        }
    }
}

impl Debug for PacingData {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if fmt.alternate() {
            fmt.debug_struct("PacingData")
                .field("frames", &self.frames)
                .field("tuning", &self.tuning)
                .field("vsync", &self.vsync)
                .field("tearing_supported", &self.tearing_supported)
                .field("draw_debug_pacing_lines", &self.draw_debug_pacing_lines)
                .field("usage_flags", &self.usage_flags)
                .field("base", &self.num_frames_sent_for_presentation_base)
                .field("num_frames_to_present", &self.num_frames_to_present)
                .field("replacement_buffer_fence_signal", &self.replacement_buffer_fence_signal)
                .field("ui_surface", &self.ui_surface)
                .field("present_callback", &self.present_callback)
                .field("frame_id", &self.frame_id)
                .field("reset", &self.reset)
                .finish()
        } else {
            write!(
                fmt,
                "PacingData(frame {}, {} from {})",
                self.frame_id, self.num_frames_to_present, self.num_frames_sent_for_presentation_base
            )
        }
    }
}

impl PacingData {
    pub fn frame(&self, kind: FrameKind) -> &FrameInfo {
        &self.frames[kind as usize]
    }

    pub fn frame_mut(&mut self, kind: FrameKind) -> &mut FrameInfo {
        &mut self.frames[kind as usize]
    }

    /// Present fence value after this window is fully presented.
    pub fn last_present_index(&self) -> u64 {
        self.num_frames_sent_for_presentation_base + u64::from(self.num_frames_to_present)
    }
}

/// Single-slot handoff between threads.
///
/// Publishing overwrites any value not yet taken.
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
}

impl<T> Debug for Mailbox<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let occupied = self.slot.lock().is_some();
        write!(fmt, "Mailbox({})", if occupied { "full" } else { "empty" })
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Mailbox::new()
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Mailbox {
            slot: Mutex::new(None),
        }
    }

    /// Stores `value` returning the one it replaced.
    pub fn publish(&self, value: T) -> Option<T> {
        self.slot.lock().replace(value)
    }

    /// Takes the value leaving the slot empty.
    pub fn take(&self) -> Option<T> {
        self.slot.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }
}

/// Delay between the interpolated and the real frame of a window.
///
/// Half the average frame time, biased towards presenting early when
/// frame times are noisy. Never negative.
pub fn present_delay(average: f64, deviation: f64, variance_factor: f64, margin_ticks: u64) -> u64 {
    let estimate = average * 0.5 - deviation * variance_factor - margin_ticks as f64;
    if estimate > 0.0 {
        estimate as u64
    } else {
        0
    }
}
