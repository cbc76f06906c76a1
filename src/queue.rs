use crate::{DeviceLost, OutOfMemory};

/// Kind of work a queue accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub enum QueueKind {
    /// Accepts graphics, compute and transfer work and can present.
    Graphics,

    /// Accepts compute and transfer work.
    /// Used for interpolation when async workloads are allowed.
    Compute,
}

bitflags::bitflags! {
    /// Flags controlling a single present call.
    #[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
    pub struct PresentFlags: u32 {
        /// Do not present, only query presentation status.
        const TEST =            0x1;

        /// Present without waiting for vertical blank.
        /// Only valid with zero sync interval and when tearing is supported.
        const ALLOW_TEARING =   0x2;

        /// Drop any queued presents in favour of this one.
        const RESTART =         0x4;
    }
}

#[derive(Clone, Copy, Debug, thiserror::Error, PartialEq, Eq)]
pub enum PresentError {
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

    #[error("Surface is out of date")]
    OutOfDate,

    #[error("Surface was lost")]
    SurfaceLost,
}
