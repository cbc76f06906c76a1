use raw_window_handle::RawWindowHandle;

/// Window the swapchain presents to.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceInfo {
    pub window: RawWindowHandle,
}

unsafe impl Send for SurfaceInfo {}
unsafe impl Sync for SurfaceInfo {}

/// Color space of the presented images.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub enum ColorSpace {
    /// Gamma 2.2, BT.709 primaries.
    SrgbNonLinear,

    /// ST.2084 (PQ) transfer, BT.2020 primaries.
    Hdr10St2084,

    /// Linear, BT.709 primaries, extended range.
    ScRgbLinear,
}

impl Default for ColorSpace {
    fn default() -> Self {
        ColorSpace::SrgbNonLinear
    }
}

/// Transfer function the frame-generation effect should assume for its inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub enum TransferFunction {
    Srgb,
    Pq,
    ScRgb,
}

impl From<ColorSpace> for TransferFunction {
    fn from(color_space: ColorSpace) -> Self {
        match color_space {
            ColorSpace::SrgbNonLinear => TransferFunction::Srgb,
            ColorSpace::Hdr10St2084 => TransferFunction::Pq,
            ColorSpace::ScRgbLinear => TransferFunction::ScRgb,
        }
    }
}

/// Mastering luminance range in nits.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct HdrMetadata {
    pub min_luminance: f32,
    pub max_luminance: f32,
}

impl Default for HdrMetadata {
    fn default() -> Self {
        HdrMetadata {
            min_luminance: 0.0,
            max_luminance: 1000.0,
        }
    }
}
