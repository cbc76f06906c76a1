use crate::resource::{Format, ResourceUsage};

/// Number of buffers the native swapchain is created with,
/// regardless of what the application asks for.
pub const INTERNAL_BUFFER_COUNT: u32 = 3;

/// Largest buffer count an application may request.
pub const MAX_BUFFER_COUNT: u32 = 16;

/// How presented buffers are treated by the display stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub enum SwapEffect {
    Discard,
    Sequential,
    FlipSequential,
    FlipDiscard,
}

impl Default for SwapEffect {
    fn default() -> Self {
        SwapEffect::FlipDiscard
    }
}

bitflags::bitflags! {
    #[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
    pub struct SwapchainFlags: u32 {
        /// Presents with zero sync interval may tear.
        const ALLOW_TEARING =                   0x1;

        /// Expose waitable object bounding the frame latency.
        const FRAME_LATENCY_WAITABLE_OBJECT =   0x2;

        const ALLOW_MODE_SWITCH =               0x4;
    }
}

/// Description of a swapchain.
///
/// For the proxy swapchain this always reports what the application requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct SwapchainDesc {
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub buffer_count: u32,
    pub usage: ResourceUsage,
    pub swap_effect: SwapEffect,
    pub flags: SwapchainFlags,
}

impl SwapchainDesc {
    /// Description of the native swapchain backing a proxy for this one.
    pub(crate) fn to_native(&self, tearing_supported: bool) -> SwapchainDesc {
        let mut flags = self.flags - SwapchainFlags::FRAME_LATENCY_WAITABLE_OBJECT;
        if tearing_supported {
            flags |= SwapchainFlags::ALLOW_TEARING;
        }

        SwapchainDesc {
            buffer_count: INTERNAL_BUFFER_COUNT,
            swap_effect: SwapEffect::FlipDiscard,
            usage: self.usage | ResourceUsage::TRANSFER_DST | ResourceUsage::COLOR_ATTACHMENT,
            flags,
            ..*self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_desc_is_forced_to_flip_model() {
        let desc = SwapchainDesc {
            width: 640,
            height: 480,
            format: Format::BGRA8Unorm,
            buffer_count: 2,
            usage: ResourceUsage::COLOR_ATTACHMENT,
            swap_effect: SwapEffect::Sequential,
            flags: SwapchainFlags::FRAME_LATENCY_WAITABLE_OBJECT,
        };

        let native = desc.to_native(true);
        assert_eq!(native.buffer_count, INTERNAL_BUFFER_COUNT);
        assert_eq!(native.swap_effect, SwapEffect::FlipDiscard);
        assert_eq!(native.flags, SwapchainFlags::ALLOW_TEARING);
        assert!(native.usage.contains(ResourceUsage::TRANSFER_DST));

        let native = desc.to_native(false);
        assert!(native.flags.is_empty());
    }
}
