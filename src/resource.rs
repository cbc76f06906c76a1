use std::{
    any::Any,
    fmt::{self, Debug},
    hash::{Hash, Hasher},
    sync::Arc,
};

/// Texel format of swapchain-compatible resources.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub enum Format {
    RGBA8Unorm,
    RGBA8Srgb,
    BGRA8Unorm,
    BGRA8Srgb,
    RGB10A2Unorm,
    RGBA16Sfloat,
}

impl Format {
    /// Size of one texel in bytes.
    pub fn texel_size(self) -> u64 {
        match self {
            Format::RGBA8Unorm
            | Format::RGBA8Srgb
            | Format::BGRA8Unorm
            | Format::BGRA8Srgb
            | Format::RGB10A2Unorm => 4,
            Format::RGBA16Sfloat => 8,
        }
    }
}

bitflags::bitflags! {
    /// Ways a resource is going to be accessed.
    #[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
    pub struct ResourceUsage: u32 {
        const TRANSFER_SRC =        0x01;
        const TRANSFER_DST =        0x02;
        const SAMPLED =             0x04;
        const STORAGE =             0x08;
        const COLOR_ATTACHMENT =    0x10;
        const PRESENT =             0x20;
    }
}

/// Description of a two dimensional GPU resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceDesc {
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub usage: ResourceUsage,
}

impl ResourceDesc {
    /// Number of bytes the resource occupies, ignoring alignment.
    pub fn size_in_bytes(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * self.format.texel_size()
    }
}

/// Rectangle in texels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

struct ResourceInner {
    desc: ResourceDesc,
    name: String,
    raw: Box<dyn Any + Send + Sync>,
}

/// Handle for GPU resource object.
///
/// Cloning is cheap and yields a handle to the same resource.
/// Backend-specific payload is reachable through [`Resource::raw`].
#[derive(Clone)]
pub struct Resource {
    inner: Arc<ResourceInner>,
}

impl PartialEq for Resource {
    #[inline]
    fn eq(&self, rhs: &Self) -> bool {
        std::ptr::eq(&*self.inner, &*rhs.inner)
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    #[inline]
    fn hash<H>(&self, hasher: &mut H)
    where
        H: Hasher,
    {
        std::ptr::hash(&*self.inner, hasher)
    }
}

impl Debug for Resource {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if fmt.alternate() {
            fmt.debug_struct("Resource")
                .field("name", &self.inner.name)
                .field("desc", &self.inner.desc)
                .finish()
        } else {
            write!(fmt, "Resource({})", self.inner.name)
        }
    }
}

impl Resource {
    /// Wraps backend payload into a resource handle.
    pub fn new(desc: ResourceDesc, name: impl Into<String>, raw: impl Any + Send + Sync) -> Self {
        Resource {
            inner: Arc::new(ResourceInner {
                desc,
                name: name.into(),
                raw: Box::new(raw),
            }),
        }
    }

    #[inline]
    pub fn desc(&self) -> &ResourceDesc {
        &self.inner.desc
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[inline]
    pub fn size_in_bytes(&self) -> u64 {
        self.inner.desc.size_in_bytes()
    }

    /// Returns backend payload if it is of type `T`.
    #[inline]
    pub fn raw<T: Any>(&self) -> Option<&T> {
        self.inner.raw.downcast_ref()
    }
}

/// Kind of the internal pipelines used for composition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    /// Blends UI surface over a frame.
    UiComposite,

    /// Draws pacing bars used to inspect presentation cadence.
    DebugPacingLines,
}

/// Handle for a pipeline created by backend for internal composition passes.
#[derive(Clone)]
pub struct Pipeline {
    kind: PipelineKind,
    format: Format,
    raw: Arc<dyn Any + Send + Sync>,
}

impl Debug for Pipeline {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Pipeline")
            .field("kind", &self.kind)
            .field("format", &self.format)
            .finish()
    }
}

impl Pipeline {
    pub fn new(kind: PipelineKind, format: Format, raw: impl Any + Send + Sync) -> Self {
        Pipeline {
            kind,
            format,
            raw: Arc::new(raw),
        }
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn raw<T: Any>(&self) -> Option<&T> {
        self.raw.downcast_ref()
    }
}
