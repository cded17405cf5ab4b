// Copyright 2026 the GPU Cache Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Resource descriptors, handles and references.

use alloc::sync::Arc;
use core::fmt::{Debug, Formatter};

use crate::key::UniqueKey;
use crate::Timestamp;

slotmap::new_key_type! {
    /// Identifies a resource inside a [`ResourceCache`](crate::ResourceCache).
    ///
    /// Ids are generational: once a resource is destroyed its id never
    /// resolves again, even if the slot is reused.
    pub struct ResourceId;
}

/// Pixel format of a texture resource.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// Single 8-bit coverage channel.
    Alpha8,
    /// 8-bit RGBA.
    Rgba8,
    /// 16-bit float RGBA.
    Rgba16Float,
}

impl TextureFormat {
    /// Size of one texel in bytes.
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Alpha8 => 1,
            Self::Rgba8 => 4,
            Self::Rgba16Float => 8,
        }
    }
}

/// Describes a GPU allocation.
///
/// Equal descriptors are interchangeable for scratch reuse.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResourceDesc {
    /// A 2D texture.
    Texture {
        /// Width in texels.
        width: u32,
        /// Height in texels.
        height: u32,
        /// Texel format.
        format: TextureFormat,
    },
    /// A linear buffer.
    Buffer {
        /// Size in bytes.
        size: usize,
    },
}

impl ResourceDesc {
    /// Shorthand for [`ResourceDesc::Texture`].
    pub fn texture(width: u32, height: u32, format: TextureFormat) -> Self {
        Self::Texture {
            width,
            height,
            format,
        }
    }

    /// Shorthand for [`ResourceDesc::Buffer`].
    pub fn buffer(size: usize) -> Self {
        Self::Buffer { size }
    }

    /// Bytes of GPU memory the resource occupies.
    pub fn byte_size(&self) -> usize {
        match *self {
            Self::Texture {
                width,
                height,
                format,
            } => (width as usize)
                .saturating_mul(height as usize)
                .saturating_mul(format.bytes_per_pixel()),
            Self::Buffer { size } => size,
        }
    }
}

/// Opaque value a [`ResourceBackend`](crate::ResourceBackend) uses to name
/// one of its allocations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendHandle(pub u64);

/// Immutable data shared between the cache and every reference to a resource.
pub(crate) struct ResourceToken {
    pub(crate) id: ResourceId,
    pub(crate) handle: BackendHandle,
    pub(crate) desc: ResourceDesc,
}

/// A strong reference to a cached resource.
///
/// While any `ResourceRef` to a resource is alive the cache will not evict
/// it. Cloning adds a reference; dropping releases it.
///
/// After [`ResourceCache::abandon`](crate::ResourceCache::abandon) the backend
/// handle no longer names a live allocation and the id no longer resolves.
#[derive(Clone)]
pub struct ResourceRef {
    pub(crate) token: Arc<ResourceToken>,
}

impl ResourceRef {
    /// The resource's id in its cache.
    #[inline]
    pub fn id(&self) -> ResourceId {
        self.token.id
    }

    /// The backend handle of the allocation.
    #[inline]
    pub fn handle(&self) -> BackendHandle {
        self.token.handle
    }

    /// The descriptor the resource was allocated with.
    #[inline]
    pub fn desc(&self) -> ResourceDesc {
        self.token.desc
    }

    /// Bytes of GPU memory the resource occupies.
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.token.desc.byte_size()
    }
}

impl PartialEq for ResourceRef {
    fn eq(&self, other: &Self) -> bool {
        self.token.id == other.token.id
    }
}

impl Eq for ResourceRef {}

impl Debug for ResourceRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResourceRef")
            .field("id", &self.token.id)
            .field("handle", &self.token.handle)
            .field("desc", &self.token.desc)
            .finish()
    }
}

/// A read-only snapshot of one resource's cache state.
#[derive(Clone, Debug)]
pub struct ResourceInfo {
    /// The resource's id.
    pub id: ResourceId,
    /// The descriptor the resource was allocated with.
    pub desc: ResourceDesc,
    /// Bytes of GPU memory the resource occupies.
    pub byte_size: usize,
    /// Whether the resource counts against the budget.
    pub budgeted: bool,
    /// Whether nothing outside the cache references the resource.
    pub purgeable: bool,
    /// Number of live [`ResourceRef`]s held outside the cache.
    pub ref_count: usize,
    /// When the resource was last used.
    pub timestamp: Timestamp,
    /// The unique key bound to the resource, if any.
    pub unique_key: Option<UniqueKey>,
}
