// Copyright 2026 the GPU Cache Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::resource::{BackendHandle, ResourceDesc};

/// The allocator behind a [`ResourceCache`](crate::ResourceCache).
///
/// Implemented by the embedder on top of its graphics API. The cache calls
/// [`allocate`](Self::allocate) on a miss and [`destroy`](Self::destroy) when
/// a resource is evicted or purged. It never calls `destroy` after
/// [`ResourceCache::abandon`](crate::ResourceCache::abandon), since the device
/// is gone by then.
pub trait ResourceBackend {
    /// Allocates GPU memory for `desc`.
    ///
    /// Returns `None` when the allocation fails. The cache reports that to its
    /// caller as a miss; it is not fatal.
    fn allocate(&mut self, desc: &ResourceDesc) -> Option<BackendHandle>;

    /// Frees an allocation previously returned by [`allocate`](Self::allocate).
    fn destroy(&mut self, handle: BackendHandle);
}

impl<B: ResourceBackend + ?Sized> ResourceBackend for &mut B {
    fn allocate(&mut self, desc: &ResourceDesc) -> Option<BackendHandle> {
        (**self).allocate(desc)
    }

    fn destroy(&mut self, handle: BackendHandle) {
        (**self).destroy(handle);
    }
}
