// Copyright 2026 the GPU Cache Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::resource::ResourceId;

/// Failure of a resource cache operation.
///
/// All failures are local to the call that reported them; the cache is left
/// unchanged.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CacheError {
    /// The unique key is already bound to a different resource.
    ///
    /// The caller should use the existing resource, or remove its key first.
    UniqueKeyCollision {
        /// The resource currently holding the key.
        existing: ResourceId,
    },
    /// The resource already carries a different unique key.
    AlreadyKeyed,
    /// The resource is not (or no longer) in this cache.
    UnknownResource,
}

impl core::fmt::Display for CacheError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UniqueKeyCollision { existing } => {
                write!(f, "unique key already bound to resource {existing:?}")
            }
            Self::AlreadyKeyed => write!(f, "resource already has a different unique key"),
            Self::UnknownResource => write!(f, "resource is not in the cache"),
        }
    }
}

impl core::error::Error for CacheError {}
