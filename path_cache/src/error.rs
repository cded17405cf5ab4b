// Copyright 2026 the GPU Cache Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::atlas::AtlasId;
use crate::entry::EntryId;
use crate::flush::FlushId;

/// Failure of a path cache operation.
///
/// Running out of atlas space is not an error; it is reported as
/// [`MaskDraw::Uncached`](crate::MaskDraw::Uncached) or `None`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum PathCacheError {
    /// `begin_flush` was called while another flush is active.
    FlushInProgress {
        /// The flush that is still active.
        active: FlushId,
    },
    /// The operation needs an active flush and there is none.
    NoActiveFlush,
    /// `end_flush` named a flush other than the active one.
    FlushMismatch {
        /// The flush that is active.
        active: FlushId,
        /// The flush the caller tried to end.
        requested: FlushId,
    },
    /// The entry is not (or no longer) in the cache.
    UnknownEntry,
    /// The atlas is not (or no longer) in the cache.
    UnknownAtlas,
    /// The key is held by an entry whose path changed while in flight.
    ///
    /// Draw the path uncached until the flush ends.
    StaleEntry {
        /// The stale entry.
        existing: EntryId,
    },
    /// The resource cache purged the atlas texture; its entries were dropped.
    AtlasLost {
        /// The atlas that was dropped.
        atlas: AtlasId,
    },
}

impl core::fmt::Display for PathCacheError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::FlushInProgress { active } => {
                write!(f, "flush {active:?} is still in progress")
            }
            Self::NoActiveFlush => write!(f, "no flush is active"),
            Self::FlushMismatch { active, requested } => {
                write!(f, "cannot end flush {requested:?}: active flush is {active:?}")
            }
            Self::UnknownEntry => write!(f, "entry is not in the cache"),
            Self::UnknownAtlas => write!(f, "atlas is not in the cache"),
            Self::StaleEntry { existing } => {
                write!(f, "key is held by stale entry {existing:?}")
            }
            Self::AtlasLost { atlas } => write!(f, "texture of atlas {atlas:?} was purged"),
        }
    }
}

impl core::error::Error for PathCacheError {}
