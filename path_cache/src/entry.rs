// Copyright 2026 the GPU Cache Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use gpu_cache::Timestamp;

use crate::atlas::AtlasRef;
use crate::key::PathCacheKey;

slotmap::new_key_type! {
    /// Identifies an entry inside a [`PathCache`](crate::PathCache).
    ///
    /// Removed entries never resolve again, even if the slot is reused.
    pub struct EntryId;
}

/// Device-space pixel bounds of a rendered mask.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct MaskBounds {
    /// Left edge in device pixels.
    pub x: i32,
    /// Top edge in device pixels.
    pub y: i32,
    /// Width in pixels.
    pub width: u16,
    /// Height in pixels.
    pub height: u16,
}

/// How a cached mask was placed when it was rendered.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MaskPlacement {
    /// Device bounds at render time.
    pub bounds: MaskBounds,
    /// Integer translation of the transform the mask was rendered with.
    pub translate: (i32, i32),
}

impl MaskPlacement {
    /// Device position of the mask's top-left corner when drawn with an
    /// integer translation of `translate`.
    pub fn origin_at(&self, translate: (i32, i32)) -> (i32, i32) {
        (
            self.bounds
                .x
                .saturating_add(translate.0.saturating_sub(self.translate.0)),
            self.bounds
                .y
                .saturating_add(translate.1.saturating_sub(self.translate.1)),
        )
    }
}

/// A cached mask.
#[derive(Clone, Debug)]
pub struct PathCacheEntry {
    pub(crate) key: PathCacheKey,
    pub(crate) atlas_ref: AtlasRef,
    pub(crate) placement: MaskPlacement,
    pub(crate) on_flush_ref_count: u32,
    pub(crate) hit_count: u32,
    pub(crate) timestamp: Timestamp,
    pub(crate) stale: bool,
    pub(crate) prev: Option<EntryId>,
    pub(crate) next: Option<EntryId>,
}

impl PathCacheEntry {
    pub(crate) fn new(
        key: PathCacheKey,
        atlas_ref: AtlasRef,
        placement: MaskPlacement,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            key,
            atlas_ref,
            placement,
            on_flush_ref_count: 0,
            hit_count: 0,
            timestamp,
            stale: false,
            prev: None,
            next: None,
        }
    }

    /// The key the mask was cached under.
    #[inline]
    pub fn key(&self) -> &PathCacheKey {
        &self.key
    }

    /// Where the mask lives.
    #[inline]
    pub fn atlas_ref(&self) -> AtlasRef {
        self.atlas_ref
    }

    /// Where the mask was drawn when it was rendered.
    #[inline]
    pub fn placement(&self) -> MaskPlacement {
        self.placement
    }

    /// How many times the current flush reads this entry.
    #[inline]
    pub fn on_flush_ref_count(&self) -> u32 {
        self.on_flush_ref_count
    }

    /// Number of lookups this entry satisfied.
    #[inline]
    pub fn hit_count(&self) -> u32 {
        self.hit_count
    }

    /// When the entry was last inserted or hit.
    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Whether the path changed while the entry was in flight.
    ///
    /// Stale entries never satisfy a lookup and are removed when the flush
    /// that reads them ends.
    #[inline]
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    #[inline]
    pub(crate) fn in_flight(&self) -> bool {
        self.on_flush_ref_count > 0
    }
}
