// Copyright 2026 the GPU Cache Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Flush tracking and the work a flush hands to the renderer.

use gpu_cache::BackendHandle;
use hashbrown::HashMap;

use crate::atlas::{AtlasId, AtlasRect};
use crate::entry::EntryId;
use crate::kurbo::{Affine, BezPath};
use crate::peniko::Fill;

/// Identifies one flush of a [`PathCache`](crate::PathCache).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlushId(pub(crate) u64);

/// The entries the active flush reads, with how often each was referenced.
#[derive(Debug)]
pub(crate) struct ActiveFlush {
    pub(crate) id: FlushId,
    pub(crate) entry_refs: HashMap<EntryId, u32>,
}

impl ActiveFlush {
    pub(crate) fn new(id: FlushId) -> Self {
        Self {
            id,
            entry_refs: HashMap::new(),
        }
    }
}

/// A mask ready to be sampled by a draw.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlacedMask {
    /// The entry holding the mask.
    pub entry: EntryId,
    /// The atlas holding the mask.
    pub atlas: AtlasId,
    /// Backend handle of the atlas texture.
    pub texture: BackendHandle,
    /// Texels of the mask inside the atlas, padding excluded.
    pub atlas_rect: AtlasRect,
    /// Device x of the mask's top-left corner.
    pub device_x: i32,
    /// Device y of the mask's top-left corner.
    pub device_y: i32,
}

/// What [`PathCache::prepare_draw`](crate::PathCache::prepare_draw) decided
/// for one path.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MaskDraw {
    /// The mask is already in an atlas.
    Cached(PlacedMask),
    /// Space was reserved and a [`PendingMaskRender`] queued; the mask is
    /// valid once that render has run.
    Scheduled(PlacedMask),
    /// The path should be rendered directly, without a cached mask.
    Uncached,
}

/// A mask that needs to be rasterized into its atlas before it is sampled.
#[derive(Clone, Debug)]
pub struct PendingMaskRender {
    /// The entry that will hold the mask.
    pub entry: EntryId,
    /// The atlas to render into.
    pub atlas: AtlasId,
    /// Backend handle of the atlas texture.
    pub texture: BackendHandle,
    /// Destination texels, padding excluded.
    pub rect: AtlasRect,
    /// The path to fill.
    pub path: BezPath,
    /// The fill rule.
    pub fill: Fill,
    /// Maps path coordinates into atlas texels.
    pub transform: Affine,
}

/// Rasterizes pending masks into atlas textures.
pub trait MaskRasterizer {
    /// Renders the coverage of `render.path` into `render.rect` of
    /// `render.texture`.
    fn rasterize(&mut self, render: &PendingMaskRender);
}

impl<R: MaskRasterizer + ?Sized> MaskRasterizer for &mut R {
    fn rasterize(&mut self, render: &PendingMaskRender) {
        (**self).rasterize(render);
    }
}
