// Copyright 2026 the GPU Cache Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Atlas textures and the shelf allocator that subdivides them.

use alloc::vec::Vec;
use gpu_cache::{
    KeyDomain, ResourceBackend, ResourceCache, ResourceDesc, ResourceRef, TextureFormat, UniqueKey,
};

use crate::ATLAS_KEY_TAG;

/// Padding in pixels added to each side of a mask to prevent texture bleeding.
pub const MASK_PADDING: u16 = 1;

/// Identifies an atlas inside one [`PathCache`](crate::PathCache).
///
/// Ids are never reused by the cache that issued them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtlasId(pub(crate) u32);

/// A rectangle of atlas texels.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct AtlasRect {
    /// Left edge.
    pub x: u16,
    /// Top edge.
    pub y: u16,
    /// Width in texels.
    pub width: u16,
    /// Height in texels.
    pub height: u16,
}

impl AtlasRect {
    /// Number of texels covered.
    #[inline]
    pub fn area(self) -> u32 {
        u32::from(self.width) * u32::from(self.height)
    }
}

/// Where a mask lives: an atlas and a rectangle within it.
///
/// The slot includes [`MASK_PADDING`] and may be larger than the mask when
/// it was carved from a previously released rectangle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AtlasRef {
    atlas: AtlasId,
    slot: AtlasRect,
    width: u16,
    height: u16,
}

impl AtlasRef {
    /// The atlas holding the mask.
    #[inline]
    pub fn atlas(&self) -> AtlasId {
        self.atlas
    }

    /// The full allocated rectangle, padding included.
    #[inline]
    pub fn slot(&self) -> AtlasRect {
        self.slot
    }

    /// The rectangle the mask's pixels are rendered into.
    #[inline]
    pub fn content(&self) -> AtlasRect {
        AtlasRect {
            x: self.slot.x + MASK_PADDING,
            y: self.slot.y + MASK_PADDING,
            width: self.width,
            height: self.height,
        }
    }
}

/// Read-only snapshot of an atlas' bookkeeping.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AtlasInfo {
    /// The atlas.
    pub id: AtlasId,
    /// Width of the atlas texture.
    pub width: u16,
    /// Height of the atlas texture.
    pub height: u16,
    /// Whether the atlas no longer accepts allocations.
    pub frozen: bool,
    /// Number of entries hosted.
    pub live_entries: u32,
    /// Texels occupied by hosted entries.
    pub live_pixels: u64,
    /// Texels of entries removed because their path changed.
    pub invalidated_pixels: u64,
    /// Texels handed out since the atlas was created.
    pub allocated_pixels: u64,
    /// Highest flush count of any hosted entry the current flush reads.
    pub on_flush_ref_count: u32,
}

/// Row-based packer with best-fit reuse of released rectangles.
#[derive(Clone, Debug)]
pub(crate) struct ShelfPacker {
    width: u16,
    height: u16,
    cursor_x: u16,
    cursor_y: u16,
    row_height: u16,
    free_slots: Vec<AtlasRect>,
}

impl ShelfPacker {
    pub(crate) fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            cursor_x: 0,
            cursor_y: 0,
            row_height: 0,
            free_slots: Vec::new(),
        }
    }

    pub(crate) fn allocate(&mut self, width: u16, height: u16) -> Option<AtlasRect> {
        if let Some((index, _)) = self
            .free_slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.width >= width && slot.height >= height)
            .min_by_key(|(_, slot)| slot.area())
        {
            return Some(self.free_slots.swap_remove(index));
        }

        // A failed request must not wrap the row.
        let (mut x, mut y, mut row_height) = (self.cursor_x, self.cursor_y, self.row_height);
        if x.saturating_add(width) > self.width {
            x = 0;
            y = y.saturating_add(row_height);
            row_height = 0;
        }
        if x.saturating_add(width) > self.width || y.saturating_add(height) > self.height {
            return None;
        }
        self.cursor_x = x + width;
        self.cursor_y = y;
        self.row_height = row_height.max(height);
        Some(AtlasRect {
            x,
            y,
            width,
            height,
        })
    }

    pub(crate) fn release(&mut self, slot: AtlasRect) {
        self.free_slots.push(slot);
    }
}

/// An atlas texture registered in the resource cache under a unique key.
///
/// Between flushes only the key is held, so the resource cache may purge
/// the texture. While any hosted entry is in flight the flush keeps a strong
/// reference in `flush_texture`.
#[derive(Debug)]
pub(crate) struct CachedAtlas {
    pub(crate) id: AtlasId,
    pub(crate) texture_key: UniqueKey,
    packer: ShelfPacker,
    pub(crate) frozen: bool,
    live_entries: u32,
    live_pixels: u64,
    invalidated_pixels: u64,
    allocated_pixels: u64,
    pub(crate) on_flush_ref_count: u32,
    pub(crate) flush_texture: Option<ResourceRef>,
}

impl CachedAtlas {
    fn new(id: AtlasId, texture_key: UniqueKey, width: u16, height: u16) -> Self {
        Self {
            id,
            texture_key,
            packer: ShelfPacker::new(width, height),
            frozen: false,
            live_entries: 0,
            live_pixels: 0,
            invalidated_pixels: 0,
            allocated_pixels: 0,
            on_flush_ref_count: 0,
            flush_texture: None,
        }
    }

    /// Records a new entry in `slot`.
    pub(crate) fn host(&mut self, slot: AtlasRect) {
        self.live_entries += 1;
        self.live_pixels += u64::from(slot.area());
    }

    /// Forgets a hosted entry and returns its slot to the free list.
    pub(crate) fn unhost(&mut self, slot: AtlasRect, invalidated: bool) {
        self.live_entries = self.live_entries.saturating_sub(1);
        self.live_pixels = self.live_pixels.saturating_sub(u64::from(slot.area()));
        if invalidated {
            self.invalidated_pixels += u64::from(slot.area());
        }
        self.packer.release(slot);
    }

    /// Returns a slot that never became an entry.
    pub(crate) fn release_slot(&mut self, slot: AtlasRect) {
        self.packer.release(slot);
    }

    /// Whether the atlas can be handed back to the resource cache.
    ///
    /// Only frozen atlases outside the flush qualify, once they host nothing
    /// or at least half of what they ever allocated was invalidated.
    pub(crate) fn should_retire(&self) -> bool {
        self.frozen
            && self.on_flush_ref_count == 0
            && (self.live_entries == 0 || self.invalidated_pixels * 2 >= self.allocated_pixels)
    }

    fn allocate(&mut self, width: u16, height: u16) -> Option<AtlasRef> {
        let padded_width = width.checked_add(MASK_PADDING * 2)?;
        let padded_height = height.checked_add(MASK_PADDING * 2)?;
        let slot = self.packer.allocate(padded_width, padded_height)?;
        self.allocated_pixels += u64::from(slot.area());
        Some(AtlasRef {
            atlas: self.id,
            slot,
            width,
            height,
        })
    }

    fn info(&self) -> AtlasInfo {
        AtlasInfo {
            id: self.id,
            width: self.packer.width,
            height: self.packer.height,
            frozen: self.frozen,
            live_entries: self.live_entries,
            live_pixels: self.live_pixels,
            invalidated_pixels: self.invalidated_pixels,
            allocated_pixels: self.allocated_pixels,
            on_flush_ref_count: self.on_flush_ref_count,
        }
    }
}

/// The atlases of one path cache, oldest first.
///
/// Only the newest atlas accepts allocations. Older ones are frozen but stay
/// readable until their entries are gone.
#[derive(Debug)]
pub(crate) struct AtlasStack {
    atlases: Vec<CachedAtlas>,
    current: Option<AtlasId>,
    next_id: u32,
    domain: KeyDomain,
    width: u16,
    height: u16,
}

impl AtlasStack {
    pub(crate) fn new(width: u16, height: u16) -> Self {
        Self {
            atlases: Vec::new(),
            current: None,
            next_id: 0,
            domain: UniqueKey::generate_domain(),
            width,
            height,
        }
    }

    /// Whether a mask of this size can ever fit in an atlas.
    pub(crate) fn fits_atlas(&self, width: u16, height: u16) -> bool {
        u32::from(width) + u32::from(MASK_PADDING) * 2 <= u32::from(self.width)
            && u32::from(height) + u32::from(MASK_PADDING) * 2 <= u32::from(self.height)
    }

    #[inline]
    pub(crate) fn current(&self) -> Option<AtlasId> {
        self.current
    }

    pub(crate) fn get(&self, id: AtlasId) -> Option<&CachedAtlas> {
        self.atlases.iter().find(|atlas| atlas.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: AtlasId) -> Option<&mut CachedAtlas> {
        self.atlases.iter_mut().find(|atlas| atlas.id == id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &CachedAtlas> + '_ {
        self.atlases.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut CachedAtlas> + '_ {
        self.atlases.iter_mut()
    }

    pub(crate) fn info(&self, id: AtlasId) -> Option<AtlasInfo> {
        self.get(id).map(CachedAtlas::info)
    }

    /// Allocates `width` x `height` texels plus padding in the open atlas.
    pub(crate) fn allocate(&mut self, width: u16, height: u16) -> Option<AtlasRef> {
        let current = self.current?;
        self.get_mut(current)?.allocate(width, height)
    }

    /// Opens a new atlas backed by a texture from `resources`, freezing the
    /// previous one.
    ///
    /// Returns `None` when the texture does not fit in the budget or the
    /// backend cannot allocate it.
    pub(crate) fn push<B: ResourceBackend>(
        &mut self,
        resources: &mut ResourceCache<B>,
    ) -> Option<AtlasId> {
        let desc = ResourceDesc::texture(
            u32::from(self.width),
            u32::from(self.height),
            TextureFormat::Alpha8,
        );
        if !resources.would_fit(desc.byte_size()) {
            log::debug!("no budget for another {}x{} atlas", self.width, self.height);
            return None;
        }
        let texture = resources.find_or_create_scratch(desc)?;
        let id = AtlasId(self.next_id);
        let key = UniqueKey::builder(self.domain, ATLAS_KEY_TAG)
            .push(id.0)
            .build();
        if let Err(err) = resources.insert_with_unique_key(&texture, key.clone()) {
            log::debug!("could not key atlas texture {:?}: {err}", texture.id());
            return None;
        }
        self.next_id += 1;
        if let Some(previous) = self.current.and_then(|current| self.get_mut(current)) {
            previous.frozen = true;
        }
        log::debug!(
            "opened atlas {id:?} on texture {:?} ({}x{})",
            texture.id(),
            self.width,
            self.height
        );
        self.atlases
            .push(CachedAtlas::new(id, key, self.width, self.height));
        self.current = Some(id);
        Some(id)
    }

    /// Forgets `id`, returning its bookkeeping.
    pub(crate) fn remove(&mut self, id: AtlasId) -> Option<CachedAtlas> {
        let index = self.atlases.iter().position(|atlas| atlas.id == id)?;
        if self.current == Some(id) {
            self.current = None;
        }
        Some(self.atlases.remove(index))
    }

    /// Forgets every atlas.
    pub(crate) fn clear(&mut self) -> Vec<CachedAtlas> {
        self.current = None;
        core::mem::take(&mut self.atlases)
    }
}
