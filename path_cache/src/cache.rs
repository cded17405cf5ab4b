// Copyright 2026 the GPU Cache Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Path mask cache with atlas storage, flush tracking and LRU eviction.

use alloc::vec::Vec;
use core::fmt::{Debug, Formatter};
use gpu_cache::{Clock, ResourceBackend, ResourceCache, Timestamp};
use hashbrown::HashMap;
use slotmap::SlotMap;

use crate::atlas::{AtlasId, AtlasInfo, AtlasRef, AtlasStack, CachedAtlas};
use crate::entry::{EntryId, MaskBounds, MaskPlacement, PathCacheEntry};
use crate::error::PathCacheError;
use crate::flush::{
    ActiveFlush, FlushId, MaskDraw, MaskRasterizer, PendingMaskRender, PlacedMask,
};
use crate::key::{GeometryId, MaskTransform, PathCacheKey};
use crate::kurbo::{Affine, BezPath, Shape, Vec2};
use crate::peniko::Fill;

/// Default atlas width and height in texels.
const DEFAULT_ATLAS_SIZE: u16 = 1024;

/// Default maximum mask dimension that will be cached.
const DEFAULT_MAX_MASK_SIZE: u16 = 256;

/// Default maximum number of entries.
const DEFAULT_MAX_ENTRIES: usize = 1 << 16;

/// Configuration for a [`PathCache`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PathCacheOptions {
    /// Width of each atlas texture.
    ///
    /// The default value is 1024.
    pub atlas_width: u16,
    /// Height of each atlas texture.
    ///
    /// The default value is 1024.
    pub atlas_height: u16,
    /// Masks wider or taller than this are never cached.
    ///
    /// The default value is 256.
    pub max_mask_size: u16,
    /// Inserting beyond this many entries evicts idle ones first.
    ///
    /// The default value is 65536.
    pub max_entries: usize,
}

impl Default for PathCacheOptions {
    fn default() -> Self {
        Self {
            atlas_width: DEFAULT_ATLAS_SIZE,
            atlas_height: DEFAULT_ATLAS_SIZE,
            max_mask_size: DEFAULT_MAX_MASK_SIZE,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

/// How much [`PathCache::evict_lru`] should remove.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EvictionTarget {
    /// Remove this many entries.
    Entries(usize),
    /// Remove entries until their slots add up to at least this many bytes.
    Bytes(usize),
}

impl EvictionTarget {
    fn is_met(self, entries: usize, bytes: usize) -> bool {
        match self {
            Self::Entries(target) => entries >= target,
            Self::Bytes(target) => bytes >= target,
        }
    }
}

/// Caches rasterized path masks in atlas textures.
///
/// Atlas textures belong to the [`ResourceCache`] passed to the methods that
/// need one; the path cache holds their unique keys and, while a flush reads
/// them, a strong reference. Entries read by the active flush are never
/// evicted or overwritten.
///
/// Only one flush may be active at a time.
pub struct PathCache {
    options: PathCacheOptions,
    entries: SlotMap<EntryId, PathCacheEntry>,
    index: HashMap<PathCacheKey, EntryId>,
    /// Most recently used entry.
    lru_head: Option<EntryId>,
    /// Least recently used entry.
    lru_tail: Option<EntryId>,
    atlases: AtlasStack,
    clock: Clock,
    flush: Option<ActiveFlush>,
    next_flush_id: u64,
    pending_renders: Vec<PendingMaskRender>,
    cache_hits: u64,
    cache_misses: u64,
}

impl PathCache {
    /// Creates an empty cache.
    pub fn new(options: PathCacheOptions) -> Self {
        Self {
            options,
            entries: SlotMap::with_key(),
            index: HashMap::new(),
            lru_head: None,
            lru_tail: None,
            atlases: AtlasStack::new(options.atlas_width, options.atlas_height),
            clock: Clock::new(),
            flush: None,
            next_flush_id: 0,
            pending_renders: Vec::new(),
            cache_hits: 0,
            cache_misses: 0,
        }
    }

    /// The options the cache was created with.
    #[inline]
    pub fn options(&self) -> &PathCacheOptions {
        &self.options
    }

    /// Looks up `key`.
    ///
    /// A hit moves the entry to the most recently used position. Stale
    /// entries never match.
    pub fn find(&mut self, key: &PathCacheKey) -> Option<EntryId> {
        let hit = self
            .index
            .get(key)
            .copied()
            .filter(|&id| self.entries.get(id).is_some_and(|entry| !entry.stale));
        let Some(id) = hit else {
            self.cache_misses += 1;
            return None;
        };
        self.cache_hits += 1;
        let timestamp = self.next_timestamp();
        if let Some(entry) = self.entries.get_mut(id) {
            entry.hit_count = entry.hit_count.saturating_add(1);
            entry.timestamp = timestamp;
        }
        self.touch(id);
        Some(id)
    }

    /// Caches a mask rendered into `atlas_ref`.
    ///
    /// If `key` is already cached the existing entry wins: the rectangle in
    /// `atlas_ref` goes back to its atlas and the existing id is returned, or
    /// [`PathCacheError::StaleEntry`] if that entry is stale. Evicts idle
    /// entries first when the cache is at `max_entries`.
    pub fn insert(
        &mut self,
        key: PathCacheKey,
        atlas_ref: AtlasRef,
        placement: MaskPlacement,
    ) -> Result<EntryId, PathCacheError> {
        if self.atlases.get(atlas_ref.atlas()).is_none() {
            return Err(PathCacheError::UnknownAtlas);
        }
        if let Some(&existing) = self.index.get(&key) {
            if let Some(atlas) = self.atlases.get_mut(atlas_ref.atlas()) {
                atlas.release_slot(atlas_ref.slot());
            }
            if self.entries.get(existing).is_some_and(|entry| entry.stale) {
                return Err(PathCacheError::StaleEntry { existing });
            }
            self.touch(existing);
            return Ok(existing);
        }
        if self.entries.len() >= self.options.max_entries {
            let excess = self.entries.len() + 1 - self.options.max_entries;
            self.evict_lru(EvictionTarget::Entries(excess));
        }
        let timestamp = self.next_timestamp();
        let id = self
            .entries
            .insert(PathCacheEntry::new(key, atlas_ref, placement, timestamp));
        self.index.insert(key, id);
        self.push_front(id);
        if let Some(atlas) = self.atlases.get_mut(atlas_ref.atlas()) {
            atlas.host(atlas_ref.slot());
        }
        Ok(id)
    }

    /// Removes idle entries from the least recently used end until `target`
    /// is met or nothing idle remains.
    ///
    /// Entries read by the active flush are skipped. Returns the number of
    /// entries removed.
    pub fn evict_lru(&mut self, target: EvictionTarget) -> usize {
        let mut removed = 0;
        let mut freed = 0;
        let mut cursor = self.lru_tail;
        while let Some(id) = cursor {
            if target.is_met(removed, freed) {
                break;
            }
            let Some(entry) = self.entries.get(id) else {
                break;
            };
            cursor = entry.prev;
            if entry.in_flight() {
                continue;
            }
            freed += self.remove_entry(id, false);
            removed += 1;
        }
        removed
    }

    /// Starts a flush.
    ///
    /// Fails without side effects if a flush is already active.
    pub fn begin_flush(&mut self) -> Result<FlushId, PathCacheError> {
        if let Some(active) = &self.flush {
            log::error!("begin_flush called while flush {:?} is active", active.id);
            return Err(PathCacheError::FlushInProgress { active: active.id });
        }
        let id = FlushId(self.next_flush_id);
        self.next_flush_id += 1;
        self.flush = Some(ActiveFlush::new(id));
        Ok(id)
    }

    /// Marks `id` as read by the active flush.
    ///
    /// The first reference to an atlas in a flush acquires its texture from
    /// `resources`. If the texture was purged in the meantime the atlas and
    /// its entries are dropped and [`PathCacheError::AtlasLost`] is returned.
    pub fn add_flush_ref<B: ResourceBackend>(
        &mut self,
        id: EntryId,
        resources: &mut ResourceCache<B>,
    ) -> Result<(), PathCacheError> {
        if self.flush.is_none() {
            return Err(PathCacheError::NoActiveFlush);
        }
        let entry = self.entries.get(id).ok_or(PathCacheError::UnknownEntry)?;
        if entry.stale {
            return Err(PathCacheError::StaleEntry { existing: id });
        }
        let atlas_id = entry.atlas_ref.atlas();
        let atlas = self
            .atlases
            .get_mut(atlas_id)
            .ok_or(PathCacheError::UnknownAtlas)?;
        if atlas.flush_texture.is_none() {
            let Some(texture) = resources.find_by_unique_key(&atlas.texture_key) else {
                log::debug!("texture of atlas {atlas_id:?} was purged, dropping its entries");
                self.drop_atlas(atlas_id);
                return Err(PathCacheError::AtlasLost { atlas: atlas_id });
            };
            atlas.flush_texture = Some(texture);
        }
        let entry = self
            .entries
            .get_mut(id)
            .ok_or(PathCacheError::UnknownEntry)?;
        entry.on_flush_ref_count += 1;
        atlas.on_flush_ref_count = atlas.on_flush_ref_count.max(entry.on_flush_ref_count);
        if let Some(flush) = self.flush.as_mut() {
            *flush.entry_refs.entry(id).or_insert(0) += 1;
        }
        Ok(())
    }

    /// Ends the active flush once the GPU has retired it.
    ///
    /// Releases exactly the references the flush took, removes stale entries
    /// that are no longer read and hands idle atlases back to `resources`.
    /// Masks that were scheduled but never taken for rendering are dropped.
    pub fn end_flush<B: ResourceBackend>(
        &mut self,
        flush_id: FlushId,
        resources: &mut ResourceCache<B>,
    ) -> Result<(), PathCacheError> {
        let active = self
            .flush
            .as_ref()
            .ok_or(PathCacheError::NoActiveFlush)?
            .id;
        if active != flush_id {
            return Err(PathCacheError::FlushMismatch {
                active,
                requested: flush_id,
            });
        }
        for render in core::mem::take(&mut self.pending_renders) {
            log::debug!("mask for entry {:?} was never rendered", render.entry);
            if let Some(entry) = self.entries.get_mut(render.entry) {
                entry.stale = true;
            }
        }
        let Some(flush) = self.flush.take() else {
            return Err(PathCacheError::NoActiveFlush);
        };
        let mut stale = Vec::new();
        for (id, count) in flush.entry_refs {
            let Some(entry) = self.entries.get_mut(id) else {
                continue;
            };
            entry.on_flush_ref_count = entry.on_flush_ref_count.saturating_sub(count);
            if entry.stale && !entry.in_flight() {
                stale.push(id);
            }
        }
        self.refresh_atlas_flush_refs();
        for id in stale {
            self.remove_entry(id, true);
        }
        self.release_idle_atlases(resources);
        Ok(())
    }

    /// Resolves one path draw for the active flush.
    ///
    /// Hashes the path's geometry and calls
    /// [`prepare_draw_with_geometry`](Self::prepare_draw_with_geometry).
    pub fn prepare_draw<B: ResourceBackend>(
        &mut self,
        resources: &mut ResourceCache<B>,
        path: &BezPath,
        fill: Fill,
        transform: Affine,
    ) -> Result<MaskDraw, PathCacheError> {
        self.prepare_draw_with_geometry(
            resources,
            GeometryId::from_path(path),
            path,
            fill,
            transform,
        )
    }

    /// Resolves one path draw for the active flush, using a caller-supplied
    /// geometry identity.
    ///
    /// On a hit the entry is referenced by the flush and returned as
    /// [`MaskDraw::Cached`]. On a miss space is allocated, opening a new
    /// atlas if needed, and a [`PendingMaskRender`] is queued. Masks that are
    /// too large, empty, or that no atlas can take come back as
    /// [`MaskDraw::Uncached`].
    pub fn prepare_draw_with_geometry<B: ResourceBackend>(
        &mut self,
        resources: &mut ResourceCache<B>,
        geometry: GeometryId,
        path: &BezPath,
        fill: Fill,
        transform: Affine,
    ) -> Result<MaskDraw, PathCacheError> {
        if self.flush.is_none() {
            return Err(PathCacheError::NoActiveFlush);
        }
        let mask_transform = MaskTransform::new(transform);
        let key = PathCacheKey::new(geometry, fill, &mask_transform);
        let translate = mask_transform.integer_translate();

        if let Some(id) = self.find(&key) {
            match self.add_flush_ref(id, resources) {
                Ok(()) => return self.placed_mask(id, translate).map(MaskDraw::Cached),
                Err(PathCacheError::AtlasLost { .. }) => {
                    self.cache_hits = self.cache_hits.saturating_sub(1);
                    self.cache_misses += 1;
                }
                Err(err) => return Err(err),
            }
        }

        let Some(bounds) = mask_bounds(path, &mask_transform, self.options.max_mask_size) else {
            return Ok(MaskDraw::Uncached);
        };
        let Some(atlas_ref) = self.allocate_for_draw(resources, bounds.width, bounds.height)
        else {
            log::trace!("no atlas space for a {}x{} mask", bounds.width, bounds.height);
            return Ok(MaskDraw::Uncached);
        };
        let placement = MaskPlacement { bounds, translate };
        let id = match self.insert(key, atlas_ref, placement) {
            Ok(id) => id,
            Err(PathCacheError::StaleEntry { .. }) => return Ok(MaskDraw::Uncached),
            Err(err) => return Err(err),
        };
        if let Err(err) = self.add_flush_ref(id, resources) {
            log::debug!("could not reference new entry {id:?}: {err}");
            if self.entries.contains_key(id) {
                self.remove_entry(id, false);
            }
            return Ok(MaskDraw::Uncached);
        }

        let placed = self.placed_mask(id, translate)?;
        let rect = placed.atlas_rect;
        let offset = Vec2::new(
            f64::from(rect.x) - f64::from(bounds.x),
            f64::from(rect.y) - f64::from(bounds.y),
        );
        self.pending_renders.push(PendingMaskRender {
            entry: id,
            atlas: placed.atlas,
            texture: placed.texture,
            rect,
            path: path.clone(),
            fill,
            transform: mask_transform.quantized().then_translate(offset),
        });
        Ok(MaskDraw::Scheduled(placed))
    }

    /// Allocates `width` x `height` texels in the open atlas.
    ///
    /// `None` means the open atlas is full (or there is none); the caller
    /// may [`push_atlas`](Self::push_atlas) or render uncached.
    pub fn allocate(&mut self, width: u16, height: u16) -> Option<AtlasRef> {
        self.atlases.allocate(width, height)
    }

    /// Opens a new atlas texture from `resources`, freezing the open one.
    ///
    /// Returns `None` if the texture does not fit in the budget or cannot be
    /// allocated.
    pub fn push_atlas<B: ResourceBackend>(
        &mut self,
        resources: &mut ResourceCache<B>,
    ) -> Option<AtlasId> {
        self.atlases.push(resources)
    }

    /// Forgets entries built from `geometry`, for example after the path was
    /// edited.
    ///
    /// Idle entries are removed. Entries read by the active flush are marked
    /// stale and removed when it ends. Returns the number of entries
    /// affected.
    pub fn invalidate_geometry(&mut self, geometry: GeometryId) -> usize {
        let matching: Vec<EntryId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.key.geometry() == geometry && !entry.stale)
            .map(|(id, _)| id)
            .collect();
        for &id in &matching {
            if let Some(entry) = self.entries.get_mut(id) {
                if entry.in_flight() {
                    entry.stale = true;
                    continue;
                }
            }
            self.remove_entry(id, true);
        }
        matching.len()
    }

    /// Removes every idle entry last used before `timestamp`.
    ///
    /// Returns the number of entries removed.
    pub fn purge_entries_not_used_since(&mut self, timestamp: Timestamp) -> usize {
        let old: Vec<EntryId> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.in_flight() && entry.timestamp < timestamp)
            .map(|(id, _)| id)
            .collect();
        for &id in &old {
            self.remove_entry(id, false);
        }
        old.len()
    }

    /// Hands atlases nobody needs back to `resources`.
    ///
    /// An atlas outside the flush is dropped if its texture was purged, and
    /// retired (key released, texture back to the scratch pool) if it is
    /// frozen and either empty or at least half invalidated. Returns the
    /// number of atlases removed.
    pub fn release_idle_atlases<B: ResourceBackend>(
        &mut self,
        resources: &mut ResourceCache<B>,
    ) -> usize {
        let idle: Vec<(AtlasId, bool, bool)> = self
            .atlases
            .iter()
            .filter(|atlas| atlas.on_flush_ref_count == 0)
            .map(|atlas| {
                (
                    atlas.id,
                    !resources.contains_unique_key(&atlas.texture_key),
                    atlas.should_retire(),
                )
            })
            .collect();
        let mut removed = 0;
        for (id, lost, retire) in idle {
            if lost {
                log::debug!("texture of atlas {id:?} was purged, dropping its entries");
                self.drop_atlas(id);
                removed += 1;
            } else if retire {
                if let Some(atlas) = self.drop_atlas(id) {
                    log::debug!("retiring atlas {id:?}");
                    resources.unbind_unique_key(&atlas.texture_key);
                }
                removed += 1;
            }
        }
        removed
    }

    /// Takes the masks queued for rasterization, leaving the queue empty.
    ///
    /// Each must be rendered before the GPU samples its atlas.
    pub fn take_pending_renders(&mut self) -> Vec<PendingMaskRender> {
        core::mem::take(&mut self.pending_renders)
    }

    /// Rasterizes every queued mask with `rasterizer`. Returns how many were
    /// rendered.
    pub fn render_pending<R: MaskRasterizer>(&mut self, mut rasterizer: R) -> usize {
        let renders = self.take_pending_renders();
        for render in &renders {
            rasterizer.rasterize(render);
        }
        renders.len()
    }

    /// Drops every entry and atlas, releasing atlas keys in `resources`.
    ///
    /// Fails if a flush is active.
    pub fn clear<B: ResourceBackend>(
        &mut self,
        resources: &mut ResourceCache<B>,
    ) -> Result<(), PathCacheError> {
        if let Some(active) = &self.flush {
            return Err(PathCacheError::FlushInProgress { active: active.id });
        }
        self.clear_entries();
        for atlas in self.atlases.clear() {
            resources.unbind_unique_key(&atlas.texture_key);
        }
        Ok(())
    }

    /// Drops all state without regard for the active flush.
    ///
    /// Used when the device is lost, together with
    /// [`ResourceCache::abandon`].
    pub fn abandon(&mut self) {
        let in_flight = self
            .entries
            .values()
            .filter(|entry| entry.in_flight())
            .count();
        if in_flight > 0 {
            log::warn!("abandoning path cache with {in_flight} entries in flight");
        }
        self.clear_entries();
        self.atlases.clear();
        self.flush = None;
    }

    /// Number of lookups that hit since the last [`clear_stats`](Self::clear_stats).
    #[inline]
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits
    }

    /// Number of lookups that missed since the last [`clear_stats`](Self::clear_stats).
    #[inline]
    pub fn cache_misses(&self) -> u64 {
        self.cache_misses
    }

    /// Resets the hit and miss counters.
    pub fn clear_stats(&mut self) {
        self.cache_hits = 0;
        self.cache_misses = 0;
    }

    /// The timestamp the next use will be stamped with.
    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        self.clock.now()
    }

    /// Moves the cache's clock, forwards or backwards.
    pub fn change_timestamp(&mut self, timestamp: Timestamp) {
        self.clock.set(timestamp);
    }

    /// Entry ids from most to least recently used.
    pub fn lru_entries(&self) -> impl Iterator<Item = EntryId> + '_ {
        core::iter::successors(self.lru_head, move |&id| {
            self.entries.get(id).and_then(|entry| entry.next)
        })
    }

    /// Keys from most to least recently used.
    pub fn lru_keys(&self) -> impl Iterator<Item = &PathCacheKey> + '_ {
        self.lru_entries()
            .filter_map(move |id| self.entries.get(id).map(PathCacheEntry::key))
    }

    /// The entry `id`, if it is still cached.
    pub fn entry(&self, id: EntryId) -> Option<&PathCacheEntry> {
        self.entries.get(id)
    }

    /// How many times the active flush reads entry `id`.
    pub fn peek_on_flush_ref_count(&self, id: EntryId) -> Option<u32> {
        self.entries.get(id).map(PathCacheEntry::on_flush_ref_count)
    }

    /// The highest flush count among the entries of atlas `atlas` that the
    /// active flush reads.
    pub fn peek_atlas_on_flush_ref_count(&self, atlas: AtlasId) -> Option<u32> {
        self.atlases.get(atlas).map(|atlas| atlas.on_flush_ref_count)
    }

    /// A snapshot of atlas `atlas`.
    pub fn atlas_info(&self, atlas: AtlasId) -> Option<AtlasInfo> {
        self.atlases.info(atlas)
    }

    /// Atlas ids, oldest first.
    pub fn atlas_ids(&self) -> impl Iterator<Item = AtlasId> + '_ {
        self.atlases.iter().map(|atlas| atlas.id)
    }

    /// The atlas that accepts allocations.
    #[inline]
    pub fn current_atlas(&self) -> Option<AtlasId> {
        self.atlases.current()
    }

    /// The active flush, if any.
    #[inline]
    pub fn current_flush(&self) -> Option<FlushId> {
        self.flush.as_ref().map(|flush| flush.id)
    }

    /// Number of cached entries, stale ones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn allocate_for_draw<B: ResourceBackend>(
        &mut self,
        resources: &mut ResourceCache<B>,
        width: u16,
        height: u16,
    ) -> Option<AtlasRef> {
        if !self.atlases.fits_atlas(width, height) {
            return None;
        }
        if let Some(current) = self.atlases.current() {
            let lost = self.atlases.get(current).is_some_and(|atlas| {
                atlas.on_flush_ref_count == 0 && !resources.contains_unique_key(&atlas.texture_key)
            });
            if lost {
                log::debug!("texture of open atlas {current:?} was purged");
                self.drop_atlas(current);
            }
        }
        if let Some(atlas_ref) = self.atlases.allocate(width, height) {
            return Some(atlas_ref);
        }
        self.atlases.push(resources)?;
        self.atlases.allocate(width, height)
    }

    fn placed_mask(&self, id: EntryId, translate: (i32, i32)) -> Result<PlacedMask, PathCacheError> {
        let entry = self.entries.get(id).ok_or(PathCacheError::UnknownEntry)?;
        let atlas = entry.atlas_ref.atlas();
        let texture = self
            .atlases
            .get(atlas)
            .and_then(|cached| cached.flush_texture.as_ref())
            .ok_or(PathCacheError::AtlasLost { atlas })?
            .handle();
        let (device_x, device_y) = entry.placement.origin_at(translate);
        Ok(PlacedMask {
            entry: id,
            atlas,
            texture,
            atlas_rect: entry.atlas_ref.content(),
            device_x,
            device_y,
        })
    }

    /// Sets each atlas' flush count to the highest count among the entries
    /// it hosts, dropping the texture reference of atlases left idle.
    fn refresh_atlas_flush_refs(&mut self) {
        let mut highest: HashMap<AtlasId, u32> = HashMap::new();
        for entry in self.entries.values().filter(|entry| entry.in_flight()) {
            let count = highest.entry(entry.atlas_ref.atlas()).or_insert(0);
            *count = (*count).max(entry.on_flush_ref_count);
        }
        for atlas in self.atlases.iter_mut() {
            atlas.on_flush_ref_count = highest.get(&atlas.id).copied().unwrap_or(0);
            if atlas.on_flush_ref_count == 0 {
                atlas.flush_texture = None;
            }
        }
    }

    /// Removes an atlas and every entry it hosts.
    fn drop_atlas(&mut self, atlas: AtlasId) -> Option<CachedAtlas> {
        let hosted: Vec<EntryId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.atlas_ref.atlas() == atlas)
            .map(|(id, _)| id)
            .collect();
        for id in hosted {
            self.remove_entry(id, false);
        }
        self.atlases.remove(atlas)
    }

    /// Removes `id`, returning the bytes its slot occupied.
    fn remove_entry(&mut self, id: EntryId, invalidated: bool) -> usize {
        self.unlink(id);
        let Some(entry) = self.entries.remove(id) else {
            return 0;
        };
        if self.index.get(&entry.key) == Some(&id) {
            self.index.remove(&entry.key);
        }
        let slot = entry.atlas_ref.slot();
        if let Some(atlas) = self.atlases.get_mut(entry.atlas_ref.atlas()) {
            atlas.unhost(slot, invalidated);
        }
        log::trace!("removed path mask entry {id:?}");
        usize::try_from(slot.area()).unwrap_or(usize::MAX)
    }

    fn clear_entries(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.lru_head = None;
        self.lru_tail = None;
        self.pending_renders.clear();
    }

    fn next_timestamp(&mut self) -> Timestamp {
        if self.clock.is_exhausted() {
            self.renumber_timestamps();
        }
        self.clock.advance()
    }

    /// Restamps every entry `0..n`, oldest first. Equal stamps keep their
    /// recency order.
    fn renumber_timestamps(&mut self) {
        let mut order: Vec<EntryId> = self.lru_entries().collect();
        order.reverse();
        order.sort_by_key(|&id| self.entries.get(id).map(|entry| entry.timestamp));
        for (index, id) in order.iter().enumerate() {
            if let Some(entry) = self.entries.get_mut(*id) {
                entry.timestamp = Timestamp(u32::try_from(index).unwrap_or(u32::MAX));
            }
        }
        let next = u32::try_from(order.len()).unwrap_or(u32::MAX);
        log::debug!("path cache timestamps renumbered, clock restarts at {next}");
        self.clock.set(Timestamp(next));
    }

    /// Marks `id` as most recently used.
    fn touch(&mut self, id: EntryId) {
        if self.lru_head == Some(id) {
            return;
        }
        self.unlink(id);
        self.push_front(id);
    }

    fn push_front(&mut self, id: EntryId) {
        let old_head = self.lru_head;
        let Some(entry) = self.entries.get_mut(id) else {
            return;
        };
        entry.prev = None;
        entry.next = old_head;
        if let Some(head) = old_head.and_then(|head| self.entries.get_mut(head)) {
            head.prev = Some(id);
        }
        self.lru_head = Some(id);
        if self.lru_tail.is_none() {
            self.lru_tail = Some(id);
        }
    }

    fn unlink(&mut self, id: EntryId) {
        let Some(entry) = self.entries.get_mut(id) else {
            return;
        };
        let prev = entry.prev.take();
        let next = entry.next.take();
        match prev.and_then(|prev| self.entries.get_mut(prev)) {
            Some(prev) => prev.next = next,
            None => self.lru_head = next,
        }
        match next.and_then(|next| self.entries.get_mut(next)) {
            Some(next) => next.prev = prev,
            None => self.lru_tail = prev,
        }
    }
}

impl Default for PathCache {
    fn default() -> Self {
        Self::new(PathCacheOptions::default())
    }
}

impl Debug for PathCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PathCache")
            .field("entries", &self.entries.len())
            .field("atlases", &self.atlases.iter().count())
            .field("flush", &self.current_flush())
            .field("pending_renders", &self.pending_renders.len())
            .field("cache_hits", &self.cache_hits)
            .field("cache_misses", &self.cache_misses)
            .finish_non_exhaustive()
    }
}

/// Device bounds of `path` under the quantized transform, or `None` if the
/// mask would be empty, non-finite or larger than `max_size`.
#[expect(
    clippy::cast_possible_truncation,
    reason = "bounds are integral after expand() and checked against max_size"
)]
fn mask_bounds(path: &BezPath, transform: &MaskTransform, max_size: u16) -> Option<MaskBounds> {
    let rect = transform
        .quantized()
        .transform_rect_bbox(path.bounding_box())
        .expand();
    if !rect.is_finite() || rect.is_zero_area() {
        return None;
    }
    let (width, height) = (rect.width(), rect.height());
    if width > f64::from(max_size) || height > f64::from(max_size) {
        return None;
    }
    if rect.x0 < f64::from(i32::MIN) || rect.y0 < f64::from(i32::MIN) {
        return None;
    }
    if rect.x0 > f64::from(i32::MAX) || rect.y0 > f64::from(i32::MAX) {
        return None;
    }
    Some(MaskBounds {
        x: rect.x0 as i32,
        y: rect.y0 as i32,
        width: width as u16,
        height: height as u16,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpu_cache::{BackendHandle, ResourceCacheOptions, ResourceDesc};

    #[derive(Default)]
    struct Backend {
        next: u64,
    }

    impl ResourceBackend for Backend {
        fn allocate(&mut self, _desc: &ResourceDesc) -> Option<BackendHandle> {
            self.next += 1;
            Some(BackendHandle(self.next))
        }

        fn destroy(&mut self, _handle: BackendHandle) {}
    }

    fn key(geometry: u64) -> PathCacheKey {
        PathCacheKey::new(
            GeometryId(geometry),
            Fill::NonZero,
            &MaskTransform::new(Affine::IDENTITY),
        )
    }

    fn setup(options: PathCacheOptions) -> (PathCache, ResourceCache<Backend>) {
        let mut resources = ResourceCache::new(Backend::default(), ResourceCacheOptions::default());
        let mut cache = PathCache::new(options);
        cache.push_atlas(&mut resources).unwrap();
        (cache, resources)
    }

    fn insert(cache: &mut PathCache, geometry: u64) -> EntryId {
        let atlas_ref = cache.allocate(4, 4).unwrap();
        cache
            .insert(key(geometry), atlas_ref, MaskPlacement::default())
            .unwrap()
    }

    #[test]
    fn lru_links_follow_use() {
        let (mut cache, _resources) = setup(PathCacheOptions::default());
        let a = insert(&mut cache, 1);
        let b = insert(&mut cache, 2);
        let c = insert(&mut cache, 3);
        assert_eq!(cache.lru_entries().collect::<Vec<_>>(), [c, b, a]);
        assert_eq!(cache.find(&key(1)), Some(a));
        assert_eq!(cache.lru_entries().collect::<Vec<_>>(), [a, c, b]);
        assert_eq!(cache.evict_lru(EvictionTarget::Entries(1)), 1);
        assert_eq!(cache.lru_entries().collect::<Vec<_>>(), [a, c]);
        assert_eq!(cache.entry(a).unwrap().hit_count(), 1);
    }

    #[test]
    fn duplicate_insert_keeps_existing() {
        let (mut cache, _resources) = setup(PathCacheOptions::default());
        let first = insert(&mut cache, 7);
        let duplicate = cache.allocate(4, 4).unwrap();
        let id = cache
            .insert(key(7), duplicate, MaskPlacement::default())
            .unwrap();
        assert_eq!(id, first);
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.allocate(4, 4).map(|atlas_ref| atlas_ref.slot()),
            Some(duplicate.slot()),
            "the duplicate's rectangle is reused"
        );
    }

    #[test]
    fn max_entries_evicts_oldest() {
        let (mut cache, _resources) = setup(PathCacheOptions {
            max_entries: 2,
            ..Default::default()
        });
        insert(&mut cache, 1);
        insert(&mut cache, 2);
        insert(&mut cache, 3);
        assert_eq!(cache.len(), 2);
        assert!(cache.find(&key(1)).is_none());
        assert!(cache.find(&key(3)).is_some());
    }

    #[test]
    fn evict_by_bytes() {
        let (mut cache, _resources) = setup(PathCacheOptions::default());
        for geometry in 0..4 {
            insert(&mut cache, geometry);
        }
        // Each slot is 6x6 with padding.
        assert_eq!(cache.evict_lru(EvictionTarget::Bytes(40)), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn invalidating_idle_geometry_removes_it() {
        let (mut cache, _resources) = setup(PathCacheOptions::default());
        insert(&mut cache, 5);
        insert(&mut cache, 6);
        assert_eq!(cache.invalidate_geometry(GeometryId(5)), 1);
        assert_eq!(cache.len(), 1);
        let atlas = cache.current_atlas().unwrap();
        assert_eq!(cache.atlas_info(atlas).unwrap().invalidated_pixels, 36);
    }

    #[test]
    fn unknown_atlas_is_rejected() {
        let (mut cache, mut resources) = setup(PathCacheOptions::default());
        let atlas_ref = cache.allocate(4, 4).unwrap();
        cache.clear(&mut resources).unwrap();
        assert_eq!(
            cache.insert(key(1), atlas_ref, MaskPlacement::default()),
            Err(PathCacheError::UnknownAtlas)
        );
    }

    #[test]
    fn oversized_mask_is_uncached() {
        let (mut cache, mut resources) = setup(PathCacheOptions {
            max_mask_size: 16,
            ..Default::default()
        });
        let path = crate::kurbo::Rect::new(0.0, 0.0, 40.0, 10.0).to_path(0.1);
        cache.begin_flush().unwrap();
        let draw = cache
            .prepare_draw(&mut resources, &path, Fill::NonZero, Affine::IDENTITY)
            .unwrap();
        assert_eq!(draw, MaskDraw::Uncached);
        assert!(cache.is_empty());
    }
}
