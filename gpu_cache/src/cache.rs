// Copyright 2026 the GPU Cache Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Budgeted resource cache with unique-key lookup and scratch reuse.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt::{Debug, Formatter};
use hashbrown::HashMap;
use slotmap::SlotMap;
use smallvec::SmallVec;

use crate::backend::ResourceBackend;
use crate::clock::{Clock, Timestamp};
use crate::error::CacheError;
use crate::key::UniqueKey;
use crate::resource::{
    BackendHandle, ResourceDesc, ResourceId, ResourceInfo, ResourceRef, ResourceToken,
};

/// Default byte budget (96 MiB).
const DEFAULT_BUDGET_BYTES: usize = 96 * (1 << 20);

/// Default limit on the number of budgeted resources.
const DEFAULT_MAX_RESOURCE_COUNT: usize = 2048;

/// Limits for a [`ResourceCache`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ResourceCacheOptions {
    /// Bytes of budgeted resources the cache tries to stay under.
    ///
    /// The default value is 96 MiB.
    pub budget_bytes: usize,
    /// Number of budgeted resources the cache tries to stay under.
    ///
    /// The default value is 2048.
    pub max_resource_count: usize,
}

impl Default for ResourceCacheOptions {
    fn default() -> Self {
        Self {
            budget_bytes: DEFAULT_BUDGET_BYTES,
            max_resource_count: DEFAULT_MAX_RESOURCE_COUNT,
        }
    }
}

/// Counters describing the current contents of a [`ResourceCache`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceCacheStats {
    /// Number of resources, budgeted or not.
    pub resource_count: usize,
    /// Bytes held by all resources.
    pub total_bytes: usize,
    /// Number of budgeted resources.
    pub budgeted_count: usize,
    /// Bytes held by budgeted resources.
    pub budgeted_bytes: usize,
    /// Bytes held by resources nobody outside the cache references.
    pub purgeable_bytes: usize,
    /// Number of resources with a unique key.
    pub unique_keyed_count: usize,
    /// The current byte budget.
    pub budget_bytes: usize,
}

/// Position of a resource in eviction order: oldest timestamp first, ties
/// broken by creation order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct LruKey {
    timestamp: Timestamp,
    seq: u64,
}

struct ResourceEntry {
    token: Arc<ResourceToken>,
    budgeted: bool,
    unique_key: Option<UniqueKey>,
    timestamp: Timestamp,
    seq: u64,
}

impl ResourceEntry {
    #[inline]
    fn lru_key(&self) -> LruKey {
        LruKey {
            timestamp: self.timestamp,
            seq: self.seq,
        }
    }

    /// The cache's own token is the only reference.
    #[inline]
    fn is_purgeable(&self) -> bool {
        Arc::strong_count(&self.token) == 1
    }

    #[inline]
    fn ref_count(&self) -> usize {
        Arc::strong_count(&self.token) - 1
    }

    #[inline]
    fn byte_size(&self) -> usize {
        self.token.desc.byte_size()
    }

    #[inline]
    fn new_ref(&self) -> ResourceRef {
        ResourceRef {
            token: self.token.clone(),
        }
    }
}

/// Owns GPU resources and keeps budgeted ones under a byte budget.
///
/// Every resource sits in a recency order driven by a logical [`Clock`].
/// Lookups and creation mark a resource as most recently used; eviction walks
/// from the least recently used end and only ever removes resources that are
/// purgeable (no [`ResourceRef`] outside the cache).
///
/// The cache is single-owner. It is `Send` when its backend is, so several
/// threads may share one behind a mutex, but it does no locking of its own.
pub struct ResourceCache<B> {
    backend: B,
    resources: SlotMap<ResourceId, ResourceEntry>,
    unique_index: HashMap<UniqueKey, ResourceId>,
    /// Resources without a unique key, grouped by descriptor.
    scratch_index: HashMap<ResourceDesc, SmallVec<[ResourceId; 4]>>,
    lru: BTreeMap<LruKey, ResourceId>,
    clock: Clock,
    next_seq: u64,
    budget_bytes: usize,
    max_resource_count: usize,
    total_bytes: usize,
    budgeted_bytes: usize,
    budgeted_count: usize,
}

impl<B: ResourceBackend> ResourceCache<B> {
    /// Creates an empty cache allocating through `backend`.
    pub fn new(backend: B, options: ResourceCacheOptions) -> Self {
        Self {
            backend,
            resources: SlotMap::with_key(),
            unique_index: HashMap::new(),
            scratch_index: HashMap::new(),
            lru: BTreeMap::new(),
            clock: Clock::new(),
            next_seq: 0,
            budget_bytes: options.budget_bytes,
            max_resource_count: options.max_resource_count,
            total_bytes: 0,
            budgeted_bytes: 0,
            budgeted_count: 0,
        }
    }

    /// The backend resources are allocated through.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the backend.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Looks up the resource bound to `key`.
    ///
    /// A hit marks the resource as most recently used and returns a new
    /// strong reference. Budget accounting is unchanged.
    pub fn find_by_unique_key(&mut self, key: &UniqueKey) -> Option<ResourceRef> {
        let id = *self.unique_index.get(key)?;
        self.touch(id);
        self.resources.get(id).map(ResourceEntry::new_ref)
    }

    /// Whether some resource is bound to `key`. Does not affect recency.
    pub fn contains_unique_key(&self, key: &UniqueKey) -> bool {
        self.unique_index.contains_key(key)
    }

    /// Binds `key` to `resource`.
    ///
    /// Fails if another resource already holds `key`, or if `resource`
    /// already holds a different key. Binding the same pair again succeeds
    /// without changes other than recency.
    pub fn insert_with_unique_key(
        &mut self,
        resource: &ResourceRef,
        key: UniqueKey,
    ) -> Result<(), CacheError> {
        let id = resource.id();
        let entry = self.resources.get(id).ok_or(CacheError::UnknownResource)?;
        if let Some(&existing) = self.unique_index.get(&key) {
            if existing != id {
                log::debug!(
                    "rejecting unique key {:?} for {id:?}: bound to {existing:?}",
                    key.tag()
                );
                return Err(CacheError::UniqueKeyCollision { existing });
            }
            self.touch(id);
            return Ok(());
        }
        if entry.unique_key.is_some() {
            return Err(CacheError::AlreadyKeyed);
        }
        let desc = entry.token.desc;
        self.remove_from_scratch_index(desc, id);
        if let Some(entry) = self.resources.get_mut(id) {
            entry.unique_key = Some(key.clone());
        }
        self.unique_index.insert(key, id);
        self.touch(id);
        Ok(())
    }

    /// Removes the unique key from `resource`, turning it back into scratch.
    ///
    /// Does nothing if the resource has no key.
    pub fn remove_unique_key(&mut self, resource: &ResourceRef) -> Result<(), CacheError> {
        let id = resource.id();
        let entry = self
            .resources
            .get_mut(id)
            .ok_or(CacheError::UnknownResource)?;
        if let Some(key) = entry.unique_key.take() {
            let desc = entry.token.desc;
            self.unique_index.remove(&key);
            self.scratch_index.entry(desc).or_default().push(id);
        }
        Ok(())
    }

    /// Removes the binding for `key`, wherever it points.
    ///
    /// The resource stays in the cache as scratch. Returns the resource that
    /// held the key.
    pub fn unbind_unique_key(&mut self, key: &UniqueKey) -> Option<ResourceId> {
        let id = self.unique_index.remove(key)?;
        if let Some(entry) = self.resources.get_mut(id) {
            entry.unique_key = None;
            let desc = entry.token.desc;
            self.scratch_index.entry(desc).or_default().push(id);
        }
        Some(id)
    }

    /// Returns a resource matching `desc`, reusing an idle one if possible.
    ///
    /// Reuse considers budgeted, purgeable resources without a unique key.
    /// Otherwise a new budgeted resource is allocated through the backend and
    /// the cache is brought back under budget. Returns `None` if the backend
    /// cannot allocate; the caller decides how to degrade.
    pub fn find_or_create_scratch(&mut self, desc: ResourceDesc) -> Option<ResourceRef> {
        if let Some(id) = self.find_scratch(&desc) {
            log::trace!("reusing scratch resource {id:?} for {desc:?}");
            self.touch(id);
            return self.resources.get(id).map(ResourceEntry::new_ref);
        }
        let resource = self.allocate(desc, true)?;
        self.purge_as_needed();
        Some(resource)
    }

    /// Allocates a resource that does not count against the budget.
    ///
    /// Once it becomes purgeable the next purge pass releases it, unless it
    /// was given a unique key and fits in the budget, in which case it
    /// becomes budgeted.
    pub fn create_unbudgeted(&mut self, desc: ResourceDesc) -> Option<ResourceRef> {
        self.allocate(desc, false)
    }

    /// Moves `resource` into or out of budget accounting.
    pub fn set_budgeted(
        &mut self,
        resource: &ResourceRef,
        budgeted: bool,
    ) -> Result<(), CacheError> {
        let entry = self
            .resources
            .get_mut(resource.id())
            .ok_or(CacheError::UnknownResource)?;
        if entry.budgeted == budgeted {
            return Ok(());
        }
        entry.budgeted = budgeted;
        let size = entry.byte_size();
        if budgeted {
            self.budgeted_bytes += size;
            self.budgeted_count += 1;
            self.purge_as_needed();
        } else {
            self.budgeted_bytes -= size;
            self.budgeted_count -= 1;
        }
        Ok(())
    }

    /// Sets the byte budget and evicts down to it.
    pub fn set_budget(&mut self, bytes: usize) {
        self.budget_bytes = bytes;
        self.purge_as_needed();
    }

    /// Sets both limits and evicts down to them.
    pub fn set_limits(&mut self, max_resource_count: usize, budget_bytes: usize) {
        self.max_resource_count = max_resource_count;
        self.budget_bytes = budget_bytes;
        self.purge_as_needed();
    }

    /// The current byte budget.
    #[inline]
    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }

    /// The current limit on budgeted resources.
    #[inline]
    pub fn max_resource_count(&self) -> usize {
        self.max_resource_count
    }

    /// Bytes held by budgeted resources.
    #[inline]
    pub fn budgeted_bytes(&self) -> usize {
        self.budgeted_bytes
    }

    /// Whether budgeted usage exceeds either limit.
    #[inline]
    pub fn is_over_budget(&self) -> bool {
        self.budgeted_bytes > self.budget_bytes || self.budgeted_count > self.max_resource_count
    }

    /// Evicts purgeable resources, least recently used first, until the cache
    /// is within its limits.
    ///
    /// If every remaining budgeted resource is referenced the cache stays over
    /// budget; that is expected to resolve once the references are dropped.
    ///
    /// Purgeable unbudgeted resources are settled first. One with a unique key
    /// that fits within both limits becomes budgeted; every other one is
    /// released.
    pub fn purge_as_needed(&mut self) {
        let has_unbudgeted = self.resources.len() > self.budgeted_count;
        if !has_unbudgeted && !self.is_over_budget() {
            return;
        }
        let purgeable = self.purgeable_in_lru_order();
        if has_unbudgeted {
            for &id in &purgeable {
                self.settle_unbudgeted(id);
            }
        }
        for id in purgeable {
            if !self.is_over_budget() {
                break;
            }
            if self.resources.get(id).is_some_and(|entry| entry.budgeted) {
                self.remove(id);
            }
        }
        if self.is_over_budget() {
            log::debug!(
                "resource cache over budget: {} bytes / {} resources in use, limits {} / {}",
                self.budgeted_bytes,
                self.budgeted_count,
                self.budget_bytes,
                self.max_resource_count
            );
        }
    }

    /// Evicts purgeable resources in least-recently-used order regardless of
    /// the budget, for example on a memory-pressure signal.
    ///
    /// With `max_bytes`, stops once at least that many bytes were freed.
    /// Returns the number of bytes freed.
    pub fn purge_unlocked_resources(&mut self, max_bytes: Option<usize>) -> usize {
        let mut purged = 0;
        for id in self.purgeable_in_lru_order() {
            if max_bytes.is_some_and(|limit| purged >= limit) {
                break;
            }
            purged += self.remove(id);
        }
        purged
    }

    /// Evicts every purgeable resource last used before `timestamp`.
    pub fn purge_resources_not_used_since(&mut self, timestamp: Timestamp) {
        for id in self.purgeable_in_lru_order() {
            if self
                .resources
                .get(id)
                .is_some_and(|entry| entry.timestamp < timestamp)
            {
                self.remove(id);
            }
        }
    }

    /// Whether `bytes` more budgeted memory would fit once every purgeable
    /// budgeted resource has been evicted.
    pub fn would_fit(&self, bytes: usize) -> bool {
        let locked: usize = self
            .resources
            .values()
            .filter(|entry| entry.budgeted && !entry.is_purgeable())
            .map(ResourceEntry::byte_size)
            .sum();
        locked.saturating_add(bytes) <= self.budget_bytes
    }

    /// The timestamp the next use will be stamped with.
    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        self.clock.now()
    }

    /// Moves the cache's clock, forwards or backwards.
    ///
    /// Recency comparisons are by timestamp, so rewinding makes subsequently
    /// used resources look older than ones stamped before the rewind.
    pub fn change_timestamp(&mut self, timestamp: Timestamp) {
        self.clock.set(timestamp);
    }

    /// Counts resources whose unique key carries `tag`. Diagnostics only.
    pub fn count_unique_keys_with_tag(&self, tag: &str) -> usize {
        self.unique_index
            .keys()
            .filter(|key| key.tag() == tag)
            .count()
    }

    /// Resource ids from least to most recently used.
    pub fn lru_order(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.lru.values().copied()
    }

    /// A snapshot of one resource's state.
    pub fn resource_info(&self, id: ResourceId) -> Option<ResourceInfo> {
        let entry = self.resources.get(id)?;
        Some(ResourceInfo {
            id,
            desc: entry.token.desc,
            byte_size: entry.byte_size(),
            budgeted: entry.budgeted,
            purgeable: entry.is_purgeable(),
            ref_count: entry.ref_count(),
            timestamp: entry.timestamp,
            unique_key: entry.unique_key.clone(),
        })
    }

    /// Whether `id` names a resource in this cache.
    #[inline]
    pub fn contains(&self, id: ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    /// Number of resources in the cache.
    #[inline]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the cache holds no resources.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Current usage counters.
    pub fn stats(&self) -> ResourceCacheStats {
        ResourceCacheStats {
            resource_count: self.resources.len(),
            total_bytes: self.total_bytes,
            budgeted_count: self.budgeted_count,
            budgeted_bytes: self.budgeted_bytes,
            purgeable_bytes: self
                .resources
                .values()
                .filter(|entry| entry.is_purgeable())
                .map(ResourceEntry::byte_size)
                .sum(),
            unique_keyed_count: self.unique_index.len(),
            budget_bytes: self.budget_bytes,
        }
    }

    /// Forgets every resource without calling the backend.
    ///
    /// Used when the device is lost: the GPU objects are already gone, so this
    /// ignores outstanding references. Existing [`ResourceRef`]s stop
    /// resolving.
    pub fn abandon(&mut self) {
        let referenced = self
            .resources
            .values()
            .filter(|entry| !entry.is_purgeable())
            .count();
        if referenced > 0 {
            log::warn!("abandoning resource cache with {referenced} referenced resources");
        }
        self.resources.clear();
        self.unique_index.clear();
        self.scratch_index.clear();
        self.lru.clear();
        self.total_bytes = 0;
        self.budgeted_bytes = 0;
        self.budgeted_count = 0;
    }

    /// Destroys every resource through the backend, referenced or not.
    pub fn release_all(&mut self) {
        let ids: Vec<ResourceId> = self.resources.keys().collect();
        for id in ids {
            self.remove(id);
        }
    }

    fn allocate(&mut self, desc: ResourceDesc, budgeted: bool) -> Option<ResourceRef> {
        let Some(handle) = self.backend.allocate(&desc) else {
            log::debug!("backend failed to allocate {desc:?}");
            return None;
        };
        Some(self.insert_resource(desc, handle, budgeted))
    }

    fn insert_resource(
        &mut self,
        desc: ResourceDesc,
        handle: BackendHandle,
        budgeted: bool,
    ) -> ResourceRef {
        let timestamp = self.next_timestamp();
        let seq = self.next_seq;
        self.next_seq += 1;
        let id = self.resources.insert_with_key(|id| ResourceEntry {
            token: Arc::new(ResourceToken { id, handle, desc }),
            budgeted,
            unique_key: None,
            timestamp,
            seq,
        });
        let size = desc.byte_size();
        self.total_bytes += size;
        if budgeted {
            self.budgeted_bytes += size;
            self.budgeted_count += 1;
        }
        self.scratch_index.entry(desc).or_default().push(id);
        self.lru.insert(LruKey { timestamp, seq }, id);
        ResourceRef {
            token: self.resources[id].token.clone(),
        }
    }

    /// Moves an idle unbudgeted resource into the budget if it is keyed and
    /// fits, otherwise releases it.
    fn settle_unbudgeted(&mut self, id: ResourceId) {
        let Some(entry) = self.resources.get_mut(id) else {
            return;
        };
        if entry.budgeted {
            return;
        }
        let size = entry.byte_size();
        let fits = self.budgeted_bytes.saturating_add(size) <= self.budget_bytes
            && self.budgeted_count < self.max_resource_count;
        if entry.unique_key.is_some() && fits {
            entry.budgeted = true;
            self.budgeted_bytes += size;
            self.budgeted_count += 1;
            log::trace!("idle keyed resource {id:?} moved into the budget");
        } else {
            self.remove(id);
        }
    }

    fn find_scratch(&self, desc: &ResourceDesc) -> Option<ResourceId> {
        self.scratch_index.get(desc)?.iter().copied().find(|&id| {
            self.resources
                .get(id)
                .is_some_and(|entry| entry.budgeted && entry.is_purgeable())
        })
    }

    fn remove_from_scratch_index(&mut self, desc: ResourceDesc, id: ResourceId) {
        if let Some(ids) = self.scratch_index.get_mut(&desc) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.scratch_index.remove(&desc);
            }
        }
    }

    fn purgeable_in_lru_order(&self) -> Vec<ResourceId> {
        self.lru
            .values()
            .copied()
            .filter(|&id| {
                self.resources
                    .get(id)
                    .is_some_and(ResourceEntry::is_purgeable)
            })
            .collect()
    }

    /// Marks `id` as most recently used.
    fn touch(&mut self, id: ResourceId) {
        let timestamp = self.next_timestamp();
        let Some(entry) = self.resources.get_mut(id) else {
            return;
        };
        self.lru.remove(&entry.lru_key());
        entry.timestamp = timestamp;
        self.lru.insert(entry.lru_key(), id);
    }

    fn next_timestamp(&mut self) -> Timestamp {
        if self.clock.is_exhausted() {
            self.renumber_timestamps();
        }
        self.clock.advance()
    }

    /// Restamps every resource `0..n` in current recency order.
    fn renumber_timestamps(&mut self) {
        let order: Vec<ResourceId> = self.lru.values().copied().collect();
        self.lru.clear();
        for (index, id) in order.into_iter().enumerate() {
            let Some(entry) = self.resources.get_mut(id) else {
                continue;
            };
            entry.timestamp = Timestamp(u32::try_from(index).unwrap_or(u32::MAX));
            self.lru.insert(entry.lru_key(), id);
        }
        let next = u32::try_from(self.lru.len()).unwrap_or(u32::MAX);
        log::debug!("resource cache timestamps renumbered, clock restarts at {next}");
        self.clock.set(Timestamp(next));
    }

    /// Destroys `id`, returning the bytes it occupied.
    fn remove(&mut self, id: ResourceId) -> usize {
        let Some(entry) = self.resources.remove(id) else {
            return 0;
        };
        self.lru.remove(&entry.lru_key());
        match &entry.unique_key {
            Some(key) => {
                self.unique_index.remove(key);
            }
            None => self.remove_from_scratch_index(entry.token.desc, id),
        }
        let size = entry.byte_size();
        self.total_bytes -= size;
        if entry.budgeted {
            self.budgeted_bytes -= size;
            self.budgeted_count -= 1;
        }
        log::trace!("destroying resource {id:?} ({size} bytes)");
        self.backend.destroy(entry.token.handle);
        size
    }
}

impl<B> Debug for ResourceCache<B> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("resources", &self.resources.len())
            .field("unique_keys", &self.unique_index.len())
            .field("budgeted_bytes", &self.budgeted_bytes)
            .field("budget_bytes", &self.budget_bytes)
            .field("clock", &self.clock.now())
            .finish_non_exhaustive()
    }
}
