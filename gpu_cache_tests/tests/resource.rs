// Copyright 2026 the GPU Cache Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Resource cache tests.

use gpu_cache::{CacheError, ResourceDesc, TextureFormat, Timestamp, UniqueKey};

use crate::util::resource_cache;

#[test]
fn resource_budget_evicts_least_recent() {
    let mut cache = resource_cache(1000);
    let refs: Vec<_> = (0..3)
        .map(|_| {
            cache
                .find_or_create_scratch(ResourceDesc::buffer(400))
                .unwrap()
        })
        .collect();
    let ids: Vec<_> = refs.iter().map(|r| r.id()).collect();
    assert_eq!(cache.budgeted_bytes(), 1200, "referenced resources are kept");
    drop(refs);

    cache.purge_as_needed();
    assert_eq!(cache.budgeted_bytes(), 800);
    assert!(!cache.contains(ids[0]));
    assert!(cache.contains(ids[1]));
    assert!(cache.contains(ids[2]));
    assert_eq!(cache.backend().destroyed.len(), 1);
}

#[test]
fn resource_budget_tolerates_referenced_overflow() {
    let mut cache = resource_cache(500);
    let a = cache
        .find_or_create_scratch(ResourceDesc::buffer(400))
        .unwrap();
    let b = cache
        .find_or_create_scratch(ResourceDesc::buffer(400))
        .unwrap();
    cache.purge_as_needed();
    assert!(cache.is_over_budget());
    for id in cache.lru_order() {
        assert!(cache.resource_info(id).unwrap().ref_count > 0);
    }

    drop(b);
    cache.purge_as_needed();
    assert!(!cache.is_over_budget());
    assert_eq!(cache.len(), 1);
    assert!(cache.contains(a.id()));
}

#[test]
fn resource_unique_key_is_exclusive() {
    let mut cache = resource_cache(1 << 20);
    let domain = UniqueKey::generate_domain();
    let key = UniqueKey::builder(domain, "exclusive").push(7).build();
    let a = cache
        .find_or_create_scratch(ResourceDesc::buffer(16))
        .unwrap();
    let b = cache
        .find_or_create_scratch(ResourceDesc::buffer(16))
        .unwrap();

    cache.insert_with_unique_key(&a, key.clone()).unwrap();
    assert_eq!(
        cache.insert_with_unique_key(&b, key.clone()),
        Err(CacheError::UniqueKeyCollision { existing: a.id() })
    );
    assert_eq!(
        cache.insert_with_unique_key(&a, key.clone()),
        Ok(()),
        "re-registering the same pair is a no-op"
    );
    let other = UniqueKey::builder(domain, "exclusive").push(8).build();
    assert_eq!(
        cache.insert_with_unique_key(&a, other),
        Err(CacheError::AlreadyKeyed)
    );
    assert_eq!(cache.find_by_unique_key(&key), Some(a.clone()));
    assert_eq!(cache.count_unique_keys_with_tag("exclusive"), 1);
    assert_eq!(cache.stats().unique_keyed_count, 1);
}

#[test]
fn resource_unique_key_survives_release() {
    let mut cache = resource_cache(1 << 20);
    let key = UniqueKey::builder(UniqueKey::generate_domain(), "kept")
        .push_u64(0xdead_beef_0000_0001)
        .build();
    let desc = ResourceDesc::texture(8, 8, TextureFormat::Rgba8);
    let texture = cache.find_or_create_scratch(desc).unwrap();
    let id = texture.id();
    cache.insert_with_unique_key(&texture, key.clone()).unwrap();
    drop(texture);

    let scratch = cache.find_or_create_scratch(desc).unwrap();
    assert_ne!(scratch.id(), id, "keyed resources are not handed out as scratch");
    assert_eq!(cache.find_by_unique_key(&key).map(|r| r.id()), Some(id));
}

#[test]
fn resource_removed_key_returns_to_scratch() {
    let mut cache = resource_cache(1 << 20);
    let key = UniqueKey::builder(UniqueKey::generate_domain(), "removed")
        .push(1)
        .build();
    let desc = ResourceDesc::buffer(64);
    let resource = cache.find_or_create_scratch(desc).unwrap();
    let id = resource.id();
    cache.insert_with_unique_key(&resource, key.clone()).unwrap();
    cache.remove_unique_key(&resource).unwrap();
    assert!(!cache.contains_unique_key(&key));
    drop(resource);

    let reused = cache.find_or_create_scratch(desc).unwrap();
    assert_eq!(reused.id(), id);
    assert_eq!(cache.backend().allocations, 1);
}

#[test]
fn resource_unbind_by_key() {
    let mut cache = resource_cache(1 << 20);
    let key = UniqueKey::builder(UniqueKey::generate_domain(), "unbind")
        .push(3)
        .build();
    let resource = cache
        .find_or_create_scratch(ResourceDesc::buffer(32))
        .unwrap();
    cache.insert_with_unique_key(&resource, key.clone()).unwrap();
    assert_eq!(cache.unbind_unique_key(&key), Some(resource.id()));
    assert_eq!(cache.unbind_unique_key(&key), None);
    assert!(cache.resource_info(resource.id()).unwrap().unique_key.is_none());
}

#[test]
fn resource_lookup_refreshes_recency() {
    let mut cache = resource_cache(1 << 20);
    let domain = UniqueKey::generate_domain();
    let key = UniqueKey::builder(domain, "recent").push(0).build();
    let refs: Vec<_> = (0..3)
        .map(|_| cache.find_or_create_scratch(ResourceDesc::buffer(100)).unwrap())
        .collect();
    let ids: Vec<_> = refs.iter().map(|r| r.id()).collect();
    cache.insert_with_unique_key(&refs[0], key.clone()).unwrap();
    drop(refs);
    assert!(cache.find_by_unique_key(&key).is_some());
    assert_eq!(cache.lru_order().last(), Some(ids[0]));

    cache.set_budget(200);
    assert!(!cache.contains(ids[1]), "least recently used goes first");
    assert!(cache.contains(ids[0]));
    assert!(cache.contains(ids[2]));
}

#[test]
fn resource_unbudgeted_moves_into_budget() {
    let mut cache = resource_cache(1 << 20);
    let resource = cache
        .create_unbudgeted(ResourceDesc::buffer(300))
        .unwrap();
    assert_eq!(cache.budgeted_bytes(), 0);
    assert_eq!(cache.stats().total_bytes, 300);
    cache.set_budgeted(&resource, true).unwrap();
    assert_eq!(cache.budgeted_bytes(), 300);
    cache.set_budgeted(&resource, false).unwrap();
    assert_eq!(cache.budgeted_bytes(), 0);
    assert!(!cache.resource_info(resource.id()).unwrap().budgeted);
}

#[test]
fn resource_idle_keyed_unbudgeted_is_released_over_budget() {
    let mut cache = resource_cache(1 << 20);
    let key = UniqueKey::builder(UniqueKey::generate_domain(), "unbudgeted")
        .push(1)
        .build();
    let resource = cache
        .create_unbudgeted(ResourceDesc::buffer(4000))
        .unwrap();
    cache.insert_with_unique_key(&resource, key.clone()).unwrap();
    drop(resource);

    cache.set_budget(0);
    assert!(cache.is_empty());
    assert_eq!(cache.stats().total_bytes, 0);
    assert!(!cache.contains_unique_key(&key));
    assert_eq!(cache.backend().destroyed.len(), 1);
}

#[test]
fn resource_idle_keyed_unbudgeted_joins_budget_when_it_fits() {
    let mut cache = resource_cache(1 << 20);
    let key = UniqueKey::builder(UniqueKey::generate_domain(), "unbudgeted")
        .push(2)
        .build();
    let resource = cache
        .create_unbudgeted(ResourceDesc::buffer(4000))
        .unwrap();
    let id = resource.id();
    cache.insert_with_unique_key(&resource, key.clone()).unwrap();
    drop(resource);

    cache.purge_as_needed();
    assert!(cache.resource_info(id).unwrap().budgeted);
    assert_eq!(cache.budgeted_bytes(), 4000);
    assert_eq!(cache.find_by_unique_key(&key).map(|r| r.id()), Some(id));

    cache.set_budget(0);
    assert!(cache.is_empty(), "once budgeted it is evicted like any other");
}

#[test]
fn resource_rewound_clock_breaks_ties_by_insertion() {
    let mut cache = resource_cache(1 << 20);
    let first = cache
        .find_or_create_scratch(ResourceDesc::buffer(100))
        .unwrap();
    cache.change_timestamp(Timestamp(0));
    let second = cache
        .find_or_create_scratch(ResourceDesc::buffer(100))
        .unwrap();
    let (first_id, second_id) = (first.id(), second.id());
    assert_eq!(
        cache.resource_info(first_id).unwrap().timestamp,
        cache.resource_info(second_id).unwrap().timestamp
    );
    assert_eq!(cache.lru_order().collect::<Vec<_>>(), [first_id, second_id]);
    drop((first, second));

    cache.set_budget(100);
    assert!(!cache.contains(first_id), "earlier insertion goes first on a tie");
    assert!(cache.contains(second_id));
}

#[test]
fn resource_rewound_clock_makes_later_use_older() {
    let mut cache = resource_cache(1 << 20);
    let domain = UniqueKey::generate_domain();
    let a = cache
        .find_or_create_scratch(ResourceDesc::buffer(100))
        .unwrap();
    let b = cache
        .find_or_create_scratch(ResourceDesc::buffer(100))
        .unwrap();
    cache.change_timestamp(Timestamp(10));
    cache
        .insert_with_unique_key(&a, UniqueKey::builder(domain, "rewound").push(0).build())
        .unwrap();
    cache.change_timestamp(Timestamp(5));
    cache
        .insert_with_unique_key(&b, UniqueKey::builder(domain, "rewound").push(1).build())
        .unwrap();
    let (a_id, b_id) = (a.id(), b.id());
    assert_eq!(cache.lru_order().collect::<Vec<_>>(), [b_id, a_id]);
    drop((a, b));

    cache.set_budget(100);
    assert!(!cache.contains(b_id), "b was stamped after the rewind");
    assert!(cache.contains(a_id));
}

#[test]
fn resource_purge_by_age() {
    let mut cache = resource_cache(1 << 20);
    let old_a = cache
        .find_or_create_scratch(ResourceDesc::buffer(10))
        .unwrap()
        .id();
    let old_b = cache
        .find_or_create_scratch(ResourceDesc::buffer(20))
        .unwrap()
        .id();
    let cutoff = cache.timestamp();
    let young = cache
        .find_or_create_scratch(ResourceDesc::buffer(30))
        .unwrap()
        .id();

    cache.purge_resources_not_used_since(cutoff);
    assert!(!cache.contains(old_a));
    assert!(!cache.contains(old_b));
    assert!(cache.contains(young));
}

#[test]
fn resource_forced_purge_respects_cap() {
    let mut cache = resource_cache(1 << 20);
    let refs: Vec<_> = (0..3)
        .map(|_| cache.find_or_create_scratch(ResourceDesc::buffer(100)).unwrap())
        .collect();
    drop(refs);
    cache.purge_as_needed();
    assert_eq!(cache.len(), 3, "within budget nothing is evicted");

    assert_eq!(cache.purge_unlocked_resources(Some(150)), 200);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.purge_unlocked_resources(None), 100);
    assert!(cache.is_empty());
}

#[test]
fn resource_would_fit_ignores_purgeable() {
    let mut cache = resource_cache(1000);
    let held = cache
        .find_or_create_scratch(ResourceDesc::buffer(600))
        .unwrap();
    drop(
        cache
            .find_or_create_scratch(ResourceDesc::buffer(300))
            .unwrap(),
    );
    assert!(cache.would_fit(400));
    assert!(!cache.would_fit(401));
    let stats = cache.stats();
    assert_eq!(stats.purgeable_bytes, 300);
    assert_eq!(stats.budgeted_bytes, 900);
    drop(held);
}

#[test]
fn resource_backend_failure_is_none() {
    let mut cache = resource_cache(1 << 20);
    cache.backend_mut().fail = true;
    assert!(cache
        .find_or_create_scratch(ResourceDesc::buffer(8))
        .is_none());
    assert!(cache.create_unbudgeted(ResourceDesc::buffer(8)).is_none());
    assert!(cache.is_empty());
}

#[test]
fn resource_abandon_skips_backend() {
    let mut cache = resource_cache(1 << 20);
    let held = cache
        .find_or_create_scratch(ResourceDesc::buffer(64))
        .unwrap();
    drop(
        cache
            .find_or_create_scratch(ResourceDesc::buffer(32))
            .unwrap(),
    );
    cache.abandon();
    assert!(cache.is_empty());
    assert!(cache.resource_info(held.id()).is_none());
    assert!(cache.backend().destroyed.is_empty());
    assert_eq!(cache.backend().live.len(), 2);
    assert_eq!(cache.budgeted_bytes(), 0);
}

#[test]
fn resource_release_all_destroys_everything() {
    let mut cache = resource_cache(1 << 20);
    let held = cache
        .find_or_create_scratch(ResourceDesc::buffer(64))
        .unwrap();
    cache.release_all();
    assert!(cache.is_empty());
    assert!(cache.backend().live.is_empty());
    assert_eq!(cache.backend().destroyed, [held.handle()]);
}
