// Copyright 2026 the GPU Cache Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Utility functions and types shared across tests.

mod backend;
mod rasterizer;

pub(crate) use backend::MockBackend;
pub(crate) use rasterizer::RecordingRasterizer;

use gpu_cache::{ResourceCache, ResourceCacheOptions};
use path_cache::kurbo::{BezPath, Rect, Shape};
use path_cache::{PathCache, PathCacheOptions};

/// A resource cache over a [`MockBackend`] with the given byte budget.
pub(crate) fn resource_cache(budget_bytes: usize) -> ResourceCache<MockBackend> {
    ResourceCache::new(
        MockBackend::default(),
        ResourceCacheOptions {
            budget_bytes,
            ..Default::default()
        },
    )
}

/// A path cache with small atlases, so tests can fill them quickly.
pub(crate) fn small_path_cache(atlas_size: u16) -> PathCache {
    PathCache::new(PathCacheOptions {
        atlas_width: atlas_size,
        atlas_height: atlas_size,
        ..Default::default()
    })
}

/// An axis-aligned rectangle as a path.
pub(crate) fn rect_path(x0: f64, y0: f64, x1: f64, y1: f64) -> BezPath {
    Rect::new(x0, y0, x1, y1).to_path(0.1)
}
