// Copyright 2026 the GPU Cache Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Path Cache reuses rasterized path coverage masks across draws.
//!
//! Anti-aliased path masks are packed into atlas textures that live in a
//! [`gpu_cache::ResourceCache`]. The [`PathCache`]:
//! - Fingerprints each draw with a [`PathCacheKey`] (geometry, fill rule and
//!   the parts of the transform that change the mask's pixels)
//! - Packs new masks into the open atlas with a shelf allocator, opening a new
//!   atlas texture when the current one is full
//! - Tracks which entries and atlases the current flush reads, so nothing in
//!   flight on the GPU is evicted or overwritten
//! - Evicts idle entries in least-recently-used order
//!
//! A typical frame:
//!
//! 1. [`PathCache::begin_flush`]
//! 2. [`PathCache::prepare_draw`] for every path, drawing from the returned
//!    [`MaskDraw`]
//! 3. [`PathCache::render_pending`] to rasterize the misses into their atlases
//! 4. Submit the GPU work
//! 5. [`PathCache::end_flush`] once the GPU reports that work as retired
//!
//! ## Features
//!
//! - `std` (enabled by default): Get floating point functions from the standard library
//!   (likely using your target's libc).
//! - `libm`: Use floating point implementations from [libm].
//!
//! At least one of `std` and `libm` is required; `std` overrides `libm`.
//!
//! [libm]: https://crates.io/crates/libm

// LINEBENDER LINT SET - lib.rs - v3
// See https://linebender.org/wiki/canonical-lints/
// These lints shouldn't apply to examples or tests.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
// These lints shouldn't apply to examples.
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![cfg_attr(docsrs, feature(doc_cfg))]
#![no_std]

#[cfg(not(any(feature = "std", feature = "libm")))]
compile_error!("path_cache requires either the `std` or `libm` feature to be enabled");

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub use peniko;
pub use peniko::kurbo;

mod atlas;
mod cache;
mod entry;
mod error;
mod flush;
mod key;

pub use atlas::{AtlasId, AtlasInfo, AtlasRect, AtlasRef, MASK_PADDING};
pub use cache::{EvictionTarget, PathCache, PathCacheOptions};
pub use entry::{EntryId, MaskBounds, MaskPlacement, PathCacheEntry};
pub use error::PathCacheError;
pub use flush::{FlushId, MaskDraw, MaskRasterizer, PendingMaskRender, PlacedMask};
pub use key::{GeometryId, MaskTransform, PathCacheKey, TransformClass, SUBPIXEL_BUCKETS};

/// Tag carried by the unique keys of atlas textures.
pub const ATLAS_KEY_TAG: &str = "path_mask_atlas";
