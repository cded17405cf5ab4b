// Copyright 2026 the GPU Cache Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! GPU Cache owns GPU-side resources (textures and buffers) and keeps them
//! under a byte budget.
//!
//! Resources are found in one of two ways:
//! - By [`UniqueKey`]: a content-derived fingerprint that names exactly one
//!   resource ("the texture holding content X").
//! - As *scratch*: any unreferenced resource whose [`ResourceDesc`] matches a
//!   request may be handed out again instead of allocating.
//!
//! Callers hold [`ResourceRef`]s. A resource with outstanding refs is never
//! evicted; once the cache holds the only reference it becomes *purgeable* and
//! is reclaimed in least-recently-used order when the budget is exceeded.
//!
//! The cache never talks to a graphics API directly. Allocation and destruction
//! go through a [`ResourceBackend`] supplied by the embedder.
//!
//! ## Features
//!
//! - `std` (enabled by default): Use the standard library.

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

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

mod backend;
mod cache;
mod clock;
mod error;
mod key;
mod resource;

pub use backend::ResourceBackend;
pub use cache::{ResourceCache, ResourceCacheOptions, ResourceCacheStats};
pub use clock::{Clock, Timestamp};
pub use error::CacheError;
pub use key::{KeyDomain, UniqueKey, UniqueKeyBuilder};
pub use resource::{BackendHandle, ResourceDesc, ResourceId, ResourceInfo, ResourceRef, TextureFormat};
