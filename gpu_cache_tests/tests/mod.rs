// Copyright 2026 the GPU Cache Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! This crate contains the integration test suite for `gpu_cache` and `path_cache`.
//!
//! - The `util` module contains the mock backend and rasterizer shared by the tests.
//! - We do not use the default Rust test harness, but instead use this `mod.rs` file as the
//!   entry point to run all other tests, so shared utilities live in one place.
//! - Put new tests into the module matching their topic. For test naming, put the topic
//!   first: `flush_end_releases_refs` rather than `releases_refs_on_flush_end`.

#![allow(missing_docs, reason = "we don't need docs for testing")]
#![allow(clippy::missing_assert_message, reason = "not critical for testing")]

mod resource;
mod util;
