// Copyright 2026 the GPU Cache Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::HashSet;

use gpu_cache::{BackendHandle, ResourceBackend, ResourceDesc};

/// A backend that hands out sequential handles and records what it destroys.
#[derive(Debug, Default)]
pub(crate) struct MockBackend {
    next: u64,
    /// Handles allocated and not yet destroyed.
    pub(crate) live: HashSet<BackendHandle>,
    /// Handles in the order they were destroyed.
    pub(crate) destroyed: Vec<BackendHandle>,
    /// Total number of successful allocations.
    pub(crate) allocations: usize,
    /// When set, every allocation fails.
    pub(crate) fail: bool,
}

impl ResourceBackend for MockBackend {
    fn allocate(&mut self, _desc: &ResourceDesc) -> Option<BackendHandle> {
        if self.fail {
            return None;
        }
        self.next += 1;
        self.allocations += 1;
        let handle = BackendHandle(self.next);
        self.live.insert(handle);
        Some(handle)
    }

    fn destroy(&mut self, handle: BackendHandle) {
        assert!(
            self.live.remove(&handle),
            "destroyed {handle:?} which is not live"
        );
        self.destroyed.push(handle);
    }
}
