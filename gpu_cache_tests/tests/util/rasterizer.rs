// Copyright 2026 the GPU Cache Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use path_cache::{MaskRasterizer, PendingMaskRender};

/// Records every render it is asked to perform.
#[derive(Debug, Default)]
pub(crate) struct RecordingRasterizer {
    pub(crate) renders: Vec<PendingMaskRender>,
}

impl MaskRasterizer for RecordingRasterizer {
    fn rasterize(&mut self, render: &PendingMaskRender) {
        self.renders.push(render.clone());
    }
}
