//! The per-entity record the render stages actually draw from.

use smallvec::SmallVec;

use crate::gpu::{SharedIndexBuffer, SharedVertexBuffer};
use crate::range_alloc::Range;
use crate::render_data::Transparency;
use crate::sort_key::SortKey;
use crate::uniform::UniformList;

/// Ready-to-draw state for one entity. `valid == false` means the entity
/// has no renderable geometry right now (just removed, or not yet synced)
/// and render stages must skip it.
#[derive(Debug, Clone)]
pub struct DrawCall {
    pub valid: bool,
    pub vx_ranges: SmallVec<[Option<Range<SharedVertexBuffer>>; 2]>,
    /// Bytes per vertex for each stream, mirrored from the entity's
    /// `BufferLayout` so a non-indexed draw can derive a vertex count from
    /// stream 0's range without the render stage needing the layout itself.
    pub vx_sizes_bytes: SmallVec<[usize; 2]>,
    pub ix_range: Option<Range<SharedIndexBuffer>>,
    pub uniforms: Option<UniformList>,
    pub sort_key: SortKey,
    pub transparency: Transparency,
}

impl DrawCall {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            vx_ranges: SmallVec::new(),
            vx_sizes_bytes: SmallVec::new(),
            ix_range: None,
            uniforms: None,
            sort_key: SortKey::new(),
            transparency: Transparency::Opaque,
        }
    }

    pub fn reset_to_invalid(&mut self) {
        self.valid = false;
        self.vx_ranges.clear();
        self.ix_range = None;
        self.uniforms = None;
    }
}
