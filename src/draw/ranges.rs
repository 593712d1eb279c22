//! Per-entity record of the GPU buffer ranges currently backing its
//! geometry.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::buffer_layout::BufferLayout;
use crate::gpu::{SharedIndexBuffer, SharedVertexBuffer};
use crate::range_alloc::Range;

/// Tracks, per entity, whether a [`BufferLayout`] has been pinned for it
/// and which vertex/index ranges are currently valid. `buffer_layout` being
/// `None` means "this entity is not currently tracked" — the state a
/// removed entity is reset back to.
#[derive(Debug, Clone)]
pub struct GeometryRanges {
    buffer_layout: Option<Arc<BufferLayout>>,
    vx_ranges: SmallVec<[Option<Range<SharedVertexBuffer>>; 2]>,
    ix_range: Option<Range<SharedIndexBuffer>>,
}

impl GeometryRanges {
    pub fn invalid() -> Self {
        Self {
            buffer_layout: None,
            vx_ranges: SmallVec::new(),
            ix_range: None,
        }
    }

    /// Pins `buffer_layout` and sizes the vertex-range list to its stream
    /// count, all ranges starting out unallocated.
    pub fn pinned(buffer_layout: Arc<BufferLayout>) -> Self {
        let stream_count = buffer_layout.vertex_stream_count();
        Self {
            vx_ranges: std::iter::repeat(None).take(stream_count).collect(),
            ix_range: None,
            buffer_layout: Some(buffer_layout),
        }
    }

    pub fn buffer_layout(&self) -> Option<&Arc<BufferLayout>> {
        self.buffer_layout.as_ref()
    }

    pub fn vx_range(&self, stream: usize) -> Option<&Range<SharedVertexBuffer>> {
        self.vx_ranges[stream].as_ref()
    }

    pub fn take_vx_range(&mut self, stream: usize) -> Option<Range<SharedVertexBuffer>> {
        self.vx_ranges[stream].take()
    }

    pub fn set_vx_range(&mut self, stream: usize, range: Range<SharedVertexBuffer>) {
        self.vx_ranges[stream] = Some(range);
    }

    pub fn ix_range(&self) -> Option<&Range<SharedIndexBuffer>> {
        self.ix_range.as_ref()
    }

    pub fn take_ix_range(&mut self) -> Option<Range<SharedIndexBuffer>> {
        self.ix_range.take()
    }

    pub fn set_ix_range(&mut self, range: Range<SharedIndexBuffer>) {
        self.ix_range = Some(range);
    }

    /// All vertex-stream ranges are allocated, and the index range is
    /// allocated whenever the layout is indexed.
    pub fn is_geometry_valid(&self) -> bool {
        match &self.buffer_layout {
            Some(layout) => self.vx_ranges.iter().all(Option::is_some) && (!layout.is_indexed() || self.ix_range.is_some()),
            None => false,
        }
    }

    pub fn vx_ranges(&self) -> &[Option<Range<SharedVertexBuffer>>] {
        &self.vx_ranges
    }

    /// Releases every range held back to its allocator. Consumes `self`
    /// since the record is meaningless afterward — callers replace the
    /// entry with [`GeometryRanges::invalid`] or drop it.
    pub fn release_all(self) {
        let Some(layout) = &self.buffer_layout else {
            return;
        };
        for (stream, range) in self.vx_ranges.iter().enumerate() {
            if let Some(range) = range {
                layout.release_vertex_range(stream, range);
            }
        }
        if let Some(range) = &self.ix_range {
            layout.release_index_range(range);
        }
    }
}
