//! Owned CPU-side geometry payloads and their per-channel update flags.

use smallvec::SmallVec;

/// A container of one optional index-buffer payload and one or more
/// vertex-buffer payloads, each an owned byte sequence, plus the flags that
/// tell the draw-call updater which channels changed since the last frame.
///
/// Invariant: `any_updated()` is always the logical OR of the per-vertex-buffer
/// flags and the index-buffer flag. [`Geometry::clear_updates`] clears all of
/// them together.
#[derive(Debug, Clone)]
pub struct Geometry {
    vertex_buffers: SmallVec<[Vec<u8>; 2]>,
    vertex_updated: SmallVec<[bool; 2]>,
    index_buffer: Option<Vec<u8>>,
    index_updated: bool,
    any_updated: bool,
    retain_client_copy: bool,
}

impl Geometry {
    /// `vertex_stream_count` must match the owning [`crate::buffer_layout::BufferLayout`].
    pub fn new(vertex_stream_count: usize, indexed: bool, retain_client_copy: bool) -> Self {
        Self {
            vertex_buffers: std::iter::repeat_with(Vec::new).take(vertex_stream_count).collect(),
            vertex_updated: std::iter::repeat(false).take(vertex_stream_count).collect(),
            index_buffer: if indexed { Some(Vec::new()) } else { None },
            index_updated: false,
            any_updated: false,
            retain_client_copy,
        }
    }

    pub fn vertex_stream_count(&self) -> usize {
        self.vertex_buffers.len()
    }

    pub fn is_indexed(&self) -> bool {
        self.index_buffer.is_some()
    }

    pub fn retain_client_copy(&self) -> bool {
        self.retain_client_copy
    }

    pub fn vertex_buffer(&self, stream: usize) -> &[u8] {
        &self.vertex_buffers[stream]
    }

    pub fn index_buffer(&self) -> Option<&[u8]> {
        self.index_buffer.as_deref()
    }

    /// Replaces a vertex stream's bytes wholesale and flags it (and the
    /// aggregate) as updated.
    pub fn set_vertex_buffer(&mut self, stream: usize, bytes: Vec<u8>) {
        self.vertex_buffers[stream] = bytes;
        self.vertex_updated[stream] = true;
        self.any_updated = true;
    }

    /// Replaces the index buffer's bytes wholesale and flags it (and the
    /// aggregate) as updated. Panics if this geometry is not indexed.
    pub fn set_index_buffer(&mut self, bytes: Vec<u8>) {
        assert!(self.index_buffer.is_some(), "geometry is not indexed");
        self.index_buffer = Some(bytes);
        self.index_updated = true;
        self.any_updated = true;
    }

    /// Clears a vertex stream's bytes in place, for appends during merge.
    pub fn clear_vertex_buffer(&mut self, stream: usize) {
        self.vertex_buffers[stream].clear();
    }

    pub fn extend_vertex_buffer(&mut self, stream: usize, bytes: &[u8]) {
        self.vertex_buffers[stream].extend_from_slice(bytes);
    }

    pub fn clear_index_buffer(&mut self) {
        if let Some(ix) = &mut self.index_buffer {
            ix.clear();
        }
    }

    pub fn extend_index_buffer(&mut self, bytes: &[u8]) {
        if let Some(ix) = &mut self.index_buffer {
            ix.extend_from_slice(bytes);
        }
    }

    pub fn is_vertex_buffer_updated(&self, stream: usize) -> bool {
        self.vertex_updated[stream]
    }

    pub fn is_index_buffer_updated(&self) -> bool {
        self.index_updated
    }

    pub fn is_any_updated(&self) -> bool {
        self.any_updated
    }

    pub fn updated_vertex_streams(&self) -> impl Iterator<Item = usize> + '_ {
        self.vertex_updated
            .iter()
            .enumerate()
            .filter_map(|(i, &updated)| updated.then_some(i))
    }

    /// Marks every vertex stream and the index buffer (if present) as
    /// updated without touching the payload bytes. Used when a fresh
    /// [`crate::draw::GeometryRanges`] slot is created and must force a full
    /// upload regardless of whether the caller happened to mutate bytes this
    /// frame.
    pub fn mark_all_updated(&mut self) {
        for updated in self.vertex_updated.iter_mut() {
            *updated = true;
        }
        if self.index_buffer.is_some() {
            self.index_updated = true;
        }
        self.any_updated = true;
    }

    /// Clears every per-channel flag and the aggregate.
    pub fn clear_updates(&mut self) {
        for updated in self.vertex_updated.iter_mut() {
            *updated = false;
        }
        self.index_updated = false;
        self.any_updated = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_flag_is_or_of_channels() {
        let mut g = Geometry::new(2, true, true);
        assert!(!g.is_any_updated());
        g.set_vertex_buffer(1, vec![1, 2, 3]);
        assert!(g.is_any_updated());
        assert!(g.is_vertex_buffer_updated(1));
        assert!(!g.is_vertex_buffer_updated(0));
    }

    #[test]
    fn clear_updates_clears_every_child() {
        let mut g = Geometry::new(1, true, true);
        g.set_vertex_buffer(0, vec![1]);
        g.set_index_buffer(vec![2]);
        g.clear_updates();
        assert!(!g.is_any_updated());
        assert!(!g.is_vertex_buffer_updated(0));
        assert!(!g.is_index_buffer_updated());
    }
}
