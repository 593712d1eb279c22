//! Immutable vertex/index buffer layout shared by every geometry in a batch
//! group, or by every entity drawing with the same vertex format.
//!
//! Allocators live behind a `Mutex` rather than requiring `&mut BufferLayout`
//! because every caller only ever holds a `BufferLayout` through a shared
//! `Arc` — the same layout backs every entity sharing a vertex format, and
//! the batch engine's registered `Batch` holds its own clone of the `Arc`.

use std::sync::Mutex;

use crate::error::{DrawError, DrawResult};
use crate::gpu::{SharedIndexBuffer, SharedVertexBuffer};
use crate::range_alloc::{Range, RangeAllocator};

/// GPU usage hint forwarded to freshly created buffers. The core never
/// inspects this beyond passing it through to buffer construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Written once (or rarely) and drawn from many times.
    Static,
    /// Rewritten every frame or close to it.
    Dynamic,
    /// Written once, drawn from a handful of times, then discarded.
    Stream,
}

/// One vertex attribute within a stream's layout — location, element format
/// (an opaque backend-defined code) and byte offset within the vertex.
#[derive(Debug, Clone, Copy)]
pub struct VertexAttribute {
    pub shader_location: u32,
    pub format: u32,
    pub offset_bytes: usize,
}

/// The attribute layout for one parallel vertex stream.
#[derive(Debug, Clone)]
pub struct VertexAttributeLayout {
    pub attributes: Vec<VertexAttribute>,
    pub stride_bytes: usize,
}

struct VertexStream {
    layout: VertexAttributeLayout,
    allocator: Mutex<RangeAllocator<SharedVertexBuffer>>,
}

/// Immutable descriptor shared by all geometries in a batch group, or all
/// entities drawing with the same vertex format.
///
/// Invariant (enforced by [`BufferLayout::block_vertex_capacity`] and
/// checked explicitly by the batch engine at `RegisterBatch`): every
/// vertex-stream allocator's block capacity in vertices
/// (`block_size_bytes / vertex_size_bytes`) must be identical across
/// streams for a layout used by the batch engine.
pub struct BufferLayout {
    usage: BufferUsage,
    vertex_streams: Vec<VertexStream>,
    index_allocator: Option<Mutex<RangeAllocator<SharedIndexBuffer>>>,
}

impl std::fmt::Debug for BufferLayout {
    /// The allocators live behind `Mutex`es and carry no `Debug` impl of
    /// their own (their block/free-span internals churn every frame and
    /// aren't useful in a log line); this reports the immutable shape only.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferLayout")
            .field("usage", &self.usage)
            .field("vertex_stream_count", &self.vertex_streams.len())
            .field("is_indexed", &self.index_allocator.is_some())
            .finish()
    }
}

impl BufferLayout {
    /// `vertex_block_sizes_bytes[i]` is the block size used by stream `i`'s
    /// allocator. `index_block_size_bytes` is `Some` iff this layout is
    /// indexed.
    pub fn new(
        usage: BufferUsage,
        vertex_layouts: Vec<VertexAttributeLayout>,
        vertex_block_sizes_bytes: Vec<usize>,
        index_block_size_bytes: Option<usize>,
    ) -> Self {
        assert_eq!(vertex_layouts.len(), vertex_block_sizes_bytes.len());
        let vertex_streams = vertex_layouts
            .into_iter()
            .zip(vertex_block_sizes_bytes)
            .map(|(layout, block_size)| VertexStream {
                layout,
                allocator: Mutex::new(RangeAllocator::new(block_size)),
            })
            .collect();

        Self {
            usage,
            vertex_streams,
            index_allocator: index_block_size_bytes.map(|size| Mutex::new(RangeAllocator::new(size))),
        }
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn vertex_stream_count(&self) -> usize {
        self.vertex_streams.len()
    }

    pub fn vertex_layout(&self, stream: usize) -> &VertexAttributeLayout {
        &self.vertex_streams[stream].layout
    }

    pub fn vertex_size_bytes(&self, stream: usize) -> usize {
        self.vertex_streams[stream].layout.stride_bytes
    }

    fn vertex_allocator(&self, stream: usize) -> std::sync::MutexGuard<'_, RangeAllocator<SharedVertexBuffer>> {
        self.vertex_streams[stream].allocator.lock().expect("vertex allocator poisoned")
    }

    pub fn vertex_block_size(&self, stream: usize) -> usize {
        self.vertex_allocator(stream).block_size()
    }

    pub fn acquire_vertex_range(&self, stream: usize, size_bytes: usize) -> DrawResult<Option<Range<SharedVertexBuffer>>> {
        self.vertex_allocator(stream).acquire_range(size_bytes)
    }

    pub fn create_vertex_block(&self, stream: usize, buffer: SharedVertexBuffer) {
        self.vertex_allocator(stream).create_block(buffer);
    }

    pub fn release_vertex_range(&self, stream: usize, range: &Range<SharedVertexBuffer>) -> bool {
        self.vertex_allocator(stream).release_range(range)
    }

    pub fn is_indexed(&self) -> bool {
        self.index_allocator.is_some()
    }

    fn index_allocator(&self) -> Option<std::sync::MutexGuard<'_, RangeAllocator<SharedIndexBuffer>>> {
        self.index_allocator.as_ref().map(|mutex| mutex.lock().expect("index allocator poisoned"))
    }

    pub fn index_block_size(&self) -> Option<usize> {
        self.index_allocator().map(|allocator| allocator.block_size())
    }

    pub fn acquire_index_range(&self, size_bytes: usize) -> DrawResult<Option<Range<SharedIndexBuffer>>> {
        match self.index_allocator() {
            Some(mut allocator) => allocator.acquire_range(size_bytes),
            None => Ok(None),
        }
    }

    pub fn create_index_block(&self, buffer: SharedIndexBuffer) {
        if let Some(mut allocator) = self.index_allocator() {
            allocator.create_block(buffer);
        }
    }

    pub fn release_index_range(&self, range: &Range<SharedIndexBuffer>) -> bool {
        self.index_allocator().map(|mut allocator| allocator.release_range(range)).unwrap_or(false)
    }

    /// Block capacity in vertices for stream `i`: `block_size_bytes / vertex_size_bytes`.
    pub fn block_vertex_capacity(&self, stream: usize) -> usize {
        self.vertex_block_size(stream) / self.vertex_streams[stream].layout.stride_bytes
    }

    /// Validates that every vertex stream's block capacity in vertices
    /// agrees, as required for a layout used by the batch engine.
    pub fn validate_uniform_block_vertex_capacity(&self) -> DrawResult<()> {
        let mut capacities = (0..self.vertex_stream_count()).map(|i| self.block_vertex_capacity(i));
        let Some(first) = capacities.next() else {
            return Ok(());
        };
        if capacities.all(|c| c == first) {
            Ok(())
        } else {
            Err(DrawError::MismatchingBlockSizes)
        }
    }
}
