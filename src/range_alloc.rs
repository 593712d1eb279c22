//! Block-structured GPU-buffer sub-allocator.
//!
//! A [`RangeAllocator`] owns a set of fixed-size blocks, each wrapping one
//! externally constructed GPU buffer (`B`), and hands out byte ranges within
//! them. The allocator never creates or destroys the GPU buffer itself —
//! that's the caller's job via [`RangeAllocator::create_block`] — it only
//! tracks which bytes of each block are free.
//!
//! `B` is expected to be a cheap-to-clone handle (an `Arc<dyn VertexBuffer>`
//! or similar) since a [`Range`] carries its own copy for draw-call
//! materialisation without needing to go back through the allocator.

use crate::error::{DrawError, DrawResult};

/// A sub-allocated span of bytes within one block's buffer.
#[derive(Debug, Clone)]
pub struct Range<B: Clone> {
    pub block_index: usize,
    pub buffer: B,
    pub start_byte: usize,
    pub size_bytes: usize,
}

/// Sorted, merged list of free byte spans within one block.
struct Block<B> {
    buffer: B,
    free_spans: Vec<(usize, usize)>, // (start, len), sorted by start, non-adjacent
}

impl<B> Block<B> {
    fn new(buffer: B, block_size: usize) -> Self {
        Self {
            buffer,
            free_spans: vec![(0, block_size)],
        }
    }

    fn acquire(&mut self, size: usize) -> Option<usize> {
        let idx = self.free_spans.iter().position(|&(_, len)| len >= size)?;
        let (start, len) = self.free_spans[idx];
        if len == size {
            self.free_spans.remove(idx);
        } else {
            self.free_spans[idx] = (start + size, len - size);
        }
        Some(start)
    }

    /// Merges `(start, size)` back into the free list. Returns true if the
    /// block is now entirely free.
    fn release(&mut self, start: usize, size: usize, block_size: usize) -> bool {
        let insert_at = self
            .free_spans
            .iter()
            .position(|&(s, _)| s > start)
            .unwrap_or(self.free_spans.len());
        self.free_spans.insert(insert_at, (start, size));

        // Merge with the following neighbour first, then the preceding one,
        // so indices stay valid.
        if insert_at + 1 < self.free_spans.len() {
            let (s, l) = self.free_spans[insert_at];
            let (ns, nl) = self.free_spans[insert_at + 1];
            if s + l == ns {
                self.free_spans[insert_at] = (s, l + nl);
                self.free_spans.remove(insert_at + 1);
            }
        }
        if insert_at > 0 {
            let (ps, pl) = self.free_spans[insert_at - 1];
            let (s, l) = self.free_spans[insert_at];
            if ps + pl == s {
                self.free_spans[insert_at - 1] = (ps, pl + l);
                self.free_spans.remove(insert_at);
            }
        }

        self.free_spans.len() == 1 && self.free_spans[0] == (0, block_size)
    }
}

/// Sub-allocates fixed-size byte ranges out of a growable set of
/// same-sized blocks.
pub struct RangeAllocator<B: Clone> {
    block_size: usize,
    blocks: Vec<Block<B>>,
}

impl<B: Clone> RangeAllocator<B> {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            blocks: Vec::new(),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_buffer(&self, block_index: usize) -> &B {
        &self.blocks[block_index].buffer
    }

    /// Attempts to carve `size_bytes` out of an existing block.
    ///
    /// Returns `Ok(None)` when every block is full — the caller should then
    /// construct a new GPU buffer, hand it to [`Self::create_block`], and
    /// retry. Returns `Err` if `size_bytes` could never fit in any block
    /// regardless of how many are created.
    pub fn acquire_range(&mut self, size_bytes: usize) -> DrawResult<Option<Range<B>>> {
        if size_bytes > self.block_size {
            return Err(DrawError::CapacityExceeded {
                requested: size_bytes,
                block_size: self.block_size,
            });
        }
        for (block_index, block) in self.blocks.iter_mut().enumerate() {
            if let Some(start_byte) = block.acquire(size_bytes) {
                return Ok(Some(Range {
                    block_index,
                    buffer: block.buffer.clone(),
                    start_byte,
                    size_bytes,
                }));
            }
        }
        Ok(None)
    }

    /// Appends a fresh block wrapping `buffer`. The caller is responsible
    /// for uploading block-sized zero-init to `buffer` so the backing GPU
    /// storage is sized to the whole block before any range within it is
    /// used.
    pub fn create_block(&mut self, buffer: B) {
        self.blocks.push(Block::new(buffer, self.block_size));
    }

    /// Merges `range` back into its block's free list. Returns whether the
    /// owning block is now entirely free.
    pub fn release_range(&mut self, range: &Range<B>) -> bool {
        let block = &mut self.blocks[range.block_index];
        block.release(range.start_byte, range.size_bytes, self.block_size)
    }
}
