//! `DrawCallUpdater`: diffs the renderable-entity population frame to
//! frame, keeps each entity's [`GeometryRanges`] in sync with its
//! `RenderData` geometry, and materialises the shared `DrawCall` list.

use std::collections::HashMap;
use std::sync::Arc;

use crate::buffer_layout::BufferLayout;
use crate::diff::sorted_set_difference;
use crate::ecs::{ComponentStore, EntityId};
use crate::error::{DrawError, DrawResult};
use crate::geometry::Geometry;
use crate::gpu::{BufferFactory, SharedIndexBuffer, SharedVertexBuffer};
use crate::range_alloc::Range;
use crate::render_data::RenderData;

use super::draw_call::DrawCall;
use super::ranges::GeometryRanges;

fn has_nonempty_updated_bytes(geometry: &Geometry) -> bool {
    geometry.updated_vertex_streams().any(|stream| !geometry.vertex_buffer(stream).is_empty())
        || (geometry.is_index_buffer_updated() && geometry.index_buffer().is_some_and(|bytes| !bytes.is_empty()))
}

fn acquire_vertex_range(
    layout: &BufferLayout,
    factory: &dyn BufferFactory,
    stream: usize,
    size_bytes: usize,
    buffers_to_init: &mut Vec<SharedVertexBuffer>,
) -> DrawResult<Range<SharedVertexBuffer>> {
    if let Some(range) = layout.acquire_vertex_range(stream, size_bytes)? {
        return Ok(range);
    }
    let block_size = layout.vertex_block_size(stream);
    let buffer = factory.create_vertex_buffer(layout.usage(), layout.vertex_layout(stream), block_size);
    buffer.write(0, &vec![0u8; block_size], false);
    layout.create_vertex_block(stream, buffer.clone());
    buffers_to_init.push(buffer);
    Ok(layout
        .acquire_vertex_range(stream, size_bytes)?
        .expect("a freshly created block satisfies a request already validated against block size"))
}

fn acquire_index_range(
    layout: &BufferLayout,
    factory: &dyn BufferFactory,
    size_bytes: usize,
    buffers_to_init: &mut Vec<SharedIndexBuffer>,
) -> DrawResult<Range<SharedIndexBuffer>> {
    if let Some(range) = layout.acquire_index_range(size_bytes)? {
        return Ok(range);
    }
    let block_size = layout
        .index_block_size()
        .ok_or(DrawError::CapacityExceeded { requested: size_bytes, block_size: 0 })?;
    let buffer = factory.create_index_buffer(layout.usage(), block_size);
    buffer.write(0, &vec![0u8; block_size], false);
    layout.create_index_block(buffer.clone());
    buffers_to_init.push(buffer);
    Ok(layout
        .acquire_index_range(size_bytes)?
        .expect("a freshly created block satisfies a request already validated against block size"))
}

/// Maintains the entity-id → GPU-range mapping and the shared `DrawCall`
/// list. `Update` runs on the update thread; `Sync` runs on the render
/// thread once the caller has serialised against any concurrent `Update`.
pub struct DrawCallUpdater {
    factory: Arc<dyn BufferFactory>,
    list_prev: Vec<(u64, EntityId)>,
    geometry_ranges: HashMap<EntityId, GeometryRanges>,
    buffers_to_init_vx: Vec<SharedVertexBuffer>,
    buffers_to_init_ix: Vec<SharedIndexBuffer>,
    buffers_to_sync_vx: Vec<SharedVertexBuffer>,
    buffers_to_sync_ix: Vec<SharedIndexBuffer>,
    removed_this_update: Vec<EntityId>,
    updated_this_update: Vec<EntityId>,
    added_this_update: Vec<EntityId>,
}

impl DrawCallUpdater {
    pub fn new(factory: Arc<dyn BufferFactory>) -> Self {
        Self {
            factory,
            list_prev: Vec::new(),
            geometry_ranges: HashMap::new(),
            buffers_to_init_vx: Vec::new(),
            buffers_to_init_ix: Vec::new(),
            buffers_to_sync_vx: Vec::new(),
            buffers_to_sync_ix: Vec::new(),
            removed_this_update: Vec::new(),
            updated_this_update: Vec::new(),
            added_this_update: Vec::new(),
        }
    }

    /// Entities newly tracked as of this `update` call — the render
    /// orchestrator uses this to seed a fresh `DrawCall`'s uniform list
    /// pointer, since an added entity may not produce an `updated_this_update`
    /// entry of its own if its geometry is still empty.
    pub fn added_this_update(&self) -> &[EntityId] {
        &self.added_this_update
    }

    pub fn buffers_needing_init_vx(&self) -> &[SharedVertexBuffer] {
        &self.buffers_to_init_vx
    }

    pub fn buffers_needing_init_ix(&self) -> &[SharedIndexBuffer] {
        &self.buffers_to_init_ix
    }

    pub fn buffers_needing_sync_vx(&self) -> &[SharedVertexBuffer] {
        &self.buffers_to_sync_vx
    }

    pub fn buffers_needing_sync_ix(&self) -> &[SharedIndexBuffer] {
        &self.buffers_to_sync_ix
    }

    /// `list_ent_rd_curr` is `(entity_id, render_data_unique_id)` for every
    /// currently renderable entity.
    pub fn update(&mut self, list_ent_rd_curr: &[(EntityId, u64)], render_data: &mut dyn ComponentStore<RenderData>) -> DrawResult<()> {
        self.buffers_to_init_vx.clear();
        self.buffers_to_init_ix.clear();
        self.buffers_to_sync_vx.clear();
        self.buffers_to_sync_ix.clear();
        self.removed_this_update.clear();
        self.updated_this_update.clear();
        self.added_this_update.clear();

        let mut curr: Vec<(u64, EntityId)> = list_ent_rd_curr.iter().map(|&(entity_id, unique_id)| (unique_id, entity_id)).collect();
        curr.sort_unstable();

        let removed = sorted_set_difference(&self.list_prev, &curr);
        let added = sorted_set_difference(&curr, &self.list_prev);

        for (_, entity_id) in removed {
            if let Some(ranges) = self.geometry_ranges.remove(&entity_id) {
                ranges.release_all();
            }
            self.removed_this_update.push(entity_id);
        }

        for (_, entity_id) in added {
            let Some(rd) = render_data.get_mut(entity_id) else { continue };
            let buffer_layout = rd.buffer_layout().clone();
            rd.geometry_mut().mark_all_updated();
            self.geometry_ranges.insert(entity_id, GeometryRanges::pinned(buffer_layout));
            self.added_this_update.push(entity_id);
        }

        for &(entity_id, _) in list_ent_rd_curr {
            let Some(rd) = render_data.get_mut(entity_id) else { continue };
            if !rd.geometry().is_any_updated() || !has_nonempty_updated_bytes(rd.geometry()) {
                continue;
            }

            let buffer_layout = rd.buffer_layout().clone();
            let updated_streams: Vec<usize> = rd.geometry().updated_vertex_streams().collect();
            let indexed_updated = buffer_layout.is_indexed() && rd.geometry().is_index_buffer_updated();

            let Some(ranges) = self.geometry_ranges.get_mut(&entity_id) else { continue };

            for stream in updated_streams {
                if let Some(old) = ranges.take_vx_range(stream) {
                    buffer_layout.release_vertex_range(stream, &old);
                }
                let bytes = rd.geometry().vertex_buffer(stream).to_vec();
                let range = acquire_vertex_range(&buffer_layout, self.factory.as_ref(), stream, bytes.len(), &mut self.buffers_to_init_vx)?;
                range.buffer.write(range.start_byte, &bytes, rd.geometry().retain_client_copy());
                if !self.buffers_to_sync_vx.iter().any(|b| Arc::ptr_eq(b, &range.buffer)) {
                    self.buffers_to_sync_vx.push(range.buffer.clone());
                }
                ranges.set_vx_range(stream, range);
            }

            if indexed_updated {
                if let Some(old) = ranges.take_ix_range() {
                    buffer_layout.release_index_range(&old);
                }
                let bytes = rd.geometry().index_buffer().unwrap_or(&[]).to_vec();
                let range = acquire_index_range(&buffer_layout, self.factory.as_ref(), bytes.len(), &mut self.buffers_to_init_ix)?;
                range.buffer.write(range.start_byte, &bytes, rd.geometry().retain_client_copy());
                if !self.buffers_to_sync_ix.iter().any(|b| Arc::ptr_eq(b, &range.buffer)) {
                    self.buffers_to_sync_ix.push(range.buffer.clone());
                }
                ranges.set_ix_range(range);
            }

            rd.geometry_mut().clear_updates();
            self.updated_this_update.push(entity_id);
        }

        self.list_prev = curr;
        Ok(())
    }

    /// Grows `draw_calls` to cover every tracked entity id, invalidates
    /// removed entities' draw calls, and materialises ranges for updated
    /// ones whose geometry is now fully allocated.
    pub fn sync(&mut self, draw_calls: &mut Vec<DrawCall>) {
        let max_tracked_id = self.geometry_ranges.keys().copied().max().unwrap_or(0) as usize;
        if draw_calls.len() <= max_tracked_id {
            draw_calls.resize_with(max_tracked_id + 1, DrawCall::invalid);
        }

        for entity_id in self.removed_this_update.drain(..) {
            if let Some(draw_call) = draw_calls.get_mut(entity_id as usize) {
                draw_call.reset_to_invalid();
            }
        }

        for entity_id in self.updated_this_update.drain(..) {
            let Some(ranges) = self.geometry_ranges.get(&entity_id) else { continue };
            if !ranges.is_geometry_valid() {
                continue;
            }
            if let Some(draw_call) = draw_calls.get_mut(entity_id as usize) {
                draw_call.vx_ranges = ranges.vx_ranges().iter().cloned().collect();
                draw_call.vx_sizes_bytes = ranges
                    .buffer_layout()
                    .map(|layout| (0..layout.vertex_stream_count()).map(|s| layout.vertex_size_bytes(s)).collect())
                    .unwrap_or_default();
                draw_call.ix_range = ranges.ix_range().cloned();
                draw_call.valid = true;
            }
        }
    }

    /// Releases all tracked ranges and clears every piece of state.
    /// Intended for GPU-context loss.
    pub fn reset(&mut self) {
        for (_, ranges) in self.geometry_ranges.drain() {
            ranges.release_all();
        }
        self.list_prev.clear();
        self.buffers_to_init_vx.clear();
        self.buffers_to_init_ix.clear();
        self.buffers_to_sync_vx.clear();
        self.buffers_to_sync_ix.clear();
        self.removed_this_update.clear();
        self.updated_this_update.clear();
        self.added_this_update.clear();
    }
}
