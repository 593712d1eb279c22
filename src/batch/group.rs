//! Engine-internal per-batch bookkeeping.

use std::sync::Arc;

use crate::buffer_layout::BufferLayout;
use crate::ecs::EntityId;
use crate::recycle_list::SlotId;
use crate::render_data::Batch;

/// Engine-internal record mapping a registered [`Batch`] to its source
/// entities and the merged entities it currently owns.
pub struct BatchGroup {
    /// Monotonically increasing, unique across every group this engine has
    /// ever registered — even ones reusing a recycled slot id. Guards
    /// against a stale multi-frame task clobbering a fresh group.
    pub uid: u64,
    pub batch: Batch,
    pub merged_ents: Vec<EntityId>,
    pub rebuild: bool,
    pub list_ents_prev: Vec<EntityId>,
    pub list_ents_curr: Vec<EntityId>,
    pub list_ents_upd: Vec<EntityId>,
}

impl BatchGroup {
    pub fn new(uid: u64, batch: Batch) -> Self {
        Self {
            uid,
            batch,
            merged_ents: Vec::new(),
            rebuild: false,
            list_ents_prev: Vec::new(),
            list_ents_curr: Vec::new(),
            list_ents_upd: Vec::new(),
        }
    }

    /// Occupies slot 0 of the engine's group table; never matched by any
    /// real `BatchData::group_id` since those start at 1.
    pub fn sentinel() -> Self {
        Self::new(0, Batch {
            sort_key_template: crate::sort_key::SortKey::new(),
            buffer_layout: Arc::new(BufferLayout::new(crate::buffer_layout::BufferUsage::Static, Vec::new(), Vec::new(), None)),
            uniforms: Arc::new(Vec::new()),
            draw_stages: Default::default(),
            transparency: crate::render_data::Transparency::Opaque,
            update_priority: crate::render_data::UpdatePriority::SingleFrame,
        })
    }
}

/// Immutable snapshot of one rebuilding group's per-frame merge inputs,
/// handed to the background worker task.
#[derive(Clone)]
pub struct BatchDesc {
    pub group_uid: u64,
    pub group_id: SlotId,
    pub buffer_layout: Arc<BufferLayout>,
    pub list_ents_curr: Vec<EntityId>,
}
