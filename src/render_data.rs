//! The two per-entity components the core cares about: [`RenderData`] on
//! any renderable entity, and [`BatchData`] on any source entity that should
//! be folded into a batch group.

use smallvec::SmallVec;
use std::sync::Arc;

use crate::buffer_layout::BufferLayout;
use crate::geometry::Geometry;
use crate::recycle_list::SlotId;
use crate::sort_key::SortKey;
use crate::uniform::UniformList;
use crate::unique_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transparency {
    Opaque,
    Transparent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePriority {
    SingleFrame,
    MultiFrame,
}

/// Up to four draw stages fit inline; most entities participate in one or
/// two, so a heap `Vec` would be wasted allocation on the common case.
pub type DrawStageSet = SmallVec<[SlotId; 4]>;

/// Component carried by any entity the render pipeline should draw —
/// either authored directly by the application or synthesised by the batch
/// engine.
#[derive(Debug)]
pub struct RenderData {
    sort_key: SortKey,
    buffer_layout: Arc<BufferLayout>,
    uniforms: UniformList,
    draw_stages: DrawStageSet,
    transparency: Transparency,
    enabled: bool,
    geometry: Geometry,
    unique_id: u64,
}

impl RenderData {
    pub fn new(
        sort_key: SortKey,
        buffer_layout: Arc<BufferLayout>,
        uniforms: UniformList,
        draw_stages: DrawStageSet,
        transparency: Transparency,
        retain_client_copy: bool,
    ) -> Self {
        let geometry = Geometry::new(
            buffer_layout.vertex_stream_count(),
            buffer_layout.is_indexed(),
            retain_client_copy,
        );
        Self {
            sort_key,
            buffer_layout,
            uniforms,
            draw_stages,
            transparency,
            enabled: true,
            geometry,
            unique_id: unique_id::next(),
        }
    }

    pub fn unique_id(&self) -> u64 {
        self.unique_id
    }

    pub fn sort_key(&self) -> SortKey {
        self.sort_key
    }

    pub fn set_sort_key(&mut self, key: SortKey) {
        self.sort_key = key;
    }

    pub fn buffer_layout(&self) -> &Arc<BufferLayout> {
        &self.buffer_layout
    }

    pub fn uniforms(&self) -> &UniformList {
        &self.uniforms
    }

    pub fn set_uniforms(&mut self, uniforms: UniformList) {
        self.uniforms = uniforms;
    }

    pub fn draw_stages(&self) -> &DrawStageSet {
        &self.draw_stages
    }

    pub fn transparency(&self) -> Transparency {
        self.transparency
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn geometry_mut(&mut self) -> &mut Geometry {
        &mut self.geometry
    }
}

/// Component carried by a source entity that should be folded into a batch
/// group. `group_id == 0` means "not batched".
#[derive(Debug)]
pub struct BatchData {
    group_id: SlotId,
    rebuild: bool,
    geometry: Geometry,
}

impl BatchData {
    pub fn new(group_id: SlotId, vertex_stream_count: usize, indexed: bool, retain_client_copy: bool) -> Self {
        Self {
            group_id,
            // Adding an entity to a batch group requires setting the
            // rebuild flag to make its initial content visible — the
            // source format has no way to detect "added with identical
            // geometry and no rebuild flag", so the constructor defaults
            // to true rather than leaving freshly added entities invisible.
            rebuild: true,
            geometry: Geometry::new(vertex_stream_count, indexed, retain_client_copy),
        }
    }

    pub fn group_id(&self) -> SlotId {
        self.group_id
    }

    pub fn set_group_id(&mut self, group_id: SlotId) {
        self.group_id = group_id;
    }

    pub fn rebuild(&self) -> bool {
        self.rebuild
    }

    pub fn set_rebuild(&mut self, rebuild: bool) {
        self.rebuild = rebuild;
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn geometry_mut(&mut self) -> &mut Geometry {
        &mut self.geometry
    }
}

/// Descriptor for a batch group, registered once via `BatchEngine::register_batch`.
#[derive(Clone)]
pub struct Batch {
    pub sort_key_template: SortKey,
    pub buffer_layout: Arc<BufferLayout>,
    pub uniforms: UniformList,
    pub draw_stages: DrawStageSet,
    pub transparency: Transparency,
    pub update_priority: UpdatePriority,
}
