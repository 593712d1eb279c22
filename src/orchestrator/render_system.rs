//! `RenderSystem`: owns every GPU resource list behind the async/sync
//! dual-list discipline, drives the draw-call updater, and executes the
//! draw-stage graph in topological order once per frame.
//!
//! Two halves of this type run on two different threads (see the system
//! overview's threading section): [`RenderSystem::update`] is called from
//! the update thread, [`RenderSystem::sync`] and [`RenderSystem::render`]
//! from the render thread. The caller is responsible for the rendezvous —
//! this type assumes `sync` never overlaps a concurrent `update`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::draw::{DrawCall, DrawCallUpdater};
use crate::ecs::{ComponentStore, EntityId};
use crate::error::DrawResult;
use crate::gpu::{BufferFactory, GpuContext, NullResource, SharedShaderProgram, SharedStateSet, SharedTexture2D};
use crate::recycle_list::{RecycleIndexList, SlotId};
use crate::render_data::{RenderData, Transparency};
use crate::uniform::UniformSet;

use super::draw_stage::{DrawParams, DrawStage, RenderStats, SharedDrawStage};
use super::resource_list::DualResourceList;
use super::stage_graph::DrawStageGraph;

/// A managed group of textures bound together (e.g. albedo + normal). GL
/// init/cleanup fire once per contained texture when the set itself is
/// added/removed; `bind_all` runs on every sort-key texture-field state
/// change, `sync_dirty` once per frame for any texture reporting pending
/// upload work.
#[derive(Debug, Clone, Default)]
pub struct TextureSet {
    pub textures: Vec<SharedTexture2D>,
}

impl TextureSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(textures: Vec<SharedTexture2D>) -> Self {
        Self { textures }
    }

    fn gl_init_all(&self) {
        for texture in &self.textures {
            texture.gl_init();
        }
    }

    fn gl_cleanup_all(&self) {
        for texture in &self.textures {
            texture.gl_cleanup();
        }
    }

    pub fn bind_all(&self) {
        for texture in &self.textures {
            texture.gl_bind();
        }
    }

    fn sync_dirty(&self) {
        for texture in &self.textures {
            if texture.needs_sync() {
                texture.gl_bind();
                texture.gl_sync();
            }
        }
    }
}

/// A render-thread-only closure invoked at the end of every `sync` — the
/// hook user code uses for work that must run after GPU state for the
/// frame is settled but before `render` walks the draw stages.
pub type SyncCallback = Box<dyn Fn() + Send + Sync>;

/// Sentinel stage occupying slot 0 of the draw-stage graph. Never reached
/// by `render` (the topological order always drops id 0), so its methods
/// exist only to satisfy the dual-list discipline's sentinel requirement.
struct NullDrawStage;

impl DrawStage for NullDrawStage {
    fn render(&self, _params: &DrawParams) -> RenderStats {
        RenderStats::default()
    }
    fn reset(&self) {}
    fn stats(&self) -> RenderStats {
        RenderStats::default()
    }
}

pub struct RenderSystem {
    shaders: DualResourceList<SharedShaderProgram>,
    depth_configs: DualResourceList<SharedStateSet>,
    blend_configs: DualResourceList<SharedStateSet>,
    stencil_configs: DualResourceList<SharedStateSet>,
    texture_sets: DualResourceList<TextureSet>,
    uniform_sets: DualResourceList<UniformSet>,
    stages: DrawStageGraph,
    sync_callbacks: RecycleIndexList<SyncCallback>,
    updater: DrawCallUpdater,
    draw_calls: Vec<DrawCall>,
    opaque_by_stage: HashMap<SlotId, Vec<EntityId>>,
    transparent_by_stage: HashMap<SlotId, Vec<EntityId>>,
    stage_stats: HashMap<SlotId, RenderStats>,
}

impl RenderSystem {
    pub fn new(buffer_factory: Arc<dyn BufferFactory>) -> Self {
        Self {
            shaders: DualResourceList::new(Arc::new(NullResource)),
            depth_configs: DualResourceList::new(Arc::new(NullResource)),
            blend_configs: DualResourceList::new(Arc::new(NullResource)),
            stencil_configs: DualResourceList::new(Arc::new(NullResource)),
            texture_sets: DualResourceList::new(TextureSet::empty()),
            uniform_sets: DualResourceList::new(UniformSet::empty()),
            stages: DrawStageGraph::new(Arc::new(NullDrawStage)),
            sync_callbacks: RecycleIndexList::with_sentinel(Box::new(|| {})),
            updater: DrawCallUpdater::new(buffer_factory),
            draw_calls: Vec::new(),
            opaque_by_stage: HashMap::new(),
            transparent_by_stage: HashMap::new(),
            stage_stats: HashMap::new(),
        }
    }

    pub fn register_shader(&mut self, shader: SharedShaderProgram) -> SlotId {
        self.shaders.register(shader)
    }
    pub fn remove_shader(&mut self, id: SlotId) {
        self.shaders.remove(id);
    }

    pub fn register_depth_config(&mut self, config: SharedStateSet) -> SlotId {
        self.depth_configs.register(config)
    }
    pub fn remove_depth_config(&mut self, id: SlotId) {
        self.depth_configs.remove(id);
    }

    pub fn register_blend_config(&mut self, config: SharedStateSet) -> SlotId {
        self.blend_configs.register(config)
    }
    pub fn remove_blend_config(&mut self, id: SlotId) {
        self.blend_configs.remove(id);
    }

    pub fn register_stencil_config(&mut self, config: SharedStateSet) -> SlotId {
        self.stencil_configs.register(config)
    }
    pub fn remove_stencil_config(&mut self, id: SlotId) {
        self.stencil_configs.remove(id);
    }

    pub fn register_texture_set(&mut self, set: TextureSet) -> SlotId {
        self.texture_sets.register(set)
    }
    pub fn remove_texture_set(&mut self, id: SlotId) {
        self.texture_sets.remove(id);
    }

    pub fn register_uniform_set(&mut self, set: UniformSet) -> SlotId {
        self.uniform_sets.register(set)
    }
    pub fn remove_uniform_set(&mut self, id: SlotId) {
        self.uniform_sets.remove(id);
    }

    pub fn register_draw_stage(&mut self, stage: SharedDrawStage) -> SlotId {
        self.stages.register_draw_stage(stage)
    }
    pub fn remove_draw_stage(&mut self, id: SlotId) {
        self.stages.remove_draw_stage(id);
        self.opaque_by_stage.remove(&id);
        self.transparent_by_stage.remove(&id);
        self.stage_stats.remove(&id);
    }
    pub fn add_draw_stage_dependency(&mut self, from: SlotId, to: SlotId) {
        self.stages.add_dependency(from, to);
    }
    pub fn remove_draw_stage_dependency(&mut self, from: SlotId, to: SlotId) {
        self.stages.remove_dependency(from, to);
    }

    /// Returns a handle the caller can later pass back to removal, were a
    /// removal API ever needed; sync callbacks are overwhelmingly
    /// register-once-for-the-process, so callers may simply discard it.
    pub fn add_sync_callback(&mut self, callback: SyncCallback) -> SlotId {
        self.sync_callbacks.add(callback)
    }
    pub fn remove_sync_callback(&mut self, id: SlotId) {
        self.sync_callbacks.remove(id);
    }

    pub fn stage_stats(&self, id: SlotId) -> RenderStats {
        self.stage_stats.get(&id).copied().unwrap_or_default()
    }

    pub fn draw_calls(&self) -> &[DrawCall] {
        &self.draw_calls
    }

    /// Update-thread step: gathers every renderable entity's
    /// `(entity_id, render_data_unique_id)` pair and delegates to the
    /// draw-call updater.
    pub fn update(&mut self, render_data: &mut dyn ComponentStore<RenderData>) -> DrawResult<()> {
        let pairs: Vec<(EntityId, u64)> = render_data
            .entity_ids_ascending()
            .into_iter()
            .filter_map(|id| render_data.get(id).map(|rd| (id, rd.unique_id())))
            .collect();
        self.updater.update(&pairs, render_data)
    }

    /// Render-thread step. Must not overlap a concurrent `update`. Order
    /// matches the system overview: stage graph, shaders, buffers, raster
    /// configs, textures, uniforms, then the draw-call updater itself, the
    /// per-stage id lists, per-draw-call uniform sync, and finally user
    /// sync callbacks.
    pub fn sync(&mut self, render_data: &dyn ComponentStore<RenderData>) {
        self.stages.sync(|_| {}, |_| {});

        self.shaders.sync(|shader| shader.gl_cleanup(), |shader| shader.gl_init());

        for buffer in self.updater.buffers_needing_init_vx() {
            buffer.gl_init();
        }
        for buffer in self.updater.buffers_needing_init_ix() {
            buffer.gl_init();
        }
        for buffer in self.updater.buffers_needing_sync_vx() {
            buffer.gl_bind();
            buffer.gl_sync();
        }
        for buffer in self.updater.buffers_needing_sync_ix() {
            buffer.gl_bind();
            buffer.gl_sync();
        }

        self.depth_configs.sync(|_| {}, |_| {});
        self.blend_configs.sync(|_| {}, |_| {});
        self.stencil_configs.sync(|_| {}, |_| {});

        self.texture_sets.sync(|set| set.gl_cleanup_all(), |set| set.gl_init_all());
        for (_, set) in self.texture_sets.iter_sync() {
            set.sync_dirty();
        }

        self.uniform_sets.sync(|_| {}, |_| {});
        for (_, set) in self.uniform_sets.iter_sync() {
            set.sync_all();
        }

        self.updater.sync(&mut self.draw_calls);

        for &entity_id in self.updater.added_this_update() {
            if let (Some(rd), Some(draw_call)) = (render_data.get(entity_id), self.draw_calls.get_mut(entity_id as usize)) {
                draw_call.uniforms = Some(rd.uniforms().clone());
            }
        }

        for stage_ids in self.opaque_by_stage.values_mut() {
            stage_ids.clear();
        }
        for stage_ids in self.transparent_by_stage.values_mut() {
            stage_ids.clear();
        }

        for entity_id in render_data.entity_ids_ascending() {
            let Some(rd) = render_data.get(entity_id) else { continue };
            let Some(draw_call) = self.draw_calls.get_mut(entity_id as usize) else { continue };
            if !draw_call.valid {
                continue;
            }
            draw_call.sort_key = rd.sort_key();
            draw_call.transparency = rd.transparency();
            if !rd.enabled() {
                continue;
            }
            let by_stage = match rd.transparency() {
                Transparency::Opaque => &mut self.opaque_by_stage,
                Transparency::Transparent => &mut self.transparent_by_stage,
            };
            for &stage_id in rd.draw_stages() {
                by_stage.entry(stage_id).or_default().push(entity_id);
            }
        }

        for draw_call in &self.draw_calls {
            if let Some(uniforms) = &draw_call.uniforms {
                for uniform in uniforms.iter() {
                    uniform.gl_sync();
                }
            }
        }

        let callback_ids: Vec<SlotId> = self.sync_callbacks.iter().map(|(id, _)| id).filter(|&id| id != 0).collect();
        for id in callback_ids {
            if let Some(callback) = self.sync_callbacks.get(id) {
                callback();
            }
        }
    }

    /// Render-thread step: walks the draw-stage graph's topological order,
    /// invoking each stage with the resource snapshots and this frame's
    /// per-stage opaque/transparent id lists.
    pub fn render(&mut self, gpu: &dyn GpuContext) {
        let empty = Vec::new();
        let order = self.stages.topo_order().to_vec();
        for stage_id in order {
            let opaque_ids = self.opaque_by_stage.get(&stage_id).unwrap_or(&empty);
            let transparent_ids = self.transparent_by_stage.get(&stage_id).unwrap_or(&empty);
            let params = DrawParams {
                gpu,
                shaders: self.shaders.as_slice_sync(),
                depth_configs: self.depth_configs.as_slice_sync(),
                blend_configs: self.blend_configs.as_slice_sync(),
                stencil_configs: self.stencil_configs.as_slice_sync(),
                texture_sets: self.texture_sets.as_slice_sync(),
                uniform_sets: self.uniform_sets.as_slice_sync(),
                draw_calls: &self.draw_calls,
                opaque_ids,
                transparent_ids,
            };
            let stage = self.stages.stage(stage_id).clone();
            let stats = stage.render(&params);
            self.stage_stats.insert(stage_id, stats);
        }
    }

    /// Clears every resource list, reinstating the slot-0 sentinel, resets
    /// the draw-call updater and every draw stage. Intended for GPU-context
    /// loss; the application must re-register resources afterward.
    pub fn reset(&mut self) {
        self.shaders.reset();
        self.depth_configs.reset();
        self.blend_configs.reset();
        self.stencil_configs.reset();
        self.texture_sets.reset();
        self.uniform_sets.reset();

        self.stages.reset();

        self.updater.reset();
        self.draw_calls.clear();
        self.opaque_by_stage.clear();
        self.transparent_by_stage.clear();
        self.stage_stats.clear();
    }
}
