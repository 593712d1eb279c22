//! The draw-stage contract and a reference implementation of the default
//! per-frame drawing behaviour.

use std::sync::{Arc, Mutex};

use crate::draw::DrawCall;
use crate::ecs::EntityId;
use crate::gpu::{GpuContext, SharedShaderProgram, SharedStateSet};
use crate::uniform::UniformSet;

use super::render_system::TextureSet;

/// Aggregate handed to a draw stage's [`DrawStage::render`]. Every slice is a
/// render-thread `list_sync` snapshot or a per-stage id list built by
/// `RenderSystem::sync` for this frame — nothing here is mutated during
/// `Render`. `opaque_ids`/`transparent_ids` are entity ids, doubling as
/// indices into `draw_calls`.
pub struct DrawParams<'a> {
    pub gpu: &'a dyn GpuContext,
    pub shaders: &'a [SharedShaderProgram],
    pub depth_configs: &'a [SharedStateSet],
    pub blend_configs: &'a [SharedStateSet],
    pub stencil_configs: &'a [SharedStateSet],
    pub texture_sets: &'a [TextureSet],
    pub uniform_sets: &'a [UniformSet],
    pub draw_calls: &'a [DrawCall],
    pub opaque_ids: &'a [EntityId],
    pub transparent_ids: &'a [EntityId],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub draw_calls_issued: u32,
    pub state_changes: u32,
}

/// One node of the draw-stage graph. Implementations are free to filter
/// `opaque_ids`/`transparent_ids` however they like (e.g. a shadow pass
/// drawing only opaque geometry); the default stage below draws both.
pub trait DrawStage: Send + Sync {
    fn render(&self, params: &DrawParams) -> RenderStats;

    /// Clears any stage-private state. Called by `RenderSystem::reset`.
    fn reset(&self);

    /// Statistics accumulated by the most recent `render` call.
    fn stats(&self) -> RenderStats;
}

pub type SharedDrawStage = Arc<dyn DrawStage>;

/// Reference draw stage: clears the framebuffer, stable-sorts each id list by
/// [`SortKey`](crate::sort_key::SortKey), walks transparent geometry before
/// opaque, and emits state-change commands only when a sort-key field
/// differs from the previous draw call.
pub struct DefaultDrawStage {
    clear_color: [f32; 4],
    stats: Mutex<RenderStats>,
}

impl DefaultDrawStage {
    pub fn new(clear_color: [f32; 4]) -> Self {
        Self {
            clear_color,
            stats: Mutex::new(RenderStats::default()),
        }
    }

    fn issue(&self, params: &DrawParams, id: EntityId, prev_key: &mut Option<crate::sort_key::SortKey>, stats: &mut RenderStats) {
        let Some(draw_call) = params.draw_calls.get(id as usize) else {
            return;
        };
        if !draw_call.valid {
            return;
        }
        let key = draw_call.sort_key;

        let field_changed = |get: fn(&crate::sort_key::SortKey) -> u64| match *prev_key {
            None => true,
            Some(p) => get(&p) != get(&key),
        };

        if field_changed(crate::sort_key::SortKey::shader) {
            if let Some(shader) = params.shaders.get(key.shader() as usize) {
                shader.gl_bind();
            }
            stats.state_changes += 1;
        }
        if key.depth() != 0 && field_changed(crate::sort_key::SortKey::depth) {
            if let Some(state) = params.depth_configs.get(key.depth() as usize) {
                state.gl_bind();
            }
            stats.state_changes += 1;
        }
        if key.blend() != 0 && field_changed(crate::sort_key::SortKey::blend) {
            if let Some(state) = params.blend_configs.get(key.blend() as usize) {
                state.gl_bind();
            }
            stats.state_changes += 1;
        }
        if key.stencil() != 0 && field_changed(crate::sort_key::SortKey::stencil) {
            if let Some(state) = params.stencil_configs.get(key.stencil() as usize) {
                state.gl_bind();
            }
            stats.state_changes += 1;
        }
        if field_changed(crate::sort_key::SortKey::texture) {
            if let Some(texture_set) = params.texture_sets.get(key.texture() as usize) {
                texture_set.bind_all();
            }
            stats.state_changes += 1;
        }
        if field_changed(crate::sort_key::SortKey::uniform) {
            if let (Some(shader), Some(uniform_set)) = (params.shaders.get(key.shader() as usize), params.uniform_sets.get(key.uniform() as usize)) {
                uniform_set.bind_all(shader.as_ref());
            }
            stats.state_changes += 1;
        }

        for range in draw_call.vx_ranges.iter().flatten() {
            range.buffer.gl_bind();
        }

        if let Some(ix_range) = &draw_call.ix_range {
            ix_range.buffer.gl_bind();
            params.gpu.draw_elements(key.primitive(), ix_range.start_byte, ix_range.size_bytes);
        } else if let Some(Some(vx0)) = draw_call.vx_ranges.first() {
            let vertex_size = draw_call.vx_sizes_bytes.first().copied().unwrap_or(0);
            if vertex_size > 0 {
                params.gpu.draw_arrays(key.primitive(), vertex_size, vx0.start_byte, vx0.size_bytes);
            }
        }

        stats.draw_calls_issued += 1;
        *prev_key = Some(key);
    }
}

impl DrawStage for DefaultDrawStage {
    fn render(&self, params: &DrawParams) -> RenderStats {
        params.gpu.clear(self.clear_color);

        let mut transparent: Vec<EntityId> = params.transparent_ids.to_vec();
        let mut opaque: Vec<EntityId> = params.opaque_ids.to_vec();
        let key_of = |id: &EntityId| params.draw_calls.get(*id as usize).map(|dc| dc.sort_key).unwrap_or_default();
        transparent.sort_by_key(key_of);
        opaque.sort_by_key(key_of);

        let mut prev_key = None;
        let mut stats = RenderStats::default();
        for id in transparent.into_iter().chain(opaque) {
            self.issue(params, id, &mut prev_key, &mut stats);
        }

        *self.stats.lock().expect("draw stage stats poisoned") = stats;
        stats
    }

    fn reset(&self) {
        *self.stats.lock().expect("draw stage stats poisoned") = RenderStats::default();
    }

    fn stats(&self) -> RenderStats {
        *self.stats.lock().expect("draw stage stats poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort_key::Primitive;

    struct RecordingGpu {
        cleared: Mutex<Vec<[f32; 4]>>,
        draws: Mutex<u32>,
    }

    impl GpuContext for RecordingGpu {
        fn clear(&self, color: [f32; 4]) {
            self.cleared.lock().unwrap().push(color);
        }
        fn draw_arrays(&self, _primitive: Primitive, _vertex_size: usize, _start: usize, _size_bytes: usize) {
            *self.draws.lock().unwrap() += 1;
        }
        fn draw_elements(&self, _primitive: Primitive, _start_byte: usize, _size_bytes: usize) {
            *self.draws.lock().unwrap() += 1;
        }
    }

    #[test]
    fn render_clears_and_reports_zero_draws_with_no_valid_calls() {
        let stage = DefaultDrawStage::new([0.1, 0.1, 0.1, 1.0]);
        let gpu = RecordingGpu {
            cleared: Mutex::new(Vec::new()),
            draws: Mutex::new(0),
        };
        let params = DrawParams {
            gpu: &gpu,
            shaders: &[],
            depth_configs: &[],
            blend_configs: &[],
            stencil_configs: &[],
            texture_sets: &[],
            uniform_sets: &[],
            draw_calls: &[],
            opaque_ids: &[],
            transparent_ids: &[],
        };
        let stats = stage.render(&params);
        assert_eq!(stats.draw_calls_issued, 0);
        assert_eq!(gpu.cleared.lock().unwrap().len(), 1);
    }
}
