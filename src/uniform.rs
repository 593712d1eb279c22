//! Uniforms: the "object with GL-side behaviour" capability set used for
//! per-draw-call overrides and for the contents of a registered uniform set.
//!
//! Unlike vertex/index buffers, textures, shaders and state sets, uniforms
//! are not one of the core's external GPU-API collaborators — they're a
//! small capability the core itself defines, per the no-open-ended-hierarchy
//! design note: `{sync, bind, size}` is enough, a tagged variant (trait
//! object) suffices.

use std::sync::Arc;

pub trait Uniform: std::fmt::Debug + Send + Sync {
    /// Pushes this uniform's current value to the GPU. Called once per
    /// frame from the render thread during `Sync`.
    fn gl_sync(&self);

    /// Binds this uniform against the currently active shader.
    fn gl_bind(&self, shader: &dyn crate::gpu::ShaderProgram);

    /// Size in bytes, exposed for layout/statistics purposes.
    fn size_bytes(&self) -> usize;
}

pub type SharedUniform = Arc<dyn Uniform>;

/// An ordered, shared, immutable list of per-draw-call uniform overrides.
/// `RenderData` and the `Batch` it was produced from both point at the same
/// list; `DrawCall` picks up a clone of the `Arc` the frame an entity is
/// added.
pub type UniformList = Arc<Vec<SharedUniform>>;

/// A managed resource kind: a named group of uniforms bound together at a
/// shader stage. Has no GL life cycle of its own (`on_add`/`on_remove` are
/// no-ops) but its contents are synced every frame.
#[derive(Debug, Clone, Default)]
pub struct UniformSet {
    pub uniforms: UniformList,
}

impl UniformSet {
    pub fn empty() -> Self {
        Self {
            uniforms: Arc::new(Vec::new()),
        }
    }

    pub fn sync_all(&self) {
        for uniform in self.uniforms.iter() {
            uniform.gl_sync();
        }
    }

    pub fn bind_all(&self, shader: &dyn crate::gpu::ShaderProgram) {
        for uniform in self.uniforms.iter() {
            uniform.gl_bind(shader);
        }
    }
}
