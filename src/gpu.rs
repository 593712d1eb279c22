//! The abstract GPU-API surface the core consumes.
//!
//! None of this is implemented here — buffers, textures, shaders, state sets
//! and the immediate drawing primitives are all external collaborators. The
//! core only depends on the life-cycle contract (`gl_init` / `gl_bind` /
//! `gl_sync` / `gl_cleanup`) and on being handed `Arc`-wrapped trait objects
//! it can cheaply clone into [`crate::range_alloc::Range`]s and draw calls.

use std::sync::Arc;

/// Life cycle shared by every GPU-resident resource kind. `gl_init` and
/// `gl_cleanup` run on the render thread, driven by the orchestrator's
/// add/remove callbacks; `gl_sync` runs on the render thread once per frame
/// for resources flagged dirty.
pub trait GpuResource: std::fmt::Debug + Send + Sync {
    fn gl_init(&self);
    fn gl_bind(&self);
    fn gl_sync(&self);
    fn gl_cleanup(&self);
}

/// A GPU vertex buffer backing one or more blocks of a vertex-stream range
/// allocator.
pub trait VertexBuffer: GpuResource {
    /// Stages `bytes` at `offset` for upload on the next `gl_sync`. When
    /// `retain_client_copy` is false the implementation may treat `bytes` as
    /// moved rather than copied.
    fn write(&self, offset: usize, bytes: &[u8], retain_client_copy: bool);
}

/// A GPU index buffer (fixed at unsigned 16-bit indices by the batch engine).
pub trait IndexBuffer: GpuResource {
    fn write(&self, offset: usize, bytes: &[u8], retain_client_copy: bool);
}

/// A 2D texture belonging to a texture set.
pub trait Texture2D: GpuResource {
    /// Whether this texture has pending upload work (its update counter
    /// advanced, or a sampler/param changed) and should be bound + synced
    /// this frame. The orchestrator checks this for every texture in a
    /// dirty texture set rather than re-uploading unconditionally.
    fn needs_sync(&self) -> bool;
}

/// A compiled/linked shader program.
pub trait ShaderProgram: GpuResource {}

/// Rasterizer/blend/stencil/depth or other opaque pipeline state.
pub trait StateSet: GpuResource {}

pub type SharedVertexBuffer = Arc<dyn VertexBuffer>;
pub type SharedIndexBuffer = Arc<dyn IndexBuffer>;
pub type SharedTexture2D = Arc<dyn Texture2D>;
pub type SharedShaderProgram = Arc<dyn ShaderProgram>;
pub type SharedStateSet = Arc<dyn StateSet>;

/// A no-op resource used to fill slot 0 of every managed resource list —
/// the "null/identity" sentinel. Binding shader id 0 is defined as "no
/// shader", and a state-set field of 0 in a sort key means "don't touch
/// this state", so every one of its life-cycle methods is a deliberate
/// no-op rather than a missing implementation.
#[derive(Debug, Default)]
pub struct NullResource;

impl GpuResource for NullResource {
    fn gl_init(&self) {}
    fn gl_bind(&self) {}
    fn gl_sync(&self) {}
    fn gl_cleanup(&self) {}
}

impl ShaderProgram for NullResource {}
impl StateSet for NullResource {}
impl Texture2D for NullResource {
    fn needs_sync(&self) -> bool {
        false
    }
}

/// The free-function drawing surface: clearing the framebuffer and issuing
/// indexed/non-indexed draws against whatever vertex/index buffers are
/// currently bound.
pub trait GpuContext {
    fn clear(&self, color: [f32; 4]);
    fn draw_arrays(&self, primitive: crate::sort_key::Primitive, vertex_size: usize, start: usize, size_bytes: usize);
    fn draw_elements(&self, primitive: crate::sort_key::Primitive, start_byte: usize, size_bytes: usize);
}

/// Constructs fresh GPU buffers on demand. The draw-call updater calls this
/// whenever a range allocator reports every existing block full, so a new
/// block-sized buffer can be created and handed back to `create_block`.
pub trait BufferFactory: Send + Sync {
    fn create_vertex_buffer(
        &self,
        usage: crate::buffer_layout::BufferUsage,
        layout: &crate::buffer_layout::VertexAttributeLayout,
        block_size_bytes: usize,
    ) -> SharedVertexBuffer;

    fn create_index_buffer(&self, usage: crate::buffer_layout::BufferUsage, block_size_bytes: usize) -> SharedIndexBuffer;
}
