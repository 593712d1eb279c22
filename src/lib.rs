/*  agate_draw

    Entity-component rendering middleware: the batch engine, draw-call
    updater, and render pipeline orchestrator. None of the GPU API, the
    ECS substrate, or the thread pool are implemented here — see `gpu`,
    `ecs`, and `thread_pool` for the abstract interfaces this crate
    consumes; application code supplies the concrete backends.

    Threading model: the update thread runs `BatchEngine::update` and
    `RenderSystem::update`; the render thread runs `RenderSystem::sync` and
    `RenderSystem::render`; a dedicated worker thread runs multi-frame batch
    tasks. The caller must sequence update -> sync -> render so no render
    `sync` overlaps a concurrent update-thread write.
*/

pub mod batch;
pub mod buffer_layout;
pub mod diff;
pub mod draw;
pub mod ecs;
pub mod error;
pub mod geometry;
pub mod gpu;
pub mod orchestrator;
pub mod range_alloc;
pub mod recycle_list;
pub mod render_data;
pub mod sort_key;
pub mod thread_pool;
pub mod uniform;
pub mod unique_id;

pub fn init_logging(level: log::LevelFilter) {
    env_logger::builder()
        .filter_level(level)
        .target(env_logger::Target::Stdout)
        .init();
}
