//! The draw-call updater: sub-allocates GPU buffer ranges for each
//! renderable entity's geometry and keeps a shared `DrawCall` list in sync
//! with it, without ever reallocating or moving a GPU buffer.

mod draw_call;
mod ranges;
mod updater;

pub use draw_call::DrawCall;
pub use ranges::GeometryRanges;
pub use updater::DrawCallUpdater;
