//! The one piece of long-lived global mutable state the core owns: a
//! process-wide monotonic counter used to stamp every [`crate::render_data::RenderData`]
//! with a unique id, so the draw-call updater can tell a remove-then-re-add
//! within a single entity slot apart from an untouched entity.

use std::sync::Mutex;

static NEXT_UNIQUE_ID: Mutex<u64> = Mutex::new(1);

/// Returns a fresh, process-wide unique id. `0` is never returned, so it
/// remains available as a sentinel "no render data" value if callers need
/// one.
pub fn next() -> u64 {
    let mut guard = NEXT_UNIQUE_ID.lock().expect("unique id counter poisoned");
    let id = *guard;
    *guard += 1;
    id
}
