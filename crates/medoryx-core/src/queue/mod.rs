//! Live patient queue: per-doctor tokens and a single serving slot.

mod coordinator;
mod locks;

pub use coordinator::*;
pub use locks::*;
