//! Deltas
//!
//! After a handler runs, the delta engine turns the tree's dirty fields into
//! a [`Delta`]: the smallest patch that brings the client up to date. Dirty
//! stored fields are emitted directly; computed fields are recomputed and
//! emitted only when their value actually changed.

mod engine;
mod patch;

pub use engine::compute_delta;
pub use patch::{Delta, FieldPatch};
