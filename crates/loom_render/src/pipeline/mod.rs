//! Pipeline resolution: the composite key and the per-slot cache.

pub mod cache;
pub mod key;

pub use cache::{PipelineCache, PsoEntry};
pub use key::{PsoQuery, compose_pso_hash, shader_state_word};
