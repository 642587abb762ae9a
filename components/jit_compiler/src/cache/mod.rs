//! Code caches.
//!
//! - [`optimized`] - one optimized-code slot per function feedback record
//! - [`source`] - script and eval templates keyed by source text

pub mod optimized;
pub mod source;

pub use source::{eval_position, CacheHit, EvalKey, ScriptKey, SourceCache};
