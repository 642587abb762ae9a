//! Tiered JIT compilation driver
//!
//! This crate decides how and when each function or script is compiled,
//! drives the code generators through a uniform job protocol and caches
//! what they produce:
//! - Job state machine: prepare, execute and finalize with timing and
//!   thread rules ([`CompilationJob`])
//! - Tier selection between the interpreter and legacy backends, with an
//!   asm validation sidecar ([`tier`])
//! - Optimized compiles, inline or on background workers with
//!   backpressure ([`Engine::get_optimized_code`], [`OptimizingScheduler`])
//! - Code caches: the per-function optimized slot and the source-level
//!   script and eval cache ([`cache`])
//! - On-stack replacement targets ([`OsrTarget`])
//!
//! Parsing, code generation, debugging and code-cache encoding are
//! collaborators supplied through [`Collaborators`].
//!
//! # Example
//!
//! ```
//! use jit_compiler::{dynamic_function_source, CompilerConfig};
//!
//! let config = CompilerConfig::from_json(r#"{ "concurrent_recompilation": false }"#).unwrap();
//! assert!(config.optimize);
//!
//! let (source, parameters_end) = dynamic_function_source(&["a", "b"], "return a + b");
//! assert!(source.starts_with("(function anonymous(a,b"));
//! assert!(parameters_end > 0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod cache;
mod compiler;
pub mod config;
pub mod dependencies;
pub mod engine;
pub mod feedback;
pub mod handles;
pub mod heap;
pub mod interfaces;
pub mod job;
pub mod literal;
pub mod optimize;
pub mod osr;
mod pipeline;
pub mod scheduler;
pub mod script;
pub mod telemetry;
pub mod tier;
pub mod unit;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export main types at crate root
pub use backend::{Backend, BackendJob, BackendKind, Backends, CodeOutput, JobFailure};
pub use config::{CompilerConfig, ConfigError};
pub use engine::{CodeGenCallback, Collaborators, Engine, EngineError};
pub use feedback::{FeedbackMetadata, FeedbackRecord, FeedbackSlotKind, OptimizationMarker};
pub use handles::OwnerThread;
pub use heap::{Builtin, CodeKind, Heap, ScriptDetails, ScriptKind, ScriptOrigin};
pub use interfaces::{CodeSerializer, DebugHooks, JsonCodeSerializer, ParseRequest, Parser};
pub use job::{CompilationJob, JobState, JobStatus, PhaseTimings};
pub use literal::{FunctionLiteral, ScopeFacts};
pub use optimize::{ConcurrencyMode, OptimizeOutcome};
pub use osr::{FrameTier, OsrOffset, OsrTarget};
pub use scheduler::OptimizingScheduler;
pub use script::{dynamic_function_source, CompileOptions, EvalRequest, ScriptCompileResult};
pub use telemetry::{CompileCounters, CompileStats, TelemetrySink};
pub use unit::{CompilationUnit, UnitFlags};
