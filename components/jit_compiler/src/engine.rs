//! The owner-thread world the compiler operates on.
//!
//! An [`Engine`] owns the heap arena, both caches, the optimizing worker
//! pool, the assumption table and every collaborator. It is bound to the
//! thread that created it: it holds an [`OwnerThread`] token and is
//! therefore neither `Send` nor `Sync`.
//!
//! The compile operations live in sibling modules as further `impl Engine`
//! blocks:
//! - [`crate::pipeline`] - the unoptimized pipeline
//! - [`crate::optimize`] - optimized compiles and background finalization
//! - [`crate::compiler`] - per-function entry points
//! - [`crate::script`] - script, eval and `Function` constructor compiles

use std::sync::Arc;

use core_types::{AssumptionId, ContextId, FunctionId};

use crate::backend::Backends;
use crate::cache::SourceCache;
use crate::config::{CompilerConfig, ConfigError};
use crate::dependencies::AssumptionTable;
use crate::handles::OwnerThread;
use crate::heap::{Heap, MemoryMonitor, NoMemoryPressure};
use crate::interfaces::{CodeSerializer, DebugHooks, JsonCodeSerializer, NoopDebugHooks, Parser};
use crate::scheduler::{OptimizingScheduler, SchedulerError};
use crate::telemetry::{CompileCounters, TelemetrySink};

/// Embedder decision on compiling a string to code in a context whose
/// native context forbids it. Receives the native context and the source.
pub type CodeGenCallback = Box<dyn Fn(ContextId, &str) -> bool>;

/// Errors constructing an [`Engine`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The worker pool could not be started.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// External collaborators of an engine.
///
/// Only the parser and the backends are mandatory; everything else has a
/// default that can be replaced with the `with_*` methods.
#[derive(Clone)]
pub struct Collaborators {
    /// Source parser and analyzer
    pub parser: Arc<dyn Parser>,
    /// Code generators
    pub backends: Backends,
    /// Debugger notifications
    pub debugger: Arc<dyn DebugHooks>,
    /// Code-cache encoder
    pub serializer: Arc<dyn CodeSerializer>,
    /// Memory-pressure query
    pub memory: Arc<dyn MemoryMonitor>,
    /// Statistics sink
    pub telemetry: Arc<dyn TelemetrySink>,
}

impl Collaborators {
    /// Collaborators with default debugger, serializer, memory monitor and
    /// telemetry.
    pub fn new(parser: Arc<dyn Parser>, backends: Backends) -> Self {
        Self {
            parser,
            backends,
            debugger: Arc::new(NoopDebugHooks),
            serializer: Arc::new(JsonCodeSerializer),
            memory: Arc::new(NoMemoryPressure),
            telemetry: Arc::new(CompileCounters::new()),
        }
    }

    /// Replace the debugger hooks.
    pub fn with_debugger(mut self, debugger: Arc<dyn DebugHooks>) -> Self {
        self.debugger = debugger;
        self
    }

    /// Replace the code-cache encoder.
    pub fn with_serializer(mut self, serializer: Arc<dyn CodeSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Replace the memory monitor.
    pub fn with_memory_monitor(mut self, memory: Arc<dyn MemoryMonitor>) -> Self {
        self.memory = memory;
        self
    }

    /// Replace the telemetry sink.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }
}

/// Compilation pipeline bound to one owner thread.
pub struct Engine {
    pub(crate) owner: OwnerThread,
    pub(crate) config: CompilerConfig,
    pub(crate) heap: Heap,
    pub(crate) parser: Arc<dyn Parser>,
    pub(crate) backends: Backends,
    pub(crate) debugger: Arc<dyn DebugHooks>,
    pub(crate) serializer: Arc<dyn CodeSerializer>,
    pub(crate) memory: Arc<dyn MemoryMonitor>,
    pub(crate) telemetry: Arc<dyn TelemetrySink>,
    pub(crate) source_cache: SourceCache,
    pub(crate) scheduler: Option<OptimizingScheduler>,
    pub(crate) assumptions: AssumptionTable,
    pub(crate) code_gen_callback: Option<CodeGenCallback>,
}

impl Engine {
    /// Create an engine on the current thread.
    ///
    /// Starts the optimizing worker pool when concurrent recompilation is
    /// enabled.
    pub fn new(config: CompilerConfig, collaborators: Collaborators) -> Result<Self, EngineError> {
        config.validate()?;
        let owner = OwnerThread::acquire();
        let scheduler = if config.concurrent_recompilation {
            Some(OptimizingScheduler::new(
                &owner,
                config.worker_count,
                config.queue_capacity,
            )?)
        } else {
            None
        };
        tracing::info!(
            concurrent = config.concurrent_recompilation,
            workers = config.worker_count,
            "Compiler engine started"
        );
        Ok(Self {
            owner,
            source_cache: SourceCache::new(config.source_cache_generations),
            config,
            heap: Heap::new(),
            parser: collaborators.parser,
            backends: collaborators.backends,
            debugger: collaborators.debugger,
            serializer: collaborators.serializer,
            memory: collaborators.memory,
            telemetry: collaborators.telemetry,
            scheduler,
            assumptions: AssumptionTable::new(),
            code_gen_callback: None,
        })
    }

    /// Owner-thread token.
    pub fn owner(&self) -> &OwnerThread {
        &self.owner
    }

    /// Active configuration.
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Heap arena.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Mutable heap arena.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Source-level cache.
    pub fn source_cache(&self) -> &SourceCache {
        &self.source_cache
    }

    /// Mutable source-level cache, for aging and eviction.
    pub fn source_cache_mut(&mut self) -> &mut SourceCache {
        &mut self.source_cache
    }

    /// Optimizing worker pool, when concurrent recompilation is on.
    pub fn scheduler(&self) -> Option<&OptimizingScheduler> {
        self.scheduler.as_ref()
    }

    /// Assumption table.
    pub fn assumptions(&self) -> &AssumptionTable {
        &self.assumptions
    }

    /// Register a new assumption optimized code may depend on.
    pub fn create_assumption(&mut self) -> AssumptionId {
        self.assumptions.create()
    }

    /// Install the embedder's code-generation-from-strings callback.
    pub fn set_code_gen_callback(&mut self, callback: CodeGenCallback) {
        self.code_gen_callback = Some(callback);
    }

    /// Allocate a native context.
    pub fn new_native_context(&mut self, allow_code_gen_from_strings: bool) -> ContextId {
        self.heap.new_native_context(allow_code_gen_from_strings)
    }

    /// Invalidate `assumption`.
    ///
    /// Installed code depending on it is marked for deoptimization, and
    /// every function running that code falls back to its unoptimized code.
    /// In-flight jobs depending on it are neutralized when finalized.
    pub fn invalidate_assumption(&mut self, assumption: AssumptionId) {
        let invalidation = self.assumptions.invalidate(assumption);
        for code in &invalidation.code {
            self.heap.code_mut(*code).mark_for_deoptimization();
        }
        let affected: Vec<FunctionId> = self
            .heap
            .functions()
            .filter(|function| invalidation.code.contains(&function.code))
            .map(|function| function.id)
            .collect();
        for function in &affected {
            let shared = self.heap.function(*function).shared;
            let code = self.heap.shared(shared).code;
            self.heap.function_mut(*function).code = code;
            crate::cache::optimized::clear(&mut self.heap, *function);
        }
        tracing::info!(
            assumption = %assumption,
            deoptimized = invalidation.code.len(),
            functions = affected.len(),
            aborted_jobs = invalidation.aborted_jobs,
            "Assumption invalidated"
        );
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.stop();
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}
