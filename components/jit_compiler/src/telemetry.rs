//! Compile statistics and code-creation events.
//!
//! The pipeline reports through an explicit [`TelemetrySink`] handed to the
//! engine at construction. [`CompileCounters`] is the default sink: lock-free
//! counters readable as a [`CompileStats`] snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use core_types::{Bailout, BailoutKind, CodeId};
use serde::Serialize;

use crate::backend::BackendKind;
use crate::job::PhaseTimings;

/// Tag of a code-creation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CodeEventTag {
    /// Top-level code of a host script
    Script,
    /// Top-level code of an eval script
    Eval,
    /// Eagerly compiled nested function
    Function,
    /// Lazily compiled function
    LazyCompile,
    /// Optimized code
    Optimized,
}

/// Which source cache a lookup went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceCacheKind {
    /// Host scripts
    Script,
    /// Eval and `Function` constructor sources
    Eval,
}

/// Why a concurrent optimization request was declined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeclineReason {
    /// The optimizing queue is at capacity
    QueueFull,
    /// The heap reports high memory pressure
    MemoryPressure,
}

/// Receiver of compile statistics and code events.
pub trait TelemetrySink: Send + Sync {
    /// An unoptimized compile succeeded.
    fn unoptimized_compiled(&self, backend: BackendKind, size: usize);

    /// An optimized compile succeeded.
    fn optimized_compiled(&self, timings: &PhaseTimings, size: usize);

    /// Optimization bailed out.
    fn bailout(&self, bailout: &Bailout);

    /// Code was installed.
    fn code_created(&self, tag: CodeEventTag, code: CodeId, name: &str);

    /// A source cache was consulted.
    fn source_cache_lookup(&self, kind: SourceCacheKind, hit: bool);

    /// A concurrent optimization request was declined.
    fn enqueue_declined(&self, reason: DeclineReason);

    /// A script or eval source was compiled from scratch.
    fn source_compiled(&self, kind: SourceCacheKind, size: usize);
}

/// Snapshot of [`CompileCounters`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompileStats {
    /// Successful interpreter compiles
    pub bytecode_compiles: u64,
    /// Successful legacy compiles
    pub legacy_compiles: u64,
    /// Successful asm validations
    pub asm_compiles: u64,
    /// Successful optimized compiles
    pub optimized_compiles: u64,
    /// Total unoptimized code size
    pub unoptimized_code_size: u64,
    /// Total optimized code size
    pub optimized_code_size: u64,
    /// Microseconds spent in optimizing phases
    pub optimize_micros: u64,
    /// Retry bailouts
    pub retries: u64,
    /// Abort bailouts
    pub aborts: u64,
    /// Code-creation events
    pub code_events: u64,
    /// Source cache hits
    pub cache_hits: u64,
    /// Source cache misses
    pub cache_misses: u64,
    /// Requests declined because the queue was full
    pub declined_queue_full: u64,
    /// Requests declined under memory pressure
    pub declined_memory_pressure: u64,
    /// Bytes of source compiled from scratch
    pub source_bytes_compiled: u64,
}

/// Default [`TelemetrySink`]: atomic counters.
#[derive(Debug, Default)]
pub struct CompileCounters {
    bytecode_compiles: AtomicU64,
    legacy_compiles: AtomicU64,
    asm_compiles: AtomicU64,
    optimized_compiles: AtomicU64,
    unoptimized_code_size: AtomicU64,
    optimized_code_size: AtomicU64,
    optimize_micros: AtomicU64,
    retries: AtomicU64,
    aborts: AtomicU64,
    code_events: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    declined_queue_full: AtomicU64,
    declined_memory_pressure: AtomicU64,
    source_bytes_compiled: AtomicU64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl CompileCounters {
    /// Zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read all counters.
    pub fn stats(&self) -> CompileStats {
        let read = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        CompileStats {
            bytecode_compiles: read(&self.bytecode_compiles),
            legacy_compiles: read(&self.legacy_compiles),
            asm_compiles: read(&self.asm_compiles),
            optimized_compiles: read(&self.optimized_compiles),
            unoptimized_code_size: read(&self.unoptimized_code_size),
            optimized_code_size: read(&self.optimized_code_size),
            optimize_micros: read(&self.optimize_micros),
            retries: read(&self.retries),
            aborts: read(&self.aborts),
            code_events: read(&self.code_events),
            cache_hits: read(&self.cache_hits),
            cache_misses: read(&self.cache_misses),
            declined_queue_full: read(&self.declined_queue_full),
            declined_memory_pressure: read(&self.declined_memory_pressure),
            source_bytes_compiled: read(&self.source_bytes_compiled),
        }
    }

    /// Zero all counters.
    pub fn reset_stats(&self) {
        for counter in [
            &self.bytecode_compiles,
            &self.legacy_compiles,
            &self.asm_compiles,
            &self.optimized_compiles,
            &self.unoptimized_code_size,
            &self.optimized_code_size,
            &self.optimize_micros,
            &self.retries,
            &self.aborts,
            &self.code_events,
            &self.cache_hits,
            &self.cache_misses,
            &self.declined_queue_full,
            &self.declined_memory_pressure,
            &self.source_bytes_compiled,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl TelemetrySink for CompileCounters {
    fn unoptimized_compiled(&self, backend: BackendKind, size: usize) {
        match backend {
            BackendKind::Interpreter => bump(&self.bytecode_compiles, 1),
            BackendKind::Legacy => bump(&self.legacy_compiles, 1),
            BackendKind::AsmValidator => bump(&self.asm_compiles, 1),
            BackendKind::Optimizing => {}
        }
        bump(&self.unoptimized_code_size, size as u64);
    }

    fn optimized_compiled(&self, timings: &PhaseTimings, size: usize) {
        bump(&self.optimized_compiles, 1);
        bump(&self.optimized_code_size, size as u64);
        bump(&self.optimize_micros, timings.total().as_micros() as u64);
    }

    fn bailout(&self, bailout: &Bailout) {
        match bailout.kind {
            BailoutKind::Retry => bump(&self.retries, 1),
            BailoutKind::Abort => bump(&self.aborts, 1),
        }
    }

    fn code_created(&self, tag: CodeEventTag, code: CodeId, name: &str) {
        tracing::debug!(tag = ?tag, code = %code, function = name, "Code created");
        bump(&self.code_events, 1);
    }

    fn source_cache_lookup(&self, _kind: SourceCacheKind, hit: bool) {
        if hit {
            bump(&self.cache_hits, 1);
        } else {
            bump(&self.cache_misses, 1);
        }
    }

    fn enqueue_declined(&self, reason: DeclineReason) {
        match reason {
            DeclineReason::QueueFull => bump(&self.declined_queue_full, 1),
            DeclineReason::MemoryPressure => bump(&self.declined_memory_pressure, 1),
        }
    }

    fn source_compiled(&self, _kind: SourceCacheKind, size: usize) {
        bump(&self.source_bytes_compiled, size as u64);
    }
}
