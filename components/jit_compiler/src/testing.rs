//! Scripted collaborators for tests.
//!
//! Available in this crate's unit tests and, with the `test-utils` feature,
//! to downstream test crates. Everything here is deterministic: parse
//! results are registered per source text and backend outcomes are queued
//! per job.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use core_types::{AssumptionId, CompileError, ScriptId};
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

use crate::backend::{Backend, BackendJob, BackendKind, Backends, CodeOutput, JobFailure};
use crate::config::CompilerConfig;
use crate::dependencies::CompilationDependencies;
use crate::engine::{Collaborators, Engine};
use crate::heap::MemoryMonitor;
use crate::interfaces::{DebugHooks, ParseRequest, Parser};
use crate::literal::FunctionLiteral;
use crate::telemetry::CompileCounters;
use crate::unit::CompilationUnit;

/// Parser returning registered literal trees.
///
/// Unregistered sources parse to an empty top-level literal.
#[derive(Debug, Default)]
pub struct ScriptedParser {
    scripts: Mutex<FxHashMap<String, FunctionLiteral>>,
    failures: Mutex<FxHashMap<String, CompileError>>,
    parses: AtomicUsize,
}

impl ScriptedParser {
    /// Create a parser with nothing registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the literal tree of `source`.
    pub fn script(&self, source: &str, tree: FunctionLiteral) {
        self.scripts.lock().insert(source.to_string(), tree);
    }

    /// Make every parse of `source` fail with `error`.
    pub fn fail(&self, source: &str, error: CompileError) {
        self.failures.lock().insert(source.to_string(), error);
    }

    /// Number of parse calls so far.
    pub fn parse_count(&self) -> usize {
        self.parses.load(Ordering::SeqCst)
    }
}

impl Parser for ScriptedParser {
    fn parse(&self, request: &ParseRequest) -> Result<FunctionLiteral, CompileError> {
        self.parses.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().get(request.source.as_ref()) {
            return Err(error.clone());
        }
        let tree = self
            .scripts
            .lock()
            .get(request.source.as_ref())
            .cloned()
            .unwrap_or_else(|| FunctionLiteral {
                source_size: request.source.len(),
                ..FunctionLiteral::toplevel()
            });
        if request.is_toplevel {
            return Ok(tree);
        }
        tree.find(request.literal_id)
            .cloned()
            .ok_or_else(|| CompileError::parse(format!("no function literal {}", request.literal_id)))
    }

    fn analyze(&self, _literal: &mut FunctionLiteral) -> Result<(), CompileError> {
        Ok(())
    }
}

/// Phase a scripted failure is injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Prepare
    Prepare,
    /// Execute
    Execute,
    /// Finalize
    Finalize,
}

/// Latch holding scripted execute phases until released.
#[derive(Debug, Clone, Default)]
pub struct ExecuteGate {
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl ExecuteGate {
    /// Let every held and future execute phase run.
    pub fn release(&self) {
        let (open, signal) = &*self.state;
        *open.lock() = true;
        signal.notify_all();
    }

    fn wait(&self) {
        let (open, signal) = &*self.state;
        let mut open = open.lock();
        while !*open {
            signal.wait(&mut open);
        }
    }
}

/// Backend whose jobs succeed unless told otherwise.
#[derive(Debug)]
pub struct ScriptedBackend {
    kind: BackendKind,
    background: bool,
    queued_failures: Mutex<VecDeque<(Phase, JobFailure)>>,
    sticky_failure: Mutex<Option<(Phase, JobFailure)>>,
    execute_delay: Mutex<Duration>,
    execute_panics: AtomicBool,
    gate: Mutex<Option<ExecuteGate>>,
    assumptions: Mutex<Vec<AssumptionId>>,
    code_size: AtomicUsize,
    jobs: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    /// Backend for `kind`. Interpreter and optimizing jobs may execute in
    /// the background.
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            background: matches!(kind, BackendKind::Interpreter | BackendKind::Optimizing),
            queued_failures: Mutex::new(VecDeque::new()),
            sticky_failure: Mutex::new(None),
            execute_delay: Mutex::new(Duration::ZERO),
            execute_panics: AtomicBool::new(false),
            gate: Mutex::new(None),
            assumptions: Mutex::new(Vec::new()),
            code_size: AtomicUsize::new(64),
            jobs: Mutex::new(Vec::new()),
        }
    }

    /// Backend for `kind` whose jobs must execute on the owner thread.
    pub fn owner_only(kind: BackendKind) -> Self {
        Self {
            background: false,
            ..Self::new(kind)
        }
    }

    /// Fail the next job created at `phase`.
    pub fn fail_next(&self, phase: Phase, failure: JobFailure) {
        self.queued_failures.lock().push_back((phase, failure));
    }

    /// Fail every job created from now on at `phase`.
    pub fn fail_always(&self, phase: Phase, failure: JobFailure) {
        *self.sticky_failure.lock() = Some((phase, failure));
    }

    /// Stop failing jobs.
    pub fn clear_failures(&self) {
        self.queued_failures.lock().clear();
        *self.sticky_failure.lock() = None;
    }

    /// Make every execute phase take at least `delay`.
    pub fn set_execute_delay(&self, delay: Duration) {
        *self.execute_delay.lock() = delay;
    }

    /// Make execute phases of jobs created from now on panic.
    pub fn set_execute_panics(&self, panics: bool) {
        self.execute_panics.store(panics, Ordering::SeqCst);
    }

    /// Hold execute phases of jobs created from now on until the returned
    /// gate is released.
    pub fn hold_execute(&self) -> ExecuteGate {
        let gate = ExecuteGate::default();
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    /// Make every job depend on `assumption`.
    pub fn assume_in_prepare(&self, assumption: AssumptionId) {
        self.assumptions.lock().push(assumption);
    }

    /// Size of the code every job produces.
    pub fn set_code_size(&self, size: usize) {
        self.code_size.store(size, Ordering::SeqCst);
    }

    /// Names of the units jobs were created for, in order.
    pub fn jobs(&self) -> Vec<String> {
        self.jobs.lock().clone()
    }

    /// Number of jobs created.
    pub fn jobs_created(&self) -> usize {
        self.jobs.lock().len()
    }
}

impl Backend for ScriptedBackend {
    fn new_job(&self, unit: &CompilationUnit) -> Box<dyn BackendJob> {
        self.jobs.lock().push(unit.name.clone());
        let failure = self
            .queued_failures
            .lock()
            .pop_front()
            .or_else(|| self.sticky_failure.lock().clone());
        Box::new(ScriptedJob {
            kind: self.kind,
            background: self.background,
            failure,
            delay: *self.execute_delay.lock(),
            panics: self.execute_panics.load(Ordering::SeqCst),
            gate: self.gate.lock().clone(),
            assumptions: self.assumptions.lock().clone(),
            size: self.code_size.load(Ordering::SeqCst),
        })
    }
}

struct ScriptedJob {
    kind: BackendKind,
    background: bool,
    failure: Option<(Phase, JobFailure)>,
    delay: Duration,
    panics: bool,
    gate: Option<ExecuteGate>,
    assumptions: Vec<AssumptionId>,
    size: usize,
}

impl ScriptedJob {
    fn outcome(&mut self, phase: Phase) -> Result<(), JobFailure> {
        match self.failure.take() {
            Some((at, failure)) if at == phase => Err(failure),
            other => {
                self.failure = other;
                Ok(())
            }
        }
    }
}

impl BackendJob for ScriptedJob {
    fn can_execute_on_background_thread(&self) -> bool {
        self.background
    }

    fn prepare(&mut self, dependencies: &mut CompilationDependencies) -> Result<(), JobFailure> {
        for assumption in &self.assumptions {
            dependencies.assume(*assumption);
        }
        self.outcome(Phase::Prepare)
    }

    fn execute(&mut self) -> Result<(), JobFailure> {
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.panics {
            panic!("scripted {} backend panicked in execute", self.kind);
        }
        self.outcome(Phase::Execute)
    }

    fn finalize(&mut self) -> Result<CodeOutput, JobFailure> {
        self.outcome(Phase::Finalize)?;
        Ok(CodeOutput {
            kind: self.kind.output_kind(),
            size: self.size,
        })
    }
}

/// One scripted backend per tier.
#[derive(Debug, Clone)]
pub struct TestBackends {
    /// Legacy backend
    pub legacy: Arc<ScriptedBackend>,
    /// Interpreter backend
    pub interpreter: Arc<ScriptedBackend>,
    /// Optimizing backend
    pub optimizing: Arc<ScriptedBackend>,
    /// Asm validator
    pub asm_validator: Arc<ScriptedBackend>,
}

impl TestBackends {
    /// Fresh backends that always succeed.
    pub fn new() -> Self {
        Self {
            legacy: Arc::new(ScriptedBackend::new(BackendKind::Legacy)),
            interpreter: Arc::new(ScriptedBackend::new(BackendKind::Interpreter)),
            optimizing: Arc::new(ScriptedBackend::new(BackendKind::Optimizing)),
            asm_validator: Arc::new(ScriptedBackend::new(BackendKind::AsmValidator)),
        }
    }

    /// Fresh backends with a custom interpreter backend.
    pub fn with_interpreter(interpreter: ScriptedBackend) -> Self {
        Self {
            interpreter: Arc::new(interpreter),
            ..Self::new()
        }
    }

    /// Fresh backends with a custom optimizing backend.
    pub fn with_optimizing(optimizing: ScriptedBackend) -> Self {
        Self {
            optimizing: Arc::new(optimizing),
            ..Self::new()
        }
    }

    /// The backend set to hand to an engine.
    pub fn set(&self) -> Backends {
        Backends::new(
            self.legacy.clone(),
            self.interpreter.clone(),
            self.optimizing.clone(),
            self.asm_validator.clone(),
        )
    }
}

impl Default for TestBackends {
    fn default() -> Self {
        Self::new()
    }
}

/// Debugger hooks recording compiled scripts.
#[derive(Debug, Default)]
pub struct RecordingDebugger {
    loaded: AtomicBool,
    compiled: Mutex<Vec<ScriptId>>,
}

impl RecordingDebugger {
    /// Detached debugger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach or detach.
    pub fn set_loaded(&self, loaded: bool) {
        self.loaded.store(loaded, Ordering::SeqCst);
    }

    /// Scripts reported compiled, in order.
    pub fn compiled(&self) -> Vec<ScriptId> {
        self.compiled.lock().clone()
    }
}

impl DebugHooks for RecordingDebugger {
    fn on_after_compile(&self, script: ScriptId) {
        self.compiled.lock().push(script);
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }
}

/// Memory monitor with a switchable pressure flag.
#[derive(Debug, Default)]
pub struct FakeMemoryMonitor {
    pressure: AtomicBool,
}

impl FakeMemoryMonitor {
    /// Monitor reporting no pressure.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report high pressure or not.
    pub fn set_pressure(&self, high: bool) {
        self.pressure.store(high, Ordering::SeqCst);
    }
}

impl MemoryMonitor for FakeMemoryMonitor {
    fn high_memory_pressure(&self) -> bool {
        self.pressure.load(Ordering::SeqCst)
    }
}

/// An engine wired to scripted collaborators.
pub struct Harness {
    /// The engine under test
    pub engine: Engine,
    /// Its parser
    pub parser: Arc<ScriptedParser>,
    /// Its backends
    pub backends: TestBackends,
    /// Its telemetry sink
    pub telemetry: Arc<CompileCounters>,
    /// Its debugger hooks
    pub debugger: Arc<RecordingDebugger>,
    /// Its memory monitor
    pub memory: Arc<FakeMemoryMonitor>,
}

impl Harness {
    /// Engine with `config` and always-succeeding backends.
    pub fn new(config: CompilerConfig) -> Self {
        Self::with_backends(config, TestBackends::new())
    }

    /// Engine with `config` and the given backends.
    ///
    /// Panics if the configuration is invalid.
    pub fn with_backends(config: CompilerConfig, backends: TestBackends) -> Self {
        let parser = Arc::new(ScriptedParser::new());
        let telemetry = Arc::new(CompileCounters::new());
        let debugger = Arc::new(RecordingDebugger::new());
        let memory = Arc::new(FakeMemoryMonitor::new());
        let collaborators = Collaborators::new(parser.clone(), backends.set())
            .with_telemetry(telemetry.clone())
            .with_debugger(debugger.clone())
            .with_memory_monitor(memory.clone());
        let engine = match Engine::new(config, collaborators) {
            Ok(engine) => engine,
            Err(error) => panic!("test engine: {}", error),
        };
        Self {
            engine,
            parser,
            backends,
            telemetry,
            debugger,
            memory,
        }
    }
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness").field("engine", &self.engine).finish_non_exhaustive()
    }
}
