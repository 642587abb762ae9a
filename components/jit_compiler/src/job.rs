//! Compilation job state machine.
//!
//! A job drives one [`CompilationUnit`] through a backend's three phases:
//!
//! ```text
//! ReadyToPrepare -> ReadyToExecute -> ReadyToFinalize -> Succeeded
//!        \                \                  \
//!         +----------------+------------------+------> Failed
//! ```
//!
//! - `prepare()` and `finalize()` run on the owner thread.
//! - `execute()` runs anywhere if the backend allows it; heap access and
//!   dependency changes are revoked for its duration. Otherwise it must run
//!   on the owner thread.
//! - Calling a phase in the wrong state is a contract violation and panics.
//! - Each phase is timed.

use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use core_types::{Bailout, BailoutKind, BailoutReason};

use crate::backend::{BackendJob, BackendKind, Backends, CodeOutput, JobFailure};
use crate::handles::{Capability, CapabilityScope, OwnerThread};
use crate::telemetry::TelemetrySink;
use crate::unit::CompilationUnit;

/// Phase state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Created, prepare pending
    ReadyToPrepare,
    /// Prepared, execute pending
    ReadyToExecute,
    /// Executed, finalize pending
    ReadyToFinalize,
    /// Finalized successfully
    Succeeded,
    /// Stopped by a bailout or error
    Failed,
}

/// Outcome of one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// The phase succeeded
    Succeeded,
    /// The phase failed; the job is in [`JobState::Failed`]
    Failed,
}

/// Elapsed time per phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseTimings {
    /// Time spent in prepare
    pub prepare: Duration,
    /// Time spent in execute
    pub execute: Duration,
    /// Time spent in finalize
    pub finalize: Duration,
}

impl PhaseTimings {
    /// Sum of all phases.
    pub fn total(&self) -> Duration {
        self.prepare + self.execute + self.finalize
    }
}

/// One unit driven through one backend.
pub struct CompilationJob {
    unit: CompilationUnit,
    backend: BackendKind,
    inner: Box<dyn BackendJob>,
    state: JobState,
    timings: PhaseTimings,
    owner_thread: ThreadId,
    executed_on_background_thread: bool,
    output: Option<CodeOutput>,
}

impl CompilationJob {
    /// Create a job for `unit` on the `backend` tier.
    pub fn new(
        unit: CompilationUnit,
        backend: BackendKind,
        backends: &Backends,
        owner: &OwnerThread,
    ) -> Self {
        let inner = backends.get(backend).new_job(&unit);
        Self {
            unit,
            backend,
            inner,
            state: JobState::ReadyToPrepare,
            timings: PhaseTimings::default(),
            owner_thread: owner.id(),
            executed_on_background_thread: false,
            output: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Tier this job compiles for.
    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// The unit being compiled.
    pub fn unit(&self) -> &CompilationUnit {
        &self.unit
    }

    /// The unit being compiled.
    pub fn unit_mut(&mut self) -> &mut CompilationUnit {
        &mut self.unit
    }

    /// Give the unit back, dropping the job.
    pub fn into_unit(self) -> CompilationUnit {
        self.unit
    }

    /// Per-phase elapsed time.
    pub fn timings(&self) -> &PhaseTimings {
        &self.timings
    }

    /// Whether execute actually ran off the owner thread.
    pub fn executed_on_background_thread(&self) -> bool {
        self.executed_on_background_thread
    }

    /// Whether execute may run off the owner thread.
    pub fn can_execute_on_background_thread(&self) -> bool {
        self.inner.can_execute_on_background_thread()
    }

    /// Code produced by a successful finalize.
    pub fn output(&self) -> Option<CodeOutput> {
        self.output
    }

    /// Thread that created the job.
    pub fn owner_thread(&self) -> ThreadId {
        self.owner_thread
    }

    /// Run the prepare phase on the owner thread.
    pub fn prepare(&mut self, owner: &OwnerThread) -> JobStatus {
        owner.check(self.owner_thread);
        self.expect_state(JobState::ReadyToPrepare, "prepare");

        if self.unit.is_optimizing() {
            tracing::info!(
                function = %self.unit.name,
                backend = %self.backend,
                osr = self.unit.is_osr(),
                "Compiling method"
            );
        }

        let start = Instant::now();
        let result = self.inner.prepare(&mut self.unit.dependencies);
        self.timings.prepare += start.elapsed();
        self.update_state(result, JobState::ReadyToExecute)
    }

    /// Run the execute phase.
    ///
    /// Background-eligible jobs may call this from any thread; others only
    /// from the owner thread.
    pub fn execute(&mut self) -> JobStatus {
        self.expect_state(JobState::ReadyToExecute, "execute");

        let _revoked = if self.inner.can_execute_on_background_thread() {
            self.executed_on_background_thread = thread::current().id() != self.owner_thread;
            Some(CapabilityScope::revoke(&[
                Capability::HeapAccess,
                Capability::DependencyChange,
            ]))
        } else {
            assert_eq!(
                thread::current().id(),
                self.owner_thread,
                "{} jobs must execute on the owner thread",
                self.backend
            );
            None
        };

        let start = Instant::now();
        let result = self.inner.execute();
        self.timings.execute += start.elapsed();
        self.update_state(result, JobState::ReadyToFinalize)
    }

    /// Run the finalize phase on the owner thread.
    pub fn finalize(&mut self, owner: &OwnerThread) -> JobStatus {
        owner.check(self.owner_thread);
        self.expect_state(JobState::ReadyToFinalize, "finalize");
        assert!(
            !self.unit.dependencies.has_aborted(),
            "finalize() with aborted dependencies"
        );
        let _revoked = CapabilityScope::revoke(&[Capability::DependencyChange]);

        let start = Instant::now();
        let result = self.inner.finalize();
        self.timings.finalize += start.elapsed();
        match result {
            Ok(output) => {
                self.output = Some(output);
                self.state = JobState::Succeeded;
                JobStatus::Succeeded
            }
            Err(failure) => self.fail(failure),
        }
    }

    /// Stop the job with a transient bailout.
    pub fn retry_optimization(&mut self, reason: BailoutReason) -> JobStatus {
        assert!(self.unit.is_optimizing(), "retry_optimization() on an unoptimized job");
        self.unit.set_bailout(Bailout::retry(reason));
        self.state = JobState::Failed;
        JobStatus::Failed
    }

    /// Stop the job with a sticky bailout.
    pub fn abort_optimization(&mut self, reason: BailoutReason) -> JobStatus {
        assert!(self.unit.is_optimizing(), "abort_optimization() on an unoptimized job");
        self.unit.set_bailout(Bailout::abort(reason));
        self.state = JobState::Failed;
        JobStatus::Failed
    }

    /// Record size and count of a successful unoptimized compile.
    pub fn record_unoptimized_stats(&self, telemetry: &dyn TelemetrySink) {
        if let Some(output) = self.output {
            telemetry.unoptimized_compiled(self.backend, output.size);
        }
    }

    /// Record timings of a successful optimized compile.
    pub fn record_optimized_stats(&self, telemetry: &dyn TelemetrySink) {
        assert!(self.unit.is_optimizing());
        tracing::info!(
            function = %self.unit.name,
            prepare_ms = self.timings.prepare.as_secs_f64() * 1000.0,
            execute_ms = self.timings.execute.as_secs_f64() * 1000.0,
            finalize_ms = self.timings.finalize.as_secs_f64() * 1000.0,
            "Optimized function"
        );
        let size = self.output.map(|output| output.size).unwrap_or(0);
        telemetry.optimized_compiled(&self.timings, size);
    }

    fn expect_state(&self, expected: JobState, phase: &str) {
        assert!(
            self.state == expected,
            "{}() called in state {:?}, expected {:?}",
            phase,
            self.state,
            expected
        );
    }

    fn update_state(&mut self, result: Result<(), JobFailure>, next: JobState) -> JobStatus {
        match result {
            Ok(()) => {
                self.state = next;
                JobStatus::Succeeded
            }
            Err(failure) => self.fail(failure),
        }
    }

    fn fail(&mut self, failure: JobFailure) -> JobStatus {
        match failure {
            JobFailure::Bailout(bailout) if self.unit.is_optimizing() => match bailout.kind {
                BailoutKind::Retry => self.retry_optimization(bailout.reason),
                BailoutKind::Abort => self.abort_optimization(bailout.reason),
            },
            JobFailure::Bailout(bailout) => {
                self.unit.set_bailout(bailout);
                self.state = JobState::Failed;
                JobStatus::Failed
            }
            JobFailure::Error(error) => {
                self.unit.set_pending_error(error);
                self.state = JobState::Failed;
                JobStatus::Failed
            }
        }
    }
}

impl std::fmt::Debug for CompilationJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilationJob")
            .field("unit", &self.unit.name)
            .field("backend", &self.backend)
            .field("state", &self.state)
            .field("timings", &self.timings)
            .field("executed_on_background_thread", &self.executed_on_background_thread)
            .finish()
    }
}
