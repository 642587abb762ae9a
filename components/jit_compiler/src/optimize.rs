//! Optimized compiles.
//!
//! [`Engine::get_optimized_code`] is the single entry into the optimizing
//! tier. It serves cached code when it can, refuses functions that must
//! not be optimized, and otherwise runs the job either inline
//! ([`ConcurrencyMode::NotConcurrent`]) or through the worker pool
//! ([`ConcurrencyMode::Concurrent`]). Background jobs come back through
//! [`Engine::install_optimized_functions`] or [`Engine::flush`], which
//! re-validate them before installing anything.

use core_types::{Bailout, BailoutReason, CodeId, FunctionId, SharedId};

use crate::backend::BackendKind;
use crate::cache::optimized;
use crate::engine::Engine;
use crate::feedback::OptimizationMarker;
use crate::heap::{Builtin, CodeKind};
use crate::job::{CompilationJob, JobState, JobStatus};
use crate::osr::OsrTarget;
use crate::scheduler::OptimizationTicket;
use crate::telemetry::{CodeEventTag, DeclineReason};
use crate::unit::CompilationUnit;

/// How an optimized compile is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyMode {
    /// Run all phases inline on the owner thread
    NotConcurrent,
    /// Execute on a worker and finalize later
    Concurrent,
}

/// Result of an optimization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizeOutcome {
    /// Optimized code is ready
    Optimized(CodeId),
    /// A background job is pending; run this trampoline meanwhile
    Queued(CodeId),
    /// A backpressure gate declined the request; try again later
    Declined(DeclineReason),
    /// Optimization gave up
    Bailout(Bailout),
    /// The function could not be parsed for optimization
    Failed,
}

impl OptimizeOutcome {
    /// Code to run, if the request produced any.
    pub fn code(&self) -> Option<CodeId> {
        match self {
            OptimizeOutcome::Optimized(code) | OptimizeOutcome::Queued(code) => Some(*code),
            _ => None,
        }
    }
}

impl Engine {
    /// Optimize `function`, or serve its cached optimized code.
    ///
    /// OSR requests always run inline and bypass the cache. Callers must
    /// have validated the OSR target against the function.
    pub fn get_optimized_code(
        &mut self,
        function: FunctionId,
        mode: ConcurrencyMode,
        osr: Option<OsrTarget>,
    ) -> OptimizeOutcome {
        let owner = self.owner;
        let shared = self.heap.function(function).shared;

        if osr.is_none() && self.heap.function(function).is_in_optimization_queue() {
            return OptimizeOutcome::Queued(self.pending_trampoline(function));
        }
        if let Some(feedback) = self.heap.function_mut(function).feedback.as_mut() {
            if feedback.has_marker() && !feedback.is_in_optimization_queue() {
                feedback.clear_marker();
            }
        }

        if let Some(code) = optimized::lookup(&mut self.heap, function, osr.is_some()) {
            tracing::debug!(function = %self.heap.shared(shared).name, code = %code, "Found optimized code in cache");
            return OptimizeOutcome::Optimized(code);
        }

        if let Some(feedback) = self.heap.function_mut(function).feedback.as_mut() {
            feedback.profiler_ticks = 0;
        }

        let info = self.heap.shared(shared);
        let source = std::sync::Arc::clone(&self.heap.script(info.script).source);
        let unit = CompilationUnit::optimizing(
            &owner,
            self.heap.function(function),
            info,
            source,
            osr,
            self.config.stack_limit,
        );
        let mut job = CompilationJob::new(unit, BackendKind::Optimizing, &self.backends, &owner);

        let info = self.heap.shared(shared);
        let refusal = if info.has_break_info {
            Some(BailoutReason::FunctionBeingDebugged)
        } else if info.disable_optimization_reason() == Some(BailoutReason::OptimizationDisabledForTest) {
            Some(BailoutReason::OptimizationDisabledForTest)
        } else if !self.config.optimize || !self.config.passes_filter(&info.name) {
            Some(BailoutReason::OptimizationDisabled)
        } else {
            None
        };
        if let Some(reason) = refusal {
            job.abort_optimization(reason);
            return self.optimization_failed(shared, &job);
        }

        job.unit_mut().optimizing_from_bytecode = info.has_bytecode();
        if let Some(target) = osr {
            debug_assert!(target.check_source(info.has_bytecode()).is_ok());
        }
        job.unit_mut().context_specializing = self.config.context_specialization && osr.is_none();

        let concurrent = mode == ConcurrencyMode::Concurrent && osr.is_none() && self.scheduler.is_some();
        if concurrent && !job.can_execute_on_background_thread() {
            tracing::debug!(function = %job.unit().name, "Job must execute on the owner thread, optimizing inline");
            return self.optimize_now(job, function);
        }
        if concurrent {
            self.optimize_later(job, function)
        } else {
            self.optimize_now(job, function)
        }
    }

    /// Code a function runs while its background job is in flight.
    fn pending_trampoline(&self, function: FunctionId) -> CodeId {
        let shared = self.heap.function(function).shared;
        if self.heap.shared(shared).has_bytecode() {
            Builtin::InterpreterEntryTrampoline.code_id()
        } else {
            Builtin::CheckOptimizationMarker.code_id()
        }
    }

    fn parse_for_optimization(&self, job: &mut CompilationJob) -> bool {
        if job.unit().optimizing_from_bytecode {
            return true;
        }
        let unit = job.unit_mut();
        let parsed = self.parse_unit(unit).and_then(|()| self.analyze_unit(unit).map(|_| ()));
        match parsed {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(function = %job.unit().name, error = %error, "Could not parse for optimization");
                false
            }
        }
    }

    fn optimize_now(&mut self, mut job: CompilationJob, function: FunctionId) -> OptimizeOutcome {
        let owner = self.owner;
        let shared = self.heap.function(function).shared;
        if !self.parse_for_optimization(&mut job) {
            return OptimizeOutcome::Failed;
        }

        let mut status = job.prepare(&owner);
        if status == JobStatus::Succeeded {
            self.assumptions.watch(&job.unit().dependencies);
            status = job.execute();
        }
        if status == JobStatus::Succeeded {
            status = if job.unit().dependencies.has_aborted() {
                job.retry_optimization(BailoutReason::BailedOutDueToDependencyChange)
            } else {
                job.finalize(&owner)
            };
        }
        if status == JobStatus::Failed {
            self.assumptions.unwatch(&job.unit().dependencies);
            return self.optimization_failed(shared, &job);
        }

        job.record_optimized_stats(self.telemetry.as_ref());
        let code = self.install_optimized_artifact(&job, function);
        OptimizeOutcome::Optimized(code)
    }

    fn optimize_later(&mut self, mut job: CompilationJob, function: FunctionId) -> OptimizeOutcome {
        let owner = self.owner;
        let shared = self.heap.function(function).shared;
        let name = job.unit().name.clone();

        let queue_available = self
            .scheduler
            .as_ref()
            .is_some_and(|scheduler| scheduler.is_queue_available());
        if !queue_available {
            tracing::info!(function = %name, "Compilation queue full, will retry optimizing");
            self.telemetry.enqueue_declined(DeclineReason::QueueFull);
            return OptimizeOutcome::Declined(DeclineReason::QueueFull);
        }
        if self.memory.high_memory_pressure() {
            tracing::info!(function = %name, "High memory pressure, will retry optimizing");
            self.telemetry.enqueue_declined(DeclineReason::MemoryPressure);
            return OptimizeOutcome::Declined(DeclineReason::MemoryPressure);
        }

        if !self.parse_for_optimization(&mut job) {
            return OptimizeOutcome::Failed;
        }
        if job.prepare(&owner) == JobStatus::Failed {
            return self.optimization_failed(shared, &job);
        }
        self.assumptions.watch(&job.unit().dependencies);

        let ticket = OptimizationTicket::new(job, function);
        let queued = match self.scheduler.as_mut() {
            Some(scheduler) => scheduler.queue(&owner, ticket),
            None => Err(ticket),
        };
        if let Err(ticket) = queued {
            let job = ticket.into_job();
            self.assumptions.unwatch(&job.unit().dependencies);
            tracing::warn!(function = %name, "Optimizing workers are gone");
            return OptimizeOutcome::Failed;
        }

        if let Some(feedback) = self.heap.function_mut(function).feedback.as_mut() {
            feedback.set_marker(OptimizationMarker::InOptimizationQueue);
        }
        tracing::info!(function = %name, "Queued for concurrent optimization");
        OptimizeOutcome::Queued(self.pending_trampoline(function))
    }

    /// Allocate and register the code of a succeeded optimizing job.
    fn install_optimized_artifact(&mut self, job: &CompilationJob, function: FunctionId) -> CodeId {
        let shared = self.heap.function(function).shared;
        let size = job.output().map(|output| output.size).unwrap_or(0);
        let unit = job.unit();

        let code = self.heap.new_code(CodeKind::Optimized, size, Some(shared));
        let artifact = self.heap.code_mut(code);
        artifact.osr_offset = unit.osr().map(|target| target.offset().value());
        artifact.context_specialized = unit.context_specializing;

        self.assumptions.commit(code, &unit.dependencies);
        optimized::insert(
            &mut self.heap,
            function,
            code,
            unit.context_specializing,
            unit.is_osr(),
        );
        self.telemetry.code_created(CodeEventTag::Optimized, code, &unit.name);
        code
    }

    /// Record a failed optimizing job: trace, telemetry and the sticky
    /// disable for aborts.
    fn optimization_failed(&mut self, shared: SharedId, job: &CompilationJob) -> OptimizeOutcome {
        let Some(bailout) = job.unit().bailout() else {
            return OptimizeOutcome::Failed;
        };
        tracing::info!(
            function = %job.unit().name,
            reason = %bailout.reason,
            abort = bailout.is_abort(),
            "Aborted optimizing"
        );
        self.telemetry.bailout(&bailout);
        if bailout.is_abort() {
            self.heap.shared_mut(shared).disable_optimization(bailout.reason);
        }
        OptimizeOutcome::Bailout(bailout)
    }

    /// Finalize a job that came back from a worker.
    fn finalize_optimized(&mut self, ticket: OptimizationTicket) -> bool {
        let owner = self.owner;
        let function = ticket.function();
        let mut job = ticket.into_job();
        let shared = self.heap.function(function).shared;
        self.assumptions.unwatch(&job.unit().dependencies);

        if let Some(feedback) = self.heap.function_mut(function).feedback.as_mut() {
            feedback.profiler_ticks = 0;
        }

        // A job whose execute phase panicked comes back still ReadyToExecute.
        if job.state() == JobState::ReadyToFinalize {
            if self.heap.shared(shared).optimization_disabled() {
                job.retry_optimization(BailoutReason::OptimizationDisabled);
            } else if job.unit().dependencies.has_aborted() {
                job.retry_optimization(BailoutReason::BailedOutDueToDependencyChange);
            } else if job.finalize(&owner) == JobStatus::Succeeded {
                job.record_optimized_stats(self.telemetry.as_ref());
                let code = self.install_optimized_artifact(&job, function);
                tracing::info!(function = %job.unit().name, code = %code, "Completed optimizing");
                let target = self.heap.function_mut(function);
                target.code = code;
                if let Some(feedback) = target.feedback.as_mut() {
                    feedback.clear_marker();
                }
                return true;
            }
        }

        self.optimization_failed(shared, &job);
        let unoptimized = self.heap.shared(shared).code;
        let target = self.heap.function_mut(function);
        target.code = unoptimized;
        if let Some(feedback) = target.feedback.as_mut() {
            if feedback.is_in_optimization_queue() {
                feedback.clear_marker();
            }
        }
        false
    }

    /// Finalize every background job that has finished, without waiting.
    ///
    /// Returns how many jobs installed optimized code.
    pub fn install_optimized_functions(&mut self) -> usize {
        let owner = self.owner;
        let completed = match self.scheduler.as_mut() {
            Some(scheduler) => scheduler.take_completed(&owner),
            None => return 0,
        };
        completed
            .into_iter()
            .map(|ticket| self.finalize_optimized(ticket))
            .filter(|installed| *installed)
            .count()
    }

    /// Wait for every in-flight background job and finalize it.
    ///
    /// Returns how many jobs installed optimized code.
    pub fn flush(&mut self) -> usize {
        let owner = self.owner;
        let mut installed = 0;
        loop {
            let ticket = match self.scheduler.as_mut() {
                Some(scheduler) => scheduler.wait_completed(&owner),
                None => None,
            };
            let Some(ticket) = ticket else {
                break;
            };
            if self.finalize_optimized(ticket) {
                installed += 1;
            }
        }
        installed
    }
}
