//! Per-function entry points: lazy compile, optimized compile, debug
//! recompile, OSR, instantiation and hot-call tiering.

use std::sync::Arc;

use core_types::{CodeId, CompileError, ContextId, FunctionId, SharedId};

use crate::cache::optimized;
use crate::engine::Engine;
use crate::feedback::OptimizationMarker;
use crate::optimize::{ConcurrencyMode, OptimizeOutcome};
use crate::osr::OsrTarget;
use crate::unit::CompilationUnit;

impl Engine {
    fn function_unit(&self, shared: SharedId, closure: Option<FunctionId>) -> CompilationUnit {
        let info = self.heap.shared(shared);
        let source = Arc::clone(&self.heap.script(info.script).source);
        CompilationUnit::function(&self.owner, info, source, closure, self.config.stack_limit)
    }

    /// Compile `function` so it can be called.
    ///
    /// Does nothing for functions that already have code. Otherwise the
    /// function gets its metadata's code (compiling it lazily if needed) or
    /// cached optimized code, plus a feedback record.
    pub fn compile(&mut self, function: FunctionId) -> Result<(), CompileError> {
        if self.heap.function(function).is_compiled() {
            return Ok(());
        }
        let code = self.get_lazy_code(function)?;
        self.heap.function_mut(function).code = code;
        self.heap.ensure_feedback(function);
        Ok(())
    }

    fn get_lazy_code(&mut self, function: FunctionId) -> Result<CodeId, CompileError> {
        let shared = self.heap.function(function).shared;
        if self.heap.shared(shared).is_compiled() {
            self.heap.ensure_feedback(function);
            if let Some(code) = optimized::lookup(&mut self.heap, function, false) {
                return Ok(code);
            }
            return Ok(self.heap.shared(shared).code);
        }

        let mut unit = self.function_unit(shared, Some(function));
        tracing::debug!(function = %unit.name, "Lazy compiling");
        self.parse_unit(&mut unit)?;
        self.compile_unoptimized_code(unit)?;

        if self.config.always_optimize && !self.heap.shared(shared).has_asm_data() {
            self.heap.ensure_feedback(function);
            if let OptimizeOutcome::Optimized(code) =
                self.get_optimized_code(function, ConcurrencyMode::NotConcurrent, None)
            {
                return Ok(code);
            }
        }
        Ok(self.heap.shared(shared).code)
    }

    /// Optimize `function` and install whatever code results.
    ///
    /// Optimized code is installed on success, a pending trampoline while a
    /// background job runs, and the unoptimized code otherwise. The
    /// function is always compiled afterwards.
    pub fn compile_optimized(
        &mut self,
        function: FunctionId,
        mode: ConcurrencyMode,
    ) -> Result<OptimizeOutcome, CompileError> {
        if self.heap.is_optimized(function) {
            return Ok(OptimizeOutcome::Optimized(self.heap.function(function).code));
        }
        self.heap.ensure_feedback(function);

        let outcome = self.get_optimized_code(function, mode, None);
        let code = match outcome.code() {
            Some(code) => code,
            None => {
                let shared = self.heap.function(function).shared;
                if self.heap.shared(shared).is_compiled() {
                    self.heap.shared(shared).code
                } else {
                    self.get_lazy_code(function)?
                }
            }
        };
        self.heap.function_mut(function).code = code;
        self.heap.ensure_feedback(function);
        Ok(outcome)
    }

    /// Recompile `shared` for the debugger.
    ///
    /// Failures are swallowed; the function keeps its previous code.
    pub fn compile_debug_code(&mut self, shared: SharedId) -> bool {
        let mut unit = self.function_unit(shared, None);
        unit.flags.is_debug = true;
        let result = match self.parse_unit(&mut unit) {
            Ok(()) => self.compile_unoptimized_code(unit),
            Err(error) => Err(error),
        };
        match result {
            Ok(_) => true,
            Err(error) => {
                tracing::debug!(shared = %shared, error = %error, "Debug compile failed");
                false
            }
        }
    }

    /// Make sure `shared` has bytecode, compiling it if it has no code.
    ///
    /// Returns whether bytecode is installed; asm module data never counts.
    pub fn ensure_bytecode(&mut self, shared: SharedId) -> Result<bool, CompileError> {
        if !self.heap.shared(shared).is_compiled() {
            let mut unit = self.function_unit(shared, None);
            self.parse_unit(&mut unit)?;
            self.compile_unoptimized_code(unit)?;
        }
        let info = self.heap.shared(shared);
        Ok(!info.has_asm_data() && info.has_bytecode())
    }

    /// Optimize `function` for entry into a running activation.
    ///
    /// The target must match the code backing the activation: interpreted
    /// frames need bytecode and legacy frames need legacy code. A mismatch
    /// is rejected before any job is created. The returned code is for the
    /// caller to enter; the function's own code is left alone.
    pub fn compile_for_osr(
        &mut self,
        function: FunctionId,
        target: OsrTarget,
    ) -> Result<OptimizeOutcome, CompileError> {
        let shared = self.heap.function(function).shared;
        target.check_source(self.heap.shared(shared).has_bytecode())?;
        tracing::debug!(
            function = %self.heap.shared(shared).name,
            offset = target.offset().value(),
            "Compiling for on-stack replacement"
        );
        Ok(self.get_optimized_code(function, ConcurrencyMode::NotConcurrent, Some(target)))
    }

    /// Finish setting up a freshly created function instance.
    pub fn post_instantiation(&mut self, function: FunctionId) {
        let shared = self.heap.function(function).shared;
        let info = self.heap.shared(shared);
        if self.config.always_optimize
            && info.allows_lazy_compilation
            && !info.has_asm_data()
            && info.is_compiled()
        {
            self.heap.ensure_feedback(function);
            let has_optimized = self
                .heap
                .function(function)
                .feedback
                .as_ref()
                .is_some_and(|feedback| feedback.optimized_code().is_some());
            if !self.heap.is_optimized(function) && !has_optimized {
                if let Some(feedback) = self.heap.function_mut(function).feedback.as_mut() {
                    feedback.set_marker(OptimizationMarker::CompileOptimized);
                }
            }
        }

        if self.heap.shared(shared).is_compiled() {
            self.heap.ensure_feedback(function);
            if let Some(code) = optimized::lookup(&mut self.heap, function, false) {
                self.heap.function_mut(function).code = code;
            }
        }
    }

    /// Create a function instance of `shared` in `context`.
    pub fn instantiate(&mut self, shared: SharedId, context: ContextId) -> FunctionId {
        let function = self.heap.new_function(shared, context);
        self.post_instantiation(function);
        function
    }

    /// Count a call of `function` and tier it up when it gets hot.
    ///
    /// A pending optimization marker is honored first. Functions that are
    /// queued, already optimized or have optimization disabled are left
    /// alone. Returns the optimization outcome when one was attempted.
    pub fn on_hot_call(&mut self, function: FunctionId) -> Result<Option<OptimizeOutcome>, CompileError> {
        let shared = self.heap.function(function).shared;
        let disabled = self.heap.shared(shared).optimization_disabled();
        let optimized = self.heap.is_optimized(function);
        let threshold = self.config.hotness_threshold;
        let concurrent = self.scheduler.is_some();

        let Some(feedback) = self.heap.function_mut(function).feedback.as_mut() else {
            return Ok(None);
        };
        if feedback.is_in_optimization_queue() {
            return Ok(None);
        }
        if disabled || optimized {
            feedback.clear_marker();
            return Ok(None);
        }

        let mode = match feedback.marker() {
            OptimizationMarker::CompileOptimized => Some(ConcurrencyMode::NotConcurrent),
            OptimizationMarker::CompileOptimizedConcurrent => Some(ConcurrencyMode::Concurrent),
            OptimizationMarker::None | OptimizationMarker::InOptimizationQueue => {
                feedback.profiler_ticks += 1;
                if feedback.profiler_ticks < threshold {
                    None
                } else if concurrent {
                    Some(ConcurrencyMode::Concurrent)
                } else {
                    Some(ConcurrencyMode::NotConcurrent)
                }
            }
        };
        match mode {
            Some(mode) => self.compile_optimized(function, mode).map(Some),
            None => Ok(None),
        }
    }

    /// Lift a sticky optimization disable, e.g. after a debugger detached.
    pub fn reset_optimization(&mut self, shared: SharedId) {
        let info = self.heap.shared_mut(shared);
        if let Some(reason) = info.disable_optimization_reason() {
            tracing::info!(function = %info.name, reason = %reason, "Re-enabling optimization");
        }
        info.enable_optimization();
    }

    /// Attach or detach debugger break information.
    ///
    /// Detaching re-enables optimization if it was disabled only because
    /// the function was being debugged.
    pub fn set_break_info(&mut self, shared: SharedId, attached: bool) {
        let info = self.heap.shared_mut(shared);
        info.has_break_info = attached;
        if !attached
            && info.disable_optimization_reason()
                == Some(core_types::BailoutReason::FunctionBeingDebugged)
        {
            self.reset_optimization(shared);
        }
    }
}
