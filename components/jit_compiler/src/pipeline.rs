//! Unoptimized pipeline.
//!
//! A parsed unit is analyzed, which also collects the eager nested literals
//! into a flat list. The unit is then compiled by the asm validator when
//! asm validation applies, falling back silently to the selected
//! unoptimized backend. Finalization installs the code on the unit's
//! function metadata. Finally each eager nested literal that is not
//! compiled yet goes through the same steps, sharing the outer unit's
//! interning table.

use std::sync::Arc;

use core_types::{CodeId, CompileError, SharedId};

use crate::backend::{BackendKind, CodeOutput};
use crate::engine::Engine;
use crate::heap::{Builtin, CodeKind};
use crate::interfaces::ParseRequest;
use crate::job::{CompilationJob, JobStatus};
use crate::literal::FunctionLiteral;
use crate::telemetry::CodeEventTag;
use crate::tier::{select_unoptimized_backend, use_asm_validation};
use crate::unit::CompilationUnit;

/// Error a failed unoptimized job leaves behind.
///
/// A job that failed without recording an error ran out of resources.
pub(crate) fn take_job_error(job: &mut CompilationJob) -> CompileError {
    job.unit_mut()
        .take_pending_error()
        .unwrap_or(CompileError::StackOverflow)
}

pub(crate) fn literal_of(unit: &CompilationUnit) -> Result<Arc<FunctionLiteral>, CompileError> {
    unit.literal()
        .cloned()
        .ok_or_else(|| CompileError::Analysis(format!("'{}' has not been parsed", unit.name)))
}

/// Collect eager literals below `literal`, parents first.
///
/// `depth` is the nesting depth of `literal`'s direct children.
fn collect_eager_literals(
    literal: &FunctionLiteral,
    depth: usize,
    stack_limit: usize,
    out: &mut Vec<Arc<FunctionLiteral>>,
) -> Result<(), CompileError> {
    for inner in literal.inner.iter().filter(|inner| inner.should_eager_compile) {
        if depth > stack_limit {
            return Err(CompileError::StackOverflow);
        }
        out.push(Arc::clone(inner));
        collect_eager_literals(inner, depth + 1, stack_limit, out)?;
    }
    Ok(())
}

impl Engine {
    /// Parse the unit's source and record the literal.
    pub(crate) fn parse_unit(&self, unit: &mut CompilationUnit) -> Result<(), CompileError> {
        let request = ParseRequest {
            source: Arc::clone(&unit.source),
            literal_id: unit.literal_id,
            is_toplevel: unit.flags.is_toplevel,
            is_eval: unit.flags.is_eval,
            is_module: unit.flags.is_module,
            language_mode: unit.language_mode,
            restriction: unit.restriction,
            parameters_end_pos: unit.parameters_end_pos,
        };
        let mut literal = self.parser.parse(&request)?;
        literal.language_mode = literal.language_mode.join(unit.language_mode);
        if unit.name.is_empty() {
            unit.name = literal.name.clone();
        }
        unit.set_literal(Arc::new(literal));
        Ok(())
    }

    /// Analyze the unit's literal and return its eager nested literals.
    pub(crate) fn analyze_unit(
        &self,
        unit: &mut CompilationUnit,
    ) -> Result<Vec<Arc<FunctionLiteral>>, CompileError> {
        let mut literal = FunctionLiteral::clone(&*literal_of(unit)?);
        self.parser.analyze(&mut literal)?;
        {
            let mut interner = unit.interner().lock();
            literal.walk(&mut |node| {
                interner.intern(&node.name);
            });
        }
        let mut eager = Vec::new();
        collect_eager_literals(&literal, unit.depth() + 1, unit.stack_limit, &mut eager)?;
        unit.set_literal(Arc::new(literal));
        Ok(eager)
    }

    /// Compile a parsed unit and its eager nested literals.
    ///
    /// Returns the unit's function metadata.
    pub(crate) fn compile_unoptimized_code(
        &mut self,
        mut unit: CompilationUnit,
    ) -> Result<SharedId, CompileError> {
        let owner = self.owner;
        let eager = self.analyze_unit(&mut unit)?;
        let literal = literal_of(&unit)?;

        let needs_legacy = std::iter::once(&literal)
            .chain(eager.iter())
            .any(|node| select_unoptimized_backend(&self.config, node) == BackendKind::Legacy);
        if needs_legacy {
            unit.interner().lock().internalize();
        }

        let inner_units: Vec<CompilationUnit> = eager
            .iter()
            .map(|node| CompilationUnit::inner(&owner, &unit, Arc::clone(node)))
            .collect();

        let shared = self.generate_unoptimized_code(unit)?;

        for mut inner in inner_units {
            let inner_literal = literal_of(&inner)?;
            let script = inner.handles().script(&owner);
            let inner_shared = match self.heap.find_shared_for_literal(script, inner_literal.id) {
                Some(existing) => existing,
                None => self.heap.new_shared_for_literal(&inner_literal, script),
            };
            if self.heap.shared(inner_shared).is_compiled() {
                continue;
            }
            inner.handles_mut().set_shared(&owner, inner_shared);
            self.generate_unoptimized_code(inner)?;
        }
        Ok(shared)
    }

    /// Run one analyzed unit through the asm validator or its unoptimized
    /// backend, then finalize it.
    fn generate_unoptimized_code(&mut self, mut unit: CompilationUnit) -> Result<SharedId, CompileError> {
        let owner = self.owner;
        let literal = literal_of(&unit)?;
        let asm_wasm_broken = unit
            .handles()
            .shared(&owner)
            .is_some_and(|shared| self.heap.shared(shared).asm_wasm_broken);

        if use_asm_validation(&self.config, &unit, asm_wasm_broken) {
            let mut job = CompilationJob::new(unit, BackendKind::AsmValidator, &self.backends, &owner);
            if job.prepare(&owner) == JobStatus::Succeeded && job.execute() == JobStatus::Succeeded {
                if let Ok(shared) = self.finalize_unoptimized_job(&mut job, &literal) {
                    return Ok(shared);
                }
            }
            tracing::debug!(function = %job.unit().name, "Asm validation failed, falling back");
            unit = job.into_unit();
            unit.clear_failure();
        }

        let backend = select_unoptimized_backend(&self.config, &literal);
        let mut job = CompilationJob::new(unit, backend, &self.backends, &owner);
        if job.prepare(&owner) == JobStatus::Failed || job.execute() == JobStatus::Failed {
            return Err(take_job_error(&mut job));
        }
        self.finalize_unoptimized_job(&mut job, &literal)
    }

    /// Finalize an executed unoptimized job and install its code.
    pub(crate) fn finalize_unoptimized_job(
        &mut self,
        job: &mut CompilationJob,
        literal: &FunctionLiteral,
    ) -> Result<SharedId, CompileError> {
        let owner = self.owner;
        job.unit().interner().lock().internalize();

        let script = job.unit().handles().script(&owner);
        let shared = match job.unit().handles().shared(&owner) {
            Some(shared) => shared,
            None => {
                let shared = self.heap.new_shared_for_literal(literal, script);
                self.heap.shared_mut(shared).is_toplevel = true;
                job.unit_mut().handles_mut().set_shared(&owner, shared);
                shared
            }
        };
        if job.unit().flags.is_toplevel {
            self.heap.ensure_function_infos(script, literal.max_literal_id());
        }
        self.set_shared_flags_from_literal(shared, literal);

        if job.finalize(&owner) == JobStatus::Failed {
            return Err(take_job_error(job));
        }
        let Some(output) = job.output() else {
            return Err(take_job_error(job));
        };

        let code = self.install_unoptimized_code(shared, literal, output, job.unit().flags.is_debug);
        let unit = job.unit();
        let tag = if unit.flags.is_toplevel {
            if unit.flags.is_eval {
                CodeEventTag::Eval
            } else {
                CodeEventTag::Script
            }
        } else if unit.depth() > 0 {
            CodeEventTag::Function
        } else {
            CodeEventTag::LazyCompile
        };
        self.telemetry.code_created(tag, code, &unit.name);
        job.record_unoptimized_stats(self.telemetry.as_ref());
        tracing::debug!(
            function = %unit.name,
            backend = %job.backend(),
            size = output.size,
            "Compiled unoptimized code"
        );
        Ok(shared)
    }

    fn set_shared_flags_from_literal(&mut self, shared: SharedId, literal: &FunctionLiteral) {
        let info = self.heap.shared_mut(shared);
        info.length = Some(literal.function_length);
        info.has_duplicate_parameters = literal.has_duplicate_parameters;
        if let Some(reason) = literal.dont_optimize_reason {
            info.disable_optimization(reason);
        }
    }

    /// Make the metadata's feedback shape match the literal.
    ///
    /// The shape is (re)created for metadata without one or without code.
    /// Compiled metadata must already have exactly the literal's shape;
    /// anything else would invalidate live feedback records.
    fn ensure_feedback_metadata(&mut self, shared: SharedId, literal: &FunctionLiteral) {
        let info = self.heap.shared_mut(shared);
        if info.feedback_metadata.is_empty() || !info.is_compiled() {
            info.feedback_metadata = literal.feedback_spec.clone();
        }
        assert!(
            !info.feedback_metadata.spec_differs_from(&literal.feedback_spec),
            "feedback metadata of '{}' does not match its literal",
            info.name
        );
    }

    fn install_unoptimized_code(
        &mut self,
        shared: SharedId,
        literal: &FunctionLiteral,
        output: CodeOutput,
        is_debug: bool,
    ) -> CodeId {
        self.ensure_feedback_metadata(shared, literal);
        let code = self.heap.new_code(output.kind, output.size, Some(shared));
        self.heap.code_mut(code).executed_once = literal.should_be_used_once;

        let info = self.heap.shared_mut(shared);
        info.has_scope_info = true;
        match output.kind {
            CodeKind::Bytecode => {
                if is_debug {
                    info.bytecode = None;
                }
                assert!(info.bytecode.is_none(), "'{}' already has bytecode", info.name);
                info.bytecode = Some(code);
                info.code = Builtin::InterpreterEntryTrampoline.code_id();
            }
            CodeKind::AsmData => {
                info.asm_data = Some(code);
                info.code = Builtin::InstantiateAsm.code_id();
            }
            CodeKind::Legacy | CodeKind::Optimized | CodeKind::Builtin(_) => {
                info.code = code;
            }
        }

        let script = info.script;
        for inner in &literal.inner {
            if self.heap.find_shared_for_literal(script, inner.id).is_none() {
                self.heap.new_shared_for_literal(inner, script);
            }
        }
        code
    }

    /// Analyze a parsed unit and prepare an unoptimized job for it.
    ///
    /// For callers that execute the job themselves, possibly on another
    /// thread; hand it back to [`finalize_compilation_job`](Self::finalize_compilation_job).
    /// Eager nested literals are left for lazy compilation.
    pub fn prepare_unoptimized_job(&mut self, mut unit: CompilationUnit) -> Result<CompilationJob, CompileError> {
        let owner = self.owner;
        if unit.literal().is_none() {
            self.parse_unit(&mut unit)?;
        }
        self.analyze_unit(&mut unit)?;
        let literal = literal_of(&unit)?;
        let backend = select_unoptimized_backend(&self.config, &literal);
        let mut job = CompilationJob::new(unit, backend, &self.backends, &owner);
        if job.prepare(&owner) == JobStatus::Failed {
            return Err(take_job_error(&mut job));
        }
        Ok(job)
    }

    /// Finalize an unoptimized job prepared by
    /// [`prepare_unoptimized_job`](Self::prepare_unoptimized_job).
    pub fn finalize_compilation_job(&mut self, mut job: CompilationJob) -> Result<SharedId, CompileError> {
        assert!(
            !job.unit().is_optimizing(),
            "optimizing jobs are finalized by the scheduler"
        );
        let literal = literal_of(job.unit())?;
        self.finalize_unoptimized_job(&mut job, &literal)
    }
}
