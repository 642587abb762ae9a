//! Code-generation backends behind the uniform job protocol.
//!
//! The set of backends is closed: [`BackendKind`] names every tier and
//! [`Backends::get`] dispatches with an exhaustive match. Each backend
//! creates [`BackendJob`]s that implement the three phases; the job state
//! machine in [`crate::job`] enforces ordering, timing and thread rules
//! around them.

use std::fmt;
use std::sync::Arc;

use core_types::{Bailout, CompileError};

use crate::dependencies::CompilationDependencies;
use crate::heap::CodeKind;
use crate::unit::CompilationUnit;

/// Every code-generation tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Legacy unoptimized machine-code generator
    Legacy,
    /// Interpreter bytecode generator
    Interpreter,
    /// Optimizing compiler
    Optimizing,
    /// asm module validator
    AsmValidator,
}

impl BackendKind {
    /// Name used in traces.
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Legacy => "legacy",
            BackendKind::Interpreter => "interpreter",
            BackendKind::Optimizing => "optimizing",
            BackendKind::AsmValidator => "asm-validator",
        }
    }

    /// Kind of code a successful job of this backend produces.
    pub fn output_kind(self) -> CodeKind {
        match self {
            BackendKind::Legacy => CodeKind::Legacy,
            BackendKind::Interpreter => CodeKind::Bytecode,
            BackendKind::Optimizing => CodeKind::Optimized,
            BackendKind::AsmValidator => CodeKind::AsmData,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a successful finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeOutput {
    /// Kind of the produced code
    pub kind: CodeKind,
    /// Size in bytes including metadata
    pub size: usize,
}

/// Why a phase did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFailure {
    /// Optimization gave up; the unit keeps its current code
    Bailout(Bailout),
    /// The unit cannot be compiled
    Error(CompileError),
}

/// One backend's work on one unit.
///
/// Jobs are `Send` so background-eligible execute phases can run on a
/// worker thread. Prepare and finalize always run on the owner thread.
pub trait BackendJob: Send {
    /// Whether execute may run off the owner thread.
    fn can_execute_on_background_thread(&self) -> bool;

    /// Owner-thread setup. The only phase allowed to add dependencies.
    fn prepare(&mut self, dependencies: &mut CompilationDependencies) -> Result<(), JobFailure>;

    /// The heavy lifting. Must not touch the heap.
    fn execute(&mut self) -> Result<(), JobFailure>;

    /// Owner-thread completion.
    fn finalize(&mut self) -> Result<CodeOutput, JobFailure>;
}

/// A code generator.
pub trait Backend {
    /// Create a job for `unit`.
    ///
    /// Unoptimized backends always see a parsed unit. The optimizing
    /// backend is handed its unit before the parse, which is skipped
    /// entirely when optimizing from bytecode.
    fn new_job(&self, unit: &CompilationUnit) -> Box<dyn BackendJob>;
}

/// One backend per [`BackendKind`].
#[derive(Clone)]
pub struct Backends {
    legacy: Arc<dyn Backend>,
    interpreter: Arc<dyn Backend>,
    optimizing: Arc<dyn Backend>,
    asm_validator: Arc<dyn Backend>,
}

impl Backends {
    /// Assemble the backend set.
    pub fn new(
        legacy: Arc<dyn Backend>,
        interpreter: Arc<dyn Backend>,
        optimizing: Arc<dyn Backend>,
        asm_validator: Arc<dyn Backend>,
    ) -> Self {
        Self {
            legacy,
            interpreter,
            optimizing,
            asm_validator,
        }
    }

    /// Backend for `kind`.
    pub fn get(&self, kind: BackendKind) -> &dyn Backend {
        match kind {
            BackendKind::Legacy => self.legacy.as_ref(),
            BackendKind::Interpreter => self.interpreter.as_ref(),
            BackendKind::Optimizing => self.optimizing.as_ref(),
            BackendKind::AsmValidator => self.asm_validator.as_ref(),
        }
    }
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}
