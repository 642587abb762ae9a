//! Compilation units: the description of one thing to compile.
//!
//! A unit is owned by whichever component currently drives it. Its heap
//! references live in a [`HandleBlock`]; everything else is plain data, so
//! a unit can travel with its job to a background worker and back.

use std::sync::Arc;

use core_types::{
    Bailout, CompileError, FunctionId, LanguageMode, LiteralId, ParseRestriction, ScriptId,
    NO_SOURCE_POSITION,
};
use parking_lot::Mutex;

use crate::dependencies::CompilationDependencies;
use crate::handles::{HandleBlock, OwnerThread};
use crate::heap::{Function, SharedInfo};
use crate::literal::{FunctionLiteral, InternTable};
use crate::osr::OsrTarget;

/// Flags describing how a unit is compiled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitFlags {
    /// Compiled by eval or the `Function` constructor
    pub is_eval: bool,
    /// Compiled for the debugger
    pub is_debug: bool,
    /// Top-level code of a script
    pub is_toplevel: bool,
    /// The result will be serialized into a code cache
    pub will_serialize: bool,
    /// Source is a module
    pub is_module: bool,
}

/// One function or top-level script considered for compilation.
#[derive(Debug)]
pub struct CompilationUnit {
    handles: HandleBlock,
    /// Source text of the owning script
    pub source: Arc<str>,
    /// Name used in traces
    pub name: String,
    /// Declared language mode
    pub language_mode: LanguageMode,
    /// Compile flags
    pub flags: UnitFlags,
    /// What the parser may accept
    pub restriction: ParseRestriction,
    /// End of the parameter list for `Function` constructor sources
    pub parameters_end_pos: i32,
    /// Literal to parse for function units
    pub literal_id: LiteralId,
    /// Depth budget for eagerly compiled nested literals
    pub stack_limit: usize,
    /// Optimize directly from installed bytecode
    pub optimizing_from_bytecode: bool,
    /// Fold the enclosing context into the result
    pub context_specializing: bool,
    /// Assumptions the result relies on
    pub dependencies: CompilationDependencies,
    literal: Option<Arc<FunctionLiteral>>,
    interner: Arc<Mutex<InternTable>>,
    osr: Option<OsrTarget>,
    optimizing: bool,
    depth: usize,
    bailout: Option<Bailout>,
    pending_error: Option<CompileError>,
}

impl CompilationUnit {
    fn blank(handles: HandleBlock, source: Arc<str>, name: String, stack_limit: usize) -> Self {
        Self {
            handles,
            source,
            name,
            language_mode: LanguageMode::Sloppy,
            flags: UnitFlags::default(),
            restriction: ParseRestriction::NoParseRestriction,
            parameters_end_pos: NO_SOURCE_POSITION,
            literal_id: LiteralId(0),
            stack_limit,
            optimizing_from_bytecode: false,
            context_specializing: false,
            dependencies: CompilationDependencies::new(),
            literal: None,
            interner: Arc::new(Mutex::new(InternTable::new())),
            osr: None,
            optimizing: false,
            depth: 0,
            bailout: None,
            pending_error: None,
        }
    }

    /// Unit for the top-level code of `script`.
    pub fn toplevel(
        owner: &OwnerThread,
        script: ScriptId,
        source: Arc<str>,
        language_mode: LanguageMode,
        flags: UnitFlags,
        stack_limit: usize,
    ) -> Self {
        let handles = HandleBlock::new(owner, script);
        let mut unit = Self::blank(handles, source, String::new(), stack_limit);
        unit.language_mode = language_mode;
        unit.flags = UnitFlags {
            is_toplevel: true,
            ..flags
        };
        unit
    }

    /// Unit for lazily compiling the function described by `shared`.
    pub fn function(
        owner: &OwnerThread,
        shared: &SharedInfo,
        source: Arc<str>,
        closure: Option<FunctionId>,
        stack_limit: usize,
    ) -> Self {
        let mut handles = HandleBlock::new(owner, shared.script);
        handles.set_shared(owner, shared.id);
        if let Some(closure) = closure {
            handles.set_closure(owner, closure);
        }
        let mut unit = Self::blank(handles, source, shared.name.clone(), stack_limit);
        unit.language_mode = shared.language_mode;
        unit.literal_id = shared.literal_id;
        unit.flags.is_toplevel = shared.is_toplevel;
        unit
    }

    /// Unit for an eager nested literal, sharing the outer unit's
    /// interning table and compile flags.
    ///
    /// The literal's metadata is usually created when the outer unit is
    /// installed; record it with [`HandleBlock::set_shared`] before the
    /// unit is finalized.
    pub fn inner(owner: &OwnerThread, outer: &CompilationUnit, literal: Arc<FunctionLiteral>) -> Self {
        let handles = HandleBlock::new(owner, outer.handles.script(owner));
        let mut unit = Self::blank(
            handles,
            Arc::clone(&outer.source),
            literal.name.clone(),
            outer.stack_limit,
        );
        unit.language_mode = literal.language_mode;
        unit.literal_id = literal.id;
        unit.flags = UnitFlags {
            is_debug: outer.flags.is_debug,
            will_serialize: outer.flags.will_serialize,
            ..UnitFlags::default()
        };
        unit.interner = Arc::clone(&outer.interner);
        unit.depth = outer.depth + 1;
        unit.literal = Some(literal);
        unit
    }

    /// Unit for optimizing `function`.
    pub fn optimizing(
        owner: &OwnerThread,
        function: &Function,
        shared: &SharedInfo,
        source: Arc<str>,
        osr: Option<OsrTarget>,
        stack_limit: usize,
    ) -> Self {
        let mut unit = Self::function(owner, shared, source, Some(function.id), stack_limit);
        unit.handles.set_context(owner, function.context);
        unit.optimizing = true;
        unit.osr = osr;
        unit
    }

    /// Heap references of this unit.
    pub fn handles(&self) -> &HandleBlock {
        &self.handles
    }

    /// Mutable heap references of this unit.
    pub fn handles_mut(&mut self) -> &mut HandleBlock {
        &mut self.handles
    }

    /// Parsed literal, once available.
    pub fn literal(&self) -> Option<&Arc<FunctionLiteral>> {
        self.literal.as_ref()
    }

    /// Record the parsed literal.
    pub fn set_literal(&mut self, literal: Arc<FunctionLiteral>) {
        self.literal = Some(literal);
    }

    /// Interning table shared with nested units.
    pub fn interner(&self) -> &Arc<Mutex<InternTable>> {
        &self.interner
    }

    /// Nesting depth below the unit that started the compile.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether this unit targets the optimizing tier.
    pub fn is_optimizing(&self) -> bool {
        self.optimizing
    }

    /// OSR target, for OSR compiles.
    pub fn osr(&self) -> Option<OsrTarget> {
        self.osr
    }

    /// Whether this is an OSR compile.
    pub fn is_osr(&self) -> bool {
        self.osr.is_some()
    }

    /// Recorded bailout, if optimization stopped.
    pub fn bailout(&self) -> Option<Bailout> {
        self.bailout
    }

    pub(crate) fn set_bailout(&mut self, bailout: Bailout) {
        self.bailout = Some(bailout);
    }

    /// Error left by a failed phase.
    pub fn pending_error(&self) -> Option<&CompileError> {
        self.pending_error.as_ref()
    }

    /// Record an error. The first error wins.
    pub fn set_pending_error(&mut self, error: CompileError) {
        if self.pending_error.is_none() {
            self.pending_error = Some(error);
        }
    }

    /// Take the pending error, leaving none.
    pub fn take_pending_error(&mut self) -> Option<CompileError> {
        self.pending_error.take()
    }

    /// Forget the outcome of a failed job so the unit can be compiled again.
    pub(crate) fn clear_failure(&mut self) {
        self.bailout = None;
        self.pending_error = None;
    }
}
