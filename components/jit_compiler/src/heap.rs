//! Heap model: the arena of scripts, function metadata, function
//! instances, contexts and code artifacts.
//!
//! Objects reference each other by stable id. Back references (metadata to
//! script, function to metadata, context to parent) are plain ids, so no
//! object keeps another alive and there are no reference cycles.
//!
//! Allocation checks [`Capability::HeapAccess`]; it panics while a
//! background-eligible execute phase has revoked heap access on the
//! current thread.

use std::sync::Arc;

use core_types::{
    BailoutReason, CodeId, ContextId, FunctionId, FunctionKind, LanguageMode, LiteralId,
    ScriptId, SharedId,
};
use serde::{Deserialize, Serialize};

use crate::feedback::{FeedbackMetadata, FeedbackRecord};
use crate::handles::{Capability, CapabilityScope};
use crate::literal::FunctionLiteral;

/// Builtin code objects every heap starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// Installed on functions that have not been compiled yet
    CompileLazy,
    /// Entry into the interpreter for functions with bytecode
    InterpreterEntryTrampoline,
    /// Checks the optimization marker before running unoptimized code
    CheckOptimizationMarker,
    /// Instantiates a validated asm module
    InstantiateAsm,
}

impl Builtin {
    /// All builtins, in allocation order.
    pub const ALL: [Builtin; 4] = [
        Builtin::CompileLazy,
        Builtin::InterpreterEntryTrampoline,
        Builtin::CheckOptimizationMarker,
        Builtin::InstantiateAsm,
    ];

    /// Fixed id of the builtin's code object.
    pub fn code_id(self) -> CodeId {
        CodeId(self as u32)
    }
}

/// What a code artifact is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeKind {
    /// Builtin trampoline
    #[serde(skip)]
    Builtin(Builtin),
    /// Interpreter bytecode
    Bytecode,
    /// Legacy unoptimized machine code
    Legacy,
    /// Validated asm module data
    AsmData,
    /// Optimized machine code
    Optimized,
}

/// A compiled artifact.
#[derive(Debug, Clone)]
pub struct CodeArtifact {
    /// Stable id
    pub id: CodeId,
    /// Kind
    pub kind: CodeKind,
    /// Size in bytes including metadata
    pub size: usize,
    /// Function metadata this code was compiled for
    pub shared: Option<SharedId>,
    /// Bytecode offset or AST id this code enters at, for OSR code
    pub osr_offset: Option<u32>,
    /// Code folds in a specific context and cannot be shared
    pub context_specialized: bool,
    /// Hint that the code runs once
    pub executed_once: bool,
    marked_for_deoptimization: bool,
}

impl CodeArtifact {
    /// Whether an invalidated assumption condemned this code.
    pub fn marked_for_deoptimization(&self) -> bool {
        self.marked_for_deoptimization
    }

    /// Condemn this code; it must never be entered again.
    pub fn mark_for_deoptimization(&mut self) {
        self.marked_for_deoptimization = true;
    }
}

/// Origin options of a script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScriptOrigin {
    /// Source is a module
    pub is_module: bool,
    /// Source may be shared across origins
    pub is_shared_cross_origin: bool,
}

/// Where a script's source came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    /// Embedder-provided source
    #[default]
    Normal,
    /// Engine-internal natives
    Native,
    /// Embedder extension; never cached
    Extension,
}

/// How a script was compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilationType {
    /// Compiled from the host
    Host,
    /// Compiled by eval or the `Function` constructor
    Eval,
}

/// Compilation progress of a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilationState {
    /// Not compiled yet
    Initial,
    /// Top-level code compiled
    Compiled,
}

/// Naming and origin details supplied with a script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ScriptDetails {
    /// Resource name
    pub name: Option<String>,
    /// Line offset of the source within the resource
    pub line_offset: i32,
    /// Column offset of the source within the resource
    pub column_offset: i32,
    /// Origin options
    pub origin: ScriptOrigin,
    /// Source kind
    pub kind: ScriptKind,
}

/// Where an eval script was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalOrigin {
    /// Function metadata of the caller
    pub outer: Option<SharedId>,
    /// Position of the eval call in the caller
    pub position: i32,
}

/// A unit of source text.
#[derive(Debug, Clone)]
pub struct Script {
    /// Stable id
    pub id: ScriptId,
    /// Source text
    pub source: Arc<str>,
    /// Naming and origin details
    pub details: ScriptDetails,
    /// Host or eval
    pub compilation_type: CompilationType,
    /// Compilation progress
    pub compilation_state: CompilationState,
    /// Function metadata per literal id
    pub function_infos: Vec<Option<SharedId>>,
    /// Caller of an eval script
    pub eval_origin: Option<EvalOrigin>,
}

/// Persistent metadata for one function literal.
#[derive(Debug, Clone)]
pub struct SharedInfo {
    /// Stable id
    pub id: SharedId,
    /// Owning script
    pub script: ScriptId,
    /// Literal id within the script
    pub literal_id: LiteralId,
    /// Function name
    pub name: String,
    /// Function kind
    pub kind: FunctionKind,
    /// Language mode
    pub language_mode: LanguageMode,
    /// Metadata for top-level code
    pub is_toplevel: bool,
    /// Installed unoptimized code, or [`Builtin::CompileLazy`]
    pub code: CodeId,
    /// Installed bytecode
    pub bytecode: Option<CodeId>,
    /// Installed asm module data
    pub asm_data: Option<CodeId>,
    /// Feedback shape; empty until the first compile
    pub feedback_metadata: FeedbackMetadata,
    /// Scope information has been allocated
    pub has_scope_info: bool,
    /// Debugger break information is attached
    pub has_break_info: bool,
    /// A validated asm module failed to instantiate
    pub asm_wasm_broken: bool,
    /// Formal parameter count, once known
    pub length: Option<u32>,
    /// Two formal parameters share a name
    pub has_duplicate_parameters: bool,
    /// Function may be compiled lazily
    pub allows_lazy_compilation: bool,
    /// Length of the function's source text
    pub source_size: usize,
    disable_optimization_reason: Option<BailoutReason>,
}

impl SharedInfo {
    /// Whether unoptimized code is installed.
    pub fn is_compiled(&self) -> bool {
        self.code != Builtin::CompileLazy.code_id()
    }

    /// Whether bytecode is installed.
    pub fn has_bytecode(&self) -> bool {
        self.bytecode.is_some()
    }

    /// Whether asm module data is installed.
    pub fn has_asm_data(&self) -> bool {
        self.asm_data.is_some()
    }

    /// Whether optimization is disabled.
    pub fn optimization_disabled(&self) -> bool {
        self.disable_optimization_reason.is_some()
    }

    /// Why optimization is disabled.
    pub fn disable_optimization_reason(&self) -> Option<BailoutReason> {
        self.disable_optimization_reason
    }

    /// Disable optimization. The first reason sticks.
    pub fn disable_optimization(&mut self, reason: BailoutReason) {
        if self.disable_optimization_reason.is_none() {
            self.disable_optimization_reason = Some(reason);
        }
    }

    /// Lift a previous disable.
    pub fn enable_optimization(&mut self) {
        self.disable_optimization_reason = None;
    }
}

/// A function instance.
#[derive(Debug, Clone)]
pub struct Function {
    /// Stable id
    pub id: FunctionId,
    /// Function metadata
    pub shared: SharedId,
    /// Enclosing context
    pub context: ContextId,
    /// Active code
    pub code: CodeId,
    /// Feedback, allocated once the function is compiled
    pub feedback: Option<FeedbackRecord>,
}

impl Function {
    /// Whether the active code is anything but the lazy-compile builtin.
    pub fn is_compiled(&self) -> bool {
        self.code != Builtin::CompileLazy.code_id()
    }

    /// Whether the function enters through the interpreter trampoline.
    pub fn is_interpreted(&self) -> bool {
        self.code == Builtin::InterpreterEntryTrampoline.code_id()
    }

    /// Whether a background job for this function is in flight.
    pub fn is_in_optimization_queue(&self) -> bool {
        self.feedback
            .as_ref()
            .is_some_and(|feedback| feedback.is_in_optimization_queue())
    }
}

/// A binding environment.
#[derive(Debug, Clone)]
pub struct Context {
    /// Stable id
    pub id: ContextId,
    /// Enclosing context; `None` for native contexts
    pub parent: Option<ContextId>,
    /// Native context this context belongs to
    pub native: ContextId,
    /// Native contexts only: strings may be compiled to code
    pub allow_code_gen_from_strings: bool,
    /// Native contexts only: metadata of the context's closure, used as the
    /// outer function for code compiled from strings
    pub closure: Option<SharedId>,
}

impl Context {
    /// Whether this is a native context.
    pub fn is_native(&self) -> bool {
        self.parent.is_none()
    }
}

/// Memory-pressure query.
pub trait MemoryMonitor {
    /// Whether the heap is under high memory pressure.
    fn high_memory_pressure(&self) -> bool;
}

/// A monitor that never reports pressure.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMemoryPressure;

impl MemoryMonitor for NoMemoryPressure {
    fn high_memory_pressure(&self) -> bool {
        false
    }
}

/// Arena of compiler-visible heap objects.
#[derive(Debug)]
pub struct Heap {
    scripts: Vec<Script>,
    shared: Vec<SharedInfo>,
    functions: Vec<Function>,
    contexts: Vec<Context>,
    code: Vec<CodeArtifact>,
}

impl Heap {
    /// Create a heap holding only the builtins.
    pub fn new() -> Self {
        let mut heap = Self {
            scripts: Vec::new(),
            shared: Vec::new(),
            functions: Vec::new(),
            contexts: Vec::new(),
            code: Vec::new(),
        };
        for builtin in Builtin::ALL {
            let id = heap.new_code(CodeKind::Builtin(builtin), 0, None);
            debug_assert_eq!(id, builtin.code_id());
        }
        heap
    }

    /// Code id of a builtin.
    pub fn builtin(&self, builtin: Builtin) -> CodeId {
        builtin.code_id()
    }

    /// Allocate a script.
    pub fn new_script(&mut self, source: Arc<str>, details: ScriptDetails) -> ScriptId {
        CapabilityScope::assert_allowed(Capability::HeapAccess);
        let id = ScriptId(self.scripts.len() as u32);
        self.scripts.push(Script {
            id,
            source,
            details,
            compilation_type: CompilationType::Host,
            compilation_state: CompilationState::Initial,
            function_infos: Vec::new(),
            eval_origin: None,
        });
        id
    }

    /// Script by id.
    pub fn script(&self, id: ScriptId) -> &Script {
        &self.scripts[id.index()]
    }

    /// Mutable script by id.
    pub fn script_mut(&mut self, id: ScriptId) -> &mut Script {
        &mut self.scripts[id.index()]
    }

    /// Size the script's metadata table for `max_literal_id`.
    pub fn ensure_function_infos(&mut self, script: ScriptId, max_literal_id: LiteralId) {
        let infos = &mut self.scripts[script.index()].function_infos;
        let wanted = max_literal_id.index() + 1;
        if infos.len() < wanted {
            infos.resize(wanted, None);
        }
    }

    /// Metadata previously allocated for a literal of `script`.
    pub fn find_shared_for_literal(&self, script: ScriptId, literal: LiteralId) -> Option<SharedId> {
        self.script(script)
            .function_infos
            .get(literal.index())
            .copied()
            .flatten()
    }

    /// Allocate metadata for `literal`, registering it on the script.
    ///
    /// The metadata starts uncompiled, with [`Builtin::CompileLazy`] as its
    /// code.
    pub fn new_shared_for_literal(&mut self, literal: &FunctionLiteral, script: ScriptId) -> SharedId {
        CapabilityScope::assert_allowed(Capability::HeapAccess);
        let id = SharedId(self.shared.len() as u32);
        self.shared.push(SharedInfo {
            id,
            script,
            literal_id: literal.id,
            name: literal.name.clone(),
            kind: literal.kind,
            language_mode: literal.language_mode,
            is_toplevel: false,
            code: Builtin::CompileLazy.code_id(),
            bytecode: None,
            asm_data: None,
            feedback_metadata: FeedbackMetadata::default(),
            has_scope_info: false,
            has_break_info: false,
            asm_wasm_broken: false,
            length: None,
            has_duplicate_parameters: false,
            allows_lazy_compilation: true,
            source_size: literal.source_size,
            disable_optimization_reason: None,
        });
        self.ensure_function_infos(script, literal.id);
        self.scripts[script.index()].function_infos[literal.id.index()] = Some(id);
        id
    }

    /// Function metadata by id.
    pub fn shared(&self, id: SharedId) -> &SharedInfo {
        &self.shared[id.index()]
    }

    /// Mutable function metadata by id.
    pub fn shared_mut(&mut self, id: SharedId) -> &mut SharedInfo {
        &mut self.shared[id.index()]
    }

    /// Whether any function metadata of `script` holds asm module data.
    pub fn contains_asm_module(&self, script: ScriptId) -> bool {
        self.script(script)
            .function_infos
            .iter()
            .flatten()
            .any(|shared| self.shared(*shared).has_asm_data())
    }

    /// Allocate a native context.
    pub fn new_native_context(&mut self, allow_code_gen_from_strings: bool) -> ContextId {
        CapabilityScope::assert_allowed(Capability::HeapAccess);
        let id = ContextId(self.contexts.len() as u32);
        self.contexts.push(Context {
            id,
            parent: None,
            native: id,
            allow_code_gen_from_strings,
            closure: None,
        });
        id
    }

    /// Allocate a context nested in `parent`.
    pub fn new_context(&mut self, parent: ContextId) -> ContextId {
        CapabilityScope::assert_allowed(Capability::HeapAccess);
        let id = ContextId(self.contexts.len() as u32);
        let native = self.context(parent).native;
        self.contexts.push(Context {
            id,
            parent: Some(parent),
            native,
            allow_code_gen_from_strings: false,
            closure: None,
        });
        id
    }

    /// Context by id.
    pub fn context(&self, id: ContextId) -> &Context {
        &self.contexts[id.index()]
    }

    /// Mutable context by id.
    pub fn context_mut(&mut self, id: ContextId) -> &mut Context {
        &mut self.contexts[id.index()]
    }

    /// Allocate a function instance running the metadata's current code.
    pub fn new_function(&mut self, shared: SharedId, context: ContextId) -> FunctionId {
        CapabilityScope::assert_allowed(Capability::HeapAccess);
        let id = FunctionId(self.functions.len() as u32);
        let code = self.shared(shared).code;
        self.functions.push(Function {
            id,
            shared,
            context,
            code,
            feedback: None,
        });
        id
    }

    /// Function instance by id.
    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.index()]
    }

    /// Mutable function instance by id.
    pub fn function_mut(&mut self, id: FunctionId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    /// All function instances.
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter()
    }

    /// Whether the function's active code is optimized.
    pub fn is_optimized(&self, function: FunctionId) -> bool {
        self.code(self.function(function).code).kind == CodeKind::Optimized
    }

    /// Allocate a feedback record for the function if it has none.
    ///
    /// Does nothing for uncompiled functions; their shape is not known yet.
    pub fn ensure_feedback(&mut self, function: FunctionId) {
        CapabilityScope::assert_allowed(Capability::HeapAccess);
        let shared = self.function(function).shared;
        if !self.shared(shared).is_compiled() || self.function(function).feedback.is_some() {
            return;
        }
        let record = FeedbackRecord::new(&self.shared(shared).feedback_metadata);
        self.function_mut(function).feedback = Some(record);
    }

    /// Allocate a code artifact.
    pub fn new_code(&mut self, kind: CodeKind, size: usize, shared: Option<SharedId>) -> CodeId {
        CapabilityScope::assert_allowed(Capability::HeapAccess);
        let id = CodeId(self.code.len() as u32);
        self.code.push(CodeArtifact {
            id,
            kind,
            size,
            shared,
            osr_offset: None,
            context_specialized: false,
            executed_once: false,
            marked_for_deoptimization: false,
        });
        id
    }

    /// Code artifact by id.
    pub fn code(&self, id: CodeId) -> &CodeArtifact {
        &self.code[id.index()]
    }

    /// Mutable code artifact by id.
    pub fn code_mut(&mut self, id: CodeId) -> &mut CodeArtifact {
        &mut self.code[id.index()]
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}
