//! Function literals produced by the parser, and the interning table
//! shared by every unit compiled from one parse.

use std::sync::Arc;

use core_types::{BailoutReason, FunctionKind, LanguageMode, LiteralId};
use rustc_hash::FxHashMap;

use crate::feedback::FeedbackMetadata;

/// Scope facts established by analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeFacts {
    /// The scope is an asm-like module ("use asm")
    pub asm_module: bool,
    /// The scope is a function nested in an asm-like module
    pub asm_function: bool,
}

/// A parsed function or top-level program.
///
/// Literals form a tree; `inner` holds the directly nested literals. Ids
/// are unique within a script and the top-level literal is always id `0`.
///
/// # Example
///
/// ```
/// use jit_compiler::FunctionLiteral;
/// use core_types::{FunctionKind, LiteralId};
///
/// let script = FunctionLiteral::toplevel()
///     .with_inner(FunctionLiteral::function(1, "gen").with_kind(FunctionKind::Generator));
/// assert_eq!(script.max_literal_id(), LiteralId(1));
/// assert!(script.find(LiteralId(1)).unwrap().kind.is_resumable());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionLiteral {
    /// Id within the script
    pub id: LiteralId,
    /// Declared or inferred name; empty for anonymous functions
    pub name: String,
    /// Syntactic kind
    pub kind: FunctionKind,
    /// Language mode of the literal's scope
    pub language_mode: LanguageMode,
    /// Scope facts
    pub scope: ScopeFacts,
    /// Contains constructs only the interpreter supports
    pub must_use_interpreter: bool,
    /// Contains constructs the interpreter does not support
    pub must_use_legacy: bool,
    /// Reason the optimizing tier must never be used, if any
    pub dont_optimize_reason: Option<BailoutReason>,
    /// Formal parameter count
    pub function_length: u32,
    /// Whether two formal parameters share a name
    pub has_duplicate_parameters: bool,
    /// Shape the function's feedback record must have
    pub feedback_spec: FeedbackMetadata,
    /// Compile together with the enclosing literal instead of lazily
    pub should_eager_compile: bool,
    /// Hint that the code runs once (top-level code, IIFEs)
    pub should_be_used_once: bool,
    /// Length of the literal's source text
    pub source_size: usize,
    /// Directly nested literals
    pub inner: Vec<Arc<FunctionLiteral>>,
}

impl FunctionLiteral {
    /// A top-level program literal.
    pub fn toplevel() -> Self {
        Self {
            id: LiteralId(0),
            name: String::new(),
            kind: FunctionKind::Normal,
            language_mode: LanguageMode::Sloppy,
            scope: ScopeFacts::default(),
            must_use_interpreter: false,
            must_use_legacy: false,
            dont_optimize_reason: None,
            function_length: 0,
            has_duplicate_parameters: false,
            feedback_spec: FeedbackMetadata::default(),
            should_eager_compile: true,
            should_be_used_once: true,
            source_size: 0,
            inner: Vec::new(),
        }
    }

    /// A lazily compiled function literal.
    pub fn function(id: u32, name: impl Into<String>) -> Self {
        Self {
            id: LiteralId(id),
            name: name.into(),
            should_eager_compile: false,
            should_be_used_once: false,
            ..Self::toplevel()
        }
    }

    /// Set the function kind.
    pub fn with_kind(mut self, kind: FunctionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the language mode.
    pub fn with_language_mode(mut self, mode: LanguageMode) -> Self {
        self.language_mode = mode;
        self
    }

    /// Set the scope facts.
    pub fn with_scope(mut self, scope: ScopeFacts) -> Self {
        self.scope = scope;
        self
    }

    /// Set the required feedback shape.
    pub fn with_feedback(mut self, spec: FeedbackMetadata) -> Self {
        self.feedback_spec = spec;
        self
    }

    /// Mark the literal as interpreter-only.
    pub fn interpreter_only(mut self) -> Self {
        self.must_use_interpreter = true;
        self
    }

    /// Mark the literal as needing the legacy backend.
    pub fn legacy_only(mut self) -> Self {
        self.must_use_legacy = true;
        self
    }

    /// Forbid optimizing this literal.
    pub fn dont_optimize(mut self, reason: BailoutReason) -> Self {
        self.dont_optimize_reason = Some(reason);
        self
    }

    /// Compile together with the enclosing literal.
    pub fn eager(mut self) -> Self {
        self.should_eager_compile = true;
        self
    }

    /// Add a nested literal.
    pub fn with_inner(mut self, inner: FunctionLiteral) -> Self {
        self.inner.push(Arc::new(inner));
        self
    }

    /// Largest literal id in this tree.
    pub fn max_literal_id(&self) -> LiteralId {
        self.inner
            .iter()
            .map(|inner| inner.max_literal_id())
            .fold(self.id, std::cmp::max)
    }

    /// Find the literal with `id` in this tree.
    pub fn find(&self, id: LiteralId) -> Option<&FunctionLiteral> {
        if self.id == id {
            return Some(self);
        }
        self.inner.iter().find_map(|inner| inner.find(id))
    }

    /// Visit every literal in the tree, parents first.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a FunctionLiteral)) {
        visit(self);
        for inner in &self.inner {
            inner.walk(visit);
        }
    }
}

/// Interned string symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol(u32);

/// Strings collected while parsing and analyzing one compile request.
///
/// Nested units compiled from the same parse share the table; finalizing a
/// unit internalizes everything collected so far onto the heap.
#[derive(Debug, Default)]
pub struct InternTable {
    strings: Vec<Arc<str>>,
    index: FxHashMap<Arc<str>, Symbol>,
    internalized: usize,
}

impl InternTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `value`, returning its symbol.
    pub fn intern(&mut self, value: &str) -> Symbol {
        if let Some(symbol) = self.index.get(value) {
            return *symbol;
        }
        let symbol = Symbol(self.strings.len() as u32);
        let value: Arc<str> = Arc::from(value);
        self.strings.push(value.clone());
        self.index.insert(value, symbol);
        symbol
    }

    /// Resolve a symbol.
    pub fn resolve(&self, symbol: Symbol) -> Option<&str> {
        self.strings.get(symbol.0 as usize).map(|s| s.as_ref())
    }

    /// Internalize pending strings. Returns how many were new.
    pub fn internalize(&mut self) -> usize {
        let fresh = self.strings.len() - self.internalized;
        self.internalized = self.strings.len();
        fresh
    }

    /// Whether every interned string has been internalized.
    pub fn is_internalized(&self) -> bool {
        self.internalized == self.strings.len()
    }

    /// Number of interned strings.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}
