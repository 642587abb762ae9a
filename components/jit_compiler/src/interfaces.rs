//! Collaborators the pipeline drives but does not implement: the parser,
//! the debugger and the code-cache serializer.

use std::sync::Arc;

use core_types::{CompileError, FunctionKind, LanguageMode, LiteralId, ParseRestriction, ScriptId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::feedback::FeedbackMetadata;
use crate::heap::CodeKind;
use crate::literal::FunctionLiteral;

/// What to parse.
#[derive(Debug, Clone)]
pub struct ParseRequest {
    /// Source text of the script
    pub source: Arc<str>,
    /// Literal to parse; `LiteralId(0)` is the whole program
    pub literal_id: LiteralId,
    /// Parse the whole program rather than one function
    pub is_toplevel: bool,
    /// Source is eval code
    pub is_eval: bool,
    /// Source is a module
    pub is_module: bool,
    /// Language mode inherited from the caller
    pub language_mode: LanguageMode,
    /// What the parser may accept
    pub restriction: ParseRestriction,
    /// End of the parameter list for `Function` constructor sources
    pub parameters_end_pos: i32,
}

/// Source parser and scope analyzer.
pub trait Parser: Send + Sync {
    /// Parse the requested literal.
    fn parse(&self, request: &ParseRequest) -> Result<FunctionLiteral, CompileError>;

    /// Resolve scopes of a parsed literal tree.
    fn analyze(&self, literal: &mut FunctionLiteral) -> Result<(), CompileError>;
}

/// Debugger notifications.
pub trait DebugHooks: Send + Sync {
    /// A script finished compiling.
    fn on_after_compile(&self, script: ScriptId);

    /// Whether a debugger is attached.
    fn is_loaded(&self) -> bool;
}

/// Hooks that ignore everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDebugHooks;

impl DebugHooks for NoopDebugHooks {
    fn on_after_compile(&self, _script: ScriptId) {}

    fn is_loaded(&self) -> bool {
        false
    }
}

/// One compiled function in a code cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFunction {
    /// Literal id within the script
    pub literal_id: LiteralId,
    /// Function name
    pub name: String,
    /// Function kind
    pub kind: FunctionKind,
    /// Language mode
    pub language_mode: LanguageMode,
    /// Kind of the compiled artifact; `None` for functions not compiled yet
    pub code_kind: Option<CodeKind>,
    /// Artifact size
    pub code_size: usize,
    /// Feedback shape
    pub feedback: FeedbackMetadata,
    /// Formal parameter count
    pub length: Option<u32>,
    /// Two formal parameters share a name
    pub has_duplicate_parameters: bool,
}

/// Serializable image of a compiled script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSnapshot {
    /// Length of the source the snapshot was taken from
    pub source_length: usize,
    /// SHA-256 of that source
    pub source_hash: [u8; 32],
    /// Largest literal id in the script
    pub max_literal_id: LiteralId,
    /// Compiled functions; literal 0 is the top-level code
    pub functions: Vec<SnapshotFunction>,
}

impl ScriptSnapshot {
    /// SHA-256 digest of `source`.
    pub fn hash_source(source: &str) -> [u8; 32] {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&Sha256::digest(source.as_bytes()));
        hash
    }

    /// Whether this snapshot was taken from `source`.
    pub fn matches_source(&self, source: &str) -> bool {
        self.source_length == source.len() && self.source_hash == Self::hash_source(source)
    }
}

/// Code-cache encoder.
pub trait CodeSerializer: Send + Sync {
    /// Encode a snapshot.
    fn serialize(&self, snapshot: &ScriptSnapshot) -> Vec<u8>;

    /// Decode a snapshot taken from `source`.
    ///
    /// Fails with [`CompileError::Decode`] on corrupt data or a source
    /// mismatch.
    fn deserialize(&self, bytes: &[u8], source: &str) -> Result<ScriptSnapshot, CompileError>;
}

/// JSON code-cache encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodeSerializer;

impl CodeSerializer for JsonCodeSerializer {
    fn serialize(&self, snapshot: &ScriptSnapshot) -> Vec<u8> {
        serde_json::to_vec(snapshot).unwrap_or_default()
    }

    fn deserialize(&self, bytes: &[u8], source: &str) -> Result<ScriptSnapshot, CompileError> {
        let snapshot: ScriptSnapshot = serde_json::from_slice(bytes)
            .map_err(|e| CompileError::Decode(format!("corrupt code cache: {}", e)))?;
        if !snapshot.matches_source(source) {
            return Err(CompileError::Decode("code cache does not match source".to_string()));
        }
        Ok(snapshot)
    }
}
