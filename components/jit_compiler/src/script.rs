//! Top-level compiles: host scripts, eval and the `Function` constructor.
//!
//! Each entry point consults the source cache first. Host scripts can also
//! consume a serialized code cache instead of compiling, or produce one
//! after compiling. Failures surface as [`JsError`]s; these are the only
//! places a compile error becomes visible to the caller.

use std::sync::Arc;

use core_types::{
    CompileError, ContextId, FunctionId, JsError, LanguageMode, LiteralId, ParseRestriction,
    ScriptId, SharedId, NO_SOURCE_POSITION,
};

use crate::cache::{eval_position, EvalKey, ScriptKey};
use crate::engine::Engine;
use crate::feedback::FeedbackRecord;
use crate::heap::{
    Builtin, CodeKind, CompilationState, CompilationType, EvalOrigin, ScriptDetails, ScriptKind,
};
use crate::interfaces::{ScriptSnapshot, SnapshotFunction};
use crate::literal::FunctionLiteral;
use crate::telemetry::SourceCacheKind;
use crate::unit::{CompilationUnit, UnitFlags};

/// Code-cache handling for a script compile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CompileOptions {
    /// Compile from source
    #[default]
    NoCompileOptions,
    /// Compile from source and serialize the result
    ProduceCodeCache,
    /// Try to deserialize this data before compiling from source
    ConsumeCodeCache(Vec<u8>),
}

/// Result of [`Engine::compile_script`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptCompileResult {
    /// Top-level function metadata
    pub shared: SharedId,
    /// Script the metadata belongs to
    pub script: ScriptId,
    /// Serialized code, when requested and possible
    pub produced_cache: Option<Vec<u8>>,
}

/// An eval compile request.
#[derive(Debug, Clone)]
pub struct EvalRequest {
    /// Source text
    pub source: Arc<str>,
    /// Metadata of the calling function
    pub outer: Option<SharedId>,
    /// Context the eval runs in
    pub context: ContextId,
    /// Language mode of the caller
    pub language_mode: LanguageMode,
    /// What the parser may accept
    pub restriction: ParseRestriction,
    /// End of the parameter list for `Function` constructor sources
    pub parameters_end_pos: i32,
    /// Position of the eval scope in the caller
    pub eval_scope_position: i32,
    /// Position of the eval call in the caller
    pub eval_position: i32,
    /// Naming and origin of the eval script
    pub details: ScriptDetails,
}

impl EvalRequest {
    /// A direct eval of `source` with no positions.
    pub fn new(
        source: &str,
        outer: Option<SharedId>,
        context: ContextId,
        language_mode: LanguageMode,
    ) -> Self {
        Self {
            source: Arc::from(source),
            outer,
            context,
            language_mode,
            restriction: ParseRestriction::NoParseRestriction,
            parameters_end_pos: NO_SOURCE_POSITION,
            eval_scope_position: 0,
            eval_position: 0,
            details: ScriptDetails::default(),
        }
    }

    /// Set the scope and call positions.
    pub fn at(mut self, eval_scope_position: i32, eval_position: i32) -> Self {
        self.eval_scope_position = eval_scope_position;
        self.eval_position = eval_position;
        self
    }
}

/// Assemble the source the `Function` constructor compiles.
///
/// Returns the source and the position just past the parameter list. Two
/// calls can join to the same source with different splits; the position
/// keeps them apart in the eval cache.
///
/// # Example
/// ```
/// use jit_compiler::dynamic_function_source;
///
/// let (a, split_a) = dynamic_function_source(&[""], "function anonymous(\n) {\n}");
/// let (b, split_b) = dynamic_function_source(&["\n) {\nfunction anonymous("], "}");
/// assert_eq!(a, b);
/// assert_ne!(split_a, split_b);
/// ```
pub fn dynamic_function_source(params: &[&str], body: &str) -> (String, i32) {
    let mut source = String::from("(function anonymous(");
    source.push_str(&params.join(","));
    source.push('\n');
    let parameters_end_pos = source.len() as i32;
    source.push_str(") {\n");
    source.push_str(body);
    source.push_str("\n})");
    (source, parameters_end_pos)
}

impl Engine {
    /// Parse and compile the top-level code of `script`.
    fn compile_toplevel(
        &mut self,
        script: ScriptId,
        language_mode: LanguageMode,
        flags: UnitFlags,
        restriction: ParseRestriction,
        parameters_end_pos: i32,
    ) -> Result<SharedId, CompileError> {
        let source = Arc::clone(&self.heap.script(script).source);
        let mut unit = CompilationUnit::toplevel(
            &self.owner,
            script,
            Arc::clone(&source),
            language_mode,
            flags,
            self.config.stack_limit,
        );
        unit.restriction = restriction;
        unit.parameters_end_pos = parameters_end_pos;

        self.parse_unit(&mut unit)?;
        let shared = self.compile_unoptimized_code(unit)?;
        self.heap.script_mut(script).compilation_state = CompilationState::Compiled;

        let kind = if flags.is_eval {
            SourceCacheKind::Eval
        } else {
            SourceCacheKind::Script
        };
        self.telemetry.source_compiled(kind, source.len());
        Ok(shared)
    }

    /// Compile a host script, or fetch it from the script cache.
    ///
    /// Extension scripts are never cached. With
    /// [`CompileOptions::ConsumeCodeCache`] the data is deserialized unless
    /// a debugger is attached; rejected data falls back to compiling from
    /// source. [`CompileOptions::ProduceCodeCache`] serializes the result
    /// unless the script contains an asm module.
    pub fn compile_script(
        &mut self,
        source: &str,
        details: ScriptDetails,
        context: ContextId,
        options: CompileOptions,
    ) -> Result<ScriptCompileResult, JsError> {
        let source: Arc<str> = Arc::from(source);
        let language_mode = if self.config.use_strict {
            LanguageMode::Strict
        } else {
            LanguageMode::Sloppy
        };
        let cacheable = details.kind != ScriptKind::Extension;
        let key = ScriptKey {
            source: Arc::clone(&source),
            name: details.name.clone(),
            line_offset: details.line_offset,
            column_offset: details.column_offset,
            origin: details.origin,
            context: self.heap.context(context).native,
            language_mode,
        };

        if cacheable {
            let hit = self.source_cache.lookup_script(&key);
            self.telemetry.source_cache_lookup(SourceCacheKind::Script, hit.is_some());
            if let Some(hit) = hit {
                tracing::debug!(shared = %hit.shared, "Script cache hit");
                return Ok(ScriptCompileResult {
                    shared: hit.shared,
                    script: self.heap.shared(hit.shared).script,
                    produced_cache: None,
                });
            }
        }

        if let CompileOptions::ConsumeCodeCache(data) = &options {
            if self.config.serialize_toplevel && !self.debugger.is_loaded() {
                let restored = self
                    .serializer
                    .deserialize(data, &source)
                    .and_then(|snapshot| self.materialize_snapshot(&snapshot, &source, &details));
                match restored {
                    Ok((script, shared)) => {
                        tracing::debug!(script = %script, "Deserialized code cache");
                        if cacheable {
                            let feedback = self.heap.shared(shared).feedback_metadata.clone();
                            self.source_cache.put_script(key, shared, feedback);
                        }
                        self.debugger.on_after_compile(script);
                        return Ok(ScriptCompileResult {
                            shared,
                            script,
                            produced_cache: None,
                        });
                    }
                    Err(error) => {
                        tracing::warn!(error = %error, "Code cache rejected, compiling from source");
                    }
                }
            }
        }

        let produce = options == CompileOptions::ProduceCodeCache && self.config.serialize_toplevel;
        let script = self.heap.new_script(Arc::clone(&source), details.clone());
        let flags = UnitFlags {
            will_serialize: produce,
            is_module: details.origin.is_module,
            ..UnitFlags::default()
        };
        let shared = match self.compile_toplevel(
            script,
            language_mode,
            flags,
            ParseRestriction::NoParseRestriction,
            NO_SOURCE_POSITION,
        ) {
            Ok(shared) => shared,
            Err(error) => {
                tracing::warn!(script = %script, error = %error, "Script compile failed");
                return Err(error.into());
            }
        };

        if cacheable {
            let feedback = self.heap.shared(shared).feedback_metadata.clone();
            self.source_cache.put_script(key, shared, feedback);
        }
        let produced_cache = if produce && !self.heap.contains_asm_module(script) {
            Some(self.serializer.serialize(&self.snapshot_script(script)))
        } else {
            None
        };
        self.debugger.on_after_compile(script);
        Ok(ScriptCompileResult {
            shared,
            script,
            produced_cache,
        })
    }

    /// Compile eval code and create its top-level function in the request's
    /// context.
    ///
    /// A cache hit skips compilation; the new function still gets a fresh
    /// feedback record.
    pub fn compile_eval(&mut self, request: EvalRequest) -> Result<FunctionId, JsError> {
        let position = eval_position(
            self.config.function_tostring,
            request.restriction,
            request.parameters_end_pos,
            request.eval_scope_position,
        );
        let key = EvalKey {
            source: Arc::clone(&request.source),
            outer: request.outer,
            context: request.context,
            language_mode: request.language_mode,
            position,
        };

        let hit = self.source_cache.lookup_eval(&key);
        self.telemetry.source_cache_lookup(SourceCacheKind::Eval, hit.is_some());

        let (shared, fresh_script) = match hit {
            Some(ref hit) => {
                tracing::debug!(shared = %hit.shared, position, "Eval cache hit");
                (hit.shared, None)
            }
            None => {
                let script = self
                    .heap
                    .new_script(Arc::clone(&request.source), request.details.clone());
                let eval_script = self.heap.script_mut(script);
                eval_script.compilation_type = CompilationType::Eval;
                eval_script.eval_origin = Some(EvalOrigin {
                    outer: request.outer,
                    position: request.eval_position,
                });
                let flags = UnitFlags {
                    is_eval: true,
                    ..UnitFlags::default()
                };
                let shared = self
                    .compile_toplevel(
                        script,
                        request.language_mode,
                        flags,
                        request.restriction,
                        request.parameters_end_pos,
                    )
                    .map_err(|error| {
                        tracing::warn!(script = %script, error = %error, "Eval compile failed");
                        JsError::from(error)
                    })?;
                (shared, Some(script))
            }
        };
        debug_assert!(
            !request.language_mode.is_strict() || self.heap.shared(shared).language_mode.is_strict()
        );

        let function = self.heap.new_function(shared, request.context);
        if let Some(hit) = &hit {
            self.heap.function_mut(function).feedback = Some(FeedbackRecord::new(&hit.feedback));
        }
        self.post_instantiation(function);

        if hit.is_none() {
            let feedback = self.heap.shared(shared).feedback_metadata.clone();
            self.source_cache.put_eval(key, shared, feedback);
        }
        if let Some(script) = fresh_script {
            self.debugger.on_after_compile(script);
        }
        Ok(function)
    }

    /// Compile a string to code in `context` on behalf of the `Function`
    /// constructor or indirect eval.
    ///
    /// The native context must allow code generation from strings, or the
    /// embedder callback must approve the source; otherwise this fails with
    /// an `EvalError`. Returns the top-level function of the compiled source.
    pub fn get_function_from_string(
        &mut self,
        context: ContextId,
        source: &str,
        restriction: ParseRestriction,
        parameters_end_pos: i32,
    ) -> Result<FunctionId, JsError> {
        let native = self.heap.context(context).native;
        let allowed = self.heap.context(native).allow_code_gen_from_strings
            || self
                .code_gen_callback
                .as_ref()
                .is_some_and(|callback| callback(native, source));
        if !allowed {
            tracing::info!(context = %native, "Code generation from strings refused");
            return Err(CompileError::CodeGenFromStringsDisallowed.into());
        }

        let mut request = EvalRequest::new(
            source,
            self.heap.context(native).closure,
            native,
            LanguageMode::Sloppy,
        )
        .at(0, NO_SOURCE_POSITION);
        request.restriction = restriction;
        request.parameters_end_pos = parameters_end_pos;
        self.compile_eval(request)
    }

    /// Compile `new Function(params..., body)` in `context`.
    pub fn compile_dynamic_function(
        &mut self,
        context: ContextId,
        params: &[&str],
        body: &str,
    ) -> Result<FunctionId, JsError> {
        let (source, parameters_end_pos) = dynamic_function_source(params, body);
        self.get_function_from_string(
            context,
            &source,
            ParseRestriction::OnlySingleFunctionLiteral,
            parameters_end_pos,
        )
    }

    /// Capture the compiled state of `script` for the code cache.
    fn snapshot_script(&self, script: ScriptId) -> ScriptSnapshot {
        let record = self.heap.script(script);
        let functions = record
            .function_infos
            .iter()
            .flatten()
            .map(|shared| {
                let info = self.heap.shared(*shared);
                let code = info.bytecode.or(info.asm_data).or_else(|| {
                    let code = self.heap.code(info.code);
                    (code.kind == CodeKind::Legacy).then_some(code.id)
                });
                SnapshotFunction {
                    literal_id: info.literal_id,
                    name: info.name.clone(),
                    kind: info.kind,
                    language_mode: info.language_mode,
                    code_kind: code.map(|code| self.heap.code(code).kind),
                    code_size: code.map(|code| self.heap.code(code).size).unwrap_or(0),
                    feedback: info.feedback_metadata.clone(),
                    length: info.length,
                    has_duplicate_parameters: info.has_duplicate_parameters,
                }
            })
            .collect();
        ScriptSnapshot {
            source_length: record.source.len(),
            source_hash: ScriptSnapshot::hash_source(&record.source),
            max_literal_id: LiteralId(record.function_infos.len().saturating_sub(1) as u32),
            functions,
        }
    }

    /// Rebuild a script and its function metadata from a snapshot.
    fn materialize_snapshot(
        &mut self,
        snapshot: &ScriptSnapshot,
        source: &Arc<str>,
        details: &ScriptDetails,
    ) -> Result<(ScriptId, SharedId), CompileError> {
        if !snapshot
            .functions
            .iter()
            .any(|function| function.literal_id == LiteralId(0))
        {
            return Err(CompileError::Decode("code cache has no top-level code".to_string()));
        }

        let script = self.heap.new_script(Arc::clone(source), details.clone());
        self.heap.ensure_function_infos(script, snapshot.max_literal_id);
        let mut toplevel = None;
        for function in &snapshot.functions {
            let literal = FunctionLiteral::function(function.literal_id.0, function.name.clone())
                .with_kind(function.kind)
                .with_language_mode(function.language_mode);
            let shared = self.heap.new_shared_for_literal(&literal, script);
            let code = match function.code_kind {
                Some(kind @ (CodeKind::Bytecode | CodeKind::Legacy | CodeKind::AsmData)) => {
                    Some(self.heap.new_code(kind, function.code_size, Some(shared)))
                }
                _ => None,
            };

            let info = self.heap.shared_mut(shared);
            info.is_toplevel = function.literal_id == LiteralId(0);
            info.feedback_metadata = function.feedback.clone();
            info.length = function.length;
            info.has_duplicate_parameters = function.has_duplicate_parameters;
            if let Some(code) = code {
                info.has_scope_info = true;
                match function.code_kind {
                    Some(CodeKind::Bytecode) => {
                        info.bytecode = Some(code);
                        info.code = Builtin::InterpreterEntryTrampoline.code_id();
                    }
                    Some(CodeKind::AsmData) => {
                        info.asm_data = Some(code);
                        info.code = Builtin::InstantiateAsm.code_id();
                    }
                    _ => info.code = code,
                }
            }
            if info.is_toplevel {
                toplevel = Some(shared);
            }
        }
        self.heap.script_mut(script).compilation_state = CompilationState::Compiled;
        toplevel
            .map(|shared| (script, shared))
            .ok_or_else(|| CompileError::Decode("code cache has no top-level code".to_string()))
    }
}
