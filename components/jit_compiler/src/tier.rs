//! Backend selection for unoptimized code.

use crate::backend::BackendKind;
use crate::config::CompilerConfig;
use crate::literal::FunctionLiteral;
use crate::unit::CompilationUnit;

/// Pick the unoptimized backend for `literal`.
///
/// Interpreter-only literals and resumable functions always get bytecode.
/// Legacy-only literals and asm functions get legacy code. Everything else
/// gets bytecode unless the configuration stresses the legacy backend.
pub fn select_unoptimized_backend(config: &CompilerConfig, literal: &FunctionLiteral) -> BackendKind {
    if literal.must_use_interpreter || literal.kind.is_resumable() {
        return BackendKind::Interpreter;
    }
    if literal.must_use_legacy || literal.scope.asm_function {
        return BackendKind::Legacy;
    }
    if config.stress_legacy_backend {
        BackendKind::Legacy
    } else {
        BackendKind::Interpreter
    }
}

/// Whether to try the asm validator before the normal backend.
///
/// `asm_wasm_broken` is the flag of the unit's function metadata, if any.
pub fn use_asm_validation(config: &CompilerConfig, unit: &CompilationUnit, asm_wasm_broken: bool) -> bool {
    if !config.validate_asm || asm_wasm_broken || unit.flags.is_debug {
        return false;
    }
    if config.stress_validate_asm {
        return true;
    }
    unit.literal().is_some_and(|literal| literal.scope.asm_module)
}
