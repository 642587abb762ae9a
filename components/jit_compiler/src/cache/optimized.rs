//! Optimized-code slot on a function's feedback record.
//!
//! The slot holds at most one artifact. OSR code never enters it, and
//! context-specialized code clears it instead of being written. Code an
//! invalidated assumption marked for deoptimization is evicted on lookup.

use core_types::{CodeId, FunctionId};

use crate::heap::{CodeKind, Heap};

/// Cached optimized code for `function`, if it is still usable.
pub fn lookup(heap: &mut Heap, function: FunctionId, osr: bool) -> Option<CodeId> {
    if osr {
        return None;
    }
    let code = heap.function(function).feedback.as_ref()?.optimized_code()?;
    if heap.code(code).marked_for_deoptimization() {
        tracing::debug!(function = %function, code = %code, "Evicting deoptimized code from cache");
        clear(heap, function);
        return None;
    }
    Some(code)
}

/// Record freshly installed optimized code.
pub fn insert(heap: &mut Heap, function: FunctionId, code: CodeId, context_specializing: bool, osr: bool) {
    if osr || heap.code(code).kind != CodeKind::Optimized {
        return;
    }
    if context_specializing {
        clear(heap, function);
        return;
    }
    if let Some(feedback) = heap.function_mut(function).feedback.as_mut() {
        feedback.set_optimized_code(code);
    }
}

/// Empty the slot.
pub fn clear(heap: &mut Heap, function: FunctionId) {
    if let Some(feedback) = heap.function_mut(function).feedback.as_mut() {
        feedback.clear_optimized_code();
    }
}
