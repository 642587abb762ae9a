//! Tier selection, eager inner functions and failure handling of the
//! unoptimized pipeline.

use core_types::{CompileError, ErrorKind, FunctionKind};
use integration_tests::{sync_config, Fixture};
use jit_compiler::testing::{Harness, Phase};
use jit_compiler::{
    Builtin, CompileOptions, CompilerConfig, FeedbackMetadata, FeedbackSlotKind, FunctionLiteral,
    JobFailure, ScopeFacts, ScriptDetails,
};

fn nested(depth: u32) -> FunctionLiteral {
    let mut inner: Option<FunctionLiteral> = None;
    for id in (1..=depth).rev() {
        let mut literal = FunctionLiteral::function(id, format!("level{}", id)).eager();
        if let Some(child) = inner.take() {
            literal = literal.with_inner(child);
        }
        inner = Some(literal);
    }
    match inner {
        Some(child) => FunctionLiteral::toplevel().with_inner(child),
        None => FunctionLiteral::toplevel(),
    }
}

#[test]
fn test_resumable_functions_use_interpreter_under_stress_legacy() {
    let config = CompilerConfig {
        stress_legacy_backend: true,
        ..sync_config()
    };
    let tree = FunctionLiteral::toplevel()
        .with_inner(FunctionLiteral::function(1, "gen").with_kind(FunctionKind::Generator))
        .with_inner(FunctionLiteral::function(2, "run").with_kind(FunctionKind::Async))
        .with_inner(FunctionLiteral::function(3, "plain"));
    let mut fx = Fixture::load(config, "generators", tree);
    for id in 1..=3 {
        fx.function(id);
    }

    let heap = fx.harness.engine.heap();
    assert!(heap.shared(fx.shared(1)).has_bytecode());
    assert!(heap.shared(fx.shared(2)).has_bytecode());
    assert!(!heap.shared(fx.shared(3)).has_bytecode());
    assert_eq!(fx.harness.backends.interpreter.jobs(), vec!["gen", "run"]);
    assert_eq!(fx.harness.backends.legacy.jobs(), vec!["", "plain"]);
}

#[test]
fn test_eager_inner_functions_compile_with_outer() {
    let tree = FunctionLiteral::toplevel()
        .with_inner(
            FunctionLiteral::function(1, "iife")
                .eager()
                .with_inner(FunctionLiteral::function(2, "helper").eager()),
        )
        .with_inner(FunctionLiteral::function(3, "later"));
    let fx = Fixture::load(sync_config(), "eager", tree);

    let heap = fx.harness.engine.heap();
    assert!(heap.shared(fx.shared(1)).is_compiled());
    assert!(heap.shared(fx.shared(2)).is_compiled());
    assert!(!heap.shared(fx.shared(3)).is_compiled());
    assert_eq!(fx.harness.parser.parse_count(), 1);
    assert_eq!(fx.harness.backends.interpreter.jobs(), vec!["", "iife", "helper"]);
}

#[test]
#[should_panic(expected = "does not match its literal")]
fn test_feedback_shape_change_on_recompile_is_fatal() {
    const SOURCE: &str = "function f(o) { return o.x() }";
    let before = FunctionLiteral::toplevel().with_inner(
        FunctionLiteral::function(1, "f").with_feedback(FeedbackMetadata::new(vec![
            FeedbackSlotKind::LoadProperty,
        ])),
    );
    let mut fx = Fixture::load(sync_config(), SOURCE, before);
    fx.function(1);

    let after = FunctionLiteral::toplevel().with_inner(
        FunctionLiteral::function(1, "f").with_feedback(FeedbackMetadata::new(vec![
            FeedbackSlotKind::LoadProperty,
            FeedbackSlotKind::Call,
        ])),
    );
    fx.harness.parser.script(SOURCE, after);
    let shared = fx.shared(1);
    fx.harness.engine.compile_debug_code(shared);
}

#[test]
fn test_debug_recompile_keeps_feedback_shape() {
    const SOURCE: &str = "function f(o) { return o.x }";
    let tree = FunctionLiteral::toplevel().with_inner(
        FunctionLiteral::function(1, "f")
            .with_feedback(FeedbackMetadata::new(vec![FeedbackSlotKind::LoadProperty])),
    );
    let mut fx = Fixture::load(sync_config(), SOURCE, tree);
    let f = fx.function(1);
    let shared = fx.shared(1);
    let old_bytecode = fx.harness.engine.heap().shared(shared).bytecode;

    assert!(fx.harness.engine.compile_debug_code(shared));
    let heap = fx.harness.engine.heap();
    assert_ne!(heap.shared(shared).bytecode, old_bytecode);
    assert_eq!(heap.function(f).feedback.as_ref().unwrap().shape().len(), 1);
}

#[test]
fn test_deep_nesting_is_a_range_error() {
    let config = CompilerConfig {
        stack_limit: 4,
        ..sync_config()
    };
    let mut harness = Harness::new(config);
    harness.parser.script("deep", nested(6));
    harness.parser.script("shallow", nested(3));
    let native = harness.engine.new_native_context(true);

    let error = harness
        .engine
        .compile_script("deep", ScriptDetails::default(), native, CompileOptions::default())
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::RangeError);
    assert_eq!(error.message, CompileError::StackOverflow.to_string());
    assert_eq!(harness.engine.source_cache().script_entries(), 0);

    assert!(harness
        .engine
        .compile_script("shallow", ScriptDetails::default(), native, CompileOptions::default())
        .is_ok());
}

#[test]
fn test_parse_failure_is_a_syntax_error() {
    let mut harness = Harness::new(sync_config());
    harness
        .parser
        .fail("let let = 1", CompileError::parse("Unexpected identifier"));
    let native = harness.engine.new_native_context(true);

    let error = harness
        .engine
        .compile_script("let let = 1", ScriptDetails::default(), native, CompileOptions::default())
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::SyntaxError);
    assert_eq!(error.message, "Unexpected identifier");
}

fn asm_module() -> FunctionLiteral {
    FunctionLiteral::toplevel().with_scope(ScopeFacts {
        asm_module: true,
        asm_function: false,
    })
}

#[test]
fn test_valid_asm_module_is_instantiated_from_asm_data() {
    let mut fx = Fixture::load(sync_config(), "\"use asm\"", asm_module());
    let shared = fx.shared(0);

    let info = fx.harness.engine.heap().shared(shared);
    assert!(info.has_asm_data());
    assert_eq!(info.code, Builtin::InstantiateAsm.code_id());
    assert_eq!(fx.harness.engine.ensure_bytecode(shared), Ok(false));
}

#[test]
fn test_invalid_asm_module_falls_back_silently() {
    let backends = jit_compiler::testing::TestBackends::new();
    backends.asm_validator.fail_next(
        Phase::Execute,
        JobFailure::Error(CompileError::Analysis("not valid asm".to_string())),
    );
    let fx = Fixture::load_with(sync_config(), backends, "\"use asm\"", asm_module());
    let shared = fx.shared(0);

    let info = fx.harness.engine.heap().shared(shared);
    assert!(!info.has_asm_data());
    assert!(info.has_bytecode());
    assert_eq!(fx.harness.backends.asm_validator.jobs_created(), 1);
    assert_eq!(fx.harness.backends.interpreter.jobs_created(), 1);
}

#[test]
fn test_asm_validation_is_skipped_when_disabled() {
    let config = CompilerConfig {
        validate_asm: false,
        ..sync_config()
    };
    let fx = Fixture::load(config, "\"use asm\"", asm_module());
    assert_eq!(fx.harness.backends.asm_validator.jobs_created(), 0);
    let shared = fx.shared(0);
    assert!(fx.harness.engine.heap().shared(shared).has_bytecode());
}
