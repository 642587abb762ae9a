//! Code generation from strings, eval instantiation and code caches.

use core_types::{ErrorKind, LanguageMode, ParseRestriction, NO_SOURCE_POSITION};
use integration_tests::{functions, sync_config};
use jit_compiler::testing::Harness;
use jit_compiler::{CompileOptions, EvalRequest, FunctionLiteral, ScopeFacts, ScriptDetails};

#[test]
fn test_code_generation_refused_without_permission() {
    let mut harness = Harness::new(sync_config());
    let native = harness.engine.new_native_context(false);

    let error = harness
        .engine
        .compile_dynamic_function(native, &["a"], "return a")
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::EvalError);

    let error = harness
        .engine
        .get_function_from_string(native, "1 + 1", ParseRestriction::NoParseRestriction, NO_SOURCE_POSITION)
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::EvalError);
    assert_eq!(harness.parser.parse_count(), 0);
}

#[test]
fn test_embedder_callback_can_allow_code_generation() {
    let mut harness = Harness::new(sync_config());
    let native = harness.engine.new_native_context(false);
    harness
        .engine
        .set_code_gen_callback(Box::new(|_, source: &str| !source.contains("forbidden")));

    assert!(harness
        .engine
        .compile_dynamic_function(native, &[], "return 1")
        .is_ok());
    let error = harness
        .engine
        .compile_dynamic_function(native, &[], "forbidden()")
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::EvalError);
}

#[test]
fn test_nested_context_uses_native_permission() {
    let mut harness = Harness::new(sync_config());
    let native = harness.engine.new_native_context(true);
    let inner = harness.engine.heap_mut().new_context(native);
    assert!(!harness.engine.heap().context(inner).allow_code_gen_from_strings);

    let function = harness
        .engine
        .compile_dynamic_function(inner, &[], "return 1")
        .unwrap();
    assert_eq!(harness.engine.heap().function(function).context, native);
}

#[test]
fn test_cached_eval_gets_fresh_feedback() {
    let mut harness = Harness::new(sync_config());
    let native = harness.engine.new_native_context(true);
    let request = || EvalRequest::new("x + 1", None, native, LanguageMode::Sloppy).at(3, 9);

    let first = harness.engine.compile_eval(request()).unwrap();
    let second = harness.engine.compile_eval(request()).unwrap();

    let heap = harness.engine.heap();
    assert_ne!(first, second);
    assert_eq!(heap.function(first).shared, heap.function(second).shared);
    assert!(heap.function(second).feedback.is_some());
    assert_eq!(harness.parser.parse_count(), 1);
}

#[test]
fn test_code_cache_skips_parse_in_new_engine() {
    const SOURCE: &str = "function f() {}";
    let mut producer = Harness::new(sync_config());
    producer.parser.script(SOURCE, functions(&["f"]));
    let native = producer.engine.new_native_context(true);
    let produced = producer
        .engine
        .compile_script(SOURCE, ScriptDetails::default(), native, CompileOptions::ProduceCodeCache)
        .unwrap();
    let data = produced.produced_cache.expect("code cache produced");

    let mut consumer = Harness::new(sync_config());
    let native = consumer.engine.new_native_context(true);
    let consumed = consumer
        .engine
        .compile_script(SOURCE, ScriptDetails::default(), native, CompileOptions::ConsumeCodeCache(data))
        .unwrap();

    assert_eq!(consumer.parser.parse_count(), 0);
    assert!(consumer.engine.heap().shared(consumed.shared).has_bytecode());
    assert_eq!(consumer.debugger.compiled(), vec![consumed.script]);
}

#[test]
fn test_code_cache_ignored_while_debugging() {
    const SOURCE: &str = "function f() {}";
    let mut producer = Harness::new(sync_config());
    let native = producer.engine.new_native_context(true);
    let data = producer
        .engine
        .compile_script(SOURCE, ScriptDetails::default(), native, CompileOptions::ProduceCodeCache)
        .unwrap()
        .produced_cache
        .unwrap();

    let mut consumer = Harness::new(sync_config());
    consumer.debugger.set_loaded(true);
    let native = consumer.engine.new_native_context(true);
    consumer
        .engine
        .compile_script(SOURCE, ScriptDetails::default(), native, CompileOptions::ConsumeCodeCache(data))
        .unwrap();
    assert_eq!(consumer.parser.parse_count(), 1);
}

#[test]
fn test_no_code_cache_for_asm_scripts() {
    const SOURCE: &str = "\"use asm\"";
    let mut harness = Harness::new(sync_config());
    harness.parser.script(
        SOURCE,
        FunctionLiteral::toplevel().with_scope(ScopeFacts {
            asm_module: true,
            asm_function: false,
        }),
    );
    let native = harness.engine.new_native_context(true);
    let result = harness
        .engine
        .compile_script(SOURCE, ScriptDetails::default(), native, CompileOptions::ProduceCodeCache)
        .unwrap();
    assert_eq!(result.produced_cache, None);
}
