//! Script and eval cache behavior across whole compiles.

use integration_tests::{functions, sync_config};
use jit_compiler::testing::Harness;
use jit_compiler::{CompileOptions, EvalRequest, ScriptDetails, ScriptOrigin};
use core_types::LanguageMode;

const SOURCE: &str = "function f() {} function g() {}";

#[test]
fn test_second_script_compile_is_served_from_cache() {
    let mut harness = Harness::new(sync_config());
    harness.parser.script(SOURCE, functions(&["f", "g"]));
    let native = harness.engine.new_native_context(true);

    let first = harness
        .engine
        .compile_script(SOURCE, ScriptDetails::default(), native, CompileOptions::default())
        .unwrap();
    let bytecode_jobs = harness.backends.interpreter.jobs_created();
    let second = harness
        .engine
        .compile_script(SOURCE, ScriptDetails::default(), native, CompileOptions::default())
        .unwrap();

    assert_eq!(first.shared, second.shared);
    assert_eq!(harness.parser.parse_count(), 1);
    assert_eq!(harness.backends.interpreter.jobs_created(), bytecode_jobs);
    let stats = harness.telemetry.stats();
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_misses, 1);
}

#[test]
fn test_script_cache_keys_on_origin_and_context() {
    let mut harness = Harness::new(sync_config());
    let native = harness.engine.new_native_context(true);
    let other_native = harness.engine.new_native_context(true);

    let base = harness
        .engine
        .compile_script(SOURCE, ScriptDetails::default(), native, CompileOptions::default())
        .unwrap();

    let named = ScriptDetails {
        name: Some("other.js".to_string()),
        ..ScriptDetails::default()
    };
    let renamed = harness
        .engine
        .compile_script(SOURCE, named, native, CompileOptions::default())
        .unwrap();
    assert_ne!(base.shared, renamed.shared);

    let shared_origin = ScriptDetails {
        origin: ScriptOrigin {
            is_shared_cross_origin: true,
            ..ScriptOrigin::default()
        },
        ..ScriptDetails::default()
    };
    let cross_origin = harness
        .engine
        .compile_script(SOURCE, shared_origin, native, CompileOptions::default())
        .unwrap();
    assert_ne!(base.shared, cross_origin.shared);

    let elsewhere = harness
        .engine
        .compile_script(SOURCE, ScriptDetails::default(), other_native, CompileOptions::default())
        .unwrap();
    assert_ne!(base.shared, elsewhere.shared);
    assert_eq!(harness.parser.parse_count(), 4);
}

#[test]
fn test_dynamic_functions_with_same_joined_source_do_not_collide() {
    let mut harness = Harness::new(sync_config());
    let native = harness.engine.new_native_context(true);

    let first = harness
        .engine
        .compile_dynamic_function(native, &[""], "function anonymous(\n) {\n}")
        .unwrap();
    let second = harness
        .engine
        .compile_dynamic_function(native, &["\n) {\nfunction anonymous("], "}")
        .unwrap();

    let heap = harness.engine.heap();
    assert_ne!(heap.function(first).shared, heap.function(second).shared);
    assert_eq!(harness.parser.parse_count(), 2);
    assert_eq!(harness.engine.source_cache().eval_entries(), 2);

    let again = harness
        .engine
        .compile_dynamic_function(native, &[""], "function anonymous(\n) {\n}")
        .unwrap();
    assert_eq!(
        harness.engine.heap().function(again).shared,
        harness.engine.heap().function(first).shared
    );
    assert_eq!(harness.parser.parse_count(), 2);
}

#[test]
fn test_eval_cache_separates_language_modes() {
    let mut harness = Harness::new(sync_config());
    let native = harness.engine.new_native_context(true);

    let sloppy = harness
        .engine
        .compile_eval(EvalRequest::new("x = 1", None, native, LanguageMode::Sloppy).at(4, 10))
        .unwrap();
    let strict = harness
        .engine
        .compile_eval(EvalRequest::new("x = 1", None, native, LanguageMode::Strict).at(4, 10))
        .unwrap();
    let heap = harness.engine.heap();
    assert_ne!(heap.function(sloppy).shared, heap.function(strict).shared);
    assert!(heap.shared(heap.function(strict).shared).language_mode.is_strict());
}

#[test]
fn test_aged_out_script_is_compiled_again() {
    let mut harness = Harness::new(sync_config());
    let native = harness.engine.new_native_context(true);

    let first = harness
        .engine
        .compile_script(SOURCE, ScriptDetails::default(), native, CompileOptions::default())
        .unwrap();
    harness.engine.source_cache_mut().age();
    harness.engine.source_cache_mut().age();
    let second = harness
        .engine
        .compile_script(SOURCE, ScriptDetails::default(), native, CompileOptions::default())
        .unwrap();

    assert_ne!(first.shared, second.shared);
    assert_eq!(harness.parser.parse_count(), 2);
}
