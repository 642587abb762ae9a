//! On-stack replacement requests against interpreted and legacy functions.

use core_types::CompileError;
use integration_tests::{functions, sync_config, Fixture};
use jit_compiler::{CompilerConfig, FrameTier, OptimizeOutcome, OsrOffset, OsrTarget};

const SOURCE: &str = "function loop() { for (;;) {} }";

#[test]
fn test_interpreted_frame_enters_at_bytecode_offset() {
    let mut fx = Fixture::load(sync_config(), SOURCE, functions(&["loop"]));
    let f = fx.function(1);
    let code_before = fx.harness.engine.heap().function(f).code;
    let parses = fx.harness.parser.parse_count();

    let target = OsrTarget::new(FrameTier::Interpreted, OsrOffset::BytecodeOffset(21)).unwrap();
    let outcome = fx.harness.engine.compile_for_osr(f, target).unwrap();
    let OptimizeOutcome::Optimized(code) = outcome else {
        panic!("expected OSR code, got {:?}", outcome);
    };

    let heap = fx.harness.engine.heap();
    assert_eq!(heap.code(code).osr_offset, Some(21));
    assert_eq!(heap.function(f).code, code_before);
    assert_eq!(fx.harness.parser.parse_count(), parses);
}

#[test]
fn test_legacy_frame_enters_at_ast_id() {
    let config = CompilerConfig {
        stress_legacy_backend: true,
        ..sync_config()
    };
    let mut fx = Fixture::load(config, SOURCE, functions(&["loop"]));
    let f = fx.function(1);
    assert!(!fx.harness.engine.heap().shared(fx.shared(1)).has_bytecode());

    let target = OsrTarget::new(FrameTier::Legacy, OsrOffset::AstId(7)).unwrap();
    let outcome = fx.harness.engine.compile_for_osr(f, target).unwrap();
    let code = outcome.code().unwrap();
    assert_eq!(fx.harness.engine.heap().code(code).osr_offset, Some(7));
}

#[test]
fn test_mismatched_pairing_is_rejected_before_compiling() {
    assert!(matches!(
        OsrTarget::new(FrameTier::Interpreted, OsrOffset::AstId(7)),
        Err(CompileError::OsrPairing(_))
    ));
    assert!(matches!(
        OsrTarget::new(FrameTier::Legacy, OsrOffset::BytecodeOffset(7)),
        Err(CompileError::OsrPairing(_))
    ));

    let mut fx = Fixture::load(sync_config(), SOURCE, functions(&["loop"]));
    let f = fx.function(1);
    let target = OsrTarget::new(FrameTier::Legacy, OsrOffset::AstId(7)).unwrap();
    let error = fx.harness.engine.compile_for_osr(f, target).unwrap_err();
    assert!(matches!(error, CompileError::OsrPairing(_)));
    assert_eq!(fx.harness.backends.optimizing.jobs_created(), 0);
}

#[test]
fn test_osr_ignores_and_skips_the_optimized_cache() {
    let mut fx = Fixture::load(sync_config(), SOURCE, functions(&["loop"]));
    let f = fx.function(1);
    let regular = fx
        .harness
        .engine
        .compile_optimized(f, jit_compiler::ConcurrencyMode::NotConcurrent)
        .unwrap()
        .code()
        .unwrap();

    let target = OsrTarget::new(FrameTier::Interpreted, OsrOffset::BytecodeOffset(3)).unwrap();
    let osr = fx.harness.engine.compile_for_osr(f, target).unwrap().code().unwrap();
    assert_ne!(osr, regular);

    let feedback = fx.harness.engine.heap().function(f).feedback.as_ref().unwrap();
    assert_eq!(feedback.optimized_code(), Some(regular));
    assert_eq!(fx.harness.backends.optimizing.jobs_created(), 2);
}
