//! Hot-call tiering, optimized code caching and background finalization.

use std::time::Duration;

use core_types::{Bailout, BailoutReason};
use integration_tests::{functions, sync_config, Fixture};
use jit_compiler::testing::{Phase, ScriptedBackend, TestBackends};
use jit_compiler::{
    BackendKind, CodeKind, CompilerConfig, ConcurrencyMode, JobFailure, OptimizeOutcome,
};
use jit_compiler::telemetry::DeclineReason;

const SOURCE: &str = "function f() {} function g() {}";

fn fixture(config: CompilerConfig) -> Fixture {
    Fixture::load(config, SOURCE, functions(&["f", "g"]))
}

#[test]
fn test_abort_is_not_retried_by_hot_calls() {
    let mut fx = fixture(sync_config());
    fx.harness.backends.optimizing.fail_next(
        Phase::Execute,
        JobFailure::Bailout(Bailout::abort(BailoutReason::FunctionTooBig)),
    );
    let f = fx.function(1);

    let outcome = fx.heat_up(f);
    assert_eq!(
        outcome,
        Some(OptimizeOutcome::Bailout(Bailout::abort(BailoutReason::FunctionTooBig)))
    );
    assert!(fx.harness.engine.heap().shared(fx.shared(1)).optimization_disabled());

    for _ in 0..10 {
        assert_eq!(fx.harness.engine.on_hot_call(f).unwrap(), None);
    }
    assert_eq!(fx.harness.backends.optimizing.jobs_created(), 1);
    assert!(!fx.harness.engine.heap().is_optimized(f));
}

#[test]
fn test_retry_may_be_attempted_again() {
    let mut fx = fixture(sync_config());
    fx.harness.backends.optimizing.fail_next(
        Phase::Prepare,
        JobFailure::Bailout(Bailout::retry(BailoutReason::BailedOutDueToDependencyChange)),
    );
    let f = fx.function(1);

    let first = fx.heat_up(f);
    assert!(matches!(first, Some(OptimizeOutcome::Bailout(bailout)) if !bailout.is_abort()));
    assert!(!fx.harness.engine.heap().shared(fx.shared(1)).optimization_disabled());

    let second = fx.heat_up(f);
    assert!(matches!(second, Some(OptimizeOutcome::Optimized(_))));
    assert!(fx.harness.engine.heap().is_optimized(f));
    assert_eq!(fx.harness.backends.optimizing.jobs_created(), 2);
    let stats = fx.harness.telemetry.stats();
    assert_eq!(stats.retries, 1);
    assert_eq!(stats.aborts, 0);
}

#[test]
fn test_full_queue_declines_without_disabling() {
    let mut fx = fixture(CompilerConfig {
        queue_capacity: 1,
        ..Default::default()
    });
    let gate = fx.harness.backends.optimizing.hold_execute();
    let f = fx.function(1);
    let g = fx.function(2);
    let g_code = fx.harness.engine.heap().function(g).code;

    let queued = fx.harness.engine.compile_optimized(f, ConcurrencyMode::Concurrent).unwrap();
    assert!(matches!(queued, OptimizeOutcome::Queued(_)));
    let declined = fx.harness.engine.compile_optimized(g, ConcurrencyMode::Concurrent).unwrap();
    assert_eq!(declined, OptimizeOutcome::Declined(DeclineReason::QueueFull));

    assert_eq!(fx.harness.engine.heap().function(g).code, g_code);
    assert!(!fx.harness.engine.heap().shared(fx.shared(2)).optimization_disabled());
    assert_eq!(fx.harness.telemetry.stats().declined_queue_full, 1);

    gate.release();
    assert_eq!(fx.harness.engine.flush(), 1);
    let later = fx.harness.engine.compile_optimized(g, ConcurrencyMode::Concurrent).unwrap();
    assert!(matches!(later, OptimizeOutcome::Queued(_)));
    assert_eq!(fx.harness.engine.flush(), 1);
    assert!(fx.harness.engine.heap().is_optimized(g));
}

#[test]
fn test_memory_pressure_declines_without_disabling() {
    let mut fx = fixture(CompilerConfig::default());
    let f = fx.function(1);
    let code = fx.harness.engine.heap().function(f).code;
    fx.harness.memory.set_pressure(true);

    let declined = fx.harness.engine.compile_optimized(f, ConcurrencyMode::Concurrent).unwrap();
    assert_eq!(declined, OptimizeOutcome::Declined(DeclineReason::MemoryPressure));
    assert_eq!(fx.harness.engine.heap().function(f).code, code);
    assert!(!fx.harness.engine.heap().shared(fx.shared(1)).optimization_disabled());
    assert_eq!(fx.harness.backends.optimizing.jobs_created(), 1);

    fx.harness.memory.set_pressure(false);
    fx.harness.engine.compile_optimized(f, ConcurrencyMode::Concurrent).unwrap();
    assert_eq!(fx.harness.engine.flush(), 1);
    assert!(fx.harness.engine.heap().is_optimized(f));
}

#[test]
fn test_context_specialized_code_stays_out_of_cache() {
    let mut fx = fixture(CompilerConfig {
        context_specialization: true,
        ..sync_config()
    });
    let f = fx.function(1);

    let outcome = fx.harness.engine.compile_optimized(f, ConcurrencyMode::NotConcurrent).unwrap();
    let OptimizeOutcome::Optimized(code) = outcome else {
        panic!("expected optimized code, got {:?}", outcome);
    };
    let heap = fx.harness.engine.heap();
    assert!(heap.code(code).context_specialized);
    assert_eq!(heap.function(f).code, code);
    assert_eq!(heap.function(f).feedback.as_ref().unwrap().optimized_code(), None);

    let again = fx.harness.engine.get_optimized_code(f, ConcurrencyMode::NotConcurrent, None);
    assert_ne!(again, OptimizeOutcome::Optimized(code));
    assert_eq!(fx.harness.backends.optimizing.jobs_created(), 2);
}

#[test]
fn test_debugged_function_is_not_optimized() {
    let mut fx = fixture(sync_config());
    let f = fx.function(1);
    let code = fx.harness.engine.heap().function(f).code;
    fx.harness.engine.set_break_info(fx.shared(1), true);

    let outcome = fx.harness.engine.get_optimized_code(f, ConcurrencyMode::NotConcurrent, None);
    assert_eq!(
        outcome,
        OptimizeOutcome::Bailout(Bailout::abort(BailoutReason::FunctionBeingDebugged))
    );
    assert_eq!(fx.harness.engine.heap().function(f).code, code);
    assert_eq!(fx.harness.backends.optimizing.jobs_created(), 1);

    fx.harness.engine.set_break_info(fx.shared(1), false);
    let outcome = fx.harness.engine.compile_optimized(f, ConcurrencyMode::NotConcurrent).unwrap();
    assert!(matches!(outcome, OptimizeOutcome::Optimized(_)));
}

#[test]
fn test_job_of_disabled_function_is_discarded() {
    let mut fx = fixture(CompilerConfig::default());
    let gate = fx.harness.backends.optimizing.hold_execute();
    let f = fx.function(1);
    let unoptimized = fx.harness.engine.heap().shared(fx.shared(1)).code;

    fx.harness.engine.compile_optimized(f, ConcurrencyMode::Concurrent).unwrap();
    let shared = fx.shared(1);
    fx.harness
        .engine
        .heap_mut()
        .shared_mut(shared)
        .disable_optimization(BailoutReason::OptimizationDisabled);
    gate.release();

    assert_eq!(fx.harness.engine.flush(), 0);
    let heap = fx.harness.engine.heap();
    assert_eq!(heap.function(f).code, unoptimized);
    assert!(!heap.function(f).is_in_optimization_queue());
    assert_eq!(fx.harness.telemetry.stats().retries, 1);
}

#[test]
fn test_invalidated_code_is_not_served_from_cache() {
    let mut fx = fixture(sync_config());
    let assumption = fx.harness.engine.create_assumption();
    fx.harness.backends.optimizing.assume_in_prepare(assumption);
    let f = fx.function(1);

    let first = fx.harness.engine.compile_optimized(f, ConcurrencyMode::NotConcurrent).unwrap();
    let OptimizeOutcome::Optimized(code) = first else {
        panic!("expected optimized code, got {:?}", first);
    };

    fx.harness.engine.invalidate_assumption(assumption);
    let heap = fx.harness.engine.heap();
    assert!(heap.code(code).marked_for_deoptimization());
    assert_ne!(heap.function(f).code, code);
    assert_eq!(heap.function(f).feedback.as_ref().unwrap().optimized_code(), None);

    let sibling = fx.function(1);
    assert_ne!(fx.harness.engine.heap().function(sibling).code, code);

    // The backend still relies on the dead assumption, so the fresh job
    // cannot finish; what matters is that one was started.
    let second = fx.harness.engine.get_optimized_code(f, ConcurrencyMode::NotConcurrent, None);
    assert_eq!(
        second,
        OptimizeOutcome::Bailout(Bailout::retry(BailoutReason::BailedOutDueToDependencyChange))
    );
    assert_eq!(fx.harness.backends.optimizing.jobs_created(), 2);
}

#[test]
fn test_optimized_function_is_not_recompiled() {
    let mut fx = fixture(sync_config());
    let f = fx.function(1);
    let outcome = fx.harness.engine.compile_optimized(f, ConcurrencyMode::NotConcurrent).unwrap();
    let code = outcome.code().unwrap();

    let again = fx.harness.engine.compile_optimized(f, ConcurrencyMode::NotConcurrent).unwrap();
    assert_eq!(again, OptimizeOutcome::Optimized(code));
    assert_eq!(fx.harness.backends.optimizing.jobs_created(), 1);
    assert_eq!(fx.harness.engine.heap().code(code).kind, CodeKind::Optimized);
}

#[test]
fn test_many_background_jobs_all_install() {
    let names: Vec<String> = (0..12).map(|index| format!("f{}", index)).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let source = "many functions";
    let mut fx = Fixture::load(
        CompilerConfig {
            worker_count: 3,
            queue_capacity: 16,
            ..Default::default()
        },
        source,
        functions(&name_refs),
    );
    fx.harness
        .backends
        .optimizing
        .set_execute_delay(Duration::from_millis(2));

    let instances: Vec<_> = (1..=12).map(|id| fx.function(id)).collect();
    for function in &instances {
        let outcome = fx.harness.engine.compile_optimized(*function, ConcurrencyMode::Concurrent).unwrap();
        assert!(matches!(outcome, OptimizeOutcome::Queued(_)));
    }

    assert_eq!(fx.harness.engine.flush(), 12);
    for function in &instances {
        assert!(fx.harness.engine.heap().is_optimized(*function));
    }
    assert_eq!(fx.harness.telemetry.stats().optimized_compiles, 12);
}

#[test]
fn test_owner_only_optimizer_never_strands_a_function() {
    let backends = TestBackends::with_optimizing(ScriptedBackend::owner_only(BackendKind::Optimizing));
    let mut fx = Fixture::load_with(CompilerConfig::default(), backends, SOURCE, functions(&["f", "g"]));
    let f = fx.function(1);

    let outcome = fx.harness.engine.compile_optimized(f, ConcurrencyMode::Concurrent).unwrap();
    assert!(matches!(outcome, OptimizeOutcome::Optimized(_)));
    assert_eq!(fx.harness.engine.flush(), 0);
    assert!(fx.harness.engine.heap().is_optimized(f));
    assert!(!fx.harness.engine.heap().function(f).is_in_optimization_queue());
    assert_eq!(fx.harness.engine.scheduler().map(|s| s.in_flight()), Some(0));

    let g = fx.function(2);
    let second = fx.harness.engine.compile_optimized(g, ConcurrencyMode::Concurrent).unwrap();
    assert!(matches!(second, OptimizeOutcome::Optimized(_)));
}
