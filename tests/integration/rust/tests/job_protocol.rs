//! The prepare/execute/finalize protocol as seen from outside the engine.

use std::sync::Arc;
use std::thread;

use core_types::LanguageMode;
use jit_compiler::testing::{Harness, Phase};
use jit_compiler::{
    BackendKind, CompilationJob, CompilationUnit, JobFailure, JobState, JobStatus, ScriptDetails,
    UnitFlags,
};
use integration_tests::sync_config;

const SOURCE: &str = "1 + 1";

fn toplevel_job(harness: &mut Harness, backend: BackendKind) -> CompilationJob {
    let source: Arc<str> = Arc::from(SOURCE);
    let script = harness
        .engine
        .heap_mut()
        .new_script(Arc::clone(&source), ScriptDetails::default());
    let unit = CompilationUnit::toplevel(
        harness.engine.owner(),
        script,
        source,
        LanguageMode::Sloppy,
        UnitFlags::default(),
        harness.engine.config().stack_limit,
    );
    let backends = harness.backends.set();
    CompilationJob::new(unit, backend, &backends, harness.engine.owner())
}

#[test]
#[should_panic(expected = "execute")]
fn test_execute_before_prepare_is_rejected() {
    let mut harness = Harness::new(sync_config());
    let mut job = toplevel_job(&mut harness, BackendKind::Interpreter);
    job.execute();
}

#[test]
#[should_panic(expected = "finalize")]
fn test_finalize_before_execute_is_rejected() {
    let mut harness = Harness::new(sync_config());
    let mut job = toplevel_job(&mut harness, BackendKind::Interpreter);
    assert_eq!(job.prepare(harness.engine.owner()), JobStatus::Succeeded);
    job.finalize(harness.engine.owner());
}

#[test]
#[should_panic(expected = "prepare")]
fn test_prepare_twice_is_rejected() {
    let mut harness = Harness::new(sync_config());
    let mut job = toplevel_job(&mut harness, BackendKind::Legacy);
    job.prepare(harness.engine.owner());
    job.prepare(harness.engine.owner());
}

#[test]
fn test_background_execute_hands_job_back() {
    let mut harness = Harness::new(sync_config());
    let mut job = toplevel_job(&mut harness, BackendKind::Interpreter);
    assert!(job.can_execute_on_background_thread());
    assert_eq!(job.prepare(harness.engine.owner()), JobStatus::Succeeded);

    let mut job = thread::spawn(move || {
        assert_eq!(job.execute(), JobStatus::Succeeded);
        job
    })
    .join()
    .unwrap();

    assert!(job.executed_on_background_thread());
    assert_eq!(job.state(), JobState::ReadyToFinalize);
    assert_eq!(job.finalize(harness.engine.owner()), JobStatus::Succeeded);
    assert!(job.output().is_some());
}

#[test]
#[should_panic(expected = "owner thread")]
fn test_legacy_execute_off_owner_thread_is_rejected() {
    let mut harness = Harness::new(sync_config());
    let mut job = toplevel_job(&mut harness, BackendKind::Legacy);
    assert!(!job.can_execute_on_background_thread());
    job.prepare(harness.engine.owner());

    let result = thread::spawn(move || {
        job.execute();
    })
    .join();
    if let Err(panic) = result {
        std::panic::resume_unwind(panic);
    }
}

#[test]
fn test_failed_phase_keeps_error_on_unit() {
    let mut harness = Harness::new(sync_config());
    harness
        .backends
        .interpreter
        .fail_next(Phase::Execute, JobFailure::Error(core_types::CompileError::StackOverflow));
    let mut job = toplevel_job(&mut harness, BackendKind::Interpreter);

    assert_eq!(job.prepare(harness.engine.owner()), JobStatus::Succeeded);
    assert_eq!(job.execute(), JobStatus::Failed);
    assert_eq!(job.state(), JobState::Failed);
    assert_eq!(
        job.unit().pending_error(),
        Some(&core_types::CompileError::StackOverflow)
    );
}
