//! Unit tests for Bailout and BailoutReason

use core_types::{Bailout, BailoutKind, BailoutReason};

#[test]
fn test_retry_is_not_sticky() {
    let bailout = Bailout::retry(BailoutReason::OptimizationDisabled);
    assert_eq!(bailout.kind, BailoutKind::Retry);
    assert!(!bailout.is_abort());
}

#[test]
fn test_abort_is_sticky() {
    let bailout = Bailout::abort(BailoutReason::FunctionBeingDebugged);
    assert!(bailout.is_abort());
    assert_eq!(bailout.reason, BailoutReason::FunctionBeingDebugged);
}

#[test]
fn test_reason_messages_are_distinct() {
    let reasons = [
        BailoutReason::FunctionBeingDebugged,
        BailoutReason::OptimizationDisabled,
        BailoutReason::OptimizationDisabledForTest,
        BailoutReason::BailedOutDueToDependencyChange,
        BailoutReason::GraphBuildingFailed,
        BailoutReason::UnsupportedConstruct,
        BailoutReason::FunctionTooBig,
        BailoutReason::CodeGenerationFailed,
        BailoutReason::OptimizedTooManyTimes,
    ];
    let mut messages: Vec<&str> = reasons.iter().map(|r| r.message()).collect();
    messages.sort_unstable();
    messages.dedup();
    assert_eq!(messages.len(), reasons.len());
}

#[test]
fn test_bailout_serializes_by_name() {
    let bailout = Bailout::retry(BailoutReason::BailedOutDueToDependencyChange);
    let json = serde_json::to_string(&bailout).unwrap();
    assert!(json.contains("BailedOutDueToDependencyChange"));
    let back: Bailout = serde_json::from_str(&json).unwrap();
    assert_eq!(back, bailout);
}
