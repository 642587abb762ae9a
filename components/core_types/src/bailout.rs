//! Bailout reasons and retry/abort classification.
//!
//! A bailout is a decision to abandon or defer optimization. It is a value,
//! never an error: the unit keeps running its existing code.
//!
//! - **Retry** is transient; the unit may be optimized again later.
//! - **Abort** is sticky; optimization stays disabled until an explicit
//!   external reset.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why optimization of a unit was abandoned or deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BailoutReason {
    /// Debugger break information is attached to the function
    FunctionBeingDebugged,
    /// Optimization is off globally, filtered out, or disabled for the unit
    OptimizationDisabled,
    /// Optimization was disabled by a test hook
    OptimizationDisabledForTest,
    /// An assumption the job depended on was invalidated while it ran
    BailedOutDueToDependencyChange,
    /// The optimizing backend could not build its graph
    GraphBuildingFailed,
    /// The literal contains a construct the optimizing backend rejects
    UnsupportedConstruct,
    /// The function is too large to optimize
    FunctionTooBig,
    /// Code generation in the backend failed
    CodeGenerationFailed,
    /// Optimized code was deoptimized too many times
    OptimizedTooManyTimes,
}

impl BailoutReason {
    /// Human-readable message for traces.
    pub fn message(self) -> &'static str {
        match self {
            BailoutReason::FunctionBeingDebugged => "Function is being debugged",
            BailoutReason::OptimizationDisabled => "Optimization disabled",
            BailoutReason::OptimizationDisabledForTest => "Optimization disabled for test",
            BailoutReason::BailedOutDueToDependencyChange => "Bailed out due to dependency change",
            BailoutReason::GraphBuildingFailed => "Optimized graph construction failed",
            BailoutReason::UnsupportedConstruct => "Unsupported construct",
            BailoutReason::FunctionTooBig => "Function is too big to be optimized",
            BailoutReason::CodeGenerationFailed => "Code generation failed",
            BailoutReason::OptimizedTooManyTimes => "Optimized too many times",
        }
    }
}

impl fmt::Display for BailoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Whether a bailout may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BailoutKind {
    /// Transient; future optimization attempts are allowed
    Retry,
    /// Sticky; optimization is disabled until reset
    Abort,
}

/// A recorded bailout: reason plus retry/abort classification.
///
/// # Examples
///
/// ```
/// use core_types::{Bailout, BailoutKind, BailoutReason};
///
/// let bailout = Bailout::retry(BailoutReason::BailedOutDueToDependencyChange);
/// assert_eq!(bailout.kind, BailoutKind::Retry);
/// assert!(!bailout.is_abort());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bailout {
    /// Why optimization stopped
    pub reason: BailoutReason,
    /// Retry or abort
    pub kind: BailoutKind,
}

impl Bailout {
    /// A transient bailout.
    pub fn retry(reason: BailoutReason) -> Self {
        Self {
            reason,
            kind: BailoutKind::Retry,
        }
    }

    /// A sticky bailout.
    pub fn abort(reason: BailoutReason) -> Self {
        Self {
            reason,
            kind: BailoutKind::Abort,
        }
    }

    /// Whether this bailout disables future optimization.
    pub fn is_abort(&self) -> bool {
        self.kind == BailoutKind::Abort
    }
}

impl fmt::Display for Bailout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            BailoutKind::Retry => "retry",
            BailoutKind::Abort => "abort",
        };
        write!(f, "{} ({})", self.reason, kind)
    }
}
