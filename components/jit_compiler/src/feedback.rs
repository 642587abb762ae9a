//! Feedback shapes and per-function feedback records.

use core_types::CodeId;
use serde::{Deserialize, Serialize};

/// Kind of one feedback slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedbackSlotKind {
    /// Call site
    Call,
    /// Property load
    LoadProperty,
    /// Property store
    StoreProperty,
    /// Global load
    LoadGlobal,
    /// Binary operation
    BinaryOp,
    /// Comparison
    CompareOp,
    /// Object or array literal boilerplate
    Literal,
    /// Closure creation
    CreateClosure,
}

/// Shape of a feedback record.
///
/// Persistent function metadata stores the shape; each function instance
/// gets a record allocated to match it. Recompiles must reproduce the same
/// shape exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedbackMetadata {
    slots: Vec<FeedbackSlotKind>,
}

impl FeedbackMetadata {
    /// Shape with the given slots.
    pub fn new(slots: Vec<FeedbackSlotKind>) -> Self {
        Self { slots }
    }

    /// Slots in order.
    pub fn slots(&self) -> &[FeedbackSlotKind] {
        &self.slots
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the shape has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether this shape differs from the one a literal requires.
    pub fn spec_differs_from(&self, spec: &FeedbackMetadata) -> bool {
        self.slots != spec.slots
    }
}

/// Request to optimize, or optimization in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptimizationMarker {
    /// Nothing pending
    #[default]
    None,
    /// Optimize synchronously on the next call
    CompileOptimized,
    /// Optimize concurrently on the next call
    CompileOptimizedConcurrent,
    /// A background job for this function is in flight
    InOptimizationQueue,
}

/// Per-function feedback: hotness, the cached optimized artifact and the
/// optimization marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackRecord {
    shape: FeedbackMetadata,
    optimized_code: Option<CodeId>,
    /// Calls observed since the last optimization attempt
    pub profiler_ticks: u32,
    marker: OptimizationMarker,
}

impl FeedbackRecord {
    /// Allocate a fresh record matching `shape`.
    pub fn new(shape: &FeedbackMetadata) -> Self {
        Self {
            shape: shape.clone(),
            optimized_code: None,
            profiler_ticks: 0,
            marker: OptimizationMarker::None,
        }
    }

    /// Shape this record was allocated for.
    pub fn shape(&self) -> &FeedbackMetadata {
        &self.shape
    }

    /// Cached optimized artifact, if any.
    pub fn optimized_code(&self) -> Option<CodeId> {
        self.optimized_code
    }

    /// Store an optimized artifact. Clears any pending marker.
    pub fn set_optimized_code(&mut self, code: CodeId) {
        self.optimized_code = Some(code);
        self.marker = OptimizationMarker::None;
    }

    /// Drop the cached artifact.
    pub fn clear_optimized_code(&mut self) {
        self.optimized_code = None;
    }

    /// Current marker.
    pub fn marker(&self) -> OptimizationMarker {
        self.marker
    }

    /// Set the marker.
    pub fn set_marker(&mut self, marker: OptimizationMarker) {
        self.marker = marker;
    }

    /// Whether any marker is set.
    pub fn has_marker(&self) -> bool {
        self.marker != OptimizationMarker::None
    }

    /// Reset the marker.
    pub fn clear_marker(&mut self) {
        self.marker = OptimizationMarker::None;
    }

    /// Whether a background job is in flight.
    pub fn is_in_optimization_queue(&self) -> bool {
        self.marker == OptimizationMarker::InOptimizationQueue
    }
}
