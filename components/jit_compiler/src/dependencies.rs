//! Assumptions optimized code depends on, and their invalidation.
//!
//! A job records the assumptions it relies on during prepare. While the
//! job is in flight the table watches it; invalidating an assumption marks
//! the watcher aborted, and the job is neutralized at finalize with
//! `BailedOutDueToDependencyChange`. Once installed, the code itself is
//! registered as a dependent and marked for deoptimization on invalidation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use core_types::{AssumptionId, CodeId};

use crate::handles::{Capability, CapabilityScope};

/// Assumptions one compilation relies on.
#[derive(Debug, Default)]
pub struct CompilationDependencies {
    assumptions: Vec<AssumptionId>,
    aborted: Arc<AtomicBool>,
}

impl CompilationDependencies {
    /// Empty dependency set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Depend on `assumption`.
    ///
    /// Panics while dependency changes are revoked (background execute and
    /// finalize).
    pub fn assume(&mut self, assumption: AssumptionId) {
        CapabilityScope::assert_allowed(Capability::DependencyChange);
        if !self.assumptions.contains(&assumption) {
            self.assumptions.push(assumption);
        }
    }

    /// Recorded assumptions.
    pub fn assumptions(&self) -> &[AssumptionId] {
        &self.assumptions
    }

    /// Whether an assumption was invalidated since it was recorded.
    pub fn has_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.aborted)
    }
}

#[derive(Debug)]
struct AssumptionCell {
    valid: bool,
    dependent_code: Vec<CodeId>,
    watchers: Vec<Arc<AtomicBool>>,
}

/// Result of invalidating an assumption.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Invalidation {
    /// Installed code that must be deoptimized
    pub code: Vec<CodeId>,
    /// In-flight jobs that were neutralized
    pub aborted_jobs: usize,
}

/// Owner-thread table of assumptions.
#[derive(Debug, Default)]
pub struct AssumptionTable {
    cells: Vec<AssumptionCell>,
}

impl AssumptionTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new, valid assumption.
    pub fn create(&mut self) -> AssumptionId {
        let id = AssumptionId(self.cells.len() as u32);
        self.cells.push(AssumptionCell {
            valid: true,
            dependent_code: Vec::new(),
            watchers: Vec::new(),
        });
        id
    }

    /// Whether `assumption` still holds.
    pub fn is_valid(&self, assumption: AssumptionId) -> bool {
        self.cells[assumption.index()].valid
    }

    /// Watch an in-flight job's dependencies.
    ///
    /// A dependency set that already relies on an invalid assumption is
    /// aborted immediately.
    pub fn watch(&mut self, dependencies: &CompilationDependencies) {
        for assumption in dependencies.assumptions() {
            let cell = &mut self.cells[assumption.index()];
            if cell.valid {
                cell.watchers.push(dependencies.abort_flag());
            } else {
                dependencies.aborted.store(true, Ordering::Release);
            }
        }
    }

    /// Stop watching a job that has been finalized or dropped.
    pub fn unwatch(&mut self, dependencies: &CompilationDependencies) {
        for assumption in dependencies.assumptions() {
            self.cells[assumption.index()]
                .watchers
                .retain(|flag| !Arc::ptr_eq(flag, &dependencies.aborted));
        }
    }

    /// Register installed code as dependent on the job's assumptions.
    pub fn commit(&mut self, code: CodeId, dependencies: &CompilationDependencies) {
        self.unwatch(dependencies);
        for assumption in dependencies.assumptions() {
            self.cells[assumption.index()].dependent_code.push(code);
        }
    }

    /// Invalidate `assumption`.
    ///
    /// Returns the installed code that depended on it and aborts every
    /// watched job. Invalidating twice is a no-op.
    pub fn invalidate(&mut self, assumption: AssumptionId) -> Invalidation {
        let cell = &mut self.cells[assumption.index()];
        if !cell.valid {
            return Invalidation::default();
        }
        cell.valid = false;
        let watchers = std::mem::take(&mut cell.watchers);
        for flag in &watchers {
            flag.store(true, Ordering::Release);
        }
        Invalidation {
            code: std::mem::take(&mut cell.dependent_code),
            aborted_jobs: watchers.len(),
        }
    }
}
