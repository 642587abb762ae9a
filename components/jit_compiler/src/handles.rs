//! Thread affinity and capability tokens.
//!
//! - [`OwnerThread`] - proof that the caller runs on the engine's owner
//!   thread; required by every owner-only operation
//! - [`HandleBlock`] - the heap references a job holds, detached from the
//!   owner's scope and moved with the job by value
//! - [`CapabilityScope`] - revokes heap access or dependency changes on the
//!   current thread for the duration of a phase

use std::cell::Cell;
use std::marker::PhantomData;
use std::thread::{self, ThreadId};

use core_types::{ContextId, FunctionId, ScriptId, SharedId};

/// Token for the thread that owns an engine.
///
/// The token is `!Send`, so it cannot leave the thread that acquired it.
/// Owner-only operations take it as a parameter and check it against the
/// thread id recorded when the engine or job was created.
#[derive(Debug, Clone, Copy)]
pub struct OwnerThread {
    id: ThreadId,
    _not_send: PhantomData<*const ()>,
}

impl OwnerThread {
    /// Acquire the token for the current thread.
    pub fn acquire() -> Self {
        Self {
            id: thread::current().id(),
            _not_send: PhantomData,
        }
    }

    /// Thread id this token belongs to.
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Whether the caller is running on the token's thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.id
    }

    /// Panics unless this token belongs to `expected` and the caller runs
    /// on it.
    pub fn check(&self, expected: ThreadId) {
        assert!(
            self.id == expected && self.is_current(),
            "owner-only operation invoked off the owner thread"
        );
    }
}

/// Heap references held by a compilation job.
///
/// Reading a reference requires the owner token; a worker thread holding
/// the block by value can move it but never dereference it. A block has
/// exactly one holder, so it cannot be duplicated:
///
/// ```compile_fail
/// use jit_compiler::handles::HandleBlock;
///
/// fn duplicate(block: &HandleBlock) -> HandleBlock {
///     block.clone()
/// }
/// ```
#[derive(Debug)]
pub struct HandleBlock {
    owner: ThreadId,
    script: ScriptId,
    shared: Option<SharedId>,
    closure: Option<FunctionId>,
    context: Option<ContextId>,
}

impl HandleBlock {
    /// Open a block for a job compiling from `script`.
    pub fn new(owner: &OwnerThread, script: ScriptId) -> Self {
        Self {
            owner: owner.id(),
            script,
            shared: None,
            closure: None,
            context: None,
        }
    }

    /// Script the job compiles from.
    pub fn script(&self, owner: &OwnerThread) -> ScriptId {
        owner.check(self.owner);
        self.script
    }

    /// Function metadata the job compiles.
    pub fn shared(&self, owner: &OwnerThread) -> Option<SharedId> {
        owner.check(self.owner);
        self.shared
    }

    /// Function instance the job optimizes.
    pub fn closure(&self, owner: &OwnerThread) -> Option<FunctionId> {
        owner.check(self.owner);
        self.closure
    }

    /// Enclosing context.
    pub fn context(&self, owner: &OwnerThread) -> Option<ContextId> {
        owner.check(self.owner);
        self.context
    }

    /// Record the function metadata.
    pub fn set_shared(&mut self, owner: &OwnerThread, shared: SharedId) {
        owner.check(self.owner);
        self.shared = Some(shared);
    }

    /// Record the function instance.
    pub fn set_closure(&mut self, owner: &OwnerThread, closure: FunctionId) {
        owner.check(self.owner);
        self.closure = Some(closure);
    }

    /// Record the context.
    pub fn set_context(&mut self, owner: &OwnerThread, context: ContextId) {
        owner.check(self.owner);
        self.context = Some(context);
    }
}

/// A capability that can be revoked for the duration of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Allocating heap objects, creating or dereferencing handles
    HeapAccess,
    /// Registering new code dependencies
    DependencyChange,
}

thread_local! {
    static NO_HEAP_ACCESS: Cell<u32> = const { Cell::new(0) };
    static NO_DEPENDENCY_CHANGE: Cell<u32> = const { Cell::new(0) };
}

fn counter(capability: Capability) -> &'static std::thread::LocalKey<Cell<u32>> {
    match capability {
        Capability::HeapAccess => &NO_HEAP_ACCESS,
        Capability::DependencyChange => &NO_DEPENDENCY_CHANGE,
    }
}

/// Guard revoking capabilities on the current thread until dropped.
///
/// Scopes nest; a capability is available again once every scope that
/// revoked it has been dropped.
#[derive(Debug)]
pub struct CapabilityScope {
    revoked: Vec<Capability>,
    _not_send: PhantomData<*const ()>,
}

impl CapabilityScope {
    /// Revoke `capabilities` on the current thread.
    pub fn revoke(capabilities: &[Capability]) -> Self {
        for capability in capabilities {
            counter(*capability).with(|c| c.set(c.get() + 1));
        }
        Self {
            revoked: capabilities.to_vec(),
            _not_send: PhantomData,
        }
    }

    /// Whether `capability` is currently available on this thread.
    pub fn is_allowed(capability: Capability) -> bool {
        counter(capability).with(|c| c.get() == 0)
    }

    /// Panics if `capability` is revoked on this thread.
    pub fn assert_allowed(capability: Capability) {
        assert!(
            Self::is_allowed(capability),
            "{:?} is revoked on this thread",
            capability
        );
    }
}

impl Drop for CapabilityScope {
    fn drop(&mut self) {
        for capability in &self.revoked {
            counter(*capability).with(|c| c.set(c.get() - 1));
        }
    }
}
