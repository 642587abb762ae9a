//! Integration test suite for the JIT compilation driver
//!
//! The tests drive a real [`Engine`](jit_compiler::Engine) through its
//! public entry points, with scripted parser and backends standing in for
//! the real ones.

use core_types::{ContextId, FunctionId, LiteralId, ScriptId, SharedId};
use jit_compiler::testing::{Harness, TestBackends};
use jit_compiler::{CompilerConfig, FunctionLiteral, ScriptDetails};

/// An engine with one compiled script loaded into a native context.
pub struct Fixture {
    /// Engine and its scripted collaborators
    pub harness: Harness,
    /// Native context the script was compiled in
    pub native: ContextId,
    /// The loaded script
    pub script: ScriptId,
}

impl Fixture {
    /// Compile `source`, whose literal tree is `tree`, with `config`.
    pub fn load(config: CompilerConfig, source: &str, tree: FunctionLiteral) -> Self {
        Self::load_with(config, TestBackends::new(), source, tree)
    }

    /// Like [`Fixture::load`] with custom backends.
    pub fn load_with(
        config: CompilerConfig,
        backends: TestBackends,
        source: &str,
        tree: FunctionLiteral,
    ) -> Self {
        let mut harness = Harness::with_backends(config, backends);
        harness.parser.script(source, tree);
        let native = harness.engine.new_native_context(true);
        let result = harness
            .engine
            .compile_script(source, ScriptDetails::default(), native, Default::default())
            .expect("script compiles");
        Self {
            harness,
            native,
            script: result.script,
        }
    }

    /// Metadata of literal `id` in the loaded script.
    pub fn shared(&self, id: u32) -> SharedId {
        self.harness
            .engine
            .heap()
            .find_shared_for_literal(self.script, LiteralId(id))
            .expect("literal has metadata")
    }

    /// A new, compiled instance of literal `id`.
    pub fn function(&mut self, id: u32) -> FunctionId {
        let shared = self.shared(id);
        let function = self.harness.engine.instantiate(shared, self.native);
        self.harness.engine.compile(function).expect("function compiles");
        function
    }

    /// Call `function` until the engine tries to optimize it.
    pub fn heat_up(&mut self, function: FunctionId) -> Option<jit_compiler::OptimizeOutcome> {
        for _ in 0..self.harness.engine.config().hotness_threshold {
            if let Some(outcome) = self.harness.engine.on_hot_call(function).expect("hot call") {
                return Some(outcome);
            }
        }
        None
    }
}

/// A script with top-level functions named `names`, literal ids from 1.
pub fn functions(names: &[&str]) -> FunctionLiteral {
    names
        .iter()
        .enumerate()
        .fold(FunctionLiteral::toplevel(), |tree, (index, name)| {
            tree.with_inner(FunctionLiteral::function(index as u32 + 1, *name))
        })
}

/// Configuration without background workers.
pub fn sync_config() -> CompilerConfig {
    CompilerConfig {
        concurrent_recompilation: false,
        ..Default::default()
    }
}
