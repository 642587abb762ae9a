//! Source-level cache of compiled top-level code.
//!
//! Host scripts and eval sources are cached separately. An entry holds the
//! top-level function metadata as a template together with its feedback
//! shape; every instantiation from a hit allocates a fresh feedback record.
//!
//! Eviction is generational: [`SourceCache::age`] advances every entry by
//! one generation and drops entries that reach the configured limit. A hit
//! makes an entry young again.

use std::hash::Hash;
use std::sync::Arc;

use core_types::{ContextId, LanguageMode, ParseRestriction, SharedId, NO_SOURCE_POSITION};
use rustc_hash::FxHashMap;

use crate::feedback::FeedbackMetadata;
use crate::heap::ScriptOrigin;

/// Key of a host script entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptKey {
    /// Exact source text
    pub source: Arc<str>,
    /// Resource name
    pub name: Option<String>,
    /// Line offset of the source
    pub line_offset: i32,
    /// Column offset of the source
    pub column_offset: i32,
    /// Origin options
    pub origin: ScriptOrigin,
    /// Native context the script runs in
    pub context: ContextId,
    /// Language mode
    pub language_mode: LanguageMode,
}

/// Key of an eval entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EvalKey {
    /// Exact source text
    pub source: Arc<str>,
    /// Metadata of the calling function
    pub outer: Option<SharedId>,
    /// Context the eval runs in
    pub context: ContextId,
    /// Language mode
    pub language_mode: LanguageMode,
    /// Position discriminant, see [`eval_position`]
    pub position: i32,
}

/// Position discriminant of an eval key.
///
/// `Function` constructor sources are concatenated from a parameter list
/// and a body, so two different splits can produce the same text. When the
/// split point is known it is stored negated, which keeps it apart from the
/// non-negative call positions of ordinary eval.
pub fn eval_position(
    function_tostring: bool,
    restriction: ParseRestriction,
    parameters_end_pos: i32,
    scope_position: i32,
) -> i32 {
    if function_tostring
        && restriction == ParseRestriction::OnlySingleFunctionLiteral
        && parameters_end_pos != NO_SOURCE_POSITION
    {
        -parameters_end_pos
    } else {
        scope_position
    }
}

/// A cached template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHit {
    /// Top-level function metadata
    pub shared: SharedId,
    /// Feedback shape for fresh instantiations
    pub feedback: FeedbackMetadata,
}

#[derive(Debug, Clone)]
struct Entry {
    hit: CacheHit,
    age: u32,
}

fn lookup<K: Eq + Hash>(table: &mut FxHashMap<K, Entry>, key: &K) -> Option<CacheHit> {
    let entry = table.get_mut(key)?;
    entry.age = 0;
    Some(entry.hit.clone())
}

/// Script and eval caches.
#[derive(Debug)]
pub struct SourceCache {
    scripts: FxHashMap<ScriptKey, Entry>,
    evals: FxHashMap<EvalKey, Entry>,
    generations: u32,
}

impl SourceCache {
    /// Empty cache keeping entries for `generations` calls to [`age`](Self::age).
    pub fn new(generations: u32) -> Self {
        Self {
            scripts: FxHashMap::default(),
            evals: FxHashMap::default(),
            generations: generations.max(1),
        }
    }

    /// Find a script template.
    pub fn lookup_script(&mut self, key: &ScriptKey) -> Option<CacheHit> {
        lookup(&mut self.scripts, key)
    }

    /// Store a script template. Last write wins.
    pub fn put_script(&mut self, key: ScriptKey, shared: SharedId, feedback: FeedbackMetadata) {
        self.scripts.insert(
            key,
            Entry {
                hit: CacheHit { shared, feedback },
                age: 0,
            },
        );
    }

    /// Find an eval template.
    pub fn lookup_eval(&mut self, key: &EvalKey) -> Option<CacheHit> {
        lookup(&mut self.evals, key)
    }

    /// Store an eval template. Last write wins.
    pub fn put_eval(&mut self, key: EvalKey, shared: SharedId, feedback: FeedbackMetadata) {
        self.evals.insert(
            key,
            Entry {
                hit: CacheHit { shared, feedback },
                age: 0,
            },
        );
    }

    /// Advance one generation, dropping entries that have not been hit for
    /// the configured number of generations.
    pub fn age(&mut self) {
        let limit = self.generations;
        let keep = |entry: &mut Entry| {
            entry.age += 1;
            entry.age < limit
        };
        self.scripts.retain(|_, entry| keep(entry));
        self.evals.retain(|_, entry| keep(entry));
    }

    /// Drop every entry whose template is `shared`.
    pub fn remove(&mut self, shared: SharedId) {
        self.scripts.retain(|_, entry| entry.hit.shared != shared);
        self.evals.retain(|_, entry| entry.hit.shared != shared);
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.scripts.clear();
        self.evals.clear();
    }

    /// Number of script entries.
    pub fn script_entries(&self) -> usize {
        self.scripts.len()
    }

    /// Number of eval entries.
    pub fn eval_entries(&self) -> usize {
        self.evals.len()
    }
}
