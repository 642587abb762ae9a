//! Compiler configuration.
//!
//! Read-only toggles consulted by tier selection, the optimizing scheduler
//! and the caches. Every field has a default, so a configuration file only
//! needs to name what it changes:
//!
//! ```
//! use jit_compiler::CompilerConfig;
//!
//! let config = CompilerConfig::from_json(r#"{ "always_optimize": true }"#).unwrap();
//! assert!(config.always_optimize);
//! assert_eq!(config.queue_capacity, 8);
//! ```

use serde::Deserialize;

/// Errors produced while loading a [`CompilerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The document is not valid JSON or has a field of the wrong type.
    #[error("invalid compiler configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// A value is out of range.
    #[error("invalid compiler configuration: {field} {problem}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        problem: &'static str,
    },
}

/// Toggles for the compilation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Global switch for the optimizing tier
    pub optimize: bool,
    /// Which functions may be optimized, by name
    ///
    /// `*` matches everything, `foo*` matches by prefix, `-foo` negates and
    /// the empty filter matches only anonymous functions.
    pub optimization_filter: String,
    /// Optimize every function right after its unoptimized compile
    pub always_optimize: bool,
    /// Use the legacy unoptimized backend wherever it is supported
    pub stress_legacy_backend: bool,
    /// Attempt asm validation for asm-like module scopes
    pub validate_asm: bool,
    /// Attempt asm validation for every eligible unit
    pub stress_validate_asm: bool,
    /// Run optimizing compiles on background workers
    pub concurrent_recompilation: bool,
    /// Maximum optimizing jobs queued and not yet installed
    pub queue_capacity: usize,
    /// Number of background optimizing workers
    pub worker_count: usize,
    /// Fold the enclosing context into optimized code
    pub context_specialization: bool,
    /// Hot calls before a function is optimized
    pub hotness_threshold: u32,
    /// Compile top-level scripts in strict mode
    pub use_strict: bool,
    /// Deepest nesting of eagerly compiled literals before the compile
    /// reports stack exhaustion
    pub stack_limit: usize,
    /// Ageing passes a source-cache entry survives without a hit
    pub source_cache_generations: u32,
    /// Allow producing and consuming serialized top-level code
    pub serialize_toplevel: bool,
    /// Separate `Function` constructor parameters from the body in the
    /// eval cache key
    pub function_tostring: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            optimize: true,
            optimization_filter: "*".to_string(),
            always_optimize: false,
            stress_legacy_backend: false,
            validate_asm: true,
            stress_validate_asm: false,
            concurrent_recompilation: true,
            queue_capacity: 8,
            worker_count: 1,
            context_specialization: false,
            hotness_threshold: 2,
            use_strict: false,
            stack_limit: 256,
            source_cache_generations: 1,
            serialize_toplevel: true,
            function_tostring: true,
        }
    }
}

impl CompilerConfig {
    /// Load a configuration from a JSON document.
    ///
    /// Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: CompilerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrent_recompilation && self.worker_count == 0 {
            return Err(ConfigError::Invalid {
                field: "worker_count",
                problem: "must be at least 1 with concurrent recompilation",
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "queue_capacity",
                problem: "must be at least 1",
            });
        }
        if self.source_cache_generations == 0 {
            return Err(ConfigError::Invalid {
                field: "source_cache_generations",
                problem: "must be at least 1",
            });
        }
        Ok(())
    }

    /// Whether `name` passes [`optimization_filter`](Self::optimization_filter).
    pub fn passes_filter(&self, name: &str) -> bool {
        let filter = self.optimization_filter.as_str();
        if filter.is_empty() {
            return name.is_empty();
        }
        let (positive, pattern) = match filter.strip_prefix('-') {
            Some(rest) => (false, rest),
            None => (true, filter),
        };
        let matched = if pattern == "*" {
            true
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            name.starts_with(prefix)
        } else {
            name == pattern
        };
        matched == positive
    }
}
