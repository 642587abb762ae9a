//! Stable identifiers for arena-allocated compiler objects.
//!
//! Scripts, function metadata, function instances, contexts and code
//! artifacts reference each other by id rather than by pointer, so a back
//! reference never keeps its target alive.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            /// Position of the object in its arena.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Identifies a script (a compiled unit of source text).
    ScriptId,
    "script"
);
define_id!(
    /// Identifies persistent per-literal function metadata.
    SharedId,
    "shared"
);
define_id!(
    /// Identifies a function instance (closure).
    FunctionId,
    "function"
);
define_id!(
    /// Identifies a binding environment.
    ContextId,
    "context"
);
define_id!(
    /// Identifies a code artifact, including builtin trampolines.
    CodeId,
    "code"
);
define_id!(
    /// Identifies an assumption optimized code may depend on.
    AssumptionId,
    "assumption"
);
define_id!(
    /// Identifies a function literal within its script; the top-level
    /// literal is always `0`.
    LiteralId,
    "literal"
);
