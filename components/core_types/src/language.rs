//! Static properties of function literals.

use serde::{Deserialize, Serialize};

/// Declared language mode of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LanguageMode {
    /// Sloppy mode
    #[default]
    Sloppy,
    /// Strict mode
    Strict,
}

impl LanguageMode {
    /// Combine two modes; strict wins.
    pub fn join(self, other: LanguageMode) -> LanguageMode {
        if self == LanguageMode::Strict || other == LanguageMode::Strict {
            LanguageMode::Strict
        } else {
            LanguageMode::Sloppy
        }
    }

    /// Whether this mode is strict.
    pub fn is_strict(self) -> bool {
        self == LanguageMode::Strict
    }
}

/// Syntactic kind of a function literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FunctionKind {
    /// Ordinary function or top-level code
    #[default]
    Normal,
    /// Arrow function
    Arrow,
    /// Generator function
    Generator,
    /// Async function
    Async,
    /// Async generator function
    AsyncGenerator,
    /// Module body
    Module,
    /// Class constructor
    ClassConstructor,
}

impl FunctionKind {
    /// Whether activations of this kind can be suspended and resumed.
    ///
    /// Suspended activations are stored against the interpreter's bytecode,
    /// so resumable kinds can only run on the interpreter tier.
    pub fn is_resumable(self) -> bool {
        matches!(
            self,
            FunctionKind::Generator
                | FunctionKind::Async
                | FunctionKind::AsyncGenerator
                | FunctionKind::Module
        )
    }
}

/// Restriction placed on what a parse may accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ParseRestriction {
    /// Any program
    #[default]
    NoParseRestriction,
    /// Exactly one function literal, as built by the `Function` constructor
    OnlySingleFunctionLiteral,
}
