//! Shared vocabulary for the tiered compilation pipeline.
//!
//! This crate provides the foundational types every compiler component
//! speaks: stable arena identifiers, language modes and function kinds,
//! bailout reasons, source positions and the language-level error taxonomy.
//!
//! # Overview
//!
//! - [`JsError`] - Language-level errors surfaced by top-level entry points
//! - [`ErrorKind`] - Types of language-level errors
//! - [`CompileError`] - Failures of a compile request
//! - [`Bailout`] - A decision to abandon or defer optimization
//! - [`LanguageMode`] / [`FunctionKind`] - Static literal properties
//! - [`SourcePosition`] - Source code location
//!
//! # Examples
//!
//! ```
//! use core_types::{Bailout, BailoutReason, CompileError, ErrorKind, JsError};
//!
//! let bailout = Bailout::abort(BailoutReason::FunctionBeingDebugged);
//! assert!(bailout.is_abort());
//!
//! let error: JsError = CompileError::StackOverflow.into();
//! assert_eq!(error.kind, ErrorKind::RangeError);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod bailout;
mod error;
mod ids;
mod language;
mod source;

pub use bailout::{Bailout, BailoutKind, BailoutReason};
pub use error::{CompileError, ErrorKind, JsError};
pub use ids::{
    AssumptionId, CodeId, ContextId, FunctionId, LiteralId, ScriptId, SharedId,
};
pub use language::{FunctionKind, LanguageMode, ParseRestriction};
pub use source::{SourcePosition, NO_SOURCE_POSITION};
