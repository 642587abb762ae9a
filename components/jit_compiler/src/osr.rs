//! On-Stack Replacement (OSR) targets
//!
//! OSR replaces the code behind a running activation with optimized code
//! entered at a specific offset. The meaning of the offset depends on the
//! tier the activation runs on:
//! - Interpreted frames: the offset is a bytecode offset
//! - Legacy frames: the offset is an AST node id
//!
//! An optimizing job can only honor one interpretation, so a target that
//! pairs a frame with the other interpretation is rejected before any job
//! exists. OSR compiles always run synchronously and their code is never
//! cached.

use core_types::CompileError;

/// Tier of the activation being replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTier {
    /// Frame runs interpreter bytecode
    Interpreted,
    /// Frame runs legacy machine code
    Legacy,
}

/// Offset at which optimized code is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsrOffset {
    /// Bytecode offset; pairs with interpreted frames
    BytecodeOffset(u32),
    /// AST node id; pairs with legacy frames
    AstId(u32),
}

impl OsrOffset {
    /// Numeric value of the offset.
    pub fn value(self) -> u32 {
        match self {
            OsrOffset::BytecodeOffset(offset) | OsrOffset::AstId(offset) => offset,
        }
    }
}

/// A validated OSR target: frame tier plus matching offset.
///
/// # Example
/// ```
/// use jit_compiler::{FrameTier, OsrOffset, OsrTarget};
///
/// let target = OsrTarget::new(FrameTier::Interpreted, OsrOffset::BytecodeOffset(12)).unwrap();
/// assert_eq!(target.offset().value(), 12);
///
/// assert!(OsrTarget::new(FrameTier::Legacy, OsrOffset::BytecodeOffset(12)).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsrTarget {
    frame: FrameTier,
    offset: OsrOffset,
}

impl OsrTarget {
    /// Pair a frame with an offset.
    ///
    /// # Returns
    /// * `Ok(OsrTarget)` - The offset interpretation matches the frame
    /// * `Err(CompileError::OsrPairing)` - It does not
    pub fn new(frame: FrameTier, offset: OsrOffset) -> Result<Self, CompileError> {
        match (frame, offset) {
            (FrameTier::Interpreted, OsrOffset::BytecodeOffset(_))
            | (FrameTier::Legacy, OsrOffset::AstId(_)) => Ok(Self { frame, offset }),
            (FrameTier::Interpreted, OsrOffset::AstId(id)) => Err(CompileError::OsrPairing(
                format!("AST id {} targets an interpreted frame", id),
            )),
            (FrameTier::Legacy, OsrOffset::BytecodeOffset(offset)) => {
                Err(CompileError::OsrPairing(format!(
                    "bytecode offset {} targets a legacy frame",
                    offset
                )))
            }
        }
    }

    /// Frame tier.
    pub fn frame(&self) -> FrameTier {
        self.frame
    }

    /// Entry offset.
    pub fn offset(&self) -> OsrOffset {
        self.offset
    }

    /// Check the target against the function being optimized.
    ///
    /// Interpreted frames require optimizing from existing bytecode; legacy
    /// frames require optimizing from source.
    pub fn check_source(&self, optimizing_from_bytecode: bool) -> Result<(), CompileError> {
        match (self.frame, optimizing_from_bytecode) {
            (FrameTier::Interpreted, true) | (FrameTier::Legacy, false) => Ok(()),
            (FrameTier::Interpreted, false) => Err(CompileError::OsrPairing(
                "interpreted frame but the function has no bytecode".to_string(),
            )),
            (FrameTier::Legacy, true) => Err(CompileError::OsrPairing(
                "legacy frame but the function runs bytecode".to_string(),
            )),
        }
    }
}
