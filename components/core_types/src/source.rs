//! Positions in script source.

/// Marks an integer source offset as absent, e.g. the parameters-end split
/// of a source that was not built by the `Function` constructor.
pub const NO_SOURCE_POSITION: i32 = -1;

/// Where in a script a diagnostic points.
///
/// Lines and columns are as the parser reports them; `offset` is a byte
/// offset into the source text.
///
/// ```
/// use core_types::SourcePosition;
///
/// let at = SourcePosition { line: 2, column: 4, offset: 17 };
/// assert_eq!(at.offset, 17);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    /// Line of the diagnostic
    pub line: u32,
    /// Column within the line
    pub column: u32,
    /// Byte offset into the source
    pub offset: usize,
}
