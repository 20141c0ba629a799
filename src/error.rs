/// Alias for `Result<T, MaskError>`.
pub type MaskResult<T> = Result<T, MaskError>;

/// Errors raised when persisting or restoring the exposure grid.
#[derive(Debug, thiserror::Error)]
pub enum MaskError {
    /// The stored grid has a different `(height, width)` than the live one.
    #[error("grid shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// The stored cell count does not match its declared shape.
    #[error("corrupt grid data: shape {shape:?} but {cells} cells")]
    Corrupt { shape: (usize, usize), cells: usize },

    #[error("grid file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("grid encoding failed: {0}")]
    Codec(#[from] bincode::Error),
}
