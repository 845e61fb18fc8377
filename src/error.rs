use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for the simulation core.
///
/// Each variant carries enough context to be actionable. Numerical failures
/// are local to the run that raised them: the ensemble driver records them
/// per particle and keeps sibling runs alive.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid user or API parameter.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Numerical or geometric issue (e.g., root-finding non-convergence,
    /// degenerate wall normal).
    #[error("numerical error: {0}")]
    MathError(String),

    /// Pathological run accumulating consecutive same-side bounces beyond
    /// the guard limit; treated as diverging and aborted.
    #[error("diverging run: {0}")]
    DivergingRun(String),

    /// Propagated I/O errors from the record sink.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
