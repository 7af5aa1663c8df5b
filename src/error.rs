//! Error types for the segmentation engine

use thiserror::Error;

/// Segmentation engine error types
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid parameter provided
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// No more segmentation slots available
    #[error("Segmentation capacity exceeded (limit {limit})")]
    CapacityExceeded { limit: usize },

    /// Segmentation index out of range
    #[error("Segmentation {0} does not exist")]
    SegmentationNotFound(usize),

    /// Buffer length does not match the volume
    #[error("Dimension mismatch: expected {expected} voxels, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Contour could not be turned into a mask
    #[error("Degenerate contour: {0}")]
    DegenerateContour(String),

    /// No contour is stored for the requested slice
    #[error("No contour stored for viewport {viewport} slice {slice}")]
    ContourNotFound { viewport: usize, slice: usize },

    /// A background worker died before delivering its result
    #[error("Worker failed: {0}")]
    WorkerFailed(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File load error
    #[error("File load error: {0}")]
    FileLoad(String),

    /// File save error
    #[error("File save error: {0}")]
    FileSave(String),

    /// Operation failed
    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Recoverable conditions leave engine state untouched and can be
    /// reported to the user without aborting the session.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::CapacityExceeded { .. }
                | Error::DegenerateContour(_)
                | Error::ContourNotFound { .. }
                | Error::InvalidParameter(_)
        )
    }
}

/// Result type alias for segmentation operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidParameter("test".to_string());
        assert_eq!(err.to_string(), "Invalid parameter: test");

        let err = Error::CapacityExceeded { limit: 3 };
        assert_eq!(err.to_string(), "Segmentation capacity exceeded (limit 3)");
    }

    #[test]
    fn test_recoverable() {
        assert!(Error::DegenerateContour("empty".into()).is_recoverable());
        assert!(!Error::WorkerFailed("gone".into()).is_recoverable());
    }
}
