//! Error types shared across the engine.

/// Errors that can occur in matrix, network and population operations
#[derive(Debug)]
pub enum Error {
    /// Mismatched matrix dimensions or network topologies
    ShapeMismatch(String),
    /// Row index past the end of a matrix
    RowOutOfRange { row: usize, rows: usize },
    /// A serialized dimension or element size does not match the reader
    Format(String),
    /// Underlying byte-stream failure
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShapeMismatch(msg) => write!(f, "Shape mismatch: {}", msg),
            Self::RowOutOfRange { row, rows } => {
                write!(f, "Row {} out of range (matrix has {} rows)", row, rows)
            }
            Self::Format(msg) => write!(f, "Format error: {}", msg),
            Self::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::RowOutOfRange { row: 7, rows: 4 };
        assert!(err.to_string().contains("Row 7"));

        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, Error::Io(_)));
    }
}
