//! Error types for the hebi transpiler

use thiserror::Error;

/// Main error type for hebi
#[derive(Debug, Error)]
pub enum TranspileError {
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Unsupported construct at line {line}: {construct}")]
    Unsupported { line: usize, construct: String },

    #[error("Type error at line {line}: {message}")]
    Type { line: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranspileError {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        TranspileError::Parse {
            line,
            message: message.into(),
        }
    }

    pub fn unsupported(line: usize, construct: impl Into<String>) -> Self {
        TranspileError::Unsupported {
            line,
            construct: construct.into(),
        }
    }

    pub fn type_error(line: usize, message: impl Into<String>) -> Self {
        TranspileError::Type {
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TranspileError>;
