//! Engine Error Types
//!
//! Every failure the core can report. All of them are fatal for the operation
//! that raised them; the only local recoveries (missing partition config,
//! unknown predicate location) never surface as errors.

use std::path::PathBuf;
use thiserror::Error;

use crate::dataflow::DataflowError;
use crate::storage::StorageError;

/// Boxed underlying cause of an evaluation failure
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// No stratification exists within the relaxation bound
    #[error(
        "Program is not stratifiable: '{predicate}' reached stratum {stratum}, \
         above the bound of {rule_count} rules"
    )]
    Stratification {
        predicate: String,
        stratum: usize,
        rule_count: usize,
    },

    /// Unbound variable in the head, a negated literal, or a builtin
    #[error("Unsafe rule '{rule}': {reason}")]
    RuleSafety { rule: String, reason: String },

    /// Builtin with more than one unbound argument, or a constant filter
    /// wider than the tuple it applies to
    #[error("Arity error: {0}")]
    BuiltinArity(String),

    /// Dataflow job or storage failure while evaluating or importing
    #[error("Evaluation failed during {context}: {source}")]
    Evaluation {
        context: String,
        #[source]
        source: BoxedCause,
    },

    /// Partition metadata temp file already exists
    #[error("Concurrent write detected: staging file {0} already exists")]
    ConcurrentWrite(PathBuf),

    /// Invalid or unsupported configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    pub fn evaluation(context: impl Into<String>, source: impl Into<BoxedCause>) -> Self {
        EngineError::Evaluation {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn rule_safety(rule: impl ToString, reason: impl Into<String>) -> Self {
        EngineError::RuleSafety {
            rule: rule.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ConcurrentWrite(path) => EngineError::ConcurrentWrite(path),
            other => EngineError::evaluation("storage", other),
        }
    }
}

impl From<DataflowError> for EngineError {
    fn from(err: DataflowError) -> Self {
        EngineError::evaluation("dataflow job", err)
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrent_write_is_preserved() {
        let err: EngineError = StorageError::ConcurrentWrite(PathBuf::from("/tmp/x")).into();
        assert!(matches!(err, EngineError::ConcurrentWrite(_)));
    }

    #[test]
    fn test_io_becomes_evaluation_error_with_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: EngineError = StorageError::Io(io).into();
        assert!(matches!(err, EngineError::Evaluation { .. }));
        assert!(std::error::Error::source(&err).is_some());
        assert!(format!("{err}").contains("storage"));
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::Stratification {
            predicate: "p/1".to_string(),
            stratum: 2,
            rule_count: 1,
        };
        assert!(format!("{err}").contains("not stratifiable"));
    }
}
