use std::error;
use std::fmt;

use crate::concurrency::retry::Retryable;
use crate::workload::api::WorkloadApiError;

/// Result type used across sync execution coordination.
pub type SyncResult<T> = Result<T, SyncError>;

/// Main error type for checkpoint aggregation and workload lifecycle operations.
///
/// A [`SyncError`] is either a single error carrying an [`ErrorKind`], a static description and an
/// optional dynamic detail, or an aggregate of several errors.
#[derive(Debug, Clone)]
pub struct SyncError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    WithDescription(ErrorKind, &'static str),
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
    Many(Vec<SyncError>),
}

/// Categories of errors raised while coordinating a sync.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    // Checkpoint Errors
    /// A connector mixed checkpoint families within one session. Never retryable.
    StateTypeMismatch,
    InvalidStateMessage,
    StatePersistenceFailed,

    // Workload Errors
    WorkloadCreateFailed,
    /// The control plane kept failing for longer than the configured retry budget.
    WorkloadApiTimeout,
    WorkloadApiFailed,
    WorkloadNotFound,
    /// The workload was cancelled, either remotely or through the local cancellation signal.
    WorkloadCancelled,

    // Worker Errors
    WorkerPanicked,

    // Configuration & Validation Errors
    ConfigError,
    ValidationError,
    InvalidState,

    // IO & Serialization Errors
    IoError,
    SerializationError,
    DeserializationError,

    // Unknown / Uncategorized
    Unknown,
}

impl SyncError {
    /// Creates a [`SyncError`] aggregating multiple errors.
    pub fn many(errors: Vec<SyncError>) -> SyncError {
        SyncError {
            repr: ErrorRepr::Many(errors),
        }
    }

    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first one or [`ErrorKind::Unknown`] when the
    /// list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => kind,
            ErrorRepr::Many(ref errors) => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every [`ErrorKind`] contained in this error, flattening aggregates.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => vec![kind],
            ErrorRepr::Many(ref errors) => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the dynamic detail, or the first one found in an aggregate.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, ref detail) => Some(detail.as_str()),
            ErrorRepr::Many(ref errors) => errors.iter().find_map(|e| e.detail()),
            _ => None,
        }
    }

    /// Creates a [`SyncError`] for a value that could not be serialized to JSON.
    ///
    /// [`serde_json`] reports serialization failures with the categories of malformed input, so
    /// serializing call sites map their errors through this constructor instead of `?`.
    pub fn serialization(err: serde_json::Error) -> SyncError {
        SyncError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::SerializationError,
                "JSON serialization failed",
                err.to_string(),
            ),
        }
    }

    /// Returns `true` if this error is the cancellation signal of a workload rather than a
    /// failure of its execution.
    pub fn is_cancellation(&self) -> bool {
        self.kinds().contains(&ErrorKind::WorkloadCancelled)
    }
}

/// Protocol violations, invalid input and cancellations never go away by trying again.
impl Retryable for SyncError {
    fn is_retryable(&self) -> bool {
        !self.kinds().iter().any(|kind| {
            matches!(
                kind,
                ErrorKind::StateTypeMismatch
                    | ErrorKind::InvalidStateMessage
                    | ErrorKind::WorkloadCancelled
                    | ErrorKind::ConfigError
                    | ErrorKind::ValidationError
                    | ErrorKind::InvalidState
            )
        })
    }
}

impl PartialEq for SyncError {
    fn eq(&self, other: &SyncError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::WithDescription(kind_a, _), ErrorRepr::WithDescription(kind_b, _)) => {
                kind_a == kind_b
            }
            (
                ErrorRepr::WithDescriptionAndDetail(kind_a, _, _),
                ErrorRepr::WithDescriptionAndDetail(kind_b, _, _),
            ) => kind_a == kind_b,
            (ErrorRepr::Many(errors_a), ErrorRepr::Many(errors_b)) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self.repr {
            ErrorRepr::WithDescription(kind, desc) => write!(f, "{kind:?}: {desc}"),
            ErrorRepr::WithDescriptionAndDetail(kind, desc, ref detail) => {
                write!(f, "{kind:?}: {desc} -> {detail}")
            }
            ErrorRepr::Many(ref errors) => match errors.as_slice() {
                [] => f.write_str("Multiple errors occurred (empty)"),
                [single] => single.fmt(f),
                errors => {
                    write!(f, "Multiple errors occurred ({} total):", errors.len())?;
                    for (i, error) in errors.iter().enumerate() {
                        write!(f, "\n  {}: {}", i + 1, error)?;
                    }

                    Ok(())
                }
            },
        }
    }
}

impl error::Error for SyncError {}

impl From<(ErrorKind, &'static str)> for SyncError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> SyncError {
        SyncError {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

impl From<(ErrorKind, &'static str, String)> for SyncError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> SyncError {
        SyncError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail),
        }
    }
}

impl<E> From<Vec<E>> for SyncError
where
    E: Into<SyncError>,
{
    fn from(errors: Vec<E>) -> SyncError {
        SyncError {
            repr: ErrorRepr::Many(errors.into_iter().map(Into::into).collect()),
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> SyncError {
        SyncError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::IoError,
                "I/O error occurred",
                err.to_string(),
            ),
        }
    }
}

/// Maps [`serde_json::Error`] to a serialization or deserialization error based on its category.
impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> SyncError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        SyncError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, description, err.to_string()),
        }
    }
}

/// Maps a worker task that panicked or was aborted.
impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> SyncError {
        SyncError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::WorkerPanicked,
                "Worker task did not run to completion",
                err.to_string(),
            ),
        }
    }
}

/// Maps a control-plane error that escaped the retry wrapper.
impl From<WorkloadApiError> for SyncError {
    fn from(err: WorkloadApiError) -> SyncError {
        let (kind, description) = match err {
            WorkloadApiError::NotFound(_) => (ErrorKind::WorkloadNotFound, "Workload not found"),
            WorkloadApiError::Transient(_) => (
                ErrorKind::WorkloadApiTimeout,
                "Workload control plane unavailable",
            ),
            WorkloadApiError::Conflict(_)
            | WorkloadApiError::Gone(_)
            | WorkloadApiError::Rejected { .. } => (
                ErrorKind::WorkloadApiFailed,
                "Workload control plane rejected the request",
            ),
        };

        SyncError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, description, err.to_string()),
        }
    }
}
