use std::{error::Error, fmt, io};

use parameter_server::{ConstructionErr, StoreErr};

/// The worker module's result type.
pub type Result<T> = std::result::Result<T, WorkerErr>;

/// Failures of a worker's calls into its parameter store.
///
/// None of these are retried, a failed `apply` might have been applied by the store
/// before the failure and replaying it would apply it twice.
#[derive(Debug)]
pub enum WorkerErr {
    /// The store couldn't be reached, or it stopped before answering.
    Transport(io::Error),
    /// The store couldn't be built out of its configuration.
    Construction(String),
    /// The store refused the call, nothing was applied.
    Rejected(String),
    /// The store answered with something that isn't a reply to the call.
    UnexpectedMessage { got: String },
}

impl fmt::Display for WorkerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerErr::Transport(e) => write!(f, "transport error: {e}"),
            WorkerErr::Construction(e) => write!(f, "construction error: {e}"),
            WorkerErr::Rejected(e) => write!(f, "rejected by the store: {e}"),
            WorkerErr::UnexpectedMessage { got } => write!(f, "unexpected message: got {got}"),
        }
    }
}

impl Error for WorkerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WorkerErr::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WorkerErr {
    fn from(value: io::Error) -> Self {
        Self::Transport(value)
    }
}

impl From<ConstructionErr> for WorkerErr {
    fn from(value: ConstructionErr) -> Self {
        Self::Construction(value.to_string())
    }
}

impl From<StoreErr> for WorkerErr {
    fn from(value: StoreErr) -> Self {
        match value {
            e @ StoreErr::SizeMismatch { .. } => Self::Rejected(e.to_string()),
            StoreErr::Closed => {
                let e = io::Error::new(io::ErrorKind::BrokenPipe, StoreErr::Closed);
                Self::Transport(e)
            }
        }
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<WorkerErr> for io::Error {
    fn from(value: WorkerErr) -> Self {
        match value {
            WorkerErr::Transport(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_onto_worker_errors() {
        let closed = WorkerErr::from(StoreErr::Closed);
        assert!(matches!(&closed, WorkerErr::Transport(e) if e.kind() == io::ErrorKind::BrokenPipe));

        let mismatch = StoreErr::SizeMismatch {
            key: "w".to_string(),
            expected: 4,
            got: 3,
        };
        let rejected = WorkerErr::from(mismatch);
        assert!(matches!(&rejected, WorkerErr::Rejected(text) if text.contains("key w")));

        let invalid = WorkerErr::from(ConstructionErr::new("learning_rate must be positive"));
        assert!(matches!(invalid, WorkerErr::Construction(_)));
    }
}
