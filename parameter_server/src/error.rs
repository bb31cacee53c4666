use std::{
    error::Error,
    fmt::{self, Display},
};

/// The store module's result type.
pub type Result<T> = std::result::Result<T, StoreErr>;

/// Error returned when an optimizer can't be built out of its configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstructionErr(String);

impl ConstructionErr {
    /// Creates a new `ConstructionErr`.
    ///
    /// # Arguments
    /// * `reason` - What was wrong with the configuration.
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl Display for ConstructionErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid optimizer configuration: {}", self.0)
    }
}

impl Error for ConstructionErr {}

/// Failures of a call into a `ParameterStore`.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreErr {
    /// The call carried a tensor whose length doesn't match the one stored under `key`.
    SizeMismatch {
        key: String,
        expected: usize,
        got: usize,
    },
    /// The store is no longer running.
    Closed,
}

impl Display for StoreErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreErr::SizeMismatch { key, expected, got } => write!(
                f,
                "size mismatch for key {key}: got {got} elements, expected {expected}"
            ),
            StoreErr::Closed => f.write_str("the parameter store is closed"),
        }
    }
}

impl Error for StoreErr {}
