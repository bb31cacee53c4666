pub mod error;
pub mod optimization;
pub mod service;
pub mod storage;

pub use error::{ConstructionErr, Result, StoreErr};
pub use service::{Registry, StoreBuilder};
pub use storage::{ParameterStore, StoreHandle};
