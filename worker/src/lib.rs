pub mod error;
pub mod proxy;
pub mod remote;

pub use error::{Result, WorkerErr};
pub use proxy::WorkerProxy;
pub use remote::{RemoteClient, RemoteStore};
