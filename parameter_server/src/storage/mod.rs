mod handle;
mod store;

pub use handle::StoreHandle;
pub use store::ParameterStore;
