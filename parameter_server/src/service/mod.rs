mod builder;
mod registry;
mod server;

pub use builder::StoreBuilder;
pub use registry::Registry;
pub use server::{Acceptor, serve, serve_connection};
