pub mod optimizer;
pub mod store;
