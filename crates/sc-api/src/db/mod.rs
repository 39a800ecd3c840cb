//! Database layer

pub mod store;

pub use store::PgContractStore;
