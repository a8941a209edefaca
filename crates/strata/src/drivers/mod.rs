//! Driver implementations

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryDriver;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresDriver, TransactionMode};
