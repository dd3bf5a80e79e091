//! Backends for the session and persistence traits in [`crate::auth::store`].

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;
