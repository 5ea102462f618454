pub mod db;
pub mod memory;
pub mod models;
pub mod pg;
pub mod schema;
pub mod store;

mod error;

pub use error::Error;
pub use memory::MemoryStore;
pub use pg::PgStore;
pub use store::{BoxFuture, EventStore};

pub type Result<T, E = Error> = std::result::Result<T, E>;
