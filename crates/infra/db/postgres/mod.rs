pub mod advisory_lock;
pub mod postgres_connection;
pub mod schema;
