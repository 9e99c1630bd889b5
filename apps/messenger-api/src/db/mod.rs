pub mod memory;
pub mod pool;
pub mod repository;
pub mod schema;
