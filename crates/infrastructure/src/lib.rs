//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_record_repository;
mod in_memory_session;
mod postgres_record_repository;

pub use in_memory_record_repository::InMemoryRecordRepository;
pub use in_memory_session::InMemorySession;
pub use postgres_record_repository::PostgresRecordRepository;
