//! Persistence layer — libSQL-backed storage for sessions, messages, and
//! workflow progress.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{PersistedSession, SessionPersistence};
