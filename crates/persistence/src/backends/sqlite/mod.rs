//! SQLite backend implementation.
//!
//! Supports both in-memory databases (great for testing) and file-based
//! databases. Native transactions buffer their writes and apply them inside
//! `BEGIN IMMEDIATE` after re-validating everything they read.
//!
//! # Example
//!
//! ```no_run
//! use tandem_persistence::backends::sqlite::SqliteDocumentStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteDocumentStore::open("tandem.db")?;
//! # Ok(())
//! # }
//! ```
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE documents (
//!     collection TEXT NOT NULL,
//!     id TEXT NOT NULL,
//!     version INTEGER NOT NULL,
//!     data TEXT NOT NULL,        -- JSON payload
//!     created_at TEXT NOT NULL,  -- RFC 3339
//!     updated_at TEXT NOT NULL,
//!     PRIMARY KEY (collection, id)
//! );
//! ```

mod backend;
mod schema;
mod transaction;

pub use backend::{SqliteBackendConfig, SqliteDocumentStore};
