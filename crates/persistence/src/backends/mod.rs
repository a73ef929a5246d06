//! Storage backend implementations.
//!
//! # Available Backends
//!
//! | Backend | Feature | Description |
//! |---------|---------|-------------|
//! | Memory | always | In-process document store, with or without native transactions |
//! | SQLite | `sqlite` | Embedded document store with native transactions |
//! | Objects | always (`s3` for S3) | `object_store` buckets: in-memory, local directory or S3 |
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! use tandem_persistence::backends::sqlite::SqliteDocumentStore;
//! use tandem_persistence::backends::objects::{ObjectStoreAdapter, ObjectStoreConfig};
//!
//! # #[cfg(feature = "sqlite")]
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let documents = SqliteDocumentStore::open("./data/tandem.db")?;
//! let objects = ObjectStoreAdapter::from_config(
//!     &ObjectStoreConfig::Local { root: "./data/objects".into() },
//!     &["avatars", "qr-codes", "tickets"],
//! )?;
//! # Ok(())
//! # }
//! ```

pub mod memory;
pub mod objects;

#[cfg(feature = "sqlite")]
pub mod sqlite;
