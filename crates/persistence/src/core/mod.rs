//! Core storage traits and abstractions.
//!
//! - [`DocumentStore`] - Direct document CRUD and field lookups
//! - [`DocumentTransaction`] - Native transactions with read-your-own-writes
//! - [`ObjectAdapter`] - Object storage put/delete
//! - [`BackendKind`], [`BackendCapability`] - Static capability declarations

mod backend;
mod objects;
pub(crate) mod optimistic;
mod store;

pub use backend::{BackendCapability, BackendKind};
pub use objects::ObjectAdapter;
pub use store::{DocumentStore, DocumentTransaction};
