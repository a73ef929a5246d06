//! Test infrastructure for the coordination layer.
//!
//! Provides fixtures that build coordinators over in-process backends and
//! fault-injecting wrappers around the object and document adapters.

#![allow(dead_code)]

pub mod faults;
pub mod fixtures;

pub use faults::*;
pub use fixtures::*;
