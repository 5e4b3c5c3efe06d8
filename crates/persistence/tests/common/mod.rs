//! Test infrastructure for the reconciliation components.
//!
//! Every test runs against a fresh [`MemoryStore`](parkline_persistence::backends::memory::MemoryStore)
//! behind a real [`ConnectionManager`](parkline_persistence::ConnectionManager).

#![allow(dead_code)]

pub mod fixtures;

pub use fixtures::*;
