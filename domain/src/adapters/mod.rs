//! Adapters that live inside the domain crate for convenience.
//!
//! The in-memory store backs unit tests, local demos and the server's
//! `STORAGE_PROVIDER=memory` mode. The durable adapter lives in
//! `adapters/sqlite-adapter`.

pub mod memory_repo;
