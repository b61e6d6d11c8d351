#![deny(warnings)]

//! Persistence layer: snapshot storage backends and the registry of
//! state-changing simulation commands.
//!
//! State is stored as whole-value JSON snapshots under versioned keys, with a
//! real and a demo dataset living side by side in the same store. The
//! [`Registry`] is the only writer; it follows copy-modify-replace so a
//! failed command never leaves a half-written snapshot behind.

pub mod registry;
pub mod store;

pub use registry::{NewTeam, Registry, RegistryError, SubmitError};
pub use store::{
    store_mode, stored_mode, DataStore, DatasetMode, FileStore, MemoryStore, SnapshotStore,
};
