//! Local session stores for every supported AI coding CLI.
//!
//! A [`Store`] lists the projects and sessions of one vendor's data directory. The
//! [`StoreRegistry`] composes one store per vendor, and [`LazySession`] reads a session file
//! incrementally.

pub mod cache;
pub mod discovery;
pub mod lazy;
pub mod ops;
pub mod registry;
pub mod sources;
pub mod store;

pub use cache::StoreCache;
pub use discovery::{Discovery, StoreFactory};
pub use lazy::{LazySession, SessionCloser};
pub use registry::{ProjectFilter, SourceInfo, StoreRegistry, StoreRegistryBuilder};
pub use store::{ResumeInfo, SessionReader, Store, StoreCore, StoreOptions};
