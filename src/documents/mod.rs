//! Document lifecycle tracking and its collaborators.

pub mod departments;
pub mod locks;
pub mod store;
pub mod tracker;
pub mod types;

pub use departments::{DepartmentDirectory, StaticDepartmentDirectory};
pub use locks::KeyedLocks;
pub use store::{DocumentStore, JsonFileDocumentStore, MemoryDocumentStore};
pub use tracker::DocumentTracker;
pub use types::{Department, Document, DocumentStatus, NewDocument, StoreError, TrackerError};
