//! Core contract types for the Quill document store: resource names,
//! timestamps, status codes, the batch write model, retry policies, and an
//! in-memory backend for tests and development.

pub mod memory;
pub mod name;
pub mod retry;
pub mod status;
pub mod timestamp;
pub mod write;

pub use memory::InMemoryDocumentStore;
pub use name::{DatabaseName, DocumentName, NameError};
pub use retry::{RetryPolicy, RetryPolicyLookup};
pub use status::StatusCode;
pub use timestamp::Timestamp;
pub use write::{
    DocumentFields, DocumentWriteBackend, RpcStatus, Write, WriteKind, WriteOutcome,
};
