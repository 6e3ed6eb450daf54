//! The batch write contract between the bulk writer and a store backend.
//!
//! A backend receives an ordered sequence of [`Write`]s and either returns
//! one [`WriteOutcome`] per write, positionally aligned with the request, or
//! fails the whole call with an [`RpcStatus`].

use async_trait::async_trait;
use thiserror::Error;

use crate::name::{DatabaseName, DocumentName};
use crate::status::StatusCode;
use crate::timestamp::Timestamp;

/// The field values of a document.
pub type DocumentFields = serde_json::Map<String, serde_json::Value>;

/// The kind of mutation applied to a document.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteKind {
    /// Create the document; fails if it already exists.
    Create { fields: DocumentFields },
    /// Create or replace the document.
    Set { fields: DocumentFields },
    /// Merge fields into an existing document; fails if it does not exist.
    Update { fields: DocumentFields },
    /// Delete the document; succeeds whether or not it exists.
    Delete,
}

/// One document mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    /// The target document.
    pub document: DocumentName,
    /// The mutation to apply.
    pub kind: WriteKind,
}

/// The per-write result entry of a batch write response.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    /// The status of the write.
    pub code: StatusCode,
    /// A human-readable description of a failure; empty on success.
    pub message: String,
    /// The time at which the write was committed; present on success.
    pub write_time: Option<Timestamp>,
}

impl WriteOutcome {
    pub fn success(write_time: Timestamp) -> Self {
        Self {
            code: StatusCode::Ok,
            message: String::new(),
            write_time: Some(write_time),
        }
    }

    pub fn failure(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            write_time: None,
        }
    }
}

/// A whole-call RPC failure: the batch write did not produce per-write
/// outcomes.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("rpc failed with {code}: {message}")]
pub struct RpcStatus {
    pub code: StatusCode,
    pub message: String,
}

impl RpcStatus {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// A document store backend that can apply a batch of writes.
#[async_trait]
pub trait DocumentWriteBackend: Send + Sync + 'static {
    /// Apply a batch of writes to the given database.
    ///
    /// On success the response carries exactly one outcome per write, in
    /// request order. Per-write failures are reported through the outcomes;
    /// an `Err` means the call failed before any per-write outcome was known.
    async fn batch_write(
        &self,
        database: &DatabaseName,
        writes: Vec<Write>,
    ) -> Result<Vec<WriteOutcome>, RpcStatus>;
}

impl Write {
    pub fn create(document: DocumentName, fields: DocumentFields) -> Self {
        Self {
            document,
            kind: WriteKind::Create { fields },
        }
    }

    pub fn set(document: DocumentName, fields: DocumentFields) -> Self {
        Self {
            document,
            kind: WriteKind::Set { fields },
        }
    }

    pub fn update(document: DocumentName, fields: DocumentFields) -> Self {
        Self {
            document,
            kind: WriteKind::Update { fields },
        }
    }

    pub fn delete(document: DocumentName) -> Self {
        Self {
            document,
            kind: WriteKind::Delete,
        }
    }
}
