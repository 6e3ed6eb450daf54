use snafu::Snafu;

use quill_store_core::{RpcStatus, StatusCode};

/// Caller-usage errors surfaced by the bulk writer itself.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BulkWriterError {
    /// The writer was already closed when the call was made.
    #[snafu(display("bulk writer already closed"))]
    WriterClosed,
    /// The scheduler task went away before replying.
    #[snafu(display("reply channel closed"))]
    ReplyChannelClosed,
}

pub type Result<T, E = BulkWriterError> = std::result::Result<T, E>;

/// The failure of a single write operation.
///
/// Every enqueued operation settles exactly once, either with a
/// [`crate::writer::WriteResult`] or with one of these.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum WriteError {
    /// The store reported a terminal per-write failure.
    #[snafu(display("write failed with {code}: {message}"))]
    Rejected { code: StatusCode, message: String },
    /// The batch RPC failed and the retry budget is exhausted.
    #[snafu(display("batch rpc failed: {source}"))]
    Rpc { source: RpcStatus },
    /// The writer shut down before the write completed.
    ///
    /// Only reachable if the scheduler task is torn down mid-flight, e.g. at
    /// runtime shutdown.
    #[snafu(display("bulk writer shut down before the write completed"))]
    WriterShutDown,
}

impl WriteError {
    /// The status code associated with the failure.
    pub fn code(&self) -> StatusCode {
        match self {
            WriteError::Rejected { code, .. } => *code,
            WriteError::Rpc { source } => source.code,
            WriteError::WriterShutDown => StatusCode::Cancelled,
        }
    }
}
