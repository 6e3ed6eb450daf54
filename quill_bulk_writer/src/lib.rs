//! Bulk-write batching engine for the Quill document store.
//!
//! Callers enqueue independent create/set/update/delete operations through a
//! [`BulkWriter`]; the engine groups them into bounded batches (never two
//! writes for the same document in one batch), sends the batches as
//! rate-limited retried RPCs, and settles each operation's [`WriteHandle`]
//! individually.

pub mod backoff;
pub mod error;
pub mod rate_limiter;
pub mod writer;

mod batch;
mod scheduler;

pub use backoff::{Delay, ExponentialBackoff, TokioDelay};
pub use error::{BulkWriterError, Result, WriteError};
pub use rate_limiter::{Admission, RateLimiter, RateLimiterOptions};
pub use writer::{BulkWriter, BulkWriterOptions, WriteHandle, WriteResult};
