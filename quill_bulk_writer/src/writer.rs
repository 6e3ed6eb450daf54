//! The public bulk writer surface.
//!
//! A [`BulkWriter`] accepts create/set/update/delete operations against
//! named documents and returns a deferred [`WriteHandle`] for each one. The
//! operations are grouped into batches and sent by a background scheduler
//! task; see [`crate::scheduler`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use snafu::{OptionExt, ensure};
use tokio::sync::{mpsc, oneshot};

use quill_store_core::{
    DatabaseName, DocumentFields, DocumentName, DocumentWriteBackend, RetryPolicyLookup,
    Timestamp, Write,
};

use crate::backoff::{Delay, TokioDelay};
use crate::batch::Operation;
use crate::error::{ReplyChannelClosedSnafu, Result, WriteError, WriterClosedSnafu};
use crate::rate_limiter::RateLimiterOptions;
use crate::scheduler::Scheduler;

/// Default maximum number of operations per sent batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 20;

/// Tuning knobs for a bulk writer.
#[derive(Debug, Clone)]
pub struct BulkWriterOptions {
    /// Maximum number of operations grouped into one RPC.
    pub max_batch_size: usize,
    /// Admission-control configuration.
    pub rate_limiter: RateLimiterOptions,
    /// Retry policies, looked up by RPC method name.
    pub retry_policies: RetryPolicyLookup,
}

impl Default for BulkWriterOptions {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            rate_limiter: RateLimiterOptions::default(),
            retry_policies: RetryPolicyLookup::default(),
        }
    }
}

/// The success value of a settled write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    /// The time at which the write was committed.
    pub write_time: Timestamp,
}

/// Deferred result of one enqueued operation.
///
/// The handle settles exactly once, after the operation's batch has been
/// sent and reconciled (including any retries).
#[derive(Debug)]
pub struct WriteHandle {
    rx: oneshot::Receiver<std::result::Result<WriteResult, WriteError>>,
}

impl WriteHandle {
    /// Wait for the operation to settle.
    pub async fn result(self) -> std::result::Result<WriteResult, WriteError> {
        self.rx.await.unwrap_or(Err(WriteError::WriterShutDown))
    }
}

pub(crate) enum Command {
    Enqueue(Operation),
    Flush { reply: oneshot::Sender<()> },
}

/// Batches independent document writes and sends them as rate-limited,
/// retried RPCs, resolving each operation individually.
///
/// Dropping the writer without calling [`BulkWriter::close`] still drains:
/// the scheduler keeps running until every enqueued operation has settled.
pub struct BulkWriter {
    tx: mpsc::UnboundedSender<Command>,
    closed: AtomicBool,
}

impl BulkWriter {
    /// Create a writer with default options.
    pub fn new(database: DatabaseName, backend: Arc<dyn DocumentWriteBackend>) -> Self {
        Self::with_options(database, backend, BulkWriterOptions::default())
    }

    /// Create a writer with the given options.
    pub fn with_options(
        database: DatabaseName,
        backend: Arc<dyn DocumentWriteBackend>,
        options: BulkWriterOptions,
    ) -> Self {
        Self::with_delay(database, backend, options, Arc::new(TokioDelay))
    }

    /// Create a writer with an explicit delay primitive.
    ///
    /// Rate-limiter waits and retry backoff sleep through `delay`; tests
    /// substitute a recording or zero-delay implementation.
    pub fn with_delay(
        database: DatabaseName,
        backend: Arc<dyn DocumentWriteBackend>,
        options: BulkWriterOptions,
        delay: Arc<dyn Delay>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(database, backend, options, delay, rx);
        tokio::spawn(scheduler.run());

        Self {
            tx,
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue a create; fails on the server if the document exists.
    pub fn create(&self, document: DocumentName, fields: DocumentFields) -> Result<WriteHandle> {
        self.enqueue(Write::create(document, fields))
    }

    /// Enqueue a set, creating or replacing the document.
    pub fn set(&self, document: DocumentName, fields: DocumentFields) -> Result<WriteHandle> {
        self.enqueue(Write::set(document, fields))
    }

    /// Enqueue an update; fails on the server if the document is missing.
    pub fn update(&self, document: DocumentName, fields: DocumentFields) -> Result<WriteHandle> {
        self.enqueue(Write::update(document, fields))
    }

    /// Enqueue a delete.
    pub fn delete(&self, document: DocumentName) -> Result<WriteHandle> {
        self.enqueue(Write::delete(document))
    }

    /// Close the current batch and send everything queued so far.
    ///
    /// Resolves once every write issued before the call has settled. With
    /// nothing queued and nothing in flight it resolves immediately without
    /// issuing an RPC.
    pub async fn flush(&self) -> Result<()> {
        ensure!(!self.closed.load(Ordering::SeqCst), WriterClosedSnafu);
        self.flush_inner().await
    }

    /// Flush, then permanently reject further calls.
    ///
    /// In-flight batches are not cancelled; the call resolves once the
    /// writer is fully drained.
    pub async fn close(&self) -> Result<()> {
        ensure!(!self.closed.swap(true, Ordering::SeqCst), WriterClosedSnafu);
        self.flush_inner().await
    }

    fn enqueue(&self, write: Write) -> Result<WriteHandle> {
        ensure!(!self.closed.load(Ordering::SeqCst), WriterClosedSnafu);

        let (reply, rx) = oneshot::channel();
        let op = Operation::new(write, reply);
        self.tx
            .send(Command::Enqueue(op))
            .ok()
            .context(ReplyChannelClosedSnafu)?;

        Ok(WriteHandle { rx })
    }

    async fn flush_inner(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Flush { reply })
            .ok()
            .context(ReplyChannelClosedSnafu)?;

        rx.await.ok().context(ReplyChannelClosedSnafu)
    }
}
