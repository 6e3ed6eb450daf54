use std::collections::HashSet;

use tokio::sync::oneshot;

use quill_store_core::{DocumentName, Timestamp, Write};

use crate::error::WriteError;
use crate::writer::WriteResult;

pub(crate) type WriteReplySender = oneshot::Sender<Result<WriteResult, WriteError>>;

/// One caller-submitted write, owned by the pending batch until sent and by
/// the in-flight send until it settles.
#[derive(Debug)]
pub(crate) struct Operation {
    pub write: Write,
    reply: WriteReplySender,
}

impl Operation {
    pub fn new(write: Write, reply: WriteReplySender) -> Self {
        Self { write, reply }
    }

    pub fn document(&self) -> &DocumentName {
        &self.write.document
    }

    /// Settle the caller's handle with a successful write.
    ///
    /// Consumes the operation, so a result can only ever be delivered once.
    pub fn resolve(self, write_time: Timestamp) {
        let _ = self.reply.send(Ok(WriteResult { write_time }));
    }

    /// Settle the caller's handle with a failure.
    pub fn reject(self, error: WriteError) {
        let _ = self.reply.send(Err(error));
    }
}

/// Why an operation could not be added to the pending batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnqueueRejection {
    /// The batch already holds `max_size` operations.
    Full,
    /// The batch already holds a write for the same document.
    ConflictingDocument,
}

/// The ordered set of operations not yet handed off for sending.
///
/// Holds at most one write per document: a second write for a document
/// already in the batch is rejected so the caller closes this batch first,
/// which preserves per-document send ordering without server coordination.
#[derive(Debug)]
pub(crate) struct PendingBatch {
    ops: Vec<Operation>,
    documents: HashSet<DocumentName>,
    max_size: usize,
}

impl PendingBatch {
    pub fn new(max_size: usize) -> Self {
        // A batch must be able to hold at least one operation.
        let max_size = max_size.max(1);
        Self {
            ops: Vec::new(),
            documents: HashSet::new(),
            max_size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Append an operation, or hand it back with the reason the batch must
    /// be closed first.
    ///
    /// The conflict check runs before the size check: a conflicting document
    /// forces closure even when the batch has spare capacity.
    pub fn try_enqueue(&mut self, op: Operation) -> Result<(), (Operation, EnqueueRejection)> {
        if self.documents.contains(op.document()) {
            return Err((op, EnqueueRejection::ConflictingDocument));
        }

        if self.ops.len() >= self.max_size {
            return Err((op, EnqueueRejection::Full));
        }

        self.documents.insert(op.document().clone());
        self.ops.push(op);
        Ok(())
    }

    /// Close the batch: take the ordered operations and reset to empty.
    pub fn take(&mut self) -> Vec<Operation> {
        self.documents.clear();
        std::mem::take(&mut self.ops)
    }
}
