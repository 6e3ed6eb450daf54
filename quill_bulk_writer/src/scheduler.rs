//! The scheduler task behind a [`crate::writer::BulkWriter`].
//!
//! A single task owns the pending batch and the set of in-flight sends.
//! Commands arrive on an unbounded channel, so enqueueing never blocks the
//! caller; each closed batch becomes an independent future that waits for
//! rate-limiter admission, invokes the backend, reconciles the per-write
//! outcomes, and retries what remains.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, warn};

use quill_store_core::{
    DatabaseName, DocumentWriteBackend, RetryPolicy, StatusCode, Timestamp, WriteOutcome, retry,
};

use crate::backoff::{Delay, ExponentialBackoff};
use crate::batch::{Operation, PendingBatch};
use crate::error::WriteError;
use crate::rate_limiter::{Admission, RateLimiter};
use crate::writer::{BulkWriterOptions, Command};

/// Everything a batch send needs, shared across all sends of one writer.
///
/// The rate limiter is the only mutable state crossing task boundaries.
#[derive(Clone)]
struct SendContext {
    database: DatabaseName,
    backend: Arc<dyn DocumentWriteBackend>,
    rate_limiter: Arc<Mutex<RateLimiter>>,
    policy: RetryPolicy,
    delay: Arc<dyn Delay>,
}

struct FlushWaiter {
    /// The batches in flight when the flush was requested. Only these ids
    /// gate the waiter; batches dispatched later do not count toward it.
    batches: HashSet<u64>,
    reply: oneshot::Sender<()>,
}

pub(crate) struct Scheduler {
    rx: mpsc::UnboundedReceiver<Command>,
    pending: PendingBatch,
    in_flight: FuturesUnordered<BoxFuture<'static, u64>>,
    in_flight_ids: HashSet<u64>,
    next_batch_id: u64,
    flush_waiters: Vec<FlushWaiter>,
    ctx: SendContext,
}

impl Scheduler {
    pub fn new(
        database: DatabaseName,
        backend: Arc<dyn DocumentWriteBackend>,
        options: BulkWriterOptions,
        delay: Arc<dyn Delay>,
        rx: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let rate_limiter = RateLimiter::new(options.rate_limiter);
        let policy = options.retry_policies.policy_for(retry::BATCH_WRITE).clone();

        Self {
            rx,
            pending: PendingBatch::new(options.max_batch_size),
            in_flight: FuturesUnordered::new(),
            in_flight_ids: HashSet::new(),
            next_batch_id: 0,
            flush_waiters: Vec::new(),
            ctx: SendContext {
                database,
                backend,
                rate_limiter: Arc::new(Mutex::new(rate_limiter)),
                policy,
                delay,
            },
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.rx.recv() => {
                    let Some(command) = command else {
                        // Writer dropped; drain whatever is left.
                        break;
                    };
                    self.handle_command(command);
                }
                completed = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    if let Some(id) = completed {
                        self.finish_batch(id);
                    }
                }
            }
        }

        self.dispatch_pending();
        while let Some(id) = self.in_flight.next().await {
            self.finish_batch(id);
        }
        debug!("bulk write scheduler drained");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Enqueue(op) => self.enqueue(op),
            Command::Flush { reply } => self.flush(reply),
        }
    }

    fn enqueue(&mut self, op: Operation) {
        let Err((op, rejection)) = self.pending.try_enqueue(op) else {
            return;
        };

        // Size limit and same-document conflict converge on the same
        // dispatch path as explicit flushes.
        debug!(rejection = ?rejection, "closing batch");
        self.dispatch_pending();

        if let Err((op, rejection)) = self.pending.try_enqueue(op) {
            // A fresh batch accepts any single operation; reaching this
            // means the batch invariants are broken.
            warn!(rejection = ?rejection, "operation rejected by empty batch");
            op.reject(WriteError::Rejected {
                code: StatusCode::Internal,
                message: "operation rejected by empty batch".to_string(),
            });
        }
    }

    fn flush(&mut self, reply: oneshot::Sender<()>) {
        self.dispatch_pending();

        if self.in_flight_ids.is_empty() {
            let _ = reply.send(());
            return;
        }

        self.flush_waiters.push(FlushWaiter {
            batches: self.in_flight_ids.clone(),
            reply,
        });
    }

    /// Close the pending batch and start sending it.
    ///
    /// Closure is synchronous; the send itself is gated on rate-limiter
    /// admission inside the spawned future.
    fn dispatch_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let id = self.next_batch_id;
        self.next_batch_id += 1;
        self.in_flight_ids.insert(id);

        debug!(batch_id = id, num_writes = self.pending.len(), "dispatching batch");
        let ops = self.pending.take();
        self.in_flight
            .push(send_batch(self.ctx.clone(), ops).map(move |_| id).boxed());
    }

    fn finish_batch(&mut self, id: u64) {
        self.in_flight_ids.remove(&id);

        let waiters = std::mem::take(&mut self.flush_waiters);
        for mut waiter in waiters {
            waiter.batches.remove(&id);
            if waiter.batches.is_empty() {
                let _ = waiter.reply.send(());
            } else {
                self.flush_waiters.push(waiter);
            }
        }
    }
}

/// Outcome classification, decided once per reconciliation pass.
enum Reconciled {
    Success(Timestamp),
    Retry,
    Terminal { code: StatusCode, message: String },
}

/// Drive one closed batch to completion.
///
/// Every operation handed in settles exactly once before this future
/// resolves: with a write time, a terminal per-write failure, or the RPC
/// failure that exhausted the retry budget.
async fn send_batch(ctx: SendContext, mut ops: Vec<Operation>) {
    let mut backoff = ExponentialBackoff::new(&ctx.policy);
    let mut attempt: u32 = 0;

    while !ops.is_empty() {
        wait_for_admission(&ctx, ops.len() as u32).await;
        attempt += 1;

        let writes = ops.iter().map(|op| op.write.clone()).collect();
        match ctx.backend.batch_write(&ctx.database, writes).await {
            Ok(outcomes) => {
                ops = reconcile(ops, outcomes, attempt, &ctx.policy);
                if ops.is_empty() {
                    return;
                }

                debug!(
                    num_writes = ops.len(),
                    attempt, "resending writes with retryable failures"
                );
                ctx.delay.sleep(backoff.next_delay()).await;
            }
            Err(status) if ctx.policy.is_retryable(status.code) && attempt < ctx.policy.max_attempts => {
                warn!(code = %status.code, attempt, "batch rpc failed, retrying");
                ctx.delay.sleep(backoff.next_delay()).await;
            }
            Err(status) => {
                warn!(code = %status.code, attempt, "batch rpc failed, giving up");
                for op in ops {
                    op.reject(WriteError::Rpc {
                        source: status.clone(),
                    });
                }
                return;
            }
        }
    }
}

async fn wait_for_admission(ctx: &SendContext, count: u32) {
    loop {
        let admission = ctx.rate_limiter.lock().await.try_admit(count);
        match admission {
            Admission::Admitted => return,
            Admission::RetryAfter(delay) => ctx.delay.sleep(delay).await,
        }
    }
}

/// Match per-write outcomes back to their operations, in order.
///
/// Successes and terminal failures settle immediately; retryable failures
/// with attempts remaining are returned as the follow-up batch, preserving
/// their original order.
fn reconcile(
    ops: Vec<Operation>,
    outcomes: Vec<WriteOutcome>,
    attempt: u32,
    policy: &RetryPolicy,
) -> Vec<Operation> {
    if outcomes.len() != ops.len() {
        warn!(
            expected = ops.len(),
            received = outcomes.len(),
            "batch response misaligned with request"
        );
        for op in ops {
            op.reject(WriteError::Rejected {
                code: StatusCode::Internal,
                message: "batch response misaligned with request".to_string(),
            });
        }
        return Vec::new();
    }

    let mut retry_ops = Vec::new();
    for (op, outcome) in ops.into_iter().zip(outcomes) {
        match classify(outcome, attempt, policy) {
            Reconciled::Success(write_time) => op.resolve(write_time),
            Reconciled::Retry => retry_ops.push(op),
            Reconciled::Terminal { code, message } => {
                op.reject(WriteError::Rejected { code, message });
            }
        }
    }

    retry_ops
}

fn classify(outcome: WriteOutcome, attempt: u32, policy: &RetryPolicy) -> Reconciled {
    if outcome.code.is_ok() {
        return match outcome.write_time {
            Some(write_time) => Reconciled::Success(write_time),
            None => Reconciled::Terminal {
                code: StatusCode::Internal,
                message: "successful write outcome missing write time".to_string(),
            },
        };
    }

    if policy.is_retryable(outcome.code) && attempt < policy.max_attempts {
        return Reconciled::Retry;
    }

    Reconciled::Terminal {
        code: outcome.code,
        message: outcome.message,
    }
}
