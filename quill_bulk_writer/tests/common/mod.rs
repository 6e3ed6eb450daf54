use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use quill_bulk_writer::{BulkWriter, BulkWriterOptions, Delay};
use quill_store_core::{
    DatabaseName, DocumentFields, DocumentName, DocumentWriteBackend, RpcStatus, Timestamp, Write,
    WriteOutcome,
};

/// One scripted response of the [`RecordingBackend`].
pub enum BatchResponse {
    /// Every write succeeds, sharing a timestamp from a logical clock.
    SuccessAll,
    /// The whole call fails before per-write outcomes are known.
    Transport(RpcStatus),
    /// Explicit per-write outcomes, positionally aligned with the request.
    PerWrite(Vec<WriteOutcome>),
}

/// A backend that records every request and replays scripted responses.
///
/// With an empty script every call behaves like [`BatchResponse::SuccessAll`].
#[derive(Default)]
pub struct RecordingBackend {
    requests: Mutex<Vec<Vec<Write>>>,
    script: Mutex<VecDeque<BatchResponse>>,
    clock: AtomicI64,
}

impl RecordingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_response(&self, response: BatchResponse) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, index: usize) -> Vec<Write> {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl DocumentWriteBackend for RecordingBackend {
    async fn batch_write(
        &self,
        _database: &DatabaseName,
        writes: Vec<Write>,
    ) -> Result<Vec<WriteOutcome>, RpcStatus> {
        self.requests.lock().unwrap().push(writes.clone());

        let response = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(BatchResponse::SuccessAll);

        match response {
            BatchResponse::SuccessAll => {
                let seconds = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
                let write_time = Timestamp::new(seconds, 0);
                Ok(writes.iter().map(|_| WriteOutcome::success(write_time)).collect())
            }
            BatchResponse::Transport(status) => Err(status),
            BatchResponse::PerWrite(outcomes) => Ok(outcomes),
        }
    }
}

/// A backend whose first call blocks until [`GatedBackend::release`] is
/// called; every other call succeeds immediately.
#[derive(Default)]
pub struct GatedBackend {
    gate: Notify,
    gated: AtomicBool,
    requests: Mutex<Vec<Vec<Write>>>,
    clock: AtomicI64,
}

impl GatedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gated: AtomicBool::new(true),
            ..Self::default()
        })
    }

    /// Unblock the gated call.
    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl DocumentWriteBackend for GatedBackend {
    async fn batch_write(
        &self,
        _database: &DatabaseName,
        writes: Vec<Write>,
    ) -> Result<Vec<WriteOutcome>, RpcStatus> {
        self.requests.lock().unwrap().push(writes.clone());

        if self.gated.swap(false, Ordering::SeqCst) {
            self.gate.notified().await;
        }

        let seconds = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        let write_time = Timestamp::new(seconds, 0);
        Ok(writes.iter().map(|_| WriteOutcome::success(write_time)).collect())
    }
}

/// A delay primitive that records every requested sleep and returns
/// immediately.
#[derive(Default)]
pub struct RecordingDelay {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingDelay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Delay for RecordingDelay {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

pub fn database() -> DatabaseName {
    DatabaseName::new_unchecked("test-db")
}

pub fn doc(path: &str) -> DocumentName {
    DocumentName::new_unchecked(path)
}

pub fn fields(value: serde_json::Value) -> DocumentFields {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected a json object, got {other}"),
    }
}

pub fn writer(backend: Arc<RecordingBackend>) -> BulkWriter {
    BulkWriter::new(database(), backend)
}

pub fn writer_with_max_batch(backend: Arc<RecordingBackend>, max_batch_size: usize) -> BulkWriter {
    let options = BulkWriterOptions {
        max_batch_size,
        ..BulkWriterOptions::default()
    };
    BulkWriter::with_options(database(), backend, options)
}
