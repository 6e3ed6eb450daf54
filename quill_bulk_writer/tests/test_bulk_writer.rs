use std::sync::Arc;

use serde_json::json;

use common::{
    BatchResponse, GatedBackend, RecordingBackend, database, doc, fields, writer,
    writer_with_max_batch,
};
use quill_bulk_writer::{BulkWriter, BulkWriterError};
use quill_store_core::{InMemoryDocumentStore, Timestamp, WriteKind, WriteOutcome};

mod common;

#[tokio::test(start_paused = true)]
async fn test_distinct_documents_grouped_into_one_batch() {
    let backend = RecordingBackend::new();
    let writer = writer(backend.clone());

    let handles = vec![
        writer.set(doc("users/a"), fields(json!({"n": 1}))).unwrap(),
        writer.set(doc("users/b"), fields(json!({"n": 2}))).unwrap(),
        writer.set(doc("users/c"), fields(json!({"n": 3}))).unwrap(),
    ];

    writer.flush().await.unwrap();

    assert_eq!(backend.request_count(), 1);
    assert_eq!(backend.request(0).len(), 3);

    for handle in handles {
        let result = handle.result().await.unwrap();
        assert_eq!(result.write_time, Timestamp::new(1, 0));
    }
}

#[tokio::test(start_paused = true)]
async fn test_two_documents_share_one_rpc_at_batch_limit() {
    let backend = RecordingBackend::new();
    let writer = writer_with_max_batch(backend.clone(), 2);

    let first = writer.set(doc("users/a"), fields(json!({}))).unwrap();
    let second = writer.set(doc("users/b"), fields(json!({}))).unwrap();

    writer.close().await.unwrap();

    assert_eq!(backend.request_count(), 1);
    let request = backend.request(0);
    assert_eq!(request.len(), 2);
    assert_eq!(request[0].document, doc("users/a"));
    assert_eq!(request[1].document, doc("users/b"));

    first.result().await.unwrap();
    second.result().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_same_document_writes_never_share_a_batch() {
    let backend = RecordingBackend::new();
    let writer = writer(backend.clone());

    let first = writer.set(doc("users/a"), fields(json!({"v": 1}))).unwrap();
    let second = writer.set(doc("users/a"), fields(json!({"v": 2}))).unwrap();

    writer.close().await.unwrap();

    assert_eq!(backend.request_count(), 2);
    assert_eq!(backend.request(0).len(), 1);
    assert_eq!(backend.request(1).len(), 1);

    // The batches go out in enqueue order.
    let WriteKind::Set { fields: sent } = backend.request(0)[0].kind.clone() else {
        panic!("expected a set write");
    };
    assert_eq!(sent, fields(json!({"v": 1})));
    let WriteKind::Set { fields: sent } = backend.request(1)[0].kind.clone() else {
        panic!("expected a set write");
    };
    assert_eq!(sent, fields(json!({"v": 2})));

    first.result().await.unwrap();
    second.result().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_six_writes_with_max_batch_two_produce_three_rpcs() {
    let backend = RecordingBackend::new();
    let writer = writer_with_max_batch(backend.clone(), 2);

    let mut handles = Vec::new();
    for name in ["a", "b", "c", "d", "e", "f"] {
        let handle = writer
            .set(doc(&format!("users/{name}")), fields(json!({})))
            .unwrap();
        handles.push(handle);
    }

    writer.close().await.unwrap();

    assert_eq!(backend.request_count(), 3);
    for index in 0..3 {
        assert_eq!(backend.request(index).len(), 2);
    }

    for handle in handles {
        handle.result().await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_write_count_not_divisible_by_batch_size() {
    let backend = RecordingBackend::new();
    let writer = writer_with_max_batch(backend.clone(), 2);

    let mut handles = Vec::new();
    for name in ["a", "b", "c", "d", "e"] {
        let handle = writer
            .set(doc(&format!("users/{name}")), fields(json!({})))
            .unwrap();
        handles.push(handle);
    }

    writer.close().await.unwrap();

    // ceil(5 / 2) batches, the last one short.
    assert_eq!(backend.request_count(), 3);
    assert_eq!(backend.request(0).len(), 2);
    assert_eq!(backend.request(1).len(), 2);
    assert_eq!(backend.request(2).len(), 1);

    for handle in handles {
        handle.result().await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_flush_with_nothing_queued_is_immediate() {
    let backend = RecordingBackend::new();
    let writer = writer(backend.clone());

    writer.flush().await.unwrap();

    assert_eq!(backend.request_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_flush_waits_for_batches_in_flight_at_call_time() {
    let backend = GatedBackend::new();
    let writer = Arc::new(BulkWriter::new(database(), backend.clone()));

    let slow = writer.set(doc("users/slow"), fields(json!({}))).unwrap();
    let flush_task = tokio::spawn({
        let writer = writer.clone();
        async move { writer.flush().await }
    });
    // Let the flush reach the scheduler before more writes arrive.
    tokio::task::yield_now().await;

    // Two writes for one document push a second, fast batch out while the
    // flushed batch is still blocked inside the backend.
    let fast = writer.set(doc("users/fast"), fields(json!({"v": 1}))).unwrap();
    let later = writer.set(doc("users/fast"), fields(json!({"v": 2}))).unwrap();

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(backend.request_count(), 2);
    fast.result().await.unwrap();

    // The fast batch completing must not release the flush: the write it
    // covers is still in flight.
    assert!(!flush_task.is_finished());

    backend.release();
    flush_task.await.unwrap().unwrap();
    slow.result().await.unwrap();

    writer.close().await.unwrap();
    later.result().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reported_write_time_is_the_backend_write_time() {
    let backend = RecordingBackend::new();
    backend.push_response(BatchResponse::PerWrite(vec![WriteOutcome::success(
        Timestamp::new(2, 0),
    )]));
    let writer = writer(backend.clone());

    let handle = writer.set(doc("users/a"), fields(json!({"foo": "bar"}))).unwrap();
    writer.close().await.unwrap();

    let result = handle.result().await.unwrap();
    assert_eq!(result.write_time, Timestamp::new(2, 0));
}

#[tokio::test(start_paused = true)]
async fn test_close_settles_everything_and_rejects_further_calls() {
    let backend = RecordingBackend::new();
    let writer = writer(backend.clone());

    let first = writer.set(doc("users/a"), fields(json!({}))).unwrap();
    let second = writer.delete(doc("users/b")).unwrap();

    writer.close().await.unwrap();

    // Every previously issued handle has settled.
    first.result().await.unwrap();
    second.result().await.unwrap();

    assert!(matches!(
        writer.set(doc("users/c"), fields(json!({}))),
        Err(BulkWriterError::WriterClosed)
    ));
    assert!(matches!(
        writer.create(doc("users/c"), fields(json!({}))),
        Err(BulkWriterError::WriterClosed)
    ));
    assert!(matches!(
        writer.update(doc("users/c"), fields(json!({}))),
        Err(BulkWriterError::WriterClosed)
    ));
    assert!(matches!(
        writer.delete(doc("users/c")),
        Err(BulkWriterError::WriterClosed)
    ));
    assert!(matches!(
        writer.flush().await,
        Err(BulkWriterError::WriterClosed)
    ));
    assert!(matches!(
        writer.close().await,
        Err(BulkWriterError::WriterClosed)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_writer_still_settles_outstanding_writes() {
    let backend = RecordingBackend::new();
    let writer = writer(backend.clone());

    let handle = writer.set(doc("users/a"), fields(json!({}))).unwrap();
    drop(writer);

    handle.result().await.unwrap();
    assert_eq!(backend.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_against_in_memory_store() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let writer = BulkWriter::new(database(), store.clone());

    let set_alice = writer
        .set(doc("users/alice"), fields(json!({"name": "alice"})))
        .unwrap();
    let set_bob = writer
        .set(doc("users/bob"), fields(json!({"n": 1})))
        .unwrap();
    // Same document as the first write: forced into a later batch.
    let update_alice = writer
        .update(doc("users/alice"), fields(json!({"age": 30})))
        .unwrap();

    writer.close().await.unwrap();

    let first_time = set_alice.result().await.unwrap().write_time;
    set_bob.result().await.unwrap();
    let second_time = update_alice.result().await.unwrap().write_time;
    assert!(first_time < second_time);

    let alice = store.document(&database(), &doc("users/alice")).unwrap();
    assert_eq!(alice, fields(json!({"name": "alice", "age": 30})));
    assert!(store.document(&database(), &doc("users/bob")).is_some());
}
