//! In-memory implementation of the document write backend.
//!
//! This implementation stores documents in memory and is suitable for testing
//! and development. All data is lost when the process stops.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::name::{DatabaseName, DocumentName};
use crate::status::StatusCode;
use crate::timestamp::Timestamp;
use crate::write::{
    DocumentFields, DocumentWriteBackend, RpcStatus, Write, WriteKind, WriteOutcome,
};

#[derive(Debug, Clone)]
struct StoredDocument {
    fields: DocumentFields,
    update_time: Timestamp,
}

/// In-memory implementation of [`DocumentWriteBackend`].
///
/// Write timestamps are drawn from a logical clock that ticks once per batch
/// call, so all writes in one batch share a timestamp and tests observe
/// deterministic times.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: DashMap<(DatabaseName, DocumentName), StoredDocument>,
    clock: AtomicI64,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current field values of a document, if it exists.
    pub fn document(
        &self,
        database: &DatabaseName,
        document: &DocumentName,
    ) -> Option<DocumentFields> {
        self.documents
            .get(&(database.clone(), document.clone()))
            .map(|stored| stored.fields.clone())
    }

    /// The time of the last write applied to a document, if it exists.
    pub fn update_time(
        &self,
        database: &DatabaseName,
        document: &DocumentName,
    ) -> Option<Timestamp> {
        self.documents
            .get(&(database.clone(), document.clone()))
            .map(|stored| stored.update_time)
    }

    fn apply(&self, database: &DatabaseName, write: Write, write_time: Timestamp) -> WriteOutcome {
        let key = (database.clone(), write.document.clone());

        match write.kind {
            WriteKind::Create { fields } => {
                let mut created = false;
                self.documents.entry(key).or_insert_with(|| {
                    created = true;
                    StoredDocument {
                        fields,
                        update_time: write_time,
                    }
                });

                if created {
                    WriteOutcome::success(write_time)
                } else {
                    WriteOutcome::failure(
                        StatusCode::AlreadyExists,
                        format!("document already exists: {}", write.document),
                    )
                }
            }
            WriteKind::Set { fields } => {
                self.documents.insert(
                    key,
                    StoredDocument {
                        fields,
                        update_time: write_time,
                    },
                );
                WriteOutcome::success(write_time)
            }
            WriteKind::Update { fields } => match self.documents.get_mut(&key) {
                Some(mut stored) => {
                    for (name, value) in fields {
                        stored.fields.insert(name, value);
                    }
                    stored.update_time = write_time;
                    WriteOutcome::success(write_time)
                }
                None => WriteOutcome::failure(
                    StatusCode::NotFound,
                    format!("document not found: {}", write.document),
                ),
            },
            WriteKind::Delete => {
                self.documents.remove(&key);
                WriteOutcome::success(write_time)
            }
        }
    }
}

#[async_trait]
impl DocumentWriteBackend for InMemoryDocumentStore {
    async fn batch_write(
        &self,
        database: &DatabaseName,
        writes: Vec<Write>,
    ) -> Result<Vec<WriteOutcome>, RpcStatus> {
        let seconds = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        let write_time = Timestamp::new(seconds, 0);

        let outcomes = writes
            .into_iter()
            .map(|write| self.apply(database, write, write_time))
            .collect();

        Ok(outcomes)
    }
}
