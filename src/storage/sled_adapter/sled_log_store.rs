use serde::Deserialize;
use serde::Serialize;
use sled::transaction::ConflictableTransactionError;
use sled::transaction::ConflictableTransactionResult;
use sled::transaction::TransactionError;
use sled::transaction::TransactionalTree;
use sled::Transactional;
use sled::Tree;
use tracing::debug;
use tracing::instrument;
use tracing::trace;

use crate::constants::LOG_META_TREE;
use crate::constants::LOG_RECORDS_TREE;
use crate::convert::record_key;
use crate::convert::record_key_offset;
use crate::time::age_since_ms;
use crate::Error;
use crate::LogRecord;
use crate::LogStats;
use crate::LogStore;
use crate::Result;
use crate::StorageError;
use crate::FIRST_OFFSET;

/// Per-collection sequencing row stored in `log_meta`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct CollectionMeta {
    head_offset: i64,
    tail_offset: i64,
}

impl CollectionMeta {
    fn empty() -> Self {
        Self {
            head_offset: FIRST_OFFSET - 1,
            tail_offset: FIRST_OFFSET,
        }
    }

    fn record_count(&self) -> u64 {
        (self.head_offset - self.tail_offset + 1).max(0) as u64
    }
}

#[derive(Serialize)]
struct StoredRecordRef<'a> {
    payload: &'a [u8],
    enqueued_at_ms: i64,
}

#[derive(Deserialize)]
struct StoredRecord {
    payload: Vec<u8>,
    enqueued_at_ms: i64,
}

/// sled-backed [`LogStore`].
///
/// Records of every collection share the `log_records` tree, keyed so that
/// one collection's records are contiguous and offset-ordered. The
/// `log_meta` row of a collection is read and rewritten in the same
/// transaction as every insert or delete touching that collection, which is
/// what serializes concurrent appends.
pub struct SledLogStore {
    db: sled::Db,
    records: Tree,
    meta: Tree,
    sync_writes: bool,
}

impl SledLogStore {
    pub fn new(
        db: sled::Db,
        sync_writes: bool,
    ) -> Result<Self> {
        let records = db.open_tree(LOG_RECORDS_TREE)?;
        let meta = db.open_tree(LOG_META_TREE)?;
        Ok(Self {
            db,
            records,
            meta,
            sync_writes,
        })
    }

    fn load_meta(
        &self,
        collection_id: &str,
    ) -> Result<Option<CollectionMeta>> {
        match self.meta.get(collection_id.as_bytes())? {
            Some(raw) => decode_meta(collection_id, &raw).map(Some),
            None => Ok(None),
        }
    }
}

impl LogStore for SledLogStore {
    #[instrument(skip(self, payloads), fields(batch = payloads.len()))]
    fn append(
        &self,
        collection_id: &str,
        payloads: &[Vec<u8>],
        enqueued_at_ms: i64,
    ) -> Result<Vec<i64>> {
        let offsets = (&self.records, &self.meta)
            .transaction(|(records, meta)| {
                let mut state = tx_load_meta(meta, collection_id)?.unwrap_or_else(CollectionMeta::empty);
                let mut offsets = Vec::with_capacity(payloads.len());

                for payload in payloads {
                    state.head_offset += 1;
                    let value = bincode::serialize(&StoredRecordRef {
                        payload,
                        enqueued_at_ms,
                    })
                    .map_err(|e| ConflictableTransactionError::Abort(Error::from(e)))?;
                    records.insert(record_key(collection_id, state.head_offset), value)?;
                    offsets.push(state.head_offset);
                }

                tx_save_meta(meta, collection_id, &state)?;
                Ok(offsets)
            })
            .map_err(map_tx_err)?;

        if self.sync_writes {
            self.db.flush()?;
        }

        trace!("appended offsets {:?}", offsets.first().zip(offsets.last()));
        Ok(offsets)
    }

    #[instrument(skip(self))]
    fn read(
        &self,
        collection_id: &str,
        start_offset: i64,
        limit: usize,
    ) -> Result<Vec<LogRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let Some(state) = self.load_meta(collection_id)? else {
            return Ok(Vec::new());
        };

        let start = start_offset.max(state.tail_offset).max(FIRST_OFFSET);
        if start > state.head_offset {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let end = (state.head_offset + 1).min(start.saturating_add(limit));

        let mut result = Vec::with_capacity((end - start) as usize);
        for item in self
            .records
            .range(record_key(collection_id, start)..record_key(collection_id, end))
        {
            let (key, value) = item?;
            let offset = record_key_offset(&key)?;
            let stored: StoredRecord = bincode::deserialize(&value).map_err(|_| {
                Error::from(StorageError::DataCorruption {
                    location: format!("record {collection_id}/{offset}"),
                })
            })?;
            result.push(LogRecord {
                offset,
                payload: stored.payload,
                enqueued_at_ms: stored.enqueued_at_ms,
            });
        }

        Ok(result)
    }

    #[instrument(skip(self))]
    fn purge(
        &self,
        collection_id: &str,
        boundary: i64,
    ) -> Result<u64> {
        let deleted = (&self.records, &self.meta)
            .transaction(|(records, meta)| {
                let Some(mut state) = tx_load_meta(meta, collection_id)? else {
                    return Ok(0);
                };

                let new_tail = boundary.min(state.head_offset + 1);
                if new_tail <= state.tail_offset {
                    return Ok(0);
                }

                let mut deleted = 0u64;
                for offset in state.tail_offset..new_tail {
                    if records.remove(record_key(collection_id, offset))?.is_some() {
                        deleted += 1;
                    }
                }
                state.tail_offset = new_tail;
                tx_save_meta(meta, collection_id, &state)?;
                Ok(deleted)
            })
            .map_err(map_tx_err)?;

        if deleted > 0 && self.sync_writes {
            self.db.flush()?;
        }

        debug!("purged {} records below {}", deleted, boundary);
        Ok(deleted)
    }

    #[instrument(skip(self))]
    fn stats(
        &self,
        collection_id: &str,
    ) -> Result<LogStats> {
        (&self.records, &self.meta)
            .transaction(|(records, meta)| {
                let Some(state) = tx_load_meta(meta, collection_id)? else {
                    return Ok(LogStats::empty());
                };

                let record_count = state.record_count();
                let oldest_retained_age = if record_count == 0 {
                    None
                } else {
                    match records.get(record_key(collection_id, state.tail_offset))? {
                        Some(raw) => {
                            let stored: StoredRecord = bincode::deserialize(&raw).map_err(|_| {
                                ConflictableTransactionError::Abort(Error::from(StorageError::DataCorruption {
                                    location: format!("record {}/{}", collection_id, state.tail_offset),
                                }))
                            })?;
                            Some(age_since_ms(stored.enqueued_at_ms))
                        }
                        None => {
                            return Err(ConflictableTransactionError::Abort(Error::from(
                                StorageError::DataCorruption {
                                    location: format!("missing tail record {}/{}", collection_id, state.tail_offset),
                                },
                            )))
                        }
                    }
                };

                Ok(LogStats {
                    head_offset: state.head_offset,
                    tail_offset: state.tail_offset,
                    record_count,
                    oldest_retained_age,
                })
            })
            .map_err(map_tx_err)
    }

    fn list_collections(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for key in self.meta.iter().keys() {
            let key = key?;
            let id = String::from_utf8(key.to_vec()).map_err(|_| StorageError::DataCorruption {
                location: format!("{LOG_META_TREE} key {key:?}"),
            })?;
            ids.push(id);
        }
        Ok(ids)
    }

    #[instrument(skip(self))]
    fn drop_collection(
        &self,
        collection_id: &str,
    ) -> Result<u64> {
        let deleted = (&self.records, &self.meta)
            .transaction(|(records, meta)| {
                let Some(state) = tx_load_meta(meta, collection_id)? else {
                    return Ok(0);
                };

                let mut deleted = 0u64;
                for offset in state.tail_offset..=state.head_offset {
                    if records.remove(record_key(collection_id, offset))?.is_some() {
                        deleted += 1;
                    }
                }
                meta.remove(collection_id.as_bytes())?;
                Ok(deleted)
            })
            .map_err(map_tx_err)?;

        if self.sync_writes {
            self.db.flush()?;
        }
        debug!("dropped {} records", deleted);
        Ok(deleted)
    }

    fn flush(&self) -> Result<()> {
        trace!("LogStore flush");
        self.db.flush()?;
        Ok(())
    }
}

fn decode_meta(
    collection_id: &str,
    raw: &[u8],
) -> Result<CollectionMeta> {
    bincode::deserialize(raw).map_err(|_| {
        StorageError::DataCorruption {
            location: format!("{LOG_META_TREE}/{collection_id}"),
        }
        .into()
    })
}

fn tx_load_meta(
    meta: &TransactionalTree,
    collection_id: &str,
) -> ConflictableTransactionResult<Option<CollectionMeta>, Error> {
    match meta.get(collection_id.as_bytes())? {
        Some(raw) => decode_meta(collection_id, &raw)
            .map(Some)
            .map_err(ConflictableTransactionError::Abort),
        None => Ok(None),
    }
}

fn tx_save_meta(
    meta: &TransactionalTree,
    collection_id: &str,
    state: &CollectionMeta,
) -> ConflictableTransactionResult<(), Error> {
    let value = bincode::serialize(state).map_err(|e| ConflictableTransactionError::Abort(Error::from(e)))?;
    meta.insert(collection_id.as_bytes(), value)?;
    Ok(())
}

fn map_tx_err(e: TransactionError<Error>) -> Error {
    match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => e.into(),
    }
}
