use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing_test::traced_test;

use super::*;
use crate::test_utils::fast_policy;
use crate::test_utils::payloads;
use crate::test_utils::setup_repository;
use crate::Error;
use crate::LocalSysDb;
use crate::LogError;
use crate::LogStore;
use crate::MockLogStore;
use crate::StorageError;

fn offsets(records: &[crate::LogRecord]) -> Vec<i64> {
    records.iter().map(|r| r.offset).collect()
}

#[tokio::test]
#[traced_test]
async fn test_append_then_pull_returns_records_in_order() {
    let fixture = setup_repository(&["c1"]);
    let repo = &fixture.repository;

    assert_eq!(repo.append("c1", b"a".to_vec()).await.unwrap(), 1);
    assert_eq!(repo.append("c1", b"b".to_vec()).await.unwrap(), 2);
    assert_eq!(repo.append("c1", b"c".to_vec()).await.unwrap(), 3);

    let records = repo.read("c1", 1, 10).await.unwrap();
    assert_eq!(offsets(&records), vec![1, 2, 3]);
    let bodies: Vec<&[u8]> = records.iter().map(|r| r.payload.as_slice()).collect();
    assert_eq!(bodies, vec![&b"a"[..], &b"b"[..], &b"c"[..]]);
}

#[tokio::test]
async fn test_purge_then_pull_starts_at_boundary() {
    let fixture = setup_repository(&["c1"]);
    let repo = &fixture.repository;
    repo.append_batch("c1", payloads(&["a", "b", "c"])).await.unwrap();

    assert_eq!(repo.purge("c1", 2).await.unwrap(), 1);

    let records = repo.read("c1", 1, 10).await.unwrap();
    assert_eq!(offsets(&records), vec![2, 3]);
    assert_eq!(records[0].payload, b"b".to_vec());
    assert!(records.iter().all(|r| r.offset >= 2));
}

#[tokio::test]
async fn test_purge_twice_deletes_nothing_the_second_time() {
    let fixture = setup_repository(&["c1"]);
    let repo = &fixture.repository;
    repo.append_batch("c1", payloads(&["a", "b", "c", "d"])).await.unwrap();

    assert_eq!(repo.purge("c1", 3).await.unwrap(), 2);
    assert_eq!(repo.purge("c1", 3).await.unwrap(), 0);

    let stats = repo.stats("c1").await.unwrap();
    assert_eq!(stats.tail_offset, 3);
    assert_eq!(stats.head_offset, 4);
    assert_eq!(stats.record_count, 2);
}

#[tokio::test]
async fn test_pull_beyond_head_is_empty_not_error() {
    let fixture = setup_repository(&["c1"]);
    let repo = &fixture.repository;
    repo.append_batch("c1", payloads(&["a", "b", "c"])).await.unwrap();

    assert!(repo.read("c1", 100, 10).await.unwrap().is_empty());
    assert!(repo.read("c1", 4, 10).await.unwrap().is_empty());
    assert!(repo.read("c1", 1, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_read_with_unbounded_limit_returns_retained_records() {
    let fixture = setup_repository(&["c1"]);
    let repo = &fixture.repository;
    repo.append_batch("c1", payloads(&["a", "b", "c"])).await.unwrap();

    assert_eq!(offsets(&repo.read("c1", 1, usize::MAX).await.unwrap()), vec![1, 2, 3]);
    assert_eq!(
        offsets(&repo.read("c1", 2, i64::MAX as usize + 5).await.unwrap()),
        vec![2, 3]
    );

    repo.purge("c1", 2).await.unwrap();
    assert_eq!(offsets(&repo.read("c1", 1, usize::MAX).await.unwrap()), vec![2, 3]);
}

#[tokio::test]
async fn test_oversized_collection_id_is_invalid() {
    let fixture = setup_repository(&["c1"]);
    let repo = &fixture.repository;
    let id = "x".repeat(u16::MAX as usize + 1);

    assert!(matches!(
        repo.append(&id, b"a".to_vec()).await,
        Err(Error::Log(LogError::InvalidArgument(_)))
    ));
    assert!(matches!(
        repo.read(&id, 1, 10).await,
        Err(Error::Log(LogError::InvalidArgument(_)))
    ));
    assert!(fixture.store.list_collections().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_collection_is_rejected_without_durable_write() {
    let fixture = setup_repository(&["c1"]);
    let repo = &fixture.repository;

    let err = repo.append("ghost", b"x".to_vec()).await.unwrap_err();
    assert!(matches!(err, Error::Log(LogError::CollectionNotFound(ref id)) if id == "ghost"));

    assert!(fixture.store.list_collections().unwrap().is_empty());
    assert_eq!(fixture.store.stats("ghost").unwrap().head_offset, 0);

    assert!(repo.read("ghost", 1, 10).await.unwrap_err().is_collection_not_found());
    assert!(repo.purge("ghost", 5).await.unwrap_err().is_collection_not_found());
    assert!(repo.stats("ghost").await.unwrap_err().is_collection_not_found());
}

#[tokio::test]
async fn test_empty_batch_and_empty_id_are_invalid() {
    let fixture = setup_repository(&["c1"]);
    let repo = &fixture.repository;

    assert!(matches!(
        repo.append_batch("c1", vec![]).await,
        Err(Error::Log(LogError::InvalidArgument(_)))
    ));
    assert!(matches!(
        repo.read("", 1, 10).await,
        Err(Error::Log(LogError::InvalidArgument(_)))
    ));
}

#[tokio::test]
async fn test_batch_offsets_follow_submission_order() {
    let fixture = setup_repository(&["c1"]);
    let repo = &fixture.repository;
    repo.append("c1", b"first".to_vec()).await.unwrap();

    let batch = payloads(&["p", "q", "r", "s"]);
    let assigned = repo.append_batch("c1", batch.clone()).await.unwrap();
    assert_eq!(assigned, vec![2, 3, 4, 5]);

    let records = repo.read("c1", 2, 10).await.unwrap();
    let bodies: Vec<Vec<u8>> = records.into_iter().map(|r| r.payload).collect();
    assert_eq!(bodies, batch);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_yield_exactly_one_to_n() {
    let fixture = setup_repository(&["c1"]);
    let n = 64;

    let mut handles = Vec::new();
    for i in 0..n {
        let repo = fixture.repository.clone();
        handles.push(tokio::spawn(async move {
            repo.append("c1", format!("r{i}").into_bytes()).await.unwrap()
        }));
    }

    let mut assigned = Vec::new();
    for handle in handles {
        assigned.push(handle.await.unwrap());
    }
    assigned.sort_unstable();
    assert_eq!(assigned, (1..=n as i64).collect::<Vec<_>>());

    let stats = fixture.repository.stats("c1").await.unwrap();
    assert_eq!(stats.head_offset, n as i64);
    assert_eq!(stats.record_count, n as u64);
}

#[tokio::test]
async fn test_deleted_collection_rejects_appends_but_can_be_dropped() {
    let fixture = setup_repository(&["c1"]);
    let repo = &fixture.repository;
    repo.append_batch("c1", payloads(&["a", "b"])).await.unwrap();

    fixture.sysdb.delete_collection("c1");
    assert!(repo.append("c1", b"c".to_vec()).await.unwrap_err().is_collection_not_found());

    assert_eq!(repo.list_collections().unwrap(), vec!["c1".to_string()]);
    assert_eq!(repo.drop_collection("c1").unwrap(), 2);
    assert!(repo.list_collections().unwrap().is_empty());
}

#[tokio::test]
async fn test_sequencing_conflict_is_retried_transparently() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut store = MockLogStore::new();
    let counter = calls.clone();
    store.expect_append().times(3).returning(move |id, payloads, _| {
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(LogError::Conflict(id.to_string()).into())
        } else {
            Ok((1..=payloads.len() as i64).collect())
        }
    });

    let repo = LogRepository::new(
        Arc::new(store),
        Arc::new(LocalSysDb::with_collections(["c1"])),
        fast_policy(5),
    );
    assert_eq!(repo.append_batch("c1", payloads(&["a", "b"])).await.unwrap(), vec![1, 2]);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_persistent_conflict_surfaces_after_policy_is_exhausted() {
    let mut store = MockLogStore::new();
    store
        .expect_append()
        .times(3)
        .returning(|id, _, _| Err(LogError::Conflict(id.to_string()).into()));

    let repo = LogRepository::new(
        Arc::new(store),
        Arc::new(LocalSysDb::with_collections(["c1"])),
        fast_policy(3),
    );
    let err = repo.append("c1", b"a".to_vec()).await.unwrap_err();
    let status: tonic::Status = err.into();
    assert_eq!(status.code(), tonic::Code::Unavailable);
}

#[tokio::test]
async fn test_store_failure_is_not_retried_on_request_path() {
    let mut store = MockLogStore::new();
    store
        .expect_append()
        .times(1)
        .returning(|_, _, _| Err(StorageError::DbError("disk gone".into()).into()));

    let repo = LogRepository::new(
        Arc::new(store),
        Arc::new(LocalSysDb::with_collections(["c1"])),
        fast_policy(5),
    );
    let err = repo.append("c1", b"a".to_vec()).await.unwrap_err();
    assert!(err.is_retryable());
}
