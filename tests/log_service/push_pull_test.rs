use std::sync::Arc;

use log_service::gather_metrics_text;
use log_service::LocalSysDb;
use tonic::Code;

use crate::common::pull;
use crate::common::push;
use crate::common::scout;
use crate::common::start_node;
use crate::common::test_config;
use crate::common::Shared;

fn registry(collections: &[&str]) -> Shared {
    Shared {
        sysdb: Some(Arc::new(LocalSysDb::with_collections(collections.iter().copied()))),
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_push_pull_round_trip_over_grpc() {
    crate::enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let node = start_node(test_config(&dir), registry(&["it-c1"])).await;
    let mut client = node.client().await;

    assert_eq!(push(&mut client, "it-c1", &["a", "b", "c"]).await.unwrap(), vec![1, 2, 3]);
    assert_eq!(push(&mut client, "it-c1", &["d"]).await.unwrap(), vec![4]);

    assert_eq!(
        pull(&mut client, "it-c1", 1, 10).await.unwrap(),
        vec![
            (1, "a".to_string()),
            (2, "b".to_string()),
            (3, "c".to_string()),
            (4, "d".to_string())
        ]
    );
    assert_eq!(pull(&mut client, "it-c1", 3, 1).await.unwrap(), vec![(3, "c".to_string())]);
    assert!(pull(&mut client, "it-c1", 100, 10).await.unwrap().is_empty());

    let window = scout(&mut client, "it-c1").await.unwrap();
    assert_eq!((window.first_offset, window.first_uninserted_offset), (1, 5));

    assert!(gather_metrics_text().contains("log_pushed_records_total"));
    node.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_error_statuses_over_grpc() {
    let dir = tempfile::tempdir().unwrap();
    let node = start_node(test_config(&dir), registry(&["it-c2"])).await;
    let mut client = node.client().await;

    let status = push(&mut client, "ghost", &["x"]).await.unwrap_err();
    assert_eq!(status.code(), Code::NotFound);

    let status = push(&mut client, "it-c2", &[]).await.unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    let status = pull(&mut client, "ghost", 1, 10).await.unwrap_err();
    assert_eq!(status.code(), Code::NotFound);

    let status = scout(&mut client, "ghost").await.unwrap_err();
    assert_eq!(status.code(), Code::NotFound);

    node.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_get_gap_free_offsets() {
    let dir = tempfile::tempdir().unwrap();
    let node = start_node(test_config(&dir), registry(&["it-c3"])).await;

    let mut handles = Vec::new();
    for i in 0..16 {
        let mut client = node.client().await;
        handles.push(tokio::spawn(async move {
            let item = format!("p{i}");
            push(&mut client, "it-c3", &[item.as_str(), item.as_str()]).await.unwrap()
        }));
    }

    let mut offsets = Vec::new();
    for handle in handles {
        let batch = handle.await.unwrap();
        // A batch is one contiguous run
        assert_eq!(batch[1], batch[0] + 1);
        offsets.extend(batch);
    }
    offsets.sort_unstable();
    assert_eq!(offsets, (1..=32).collect::<Vec<i64>>());

    node.shutdown().await;
}
