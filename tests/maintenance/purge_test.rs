use std::sync::Arc;
use std::time::Duration;

use log_service::LocalSysDb;

use crate::common::pull;
use crate::common::push;
use crate::common::scout;
use crate::common::start_node;
use crate::common::test_config;
use crate::common::wait_until;
use crate::common::Shared;
use crate::common::WAIT_FOR_NODE_READY_IN_SEC;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_leader_purges_behind_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let sysdb = Arc::new(LocalSysDb::with_collections(["it-p1"]));
    let node = start_node(
        test_config(&dir),
        Shared {
            sysdb: Some(sysdb.clone()),
            ..Default::default()
        },
    )
    .await;
    let mut client = node.client().await;

    push(&mut client, "it-p1", &["a", "b", "c", "d", "e"]).await.unwrap();
    // Downstream consumed offsets 1..=3, so 4 is the oldest still needed
    sysdb.advance_log_position("it-p1", 3).unwrap();

    tokio::time::timeout(Duration::from_secs(WAIT_FOR_NODE_READY_IN_SEC), async {
        loop {
            if scout(&mut client, "it-p1").await.unwrap().first_offset == 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("purge did not reach the checkpoint");

    assert_eq!(
        pull(&mut client, "it-p1", 1, 10).await.unwrap(),
        vec![(4, "d".to_string()), (5, "e".to_string())]
    );
    // Offsets keep growing from the head, not from the tail
    assert_eq!(push(&mut client, "it-p1", &["f"]).await.unwrap(), vec![6]);

    node.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_logs_of_deleted_collections_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let sysdb = Arc::new(LocalSysDb::with_collections(["it-p2", "it-p3"]));
    let node = start_node(
        test_config(&dir),
        Shared {
            sysdb: Some(sysdb.clone()),
            ..Default::default()
        },
    )
    .await;
    let mut client = node.client().await;

    push(&mut client, "it-p2", &["a"]).await.unwrap();
    push(&mut client, "it-p3", &["b"]).await.unwrap();
    assert!(sysdb.delete_collection("it-p2"));

    let repository = node.node.repository().clone();
    wait_until(|| {
        let ids = repository.list_collections().unwrap();
        !ids.contains(&"it-p2".to_string())
    })
    .await;
    assert!(repository.list_collections().unwrap().contains(&"it-p3".to_string()));

    node.shutdown().await;
}
