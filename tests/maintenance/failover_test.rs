use std::sync::Arc;
use std::time::Duration;

use log_service::init_sled_lease_db;
use log_service::init_sled_log_db;
use log_service::LocalSysDb;
use log_service::SledLeaseStore;
use log_service::SledLogStore;

use crate::common::push;
use crate::common::start_node;
use crate::common::test_config;
use crate::common::wait_until;
use crate::common::Shared;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_leadership_fails_over_after_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let shared = Shared {
        sysdb: Some(Arc::new(LocalSysDb::with_collections(["it-f1"]))),
        log_store: Some(Arc::new(
            SledLogStore::new(init_sled_log_db(dir.path().join("shared")).unwrap(), false).unwrap(),
        )),
        lease_store: Some(Arc::new(
            SledLeaseStore::new(init_sled_lease_db(dir.path().join("shared")).unwrap()).unwrap(),
        )),
    };

    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let mut config_a = test_config(&dir_a);
    config_a.server.instance_id = "node-a".to_string();
    let mut config_b = test_config(&dir_b);
    config_b.server.instance_id = "node-b".to_string();

    let a = start_node(config_a, shared.clone()).await;
    let b = start_node(config_b, shared).await;

    wait_until(|| a.node.election_state().is_leader() || b.node.election_state().is_leader()).await;
    // Sample for a while: never two leaders at once
    for _ in 0..50 {
        assert!(!(a.node.election_state().is_leader() && b.node.election_state().is_leader()));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Both instances accept writes regardless of leadership
    let mut client_a = a.client().await;
    let mut client_b = b.client().await;
    assert_eq!(push(&mut client_a, "it-f1", &["x"]).await.unwrap(), vec![1]);
    assert_eq!(push(&mut client_b, "it-f1", &["y"]).await.unwrap(), vec![2]);

    let (leader, follower) = if a.node.election_state().is_leader() { (a, b) } else { (b, a) };
    leader.shutdown().await;

    let survivor = follower.node.clone();
    wait_until(|| survivor.election_state().is_leader()).await;
    follower.shutdown().await;
}
