use std::time::Duration;

use super::*;
use crate::test_utils::setup_lease_store;

const KEY: &str = "leader";

#[tokio::test]
async fn test_acquire_is_exclusive_while_lease_is_live() {
    let (store, _dir) = setup_lease_store();

    let token = store.try_acquire(KEY, "a", Duration::from_secs(10)).await.unwrap().unwrap();
    assert_eq!(token.epoch, 1);
    assert_eq!(token.holder, "a");

    assert!(store.try_acquire(KEY, "b", Duration::from_secs(10)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_expired_lease_can_be_taken_over_with_higher_epoch() {
    let (store, _dir) = setup_lease_store();

    let first = store.try_acquire(KEY, "a", Duration::from_millis(30)).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    let second = store.try_acquire(KEY, "b", Duration::from_secs(10)).await.unwrap().unwrap();
    assert!(second.epoch > first.epoch);

    // The previous holder can no longer renew
    assert!(!store.renew(&first, Duration::from_secs(10)).await.unwrap());
    assert!(store.renew(&second, Duration::from_secs(10)).await.unwrap());
}

#[tokio::test]
async fn test_renew_extends_the_lease() {
    let (store, _dir) = setup_lease_store();

    let token = store.try_acquire(KEY, "a", Duration::from_millis(80)).await.unwrap().unwrap();
    for _ in 0..4 {
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.renew(&token, Duration::from_millis(80)).await.unwrap());
    }
    assert!(store.try_acquire(KEY, "b", Duration::from_secs(1)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_release_frees_the_lease_immediately() {
    let (store, _dir) = setup_lease_store();

    let token = store.try_acquire(KEY, "a", Duration::from_secs(60)).await.unwrap().unwrap();
    store.release(&token).await.unwrap();

    let next = store.try_acquire(KEY, "b", Duration::from_secs(60)).await.unwrap().unwrap();
    assert_eq!(next.epoch, token.epoch + 1);

    // A stale release does not touch the new holder's lease
    store.release(&token).await.unwrap();
    assert!(store.renew(&next, Duration::from_secs(60)).await.unwrap());
    assert!(!store.renew(&token, Duration::from_secs(60)).await.unwrap());
}

#[tokio::test]
async fn test_unknown_lease_cannot_be_renewed() {
    let (store, _dir) = setup_lease_store();
    let token = LeaseToken {
        key: KEY.to_string(),
        holder: "a".to_string(),
        epoch: 1,
    };
    assert!(!store.renew(&token, Duration::from_secs(1)).await.unwrap());
    store.release(&token).await.unwrap();
}
