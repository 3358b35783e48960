//! Session-scoped identity map: one managed instance per identity, and what
//! clear does to it.

mod common;

use common::{date, session, store, JobHistory, Team};
use seam_orm::{OrmError, PrimaryKey};
use std::sync::Arc;

#[tokio::test]
async fn test_repeated_find_returns_the_same_instance() {
    let registry = common::registry();
    let store = store(&registry);

    let key;
    {
        let mut uow = session(&registry, &store);
        let team = uow.persist(Team::new("engineering")).await.unwrap();
        uow.flush().await.unwrap();
        key = PrimaryKey::single(team.id.unwrap());
    }

    let mut uow = session(&registry, &store);
    let before = store.round_trips();
    let first = uow.find::<Team>(&key).await.unwrap().unwrap();
    let second = uow.find::<Team>(&key).await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    // the second find is an identity-map hit
    assert_eq!(store.round_trips(), before + 1);
}

#[tokio::test]
async fn test_persisted_entity_is_immediately_findable() {
    let registry = common::registry();
    let store = store(&registry);

    let mut uow = session(&registry, &store);
    let team = uow.persist(Team::new("engineering")).await.unwrap();
    let key = PrimaryKey::single(team.id.unwrap());

    let before = store.round_trips();
    let found = uow.find::<Team>(&key).await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&team, &found));
    assert_eq!(store.round_trips(), before);
}

#[tokio::test]
async fn test_persisting_an_identity_twice_is_rejected() {
    let registry = common::registry();
    let store = store(&registry);

    let mut uow = session(&registry, &store);
    let job = JobHistory {
        employee_id: 7,
        start_date: date(2021, 1, 1),
        end_date: None,
        department_id: None,
    };
    uow.persist(job.clone()).await.unwrap();
    let err = uow.persist(job).await.unwrap_err();
    assert!(matches!(err, OrmError::DuplicateIdentity(_)));
}

#[tokio::test]
async fn test_removed_entity_is_not_found() {
    let registry = common::registry();
    let store = store(&registry);

    let key;
    {
        let mut uow = session(&registry, &store);
        let team = uow.persist(Team::new("engineering")).await.unwrap();
        uow.flush().await.unwrap();
        key = PrimaryKey::single(team.id.unwrap());
    }

    let mut uow = session(&registry, &store);
    let team = uow.find::<Team>(&key).await.unwrap().unwrap();
    uow.remove(team.as_ref()).unwrap();
    assert!(uow.find::<Team>(&key).await.unwrap().is_none());
    uow.flush().await.unwrap();

    let mut uow = session(&registry, &store);
    assert!(uow.find::<Team>(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_remove_of_unflushed_insert_cancels_both() {
    let registry = common::registry();
    let store = store(&registry);

    let mut uow = session(&registry, &store);
    let team = uow.persist(Team::new("short-lived")).await.unwrap();
    let key = PrimaryKey::single(team.id.unwrap());
    uow.remove(team.as_ref()).unwrap();
    assert_eq!(uow.pending_ops(), 0);
    uow.flush().await.unwrap();

    let mut uow = session(&registry, &store);
    assert!(uow.find::<Team>(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_clear_detaches_and_drops_unflushed_work() {
    let registry = common::registry();
    let store = store(&registry);

    let committed_key;
    {
        let mut uow = session(&registry, &store);
        let team = uow.persist(Team::new("engineering")).await.unwrap();
        uow.flush().await.unwrap();
        committed_key = PrimaryKey::single(team.id.unwrap());
    }

    let mut uow = session(&registry, &store);
    let before_clear = uow.find::<Team>(&committed_key).await.unwrap().unwrap();

    let doomed = uow.persist(Team::new("never-written")).await.unwrap();
    let doomed_key = PrimaryKey::single(doomed.id.unwrap());
    assert_eq!(uow.pending_ops(), 1);

    uow.clear();
    assert_eq!(uow.pending_ops(), 0);
    uow.flush().await.unwrap();

    // the committed entity re-hydrates as a fresh instance
    let before = store.round_trips();
    let after_clear = uow.find::<Team>(&committed_key).await.unwrap().unwrap();
    assert!(!Arc::ptr_eq(&before_clear, &after_clear));
    assert_eq!(store.round_trips(), before + 1);

    // the unflushed insert never reached the store
    assert!(uow.find::<Team>(&doomed_key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_coalesced_updates_write_once() {
    let registry = common::registry();
    let store = store(&registry);

    let key;
    {
        let mut uow = session(&registry, &store);
        let team = uow.persist(Team::new("v1")).await.unwrap();
        uow.flush().await.unwrap();
        key = PrimaryKey::single(team.id.unwrap());
    }

    let mut uow = session(&registry, &store);
    let team = uow.find::<Team>(&key).await.unwrap().unwrap();

    let mut v2 = team.as_ref().clone();
    v2.name = "v2".to_string();
    uow.update(v2).unwrap();
    let mut v3 = team.as_ref().clone();
    v3.name = "v3".to_string();
    let latest = uow.update(v3).unwrap();
    assert_eq!(uow.pending_ops(), 1);

    // the managed instance tracks the latest state
    let found = uow.find::<Team>(&key).await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&latest, &found));
    uow.flush().await.unwrap();

    let mut uow = session(&registry, &store);
    let team = uow.find::<Team>(&key).await.unwrap().unwrap();
    assert_eq!(team.name, "v3");
}
