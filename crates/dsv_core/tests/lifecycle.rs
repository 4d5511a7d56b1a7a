//! Version state machine, deletion and public visibility against the memory store.

mod common;

use std::sync::Arc;

use common::*;
use dsv_core::mapping::types::{GroupingRef, MappingType, OptionMapping};
use dsv_core::memory::MemoryStore;
use dsv_core::ports::{MappingStore, SnapshotStore, VersionStore};
use dsv_core::public::PublicVersionReader;
use dsv_core::{
    CreateDraftRequest, DataSetVersionService, DataSetVersionStatus, DsvError, SemVersion,
    Stores,
};
use uuid::Uuid;

use DataSetVersionStatus as S;

#[tokio::test]
async fn first_version_skips_mapping_and_successor_is_mapped() {
    let (_, service) = memory_service();
    let (ds, first) = published_first(&service, school_type_meta(&["Primary", "Secondary"])).await;
    assert_eq!(first.version, SemVersion::INITIAL);
    assert_eq!(first.status, S::Published);
    assert!(first.published_at.is_some());
    assert_eq!(first.predecessor_id, None);

    let next = service
        .create_draft(ds.id, with_meta(school_type_meta(&["Primary", "Secondary", "Special"])))
        .await
        .unwrap();
    assert_eq!(next.version, SemVersion::new(1, 1, 0));

    // A successor may not bypass mapping.
    let err = service.start_processing(next.id).await.unwrap_err();
    assert!(matches!(err, DsvError::Conflict(_)));

    let result = service.start_mapping(next.id).await.unwrap();
    assert!(result.batches.is_completed());

    let completed = service.complete_mapping(next.id).await.unwrap();
    assert_eq!(completed.version.status, S::Processing);

    let published = service.publish(next.id).await.unwrap();
    assert_eq!(published.predecessor_id, Some(first.id));

    // Publishing the successor does not touch the predecessor's status.
    let first = service.get_version(first.id).await.unwrap();
    assert_eq!(first.status, S::Published);

    assert_eq!(service.deprecate(first.id).await.unwrap().status, S::Deprecated);
    assert_eq!(service.withdraw(first.id).await.unwrap().status, S::Withdrawn);
}

#[tokio::test]
async fn only_one_version_in_flight_per_data_set() {
    let (_, service) = memory_service();
    let ds = service.create_data_set("Attendance", None).await.unwrap();
    let draft = service
        .create_draft(ds.id, CreateDraftRequest::default())
        .await
        .unwrap();

    let err = service
        .create_draft(ds.id, CreateDraftRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DsvError::Conflict(_)));

    service.cancel(draft.id).await.unwrap();
    let second = service
        .create_draft(ds.id, CreateDraftRequest::default())
        .await
        .unwrap();
    assert!(second.version > draft.version);
}

#[tokio::test]
async fn start_mapping_requires_published_predecessor() {
    let (_, service) = memory_service();
    let ds = service.create_data_set("Workforce", None).await.unwrap();
    let draft = service
        .create_draft(ds.id, with_meta(school_type_meta(&["Primary"])))
        .await
        .unwrap();
    let err = service.start_mapping(draft.id).await.unwrap_err();
    assert!(matches!(err, DsvError::Validation(_)));
    assert_eq!(service.get_version(draft.id).await.unwrap().status, S::Draft);
}

/// Drive every (status, target) pair outside the edge set and check it is
/// rejected with `Conflict` and the persisted status is unchanged.
#[tokio::test]
async fn illegal_transitions_are_conflicts_and_leave_status() {
    let targets = [
        S::Mapping,
        S::Processing,
        S::Published,
        S::Deprecated,
        S::Withdrawn,
        S::Failed,
        S::Cancelled,
    ];

    for from in S::ALL {
        for to in targets {
            if from.can_transition_to(to) {
                continue;
            }
            let (store, service) = memory_service();
            let version = version_in(&store, from).await;

            let attempts: Vec<Result<_, DsvError>> = match to {
                S::Mapping => vec![service.begin_mapping(version.id).await],
                S::Processing => vec![
                    service.start_processing(version.id).await,
                    service
                        .complete_mapping(version.id)
                        .await
                        .map(|c| c.version),
                ],
                S::Published => vec![service.publish(version.id).await],
                S::Deprecated => vec![service.deprecate(version.id).await],
                S::Withdrawn => vec![service.withdraw(version.id).await],
                S::Failed => vec![service.fail(version.id, "boom").await],
                S::Cancelled => vec![service.cancel(version.id).await],
                S::Draft => unreachable!(),
            };

            for attempt in attempts {
                match attempt {
                    Err(DsvError::Conflict(_)) => {}
                    other => panic!("{from} -> {to}: expected Conflict, got {other:?}"),
                }
            }
            let stored = store.get_version(version.id).await.unwrap();
            assert_eq!(stored.status, from, "{from} -> {to} changed status");
            assert_eq!(stored.concurrency_token, version.concurrency_token);
        }
    }
}

#[tokio::test]
async fn stale_writer_loses_the_race() {
    let (store, service) = memory_service();
    let ds = service.create_data_set("Exclusions", None).await.unwrap();
    let draft = service
        .create_draft(ds.id, CreateDraftRequest::default())
        .await
        .unwrap();

    // A background step read the draft, then an operator cancelled it.
    let stale = store.get_version(draft.id).await.unwrap();
    service.cancel(draft.id).await.unwrap();

    let mut late = stale.clone();
    late.status = S::Processing;
    let err = store
        .update_version(&late, stale.concurrency_token)
        .await
        .unwrap_err();
    assert!(matches!(err, DsvError::Conflict(_)));
    assert_eq!(service.get_version(draft.id).await.unwrap().status, S::Cancelled);
}

#[tokio::test]
async fn failed_version_keeps_diagnostic_and_stays_private() {
    let (store, service) = memory_service();
    let version = version_in(&store, S::Processing).await;
    let failed = service
        .fail(version.id, "parquet conversion crashed")
        .await
        .unwrap();
    assert_eq!(failed.status, S::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("parquet conversion crashed"));

    let reader = PublicVersionReader::new(&Stores::from_backend(store.clone()));
    let err = reader
        .get_version(version.data_set_id, "1.0.0")
        .await
        .unwrap_err();
    assert!(matches!(err, DsvError::NotFound(_)));
}

#[tokio::test]
async fn mutation_only_while_draft_or_mapping() {
    let (store, service) = memory_service();
    for status in S::ALL {
        let version = version_in(&store, status).await;
        let result = service
            .update_notes(version.id, Some("corrected".into()))
            .await;
        if status.is_mutable() {
            assert_eq!(result.unwrap().notes.as_deref(), Some("corrected"));
        } else {
            assert!(matches!(result, Err(DsvError::Conflict(_))), "{status}");
        }
    }
}

// ── Deletion ───────────────────────────────────────────────────

#[tokio::test]
async fn delete_matrix_cascades_or_forbids() {
    for status in S::ALL {
        let (store, service) = memory_service();
        let version = version_in(&store, status).await;

        store
            .insert_meta(version.id, &school_type_meta(&["Primary"]))
            .await
            .unwrap();
        let row = OptionMapping {
            source_version_id: Uuid::new_v4(),
            source_option_id: Uuid::new_v4(),
            target_version_id: version.id,
            target_option_id: None,
            grouping: GroupingRef::Filter("school_type".into()),
            mapping_type: MappingType::AutoNone,
        };
        store
            .insert_mapping_batch(version.id, 1, std::slice::from_ref(&row))
            .await
            .unwrap();

        let result = service.delete_version(version.id).await;
        match status {
            S::Draft | S::Mapping | S::Cancelled | S::Failed => {
                result.unwrap();
                assert!(matches!(
                    store.get_version(version.id).await,
                    Err(DsvError::NotFound(_))
                ));
                assert!(store.list_mappings(version.id).await.unwrap().is_empty());
                assert!(matches!(
                    store.get_meta(version.id).await,
                    Err(DsvError::NotFound(_))
                ));
            }
            S::Processing | S::Published | S::Deprecated | S::Withdrawn => {
                match result {
                    Err(DsvError::DeletionForbidden { status: s }) => assert_eq!(s, status),
                    other => panic!("{status}: expected DeletionForbidden, got {other:?}"),
                }
                assert_eq!(store.get_version(version.id).await.unwrap().status, status);
                assert_eq!(store.list_mappings(version.id).await.unwrap().len(), 1);
            }
        }
    }
}

#[tokio::test]
async fn deleting_a_draft_releases_its_number() {
    let (_, service) = memory_service();
    let (ds, _) = published_first(&service, school_type_meta(&["Primary"])).await;
    let draft = service
        .create_draft(ds.id, CreateDraftRequest::default())
        .await
        .unwrap();
    assert_eq!(draft.version, SemVersion::new(1, 1, 0));

    service.delete_version(draft.id).await.unwrap();
    let again = service
        .create_draft(ds.id, CreateDraftRequest::default())
        .await
        .unwrap();
    assert_eq!(again.version, SemVersion::new(1, 1, 0));
}

#[tokio::test]
async fn delete_loses_to_a_concurrent_transition() {
    let store = Arc::new(MemoryStore::new());
    let racing = Arc::new(RacingVersions::new(store.clone()));
    let service = DataSetVersionService::new(racing.stores(), fast_config(1000, 3));
    let (ds, _) = published_first(&service, school_type_meta(&["Primary"])).await;
    let draft = service
        .create_draft(ds.id, with_meta(school_type_meta(&["Primary"])))
        .await
        .unwrap();
    service.start_mapping(draft.id).await.unwrap();

    // The guard passes on Mapping, then completion moves the version on.
    racing.move_before_next_delete(S::Processing);
    let err = service.delete_version(draft.id).await.unwrap_err();
    assert!(matches!(err, DsvError::Conflict(_)), "{err:?}");

    let kept = store.get_version(draft.id).await.unwrap();
    assert_eq!(kept.status, S::Processing);
    assert!(store.get_meta(draft.id).await.is_ok());
    assert_eq!(store.list_mappings(draft.id).await.unwrap().len(), 2);
    assert!(matches!(
        service.delete_version(draft.id).await,
        Err(DsvError::DeletionForbidden {
            status: S::Processing
        })
    ));
}

// ── Public read path ───────────────────────────────────────────

#[tokio::test]
async fn public_read_path_shows_only_public_statuses() {
    let (store, _) = memory_service();
    let reader = PublicVersionReader::new(&Stores::from_backend(store.clone()));

    for status in S::ALL {
        let version = version_in(&store, status).await;
        let found = reader.get_version(version.data_set_id, " v1.0 ").await;
        let listed = reader.list_versions(version.data_set_id).await.unwrap();

        match status {
            S::Published | S::Deprecated | S::Withdrawn => {
                let public = found.unwrap();
                assert_eq!(public.id, version.id);
                assert_eq!(public.version, "1.0.0");
                assert_eq!(listed.len(), 1);
            }
            S::Draft | S::Mapping | S::Processing | S::Failed | S::Cancelled => {
                assert!(
                    matches!(found, Err(DsvError::NotFound(_))),
                    "{status} leaked to public read path"
                );
                assert!(listed.is_empty());
            }
        }
    }
}

#[tokio::test]
async fn public_lookup_rejects_malformed_version() {
    let (store, _) = memory_service();
    let reader = PublicVersionReader::new(&Stores::from_backend(store));
    let err = reader
        .get_version(Uuid::new_v4(), "one.two")
        .await
        .unwrap_err();
    assert!(matches!(err, DsvError::Validation(_)));
}
