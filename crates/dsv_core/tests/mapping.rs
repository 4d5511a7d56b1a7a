//! Option mapping engine end to end against the memory store.

mod common;

use std::sync::Arc;

use common::*;
use dsv_core::memory::MemoryStore;
use dsv_core::mapping::classifier::GroupingMappingStatus;
use dsv_core::mapping::types::{GroupingRef, ManualDecision, MappingType};
use dsv_core::ports::MappingStore;
use dsv_core::{ChangeKind, DataSetVersionService, DataSetVersionStatus, DsvError, SemVersion};

fn option_id(meta: &dsv_core::meta::VersionMeta, label: &str) -> uuid::Uuid {
    meta.filters[0]
        .options
        .iter()
        .find(|o| o.label == label)
        .map(|o| o.id)
        .unwrap()
}

#[tokio::test]
async fn school_type_rename_and_addition() {
    let (store, service) = memory_service();
    let source_meta = school_type_meta(&["Primary", "Secondary", "Total"]);
    let target_meta = school_type_meta(&["Primary", "Secondary", "All schools", "Special"]);
    let (ds, source) = published_first(&service, source_meta.clone()).await;

    let draft = service
        .create_draft(ds.id, with_meta(target_meta.clone()))
        .await
        .unwrap();
    service.start_mapping(draft.id).await.unwrap();

    let report = service.mapping_report(draft.id).await.unwrap();
    assert_eq!(report.source_version_id, source.id);
    let school_type = &report.filters[0];
    assert_eq!(school_type.status, GroupingMappingStatus::Partial);

    let by_label = |label: &str| {
        school_type
            .options
            .iter()
            .find(|o| o.source_key.label == label)
            .unwrap()
    };
    assert_eq!(by_label("Primary").mapping_type, MappingType::AutoMapped);
    assert_eq!(
        by_label("Primary").target_option_id,
        Some(option_id(&target_meta, "Primary"))
    );
    assert_eq!(by_label("Secondary").mapping_type, MappingType::AutoMapped);
    assert_eq!(by_label("Total").mapping_type, MappingType::AutoNone);
    assert_eq!(by_label("Total").target_option_id, None);

    // Mapping runs source -> target only: "Special" gets no inbound row.
    let rows = store.list_mappings(draft.id).await.unwrap();
    assert_eq!(rows.len(), 4);
    let special = option_id(&target_meta, "Special");
    assert!(rows.iter().all(|r| r.source_option_id != special));
    assert!(rows.iter().all(|r| r.target_option_id != Some(special)));

    // England matched on label and code.
    assert_eq!(report.locations[0].status, GroupingMappingStatus::AutoMapped);

    // Operator maps Total onto its renamed successor.
    let total = option_id(&source_meta, "Total");
    let all_schools = option_id(&target_meta, "All schools");
    let updated = service
        .update_option_mapping(draft.id, total, ManualDecision::MapTo(all_schools))
        .await
        .unwrap();
    assert_eq!(updated.mapping_type, MappingType::ManualMapped);
    assert_eq!(updated.target_option_id, Some(all_schools));

    let completed = service.complete_mapping(draft.id).await.unwrap();
    assert_eq!(completed.completion.change_kind, ChangeKind::Additive);
    assert_eq!(completed.version.version, SemVersion::new(1, 1, 0));
    assert!(completed.completion.summary.finalized);
    assert_eq!(completed.completion.summary.manual_mapped, 1);

    // Public ids carry over to mapped target options; new options keep theirs.
    let stored = service.get_meta(draft.id).await.unwrap();
    let public_id = |meta: &dsv_core::meta::VersionMeta, label: &str| {
        meta.filters[0]
            .options
            .iter()
            .find(|o| o.label == label)
            .map(|o| o.public_id.clone())
            .unwrap()
    };
    assert_eq!(public_id(&stored, "All schools"), public_id(&source_meta, "Total"));
    assert_eq!(public_id(&stored, "Primary"), public_id(&source_meta, "Primary"));
    assert_eq!(public_id(&stored, "Special"), public_id(&target_meta, "Special"));
    assert_eq!(
        stored.locations[0].options[0].public_id,
        source_meta.locations[0].options[0].public_id
    );
}

#[tokio::test]
async fn completion_can_be_retried_after_losing_the_status_write() {
    let store = Arc::new(MemoryStore::new());
    let racing = Arc::new(RacingVersions::new(store.clone()));
    let service = DataSetVersionService::new(racing.stores(), fast_config(1000, 3));
    let source_meta = school_type_meta(&["Primary", "Total"]);
    let (ds, _) = published_first(&service, source_meta.clone()).await;
    let draft = service
        .create_draft(ds.id, with_meta(school_type_meta(&["Primary", "Total"])))
        .await
        .unwrap();
    service.start_mapping(draft.id).await.unwrap();

    racing.lose_next_write_to(DataSetVersionStatus::Processing);
    let err = service.complete_mapping(draft.id).await.unwrap_err();
    assert!(matches!(err, DsvError::Conflict(_)), "{err:?}");
    assert_eq!(
        service.get_version(draft.id).await.unwrap().status,
        DataSetVersionStatus::Mapping
    );
    assert!(store.is_finalized(draft.id).await.unwrap());

    let completed = service.complete_mapping(draft.id).await.unwrap();
    assert_eq!(completed.version.status, DataSetVersionStatus::Processing);
    assert!(completed.completion.summary.finalized);
    assert_eq!(completed.completion.summary.unresolved, 0);
    let stored = service.get_meta(draft.id).await.unwrap();
    assert_eq!(
        stored.filters[0].options[0].public_id,
        source_meta.filters[0].options[0].public_id
    );

    // Once processing, completion is no longer available.
    assert!(matches!(
        service.complete_mapping(draft.id).await,
        Err(DsvError::Conflict(_))
    ));
}

#[tokio::test]
async fn removed_option_makes_the_draft_a_major_version() {
    let (_, service) = memory_service();
    let (ds, _) = published_first(&service, school_type_meta(&["Primary", "Total"])).await;
    let draft = service
        .create_draft(ds.id, with_meta(school_type_meta(&["Primary", "All schools"])))
        .await
        .unwrap();
    service.start_mapping(draft.id).await.unwrap();

    let completed = service.complete_mapping(draft.id).await.unwrap();
    assert_eq!(completed.completion.change_kind, ChangeKind::Breaking);
    assert_eq!(completed.version.version, SemVersion::new(2, 0, 0));
    assert_eq!(completed.version.status, DataSetVersionStatus::Processing);
}

#[tokio::test]
async fn unresolved_rows_block_completion_until_decided() {
    let (_, service) = memory_service();
    let source_meta = school_type_meta(&["Primary", "Total"]);
    let (ds, _) = published_first(&service, source_meta.clone()).await;
    let target_meta = school_type_meta(&["Primary", "Total", "Total"]);
    let draft = service
        .create_draft(ds.id, with_meta(target_meta.clone()))
        .await
        .unwrap();

    let built = service.start_mapping(draft.id).await.unwrap();
    assert_eq!(built.unresolved, 1);

    let report = service.mapping_report(draft.id).await.unwrap();
    let total = report.filters[0]
        .options
        .iter()
        .find(|o| o.mapping_type == MappingType::Unresolved)
        .unwrap();
    assert_eq!(total.candidates.len(), 2);
    assert!(!report.meta_summary.complete);

    let err = service.complete_mapping(draft.id).await.unwrap_err();
    assert!(matches!(err, DsvError::IncompleteMapping { unresolved: 1 }));
    assert_eq!(
        service.get_version(draft.id).await.unwrap().status,
        DataSetVersionStatus::Mapping
    );

    service
        .update_option_mapping(
            draft.id,
            total.source_option_id,
            ManualDecision::MapTo(total.candidates[1]),
        )
        .await
        .unwrap();

    service.complete_mapping(draft.id).await.unwrap();
    let again = service.complete_mapping(draft.id).await.unwrap_err();
    assert!(matches!(again, DsvError::Conflict(_)));
}

#[tokio::test]
async fn manual_decision_must_target_same_grouping() {
    let (_, service) = memory_service();
    let source_meta = school_type_meta(&["Primary", "Total"]);
    let (ds, _) = published_first(&service, source_meta.clone()).await;
    let target_meta = school_type_meta(&["Primary", "All schools"]);
    let draft = service
        .create_draft(ds.id, with_meta(target_meta.clone()))
        .await
        .unwrap();
    service.start_mapping(draft.id).await.unwrap();

    let total = option_id(&source_meta, "Total");
    let england = target_meta.locations[0].options[0].id;

    let err = service
        .update_option_mapping(draft.id, total, ManualDecision::MapTo(england))
        .await
        .unwrap_err();
    assert!(matches!(err, DsvError::Integrity(_)));

    let err = service
        .update_option_mapping(draft.id, total, ManualDecision::MapTo(uuid::Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, DsvError::Integrity(_)));

    let none = service
        .update_option_mapping(draft.id, total, ManualDecision::NoMapping)
        .await
        .unwrap();
    assert_eq!(none.mapping_type, MappingType::ManualNone);
    assert_eq!(none.grouping, GroupingRef::Filter("school_type".into()));

    let err = service
        .update_option_mapping(draft.id, uuid::Uuid::new_v4(), ManualDecision::NoMapping)
        .await
        .unwrap_err();
    assert!(matches!(err, DsvError::NotFound(_)));
}

#[tokio::test]
async fn decisions_are_rejected_outside_mapping() {
    let (_, service) = memory_service();
    let source_meta = school_type_meta(&["Primary"]);
    let (ds, _) = published_first(&service, source_meta.clone()).await;
    let draft = service
        .create_draft(ds.id, with_meta(school_type_meta(&["Primary"])))
        .await
        .unwrap();
    service.start_mapping(draft.id).await.unwrap();
    service.complete_mapping(draft.id).await.unwrap();

    let err = service
        .update_option_mapping(
            draft.id,
            option_id(&source_meta, "Primary"),
            ManualDecision::NoMapping,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DsvError::Conflict(_)));
}

#[tokio::test]
async fn dropped_filter_propagates_auto_none_and_is_breaking() {
    let (_, service) = memory_service();
    let mut source_meta = school_type_meta(&["Primary"]);
    source_meta.filters.push(filter("sex", &["Boys", "Girls"]));
    let (ds, _) = published_first(&service, source_meta).await;

    let draft = service
        .create_draft(ds.id, with_meta(school_type_meta(&["Primary"])))
        .await
        .unwrap();
    service.start_mapping(draft.id).await.unwrap();

    let report = service.mapping_report(draft.id).await.unwrap();
    let sex = report.filters.iter().find(|f| f.column == "sex").unwrap();
    assert_eq!(sex.target_filter_id, None);
    assert_eq!(sex.status, GroupingMappingStatus::Partial);
    assert!(sex
        .options
        .iter()
        .all(|o| o.mapping_type == MappingType::AutoNone));
    assert_eq!(report.meta_summary.change_kind, ChangeKind::Breaking);
}
