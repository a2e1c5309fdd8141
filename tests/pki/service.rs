use std::time::Duration as StdDuration;

use certforge::domain::{CertificateId, OwnerId};
use certforge::notify::{IssuanceEvent, EVENT_FAILED, EVENT_ISSUED};
use certforge::services::{ISSUANCE_SUBMITTED, UPLOAD_ACCEPTED};
use certforge::storage::{BlobStore, CertificateSource};
use certforge::Error;
use chrono::Duration;
use tokio::sync::broadcast::error::TryRecvError;

use super::support::{example_request, same_day, TestService, TEST_TOPIC};

async fn next_event(harness: &mut TestService) -> IssuanceEvent {
    let message = tokio::time::timeout(StdDuration::from_secs(60), harness.events.recv())
        .await
        .expect("event within timeout")
        .expect("event channel open");
    assert_eq!(message.topic, TEST_TOPIC);
    serde_json::from_slice(&message.payload).expect("event payload")
}

#[tokio::test]
async fn issue_and_wait_stores_and_announces() {
    let mut harness = TestService::in_process().await.expect("service");
    let request = example_request(Duration::days(365));

    let outcome = harness
        .service
        .issue_and_wait(OwnerId::from("user-1"), request.clone())
        .await
        .expect("issue");

    assert_eq!(outcome.metadata.to_identity_request().subject, request.subject);

    let record = harness
        .service
        .get_certificate(&outcome.certificate_id)
        .await
        .expect("stored record");
    assert_eq!(record.source, CertificateSource::Issued);
    assert_eq!(record.owner_id.as_str(), "user-1");
    assert_eq!(record.metadata, outcome.metadata);
    assert!(same_day(record.metadata.expiration_date, request.expiration_date));

    let event = next_event(&mut harness).await;
    assert_eq!(event.event_type, EVENT_ISSUED);
    assert_eq!(event.certificate_id, outcome.certificate_id);
    assert_eq!(event.serial_number.as_deref(), Some(outcome.metadata.serial_number.as_str()));
}

#[tokio::test]
async fn failed_bundle_write_rolls_back_the_record() {
    let mut harness = TestService::in_process().await.expect("service");
    let certificate_id = CertificateId::new();
    harness
        .blobs
        .store_blob(&certificate_id, b"occupied".to_vec())
        .await
        .expect("seed blob");

    harness
        .service
        .issue_as(
            certificate_id.clone(),
            OwnerId::from("user-9"),
            example_request(Duration::days(30)),
        )
        .expect("acknowledged");

    let event = next_event(&mut harness).await;
    assert_eq!(event.event_type, EVENT_FAILED);
    assert!(harness.repository.is_empty());
    let err = harness
        .service
        .get_certificate(&certificate_id)
        .await
        .expect_err("record rolled back");
    assert!(matches!(err, Error::NotFound(_)));

    // The identity was released, so the same request issues cleanly.
    harness
        .service
        .issue_and_wait(OwnerId::from("user-9"), example_request(Duration::days(30)))
        .await
        .expect("reissue");
    assert_eq!(harness.repository.len(), 1);
}

#[tokio::test]
async fn background_issue_acknowledges_first() {
    let mut harness = TestService::in_process().await.expect("service");

    let ack = harness
        .service
        .issue(OwnerId::from("user-2"), example_request(Duration::days(30)))
        .expect("acknowledged");
    assert_eq!(ack.message, ISSUANCE_SUBMITTED);

    let event = next_event(&mut harness).await;
    assert!(event.is_success(), "{event:?}");
    assert_eq!(event.certificate_id, ack.certificate_id);
    assert_eq!(event.strategy, "in-process");

    let record = harness.service.get_certificate(&ack.certificate_id).await.expect("stored record");
    assert_eq!(record.metadata.subject.common_name, "example.com");
}

#[tokio::test]
async fn caller_chosen_id_is_kept() {
    let mut harness = TestService::in_process().await.expect("service");
    let id = CertificateId::new();

    let ack = harness
        .service
        .issue_as(id.clone(), OwnerId::from("user-3"), example_request(Duration::days(30)))
        .expect("acknowledged");
    assert_eq!(ack.certificate_id, id);

    let event = next_event(&mut harness).await;
    assert_eq!(event.certificate_id, id);
    harness.service.get_certificate(&id).await.expect("stored under caller id");
}

#[tokio::test]
async fn duplicate_identity_conflicts_and_reports_failure() {
    let mut harness = TestService::in_process().await.expect("service");
    let owner = OwnerId::from("user-4");

    harness
        .service
        .issue_and_wait(owner.clone(), example_request(Duration::days(30)))
        .await
        .expect("first issuance");
    let _ = next_event(&mut harness).await;

    let err = harness
        .service
        .issue_and_wait(owner, example_request(Duration::days(60)))
        .await
        .expect_err("duplicate identity");
    assert!(matches!(err, Error::Conflict(_)), "{err:?}");

    let event = next_event(&mut harness).await;
    assert_eq!(event.event_type, EVENT_FAILED);
    assert_eq!(event.error_kind.as_deref(), Some("conflict"));
}

#[tokio::test]
async fn same_identity_for_another_owner_is_not_a_duplicate() {
    let harness = TestService::in_process().await.expect("service");
    let request = example_request(Duration::days(30));

    harness.service.issue_and_wait("alice".into(), request.clone()).await.expect("alice");
    harness.service.issue_and_wait("bob".into(), request).await.expect("bob");
}

#[tokio::test]
async fn past_expiration_is_rejected_without_side_effects() {
    let mut harness = TestService::in_process().await.expect("service");

    let err = harness
        .service
        .issue(OwnerId::from("user-5"), example_request(Duration::days(-1)))
        .expect_err("expired request");
    assert!(matches!(err, Error::Validation { .. }));

    tokio::time::sleep(StdDuration::from_millis(50)).await;
    assert!(matches!(harness.events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn upload_ingests_metadata_once_per_owner() {
    let harness = TestService::in_process().await.expect("service");
    let outcome = harness
        .service
        .issue_and_wait("issuer".into(), example_request(Duration::days(30)))
        .await
        .expect("issue");
    let pem = outcome.bundle.certificate_pem.as_bytes();

    let ack = harness
        .service
        .upload_and_ingest(pem, "uploader".into(), "edge proxy")
        .await
        .expect("upload");
    assert_eq!(ack.message, UPLOAD_ACCEPTED);

    let record = harness
        .service
        .get_certificate(&ack.certificate_id)
        .await
        .expect("uploaded record");
    assert_eq!(record.source, CertificateSource::Uploaded);
    assert_eq!(record.name.as_deref(), Some("edge proxy"));
    assert_eq!(record.metadata, outcome.metadata);

    let err = harness
        .service
        .upload_and_ingest(pem, "uploader".into(), "edge proxy again")
        .await
        .expect_err("duplicate upload");
    assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn garbage_upload_is_a_parse_error() {
    let harness = TestService::in_process().await.expect("service");

    let err = harness
        .service
        .upload_and_ingest(b"definitely not a certificate", "user-6".into(), "junk")
        .await
        .expect_err("garbage");
    assert!(matches!(err, Error::Parse(_)));
}

#[tokio::test]
async fn unknown_certificate_is_not_found() {
    let harness = TestService::in_process().await.expect("service");

    let err = harness.service.get_certificate(&CertificateId::new()).await.expect_err("unknown");
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn stored_bundle_and_owner_listing() {
    let harness = TestService::in_process().await.expect("service");
    let owner = OwnerId::from("user-7");

    let first = harness
        .service
        .issue_and_wait(owner.clone(), example_request(Duration::days(30)))
        .await
        .expect("first");
    let mut other = example_request(Duration::days(30));
    other.subject.common_name = "api.example.com".to_string();
    other.dns_names = vec!["api.example.com".to_string()];
    harness.service.issue_and_wait(owner.clone(), other).await.expect("second");

    let records = harness.service.list_certificates(&owner).await.expect("list");
    assert_eq!(records.len(), 2);
    assert!(records[0].created_at >= records[1].created_at);
    let unknown_owner = harness
        .service
        .list_certificates(&"nobody".into())
        .await
        .expect("list");
    assert!(unknown_owner.is_empty());

    let stored = harness.service.get_certificate_pem(&first.certificate_id).await.expect("blob");
    assert_eq!(String::from_utf8(stored).expect("utf8"), first.bundle.to_combined());
}
