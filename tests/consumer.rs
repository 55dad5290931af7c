mod common;

use common::*;
use pdrbox::ledger::{GranuleKey, GranuleStatus};
use pdrbox::queue::MessageQueue;
use pdrbox::worker::{MessageAction, StageFileAction};
use std::sync::Arc;
use std::time::Duration;

/// Discover and parse one manifest so its file transfers sit on the queue
async fn queue_transfers(harness: &Harness, pdr_name: &str, day: usize) {
    let pdr = publish(harness, pdr_name, &[day]);
    let provider = harness.state.catalog.provider("LPDAAC").unwrap();
    harness
        .state
        .pdr_ingest()
        .discover_with(&FixedListing(Ok(vec![pdr])), &provider, None)
        .await
        .unwrap();
    harness
        .state
        .pdr_consumer(harness.state.dispatcher(), 5)
        .run(1, Duration::from_secs(20), 0)
        .await;
}

fn stage_action(harness: &Harness) -> StageFileAction {
    StageFileAction::new(
        harness.state.storage.clone(),
        harness.state.downloader.clone(),
        harness.state.lifecycle.clone(),
        harness.state.metrics.clone(),
    )
}

#[tokio::test]
async fn test_crash_before_delete_redelivers_without_second_download() {
    let harness = harness();
    queue_transfers(&harness, "CRASH.PDR", 1).await;
    assert_eq!(harness.queue.depth("files").unwrap(), 2);

    // Work done, then the worker dies before acknowledging
    let received = harness
        .queue
        .receive("files", 1, Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(received.len(), 1);
    stage_action(&harness).execute(&received[0]).await.unwrap();
    let staged_url = received[0].body["url"].as_str().unwrap().to_string();
    assert_eq!(harness.remote.fetch_count(&staged_url), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;

    let summary = harness
        .state
        .file_consumer()
        .run(2, Duration::from_secs(200), 0)
        .await;
    assert_eq!(summary.received, 2);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(harness.queue.depth("files").unwrap(), 0);

    // The redelivered copy found the object already staged
    assert_eq!(harness.remote.fetch_count(&staged_url), 1);
    let metrics = harness.state.metrics.snapshot();
    assert_eq!(metrics.files_staged, 2);
    assert_eq!(metrics.files_skipped, 1);

    let key = GranuleKey::new("MOD09GQ", granule_id(1));
    let granule = harness.state.lifecycle.get_granule(&key).await.unwrap();
    assert_eq!(granule.status, GranuleStatus::Completed);
}

#[tokio::test]
async fn test_failed_download_stays_queued_until_it_succeeds() {
    let harness = harness();
    queue_transfers(&harness, "LATE.PDR", 2).await;

    // The data file vanishes from the provider before staging
    let id = granule_id(2);
    let missing = format!("{id}.hdf");
    let remote = Arc::new(FakeRemote::default());
    remote.put(file_url(&format!("{id}.hdf.met")), "meta");
    let action = StageFileAction::new(
        harness.state.storage.clone(),
        remote.clone(),
        harness.state.lifecycle.clone(),
        harness.state.metrics.clone(),
    );

    let received = harness
        .queue
        .receive("files", 2, Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(received.len(), 2);
    for message in &received {
        let outcome = action.execute(message).await;
        if message.body["fileName"] == missing.as_str() {
            assert!(outcome.is_err());
        } else {
            outcome.unwrap();
            harness
                .queue
                .delete("files", &message.receipt_handle)
                .await
                .unwrap();
        }
    }
    assert_eq!(harness.queue.depth("files").unwrap(), 1);

    let key = GranuleKey::new("MOD09GQ", &id);
    let granule = harness.state.lifecycle.get_granule(&key).await.unwrap();
    assert_eq!(granule.status, GranuleStatus::Processing);

    tokio::time::sleep(Duration::from_millis(100)).await;

    // The regular consumer uses the harness remote, which still has the file
    let summary = harness
        .state
        .file_consumer()
        .run(1, Duration::from_secs(200), 0)
        .await;
    assert_eq!(summary.succeeded, 1);
    assert_eq!(harness.queue.depth("files").unwrap(), 0);

    let granule = harness.state.lifecycle.get_granule(&key).await.unwrap();
    assert_eq!(granule.status, GranuleStatus::Completed);
    let manifest = harness.state.lifecycle.get_manifest("LATE.PDR").await.unwrap();
    assert!(manifest.is_complete());
}

#[tokio::test]
async fn test_redelivered_manifest_message_is_dropped_after_parse() {
    let harness = harness();
    let pdr = publish(&harness, "TWICE.PDR", &[5]);
    let provider = harness.state.catalog.provider("LPDAAC").unwrap();
    harness
        .state
        .pdr_ingest()
        .discover_with(&FixedListing(Ok(vec![pdr])), &provider, None)
        .await
        .unwrap();

    // A duplicate of the manifest message, as a redelivery would produce
    let body = harness.queue.peek_all("pdrs").unwrap().remove(0);
    harness.queue.send("pdrs", body).await.unwrap();

    let summary = harness
        .state
        .pdr_consumer(harness.state.dispatcher(), 5)
        .run(1, Duration::from_secs(20), 0)
        .await;
    assert_eq!(summary.succeeded, 2);
    assert_eq!(harness.queue.depth("pdrs").unwrap(), 0);
    // Transfers for one granule only
    assert_eq!(harness.queue.depth("files").unwrap(), 2);
}
