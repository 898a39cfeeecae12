//! Scheduled performance collection against the simulated array
//!
//! Templates are materialised by the orchestrator, the one-shot job fires
//! after the template interval and the collection outcome is recorded on the
//! task instance.

use std::sync::Arc;
use std::time::Duration;

use arraywatch::config::{CollectionConfig, RetryConfig};
use arraywatch::db::{Database, MemoryDatabase};
use arraywatch::exporter::ExportEvent;
use arraywatch::model::{TaskResult, TaskTemplate};
use arraywatch::scheduler::{JobStatus, Scheduler};
use arraywatch::tasks::{CollectionOrchestrator, MAX_TASK_RETRY_COUNT, PerformanceCollectionTask};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::helpers::*;

struct Harness {
    db: Arc<MemoryDatabase>,
    scheduler: Scheduler,
    orchestrator: CollectionOrchestrator,
    pipeline: Pipeline,
}

async fn harness(args: serde_json::Value, interval: u64, config: CollectionConfig) -> Harness {
    let pipeline = pipeline(&[device("fake-1", "fake_storage")]).await;
    let db = pipeline.db.clone();
    db.task_template_create(&TaskTemplate {
        id: "fake-1-perf".into(),
        storage_id: "fake-1".into(),
        method: "performance".into(),
        args,
        interval,
        last_run_time: None,
    })
    .await
    .unwrap();

    let scheduler = Scheduler::new(4);
    let collector = PerformanceCollectionTask::new(
        db.clone(),
        pipeline.drivers.clone(),
        pipeline.exporter.clone(),
        scheduler.clone(),
        &config,
    );
    let orchestrator = CollectionOrchestrator::new(
        db.clone(),
        scheduler.clone(),
        collector,
        Duration::from_secs(3600),
    );
    scheduler.initiate();

    Harness {
        db,
        scheduler,
        orchestrator,
        pipeline,
    }
}

async fn wait_for_result(db: &MemoryDatabase, done: impl Fn(Option<TaskResult>) -> bool) -> Option<TaskResult> {
    for _ in 0..100 {
        let instances = db.task_instances().await;
        if let Some(instance) = instances.first() {
            if done(instance.result) {
                return instance.result;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    db.task_instances().await.first().and_then(|i| i.result)
}

#[tokio::test]
async fn test_successful_collection_is_recorded_and_job_removed() {
    let h = harness(json!({ "granularity": 1 }), 1, CollectionConfig::default()).await;
    let mut rx = h.pipeline.channel.subscribe();

    assert_eq!(h.orchestrator.schedule_collection().await, 1);

    let instance = h.db.task_instances().await.remove(0);
    assert_eq!(instance.retry_count, MAX_TASK_RETRY_COUNT);
    let job = h.scheduler.get_job(&instance.id).unwrap();
    assert_eq!(job.status, JobStatus::Scheduled);

    let result = wait_for_result(&h.db, |r| r == Some(TaskResult::Succeed)).await;
    assert_eq!(result, Some(TaskResult::Succeed));

    let stored = h.db.task_instance_get(&instance.id).await.unwrap();
    assert!(stored.launch_time.is_some());
    assert!(h.scheduler.get_job(&instance.id).is_none());

    match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap() {
        ExportEvent::Metrics { storage_id, samples } => {
            assert_eq!(storage_id, "fake-1");
            assert!(!samples.is_empty());
        }
        other => panic!("unexpected export {other:?}"),
    }
}

#[tokio::test]
async fn test_transport_failure_is_recorded_and_job_removed() {
    let h = harness(json!({ "fail": "connection refused" }), 1, CollectionConfig::default()).await;

    assert_eq!(h.orchestrator.schedule_collection().await, 1);
    let instance_id = h.db.task_instances().await[0].id.clone();

    let result = wait_for_result(&h.db, |r| r == Some(TaskResult::Failed)).await;
    assert_eq!(result, Some(TaskResult::Failed));

    // removal happens right after the result is stored
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.scheduler.get_job(&instance_id).is_none());
    assert!(h.scheduler.is_empty());
}

#[tokio::test]
async fn test_retry_does_not_mask_persistent_failure() {
    let config = CollectionConfig {
        retry: RetryConfig {
            enabled: true,
            backoff_secs: 0,
        },
        serialize_per_storage: true,
    };
    let h = harness(json!({ "fail": "connection refused" }), 1, config).await;

    h.orchestrator.schedule_collection().await;

    let result = wait_for_result(&h.db, |r| r == Some(TaskResult::Failed)).await;
    assert_eq!(result, Some(TaskResult::Failed));
}

#[tokio::test]
async fn test_every_trigger_creates_a_new_instance() {
    let h = harness(json!({}), 60, CollectionConfig::default()).await;

    h.orchestrator.schedule_collection().await;
    h.orchestrator.schedule_collection().await;

    let instances = h.db.task_instances().await;
    assert_eq!(instances.len(), 2);
    assert_ne!(instances[0].id, instances[1].id);
    assert_eq!(h.scheduler.len(), 2);

    let template = &h.db.task_template_get_all().await.unwrap()[0];
    assert!(template.last_run_time.is_some());
}
