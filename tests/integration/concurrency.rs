//! Concurrency tests
//!
//! These tests verify thread-safety of the shared components:
//! - concurrent driver resolution constructs one driver per storage
//! - distinct storages never share a driver
//! - concurrent alert processing for several devices
//! - the scheduler worker bound under a burst of one-shot jobs

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use arraywatch::db::{Database, MemoryDatabase};
use arraywatch::drivers::fake::FakeStorageDriver;
use arraywatch::drivers::{DriverRegistry, StorageDriver};
use arraywatch::model::StorageDevice;
use arraywatch::scheduler::{Scheduler, Trigger, callback};

use crate::helpers::*;

#[tokio::test]
async fn test_concurrent_resolution_constructs_once() {
    let db = Arc::new(MemoryDatabase::new());
    db.storage_create(&device("fake-1", "counting")).await.unwrap();

    let constructed = Arc::new(AtomicUsize::new(0));
    let counter = constructed.clone();
    let mut registry = DriverRegistry::new(db.clone());
    registry.register(
        "counting",
        Arc::new(move |device: &StorageDevice| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FakeStorageDriver::new(device)) as Arc<dyn StorageDriver>)
        }),
    );
    let registry = Arc::new(registry);

    let mut tasks = vec![];
    for _ in 0..32 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move { registry.resolve("fake-1").await }));
    }

    let mut drivers = vec![];
    for task in tasks {
        drivers.push(task.await.unwrap().unwrap());
    }

    assert_eq!(constructed.load(Ordering::SeqCst), 1);
    assert!(drivers.iter().all(|d| Arc::ptr_eq(d, &drivers[0])));
    assert_eq!(registry.cached().await, 1);
}

#[tokio::test]
async fn test_distinct_storages_get_distinct_drivers() {
    let db = Arc::new(MemoryDatabase::new());
    db.storage_create(&device("a", "fake_storage")).await.unwrap();
    db.storage_create(&device("b", "fake_storage")).await.unwrap();
    let registry = Arc::new(DriverRegistry::with_builtin_drivers(db));

    let (a, b) = tokio::join!(registry.resolve("a"), registry.resolve("b"));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(registry.cached().await, 2);
}

#[tokio::test]
async fn test_concurrent_alerts_for_many_devices() {
    let devices: Vec<_> = (0..8).map(|i| device(&format!("s{i}"), "huawei")).collect();
    let pipeline = pipeline(&devices).await;
    let mut rx = pipeline.channel.subscribe();

    let mut tasks = vec![];
    for device in &devices {
        let processor = pipeline.processor.clone();
        let storage_id = device.id.clone();
        tasks.push(tokio::spawn(async move {
            processor
                .normalize(&storage_id, &ism_attributes("Major alarm"))
                .await
        }));
    }
    for task in tasks {
        let alert = task.await.unwrap().unwrap();
        pipeline.exporter.export(&alert).await.unwrap();
    }

    let mut seen = vec![];
    for _ in 0..devices.len() {
        seen.push(next_alert(&mut rx).await.storage_id);
    }
    seen.sort();
    let mut expected: Vec<_> = devices.iter().map(|d| d.id.clone()).collect();
    expected.sort();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_scheduler_burst_respects_worker_bound() {
    let scheduler = Scheduler::new(3);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicUsize::new(0));

    for i in 0..12 {
        let running = running.clone();
        let peak = peak.clone();
        let done = done.clone();
        scheduler
            .add_job(
                &format!("burst-{i}"),
                Trigger::once_after(Duration::from_millis(10)),
                callback(move || {
                    let running = running.clone();
                    let peak = peak.clone();
                    let done = done.clone();
                    async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        done.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            )
            .unwrap();
    }
    scheduler.initiate();

    for _ in 0..100 {
        if done.load(Ordering::SeqCst) == 12 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(done.load(Ordering::SeqCst), 12);
    assert!(peak.load(Ordering::SeqCst) <= 3);
    scheduler.shutdown();
}
