//! SQLite persistence across restarts
//!
//! Records written by one connection must be visible after the database file
//! is reopened, and the collection pipeline must work on top of it.

use std::sync::Arc;
use std::time::Duration;

use arraywatch::config::CollectionConfig;
use arraywatch::db::sqlite::SqliteDatabase;
use arraywatch::db::{Database, DbError};
use arraywatch::drivers::{DriverManager, DriverRegistry};
use arraywatch::exporter::{AlertExporter, ExportManager};
use arraywatch::model::{NewTaskInstance, TaskResult, TaskTemplate};
use arraywatch::scheduler::Scheduler;
use arraywatch::snmp::security::{AlertSource, AuthProtocol, SecurityProfile};
use arraywatch::tasks::PerformanceCollectionTask;
use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use crate::helpers::*;

fn template(interval: u64) -> TaskTemplate {
    TaskTemplate {
        id: "t1".into(),
        storage_id: "fake-1".into(),
        method: "performance".into(),
        args: serde_json::json!({ "granularity": 30 }),
        interval,
        last_run_time: None,
    }
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("arraywatch.db");

    let source = AlertSource {
        storage_id: "fake-1".into(),
        host: "10.0.0.5".parse().unwrap(),
        profile: SecurityProfile::AuthNoPriv {
            user: "monitor".into(),
            engine_id: "800007e5804f190000d232aa40".into(),
            auth_protocol: AuthProtocol::Md5,
            auth_key: "authpassword".into(),
        },
    };

    {
        let db = SqliteDatabase::new(&path).await.unwrap();
        db.storage_create(&device("fake-1", "fake_storage")).await.unwrap();
        db.alert_source_create(&source).await.unwrap();
        db.task_template_create(&template(60)).await.unwrap();
    }

    let db = SqliteDatabase::new(&path).await.unwrap();
    assert_eq!(db.storage_get("fake-1").await.unwrap(), device("fake-1", "fake_storage"));
    assert_eq!(db.alert_source_get_all().await.unwrap(), vec![source]);
    assert_eq!(db.task_template_get_all().await.unwrap(), vec![template(60)]);
}

#[tokio::test]
async fn test_missing_records_are_not_found() {
    let dir = TempDir::new().unwrap();
    let db = SqliteDatabase::new(dir.path().join("empty.db")).await.unwrap();

    assert_matches!(db.storage_get("nope").await, Err(DbError::NotFound { .. }));
    assert_matches!(db.task_instance_get("nope").await, Err(DbError::NotFound { .. }));
    assert!(db.task_template_get_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_collection_on_sqlite() {
    let dir = TempDir::new().unwrap();
    let db: Arc<dyn Database> = Arc::new(SqliteDatabase::new(dir.path().join("collect.db")).await.unwrap());
    db.storage_create(&device("fake-1", "fake_storage")).await.unwrap();

    let instance = db
        .task_instance_create(NewTaskInstance {
            task_template_id: "t1".into(),
            storage_id: "fake-1".into(),
            method: "performance".into(),
            args: serde_json::json!({ "granularity": 30 }),
            interval: 120,
            retry_count: 3,
        })
        .await
        .unwrap();

    let registry = Arc::new(DriverRegistry::with_builtin_drivers(db.clone()));
    let drivers = DriverManager::new(registry, Duration::from_secs(5));
    let exporter = AlertExporter::new(Arc::new(ExportManager::new()), drivers.clone());
    let task = PerformanceCollectionTask::new(
        db.clone(),
        drivers,
        exporter,
        Scheduler::default(),
        &CollectionConfig::default(),
    );

    assert_eq!(task.collect(&instance.id).await, Some(TaskResult::Succeed));

    let stored = db.task_instance_get(&instance.id).await.unwrap();
    assert_eq!(stored.result, Some(TaskResult::Succeed));
    assert!(stored.launch_time.is_some());
    assert_eq!(stored.interval, 120);
}
