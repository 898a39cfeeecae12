//! SQLite persistence backend
//!
//! Single-file store for devices, alert sources, task templates and task
//! instances. The database runs in WAL mode so collection tasks can update
//! instances while the orchestrator scans templates. Timestamps are stored as
//! Unix milliseconds.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::backend::Database;
use super::error::{DbError, DbResult};
use crate::model::{NewTaskInstance, StorageDevice, TaskInstance, TaskResult, TaskTemplate};
use crate::snmp::security::AlertSource;

pub struct SqliteDatabase {
    pool: Pool<Sqlite>,
}

impl SqliteDatabase {
    /// Opens (or creates) the database file and runs pending migrations
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> DbResult<Self> {
        let db_path = db_path.as_ref().to_string_lossy().to_string();
        info!("opening SQLite database at {db_path}");

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database migrations complete");

        Ok(Self { pool })
    }

    fn to_millis(dt: Option<DateTime<Utc>>) -> Option<i64> {
        dt.map(|dt| dt.timestamp_millis())
    }

    fn from_millis(millis: Option<i64>) -> Option<DateTime<Utc>> {
        millis.and_then(DateTime::from_timestamp_millis)
    }

    fn template_from_row(row: &SqliteRow) -> DbResult<TaskTemplate> {
        let args: String = row.try_get("args")?;
        Ok(TaskTemplate {
            id: row.try_get("id")?,
            storage_id: row.try_get("storage_id")?,
            method: row.try_get("method")?,
            args: serde_json::from_str(&args)?,
            interval: row.try_get::<i64, _>("interval")? as u64,
            last_run_time: Self::from_millis(row.try_get("last_run_time")?),
        })
    }

    fn instance_from_row(row: &SqliteRow) -> DbResult<TaskInstance> {
        let args: String = row.try_get("args")?;
        let result = row
            .try_get::<Option<String>, _>("result")?
            .map(|r| r.parse::<TaskResult>())
            .transpose()
            .map_err(DbError::Serialization)?;

        Ok(TaskInstance {
            id: row.try_get("id")?,
            task_template_id: row.try_get("task_template_id")?,
            storage_id: row.try_get("storage_id")?,
            method: row.try_get("method")?,
            args: serde_json::from_str(&args)?,
            interval: row.try_get::<i64, _>("interval")? as u64,
            retry_count: row.try_get::<i64, _>("retry_count")? as u32,
            launch_time: Self::from_millis(row.try_get("launch_time")?),
            result,
        })
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn storage_get(&self, id: &str) -> DbResult<StorageDevice> {
        let row = sqlx::query(
            "SELECT id, name, vendor, model, serial_number FROM storages WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("storage", id))?;

        Ok(StorageDevice {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            vendor: row.try_get("vendor")?,
            model: row.try_get("model")?,
            serial_number: row.try_get("serial_number")?,
        })
    }

    async fn storage_create(&self, storage: &StorageDevice) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO storages (id, name, vendor, model, serial_number)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                vendor = excluded.vendor,
                model = excluded.model,
                serial_number = excluded.serial_number
            "#,
        )
        .bind(&storage.id)
        .bind(&storage.name)
        .bind(&storage.vendor)
        .bind(&storage.model)
        .bind(&storage.serial_number)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn storage_list(&self) -> DbResult<Vec<StorageDevice>> {
        let rows = sqlx::query(
            "SELECT id, name, vendor, model, serial_number FROM storages ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> DbResult<StorageDevice> {
                Ok(StorageDevice {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    vendor: row.try_get("vendor")?,
                    model: row.try_get("model")?,
                    serial_number: row.try_get("serial_number")?,
                })
            })
            .collect()
    }

    async fn alert_source_create(&self, source: &AlertSource) -> DbResult<()> {
        let encoded = serde_json::to_string(source)?;
        sqlx::query(
            r#"
            INSERT INTO alert_sources (host, storage_id, source)
            VALUES (?, ?, ?)
            ON CONFLICT (host) DO UPDATE SET
                storage_id = excluded.storage_id,
                source = excluded.source
            "#,
        )
        .bind(source.host.to_string())
        .bind(&source.storage_id)
        .bind(encoded)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn alert_source_get_all(&self) -> DbResult<Vec<AlertSource>> {
        let rows = sqlx::query("SELECT source FROM alert_sources ORDER BY host")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> DbResult<AlertSource> {
                let encoded: String = row.try_get("source")?;
                Ok(serde_json::from_str(&encoded)?)
            })
            .collect()
    }

    async fn task_template_create(&self, template: &TaskTemplate) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO task_templates (id, storage_id, method, args, interval, last_run_time)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                storage_id = excluded.storage_id,
                method = excluded.method,
                args = excluded.args,
                interval = excluded.interval
            "#,
        )
        .bind(&template.id)
        .bind(&template.storage_id)
        .bind(&template.method)
        .bind(serde_json::to_string(&template.args)?)
        .bind(template.interval as i64)
        .bind(Self::to_millis(template.last_run_time))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn task_template_get_all(&self) -> DbResult<Vec<TaskTemplate>> {
        let rows = sqlx::query(
            "SELECT id, storage_id, method, args, interval, last_run_time FROM task_templates ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::template_from_row).collect()
    }

    #[instrument(skip(self, template))]
    async fn task_template_update(&self, id: &str, template: &TaskTemplate) -> DbResult<()> {
        let result = sqlx::query("UPDATE task_templates SET last_run_time = ? WHERE id = ?")
            .bind(Self::to_millis(template.last_run_time))
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("task template", id));
        }
        Ok(())
    }

    async fn task_instance_create(&self, instance: NewTaskInstance) -> DbResult<TaskInstance> {
        let instance = TaskInstance::from_new(Uuid::new_v4().to_string(), instance);
        sqlx::query(
            r#"
            INSERT INTO task_instances (
                id, task_template_id, storage_id, method, args,
                interval, retry_count, launch_time, result
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, NULL, ?)
            "#,
        )
        .bind(&instance.id)
        .bind(&instance.task_template_id)
        .bind(&instance.storage_id)
        .bind(&instance.method)
        .bind(serde_json::to_string(&instance.args)?)
        .bind(instance.interval as i64)
        .bind(instance.retry_count as i64)
        .bind(instance.result.map(|r| r.to_string()))
        .execute(&self.pool)
        .await?;

        debug!(instance_id = %instance.id, "task instance created");
        Ok(instance)
    }

    async fn task_instance_get(&self, id: &str) -> DbResult<TaskInstance> {
        let row = sqlx::query(
            r#"
            SELECT id, task_template_id, storage_id, method, args,
                   interval, retry_count, launch_time, result
            FROM task_instances WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("task instance", id))?;

        Self::instance_from_row(&row)
    }

    #[instrument(skip(self, instance))]
    async fn task_instance_update(&self, id: &str, instance: &TaskInstance) -> DbResult<()> {
        let result = sqlx::query("UPDATE task_instances SET launch_time = ?, result = ? WHERE id = ?")
            .bind(Self::to_millis(instance.launch_time))
            .bind(instance.result.map(|r| r.to_string()))
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("task instance", id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn task_instance_delete(&self, id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM task_instances WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
