use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::{CollectionFailure, MAX_TASK_RETRY_COUNT, PerformanceCollectionTask};
use crate::db::Database;
use crate::model::{NewTaskInstance, TaskTemplate};
use crate::scheduler::{Scheduler, SchedulerError, Trigger, callback};

/// Turns task templates into scheduled one-shot collections
#[derive(Clone)]
pub struct CollectionOrchestrator {
    db: Arc<dyn Database>,
    scheduler: Scheduler,
    collector: PerformanceCollectionTask,

    /// Period of the recurring trigger
    interval: Duration,
}

impl CollectionOrchestrator {
    pub fn new(
        db: Arc<dyn Database>,
        scheduler: Scheduler,
        collector: PerformanceCollectionTask,
        interval: Duration,
    ) -> Self {
        Self {
            db,
            scheduler,
            collector,
            interval,
        }
    }

    /// Registers the recurring trigger and starts the scheduler
    ///
    /// The first run happens immediately. Returns the trigger's job id.
    pub fn initiate(&self) -> Result<String, SchedulerError> {
        let job_id = Uuid::new_v4().to_string();
        let orchestrator = self.clone();

        self.scheduler.add_job(
            &job_id,
            Trigger::Interval {
                every: self.interval,
                start_at: Some(Utc::now()),
            },
            callback(move || {
                let orchestrator = orchestrator.clone();
                async move {
                    orchestrator.schedule_collection().await;
                }
            }),
        )?;
        self.scheduler.initiate();

        info!(%job_id, interval = ?self.interval, "periodic scheduler for performance collection started");
        Ok(job_id)
    }

    /// One trigger: an instance and a one-shot job per template
    ///
    /// Failures are logged per template and never raised. Returns the number
    /// of collections scheduled.
    #[instrument(skip(self))]
    pub async fn schedule_collection(&self) -> usize {
        let templates = match self.db.task_template_get_all().await {
            Ok(templates) => templates,
            Err(e) => {
                error!("failed to load task templates: {e}");
                return 0;
            }
        };

        if templates.is_empty() {
            info!("no task templates found for performance collection");
            return 0;
        }
        info!(templates = templates.len(), "scheduling performance collection");

        let mut scheduled = 0;
        for mut template in templates {
            match self.schedule_template(&mut template).await {
                Ok(instance_id) => {
                    debug!(
                        template_id = %template.id,
                        task_instance_id = %instance_id,
                        delay_secs = template.interval,
                        "collection scheduled"
                    );
                    scheduled += 1;
                }
                Err(e) => error!(template_id = %template.id, "failed to schedule collection: {e}"),
            }
        }
        scheduled
    }

    /// Instance first, then its job, then the template's `last_run_time`
    ///
    /// A step that fails undoes the earlier ones, so a template that cannot
    /// be scheduled leaves neither an orphan instance nor a moved timestamp.
    async fn schedule_template(&self, template: &mut TaskTemplate) -> Result<String, CollectionFailure> {
        let instance = self
            .db
            .task_instance_create(NewTaskInstance {
                task_template_id: template.id.clone(),
                storage_id: template.storage_id.clone(),
                method: template.method.clone(),
                args: template.args.clone(),
                interval: template.interval,
                retry_count: MAX_TASK_RETRY_COUNT,
            })
            .await?;

        let collector = self.collector.clone();
        let instance_id = instance.id.clone();
        let added = self.scheduler.add_job(
            &instance.id,
            Trigger::once_after(Duration::from_secs(template.interval)),
            callback(move || {
                let collector = collector.clone();
                let instance_id = instance_id.clone();
                async move {
                    collector.collect(&instance_id).await;
                }
            }),
        );
        if let Err(e) = added {
            self.discard_instance(&instance.id).await;
            return Err(e.into());
        }

        template.last_run_time = Some(Utc::now());
        if let Err(e) = self.db.task_template_update(&template.id, template).await {
            self.scheduler.remove_job(&instance.id);
            self.discard_instance(&instance.id).await;
            return Err(e.into());
        }

        Ok(instance.id)
    }

    async fn discard_instance(&self, instance_id: &str) {
        if let Err(e) = self.db.task_instance_delete(instance_id).await {
            warn!(task_instance_id = instance_id, "failed to discard unscheduled task instance: {e}");
        }
    }
}
