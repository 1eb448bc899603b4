//! LogPublisher - logs task summaries via tracing instead of sending them

use contracts::{CollectorTask, PublishError, TaskPublisher};
use tracing::{info, instrument};

/// Publisher that only logs, for offline runs and debugging
pub struct LogPublisher {
    name: String,
    published: u64,
}

impl LogPublisher {
    /// Create a new LogPublisher with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            published: 0,
        }
    }

    /// Tasks logged so far
    pub fn published(&self) -> u64 {
        self.published
    }
}

impl TaskPublisher for LogPublisher {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_publisher_publish",
        skip(self, task),
        fields(publisher = %self.name, job_id = %task.job_id)
    )]
    async fn publish(&mut self, task: &CollectorTask) -> Result<(), PublishError> {
        self.published += 1;
        info!(
            platform = %task.platform,
            task_type = %task.task_type,
            routing_key = %task.routing_key,
            attempt = task.attempt,
            max_attempts = task.max_attempts,
            schema_version = task.schema_version,
            "CollectorTask published"
        );
        Ok(())
    }

    #[instrument(name = "log_publisher_close", skip(self))]
    async fn close(&mut self) -> Result<(), PublishError> {
        info!(publisher = %self.name, published = self.published, "LogPublisher closed");
        Ok(())
    }
}
