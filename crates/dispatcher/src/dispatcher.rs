//! Dispatcher - request -> tasks -> publisher

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, instrument};

use contracts::{
    CollectorTask, CrawlRequest, DispatchError, DispatchOptions, PublishError, TaskPayload,
    TaskPublisher, TaskType,
};

use crate::builder::build_task;
use crate::mapper::map_payload;
use crate::metrics::{DispatchMetrics, MetricsSnapshot};
use crate::normalizer::normalize;
use crate::router::{Route, route};

/// Runs the dispatch pipeline against one publisher
///
/// Holds no per-request state. Options are shared read-only; the publisher
/// is owned exclusively so a single consumer loop drives it.
pub struct Dispatcher<P> {
    options: Arc<DispatchOptions>,
    publisher: P,
    metrics: Arc<DispatchMetrics>,
}

impl<P: TaskPublisher> Dispatcher<P> {
    pub fn new(options: Arc<DispatchOptions>, publisher: P) -> Self {
        Self {
            options,
            publisher,
            metrics: Arc::new(DispatchMetrics::new()),
        }
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Shared counters, for reporting from other tasks
    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Dispatch one request, stamping unset emission times with the current time
    ///
    /// Every target is mapped before anything is published, so a payload
    /// error never leaves a partial fan-out behind. Publishing stops at the
    /// first failure.
    #[instrument(
        name = "dispatcher_dispatch",
        skip(self, request),
        fields(
            job_id = %request.job_id,
            task_type = %request.task_type,
            platform = %request.platform,
            publisher = %self.publisher.name()
        )
    )]
    pub async fn dispatch(
        &mut self,
        request: CrawlRequest,
    ) -> Result<Vec<CollectorTask>, DispatchError> {
        self.dispatch_at(request, Utc::now()).await
    }

    /// Same as [`dispatch`](Self::dispatch) with an explicit clock
    pub async fn dispatch_at(
        &mut self,
        request: CrawlRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<CollectorTask>, DispatchError> {
        self.metrics.inc_requests();
        let result = self.run_pipeline(request, now).await;
        if let Err(err) = &result {
            self.metrics.record_failure(err);
        }
        result
    }

    /// Close the underlying publisher
    pub async fn close(&mut self) -> Result<(), PublishError> {
        self.publisher.close().await
    }

    async fn run_pipeline(
        &mut self,
        request: CrawlRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<CollectorTask>, DispatchError> {
        let request = normalize(request, &self.options, now)?;
        let routes = route(&request.platform, &self.options)?;

        let mut mapped: Vec<(Route, TaskType, TaskPayload)> = Vec::with_capacity(routes.len());
        for target in routes {
            let (task_type, payload) =
                map_payload(target.platform, &request.task_type, request.payload.as_ref())?;
            mapped.push((target, task_type, payload));
        }

        let mut published = Vec::with_capacity(mapped.len());
        for (target, task_type, payload) in mapped {
            let task = build_task(&request, &target, task_type, payload, &self.options);
            self.publisher
                .publish(&task)
                .await
                .map_err(|e| DispatchError::publish(target.platform.as_str(), e))?;
            self.metrics.inc_tasks_published();
            observability::record_task_published(task.platform.as_str());
            debug!(
                platform = %task.platform,
                routing_key = %task.routing_key,
                "Task published"
            );
            published.push(task);
        }

        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Platform, default_routing_key};
    use serde_json::json;
    use std::collections::BTreeMap;

    /// Records tasks; optionally fails the n-th publish (0-based)
    #[derive(Default)]
    struct MockPublisher {
        tasks: Vec<CollectorTask>,
        fail_at: Option<usize>,
        calls: usize,
        closed: bool,
    }

    impl TaskPublisher for MockPublisher {
        fn name(&self) -> &str {
            "mock"
        }

        async fn publish(&mut self, task: &CollectorTask) -> Result<(), PublishError> {
            let call = self.calls;
            self.calls += 1;
            if self.fail_at == Some(call) {
                return Err(PublishError::transient("mock", "channel closed"));
            }
            self.tasks.push(task.clone());
            Ok(())
        }

        async fn close(&mut self) -> Result<(), PublishError> {
            self.closed = true;
            Ok(())
        }
    }

    fn options() -> Arc<DispatchOptions> {
        let queues: BTreeMap<_, _> = Platform::ALL
            .into_iter()
            .map(|p| (p, default_routing_key(p)))
            .collect();
        Arc::new(DispatchOptions::new(3, 1, queues).unwrap())
    }

    fn fan_out_request() -> CrawlRequest {
        CrawlRequest::new("j1", "research_keyword")
            .with_payload(json!({ "keyword": "phone", "limit": 10 }))
    }

    #[tokio::test]
    async fn test_fan_out_publishes_in_order() {
        let mut dispatcher = Dispatcher::new(options(), MockPublisher::default());
        let tasks = dispatcher.dispatch(fan_out_request()).await.unwrap();

        let keys: Vec<_> = tasks.iter().map(|t| t.routing_key.as_str()).collect();
        assert_eq!(keys, vec!["crawler.tiktok.queue", "crawler.youtube.queue"]);
        assert_eq!(dispatcher.publisher().tasks, tasks);
        assert!(tasks.iter().all(|t| t.attempt == 1 && t.schema_version == 1));
    }

    #[tokio::test]
    async fn test_publish_failure_stops_fan_out() {
        let publisher = MockPublisher {
            fail_at: Some(0),
            ..Default::default()
        };
        let mut dispatcher = Dispatcher::new(options(), publisher);
        let err = dispatcher.dispatch(fan_out_request()).await.unwrap_err();

        assert!(matches!(err, DispatchError::Publish { ref platform, .. } if platform == "tiktok"));
        assert!(err.is_transient());
        assert_eq!(dispatcher.publisher().calls, 1);
        assert!(dispatcher.publisher().tasks.is_empty());
    }

    #[tokio::test]
    async fn test_mapping_failure_publishes_nothing() {
        let mut dispatcher = Dispatcher::new(options(), MockPublisher::default());
        let request = CrawlRequest::new("j2", "crawl_links")
            .with_payload(json!({ "video_urls": "not-a-list" }));
        let err = dispatcher.dispatch(request).await.unwrap_err();

        assert!(matches!(err, DispatchError::InvalidInput { .. }));
        assert_eq!(dispatcher.publisher().calls, 0);
    }

    #[tokio::test]
    async fn test_metrics_track_outcomes() {
        let mut dispatcher = Dispatcher::new(options(), MockPublisher::default());
        dispatcher.dispatch(fan_out_request()).await.unwrap();
        let _ = dispatcher
            .dispatch(CrawlRequest::new("j3", "research_keyword").with_platform("vimeo"))
            .await;

        let snap = dispatcher.snapshot();
        assert_eq!(snap.requests, 2);
        assert_eq!(snap.tasks_published, 2);
        assert_eq!(snap.unknown_route, 1);
    }

    #[test]
    fn test_partial_fan_out_counts_published_task() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        let publisher = MockPublisher {
            fail_at: Some(1),
            ..Default::default()
        };
        let mut dispatcher = Dispatcher::new(options(), publisher);
        let result = metrics::with_local_recorder(&recorder, || {
            runtime.block_on(dispatcher.dispatch(fan_out_request()))
        });

        assert!(result.is_err());
        assert_eq!(dispatcher.snapshot().tasks_published, 1);
        let rendered = handle.render();
        let published: Vec<_> = rendered
            .lines()
            .filter(|line| line.starts_with("crawl_dispatch_tasks_published_total{"))
            .collect();
        assert_eq!(published.len(), 1, "got: {rendered}");
        assert!(published[0].contains(r#"platform="tiktok""#), "got: {rendered}");
        assert!(published[0].ends_with(" 1"), "got: {rendered}");
    }

    #[tokio::test]
    async fn test_close_reaches_publisher() {
        let mut dispatcher = Dispatcher::new(options(), MockPublisher::default());
        dispatcher.close().await.unwrap();
        assert!(dispatcher.publisher().closed);
    }
}
