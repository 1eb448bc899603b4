//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置文件 -> DispatchOptions -> Dispatcher 全链路
//! - 分发管道的可测试性质 (fan-out、全有或全无、默认值)
//! - 无需 RabbitMQ：使用记录型 publisher

#[cfg(test)]
mod support {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use contracts::{
        CollectorTask, DispatchOptions, Platform, PublishError, TaskPublisher,
        default_routing_key,
    };

    /// Publisher that records every task; can be told to fail on a platform
    #[derive(Default)]
    pub struct RecordingPublisher {
        pub tasks: Vec<CollectorTask>,
        pub attempts: usize,
        pub fail_on: Option<(Platform, bool)>,
    }

    impl RecordingPublisher {
        /// Fail publishes to `platform`; `transient` picks the error kind
        pub fn failing_on(platform: Platform, transient: bool) -> Self {
            Self {
                fail_on: Some((platform, transient)),
                ..Default::default()
            }
        }
    }

    impl TaskPublisher for RecordingPublisher {
        fn name(&self) -> &str {
            "recording"
        }

        async fn publish(&mut self, task: &CollectorTask) -> Result<(), PublishError> {
            self.attempts += 1;
            match self.fail_on {
                Some((platform, true)) if platform == task.platform => {
                    Err(PublishError::transient("recording", "channel closed"))
                }
                Some((platform, false)) if platform == task.platform => {
                    Err(PublishError::permanent("recording", "nack"))
                }
                _ => {
                    self.tasks.push(task.clone());
                    Ok(())
                }
            }
        }

        async fn close(&mut self) -> Result<(), PublishError> {
            Ok(())
        }
    }

    pub fn options_for(platforms: &[Platform]) -> Arc<DispatchOptions> {
        let queues: BTreeMap<_, _> = platforms
            .iter()
            .map(|p| (*p, default_routing_key(*p)))
            .collect();
        Arc::new(DispatchOptions::new(3, 1, queues).unwrap())
    }

    pub fn all_platforms() -> Arc<DispatchOptions> {
        options_for(&Platform::ALL)
    }
}

#[cfg(test)]
mod config_tests {
    use std::path::PathBuf;

    use config_loader::ConfigLoader;
    use contracts::{AckPolicy, Platform};

    fn shipped_config() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config/crawl-dispatch.toml")
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let config = ConfigLoader::load_from_path(&shipped_config()).unwrap();
        assert_eq!(config.dispatch.default_max_attempts(), 3);
        assert_eq!(config.dispatch.schema_version(), 1);
        assert_eq!(
            config.dispatch.routing_key(Platform::TikTok),
            Some("crawler.tiktok.queue")
        );
        assert_eq!(config.broker.ingress.binding_key, "crawler.#");
        assert_eq!(config.ack.policy, AckPolicy::RequeueTransient);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use serde_json::{Value, json};

    use broker::{AckDecision, decide, decode_request};
    use contracts::payload::*;
    use contracts::registry::{self, SCHEMA_REGISTRY};
    use contracts::{
        AckConfig, AckPolicy, CrawlRequest, DispatchError, Platform, SCHEMA_VERSION_HEADER,
        TaskPayload, TaskType,
    };
    use dispatcher::Dispatcher;
    use dispatcher::mapper::map_payload;

    use crate::support::{RecordingPublisher, all_platforms, options_for};

    /// Fan-out scenario: one request, no platform, two configured platforms
    #[tokio::test]
    async fn test_fan_out_scenario() {
        let mut dispatcher = Dispatcher::new(all_platforms(), RecordingPublisher::default());
        let request = CrawlRequest::new("j1", "research_keyword")
            .with_payload(json!({ "keyword": "phone", "limit": 10 }));

        let tasks = dispatcher.dispatch(request).await.unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].routing_key, "crawler.tiktok.queue");
        assert_eq!(tasks[1].routing_key, "crawler.youtube.queue");
        for task in &tasks {
            assert_eq!(task.job_id, "j1");
            assert_eq!(task.attempt, 1);
            assert_eq!(task.max_attempts, 3);
            assert_eq!(task.schema_version, 1);
            assert_eq!(task.headers[SCHEMA_VERSION_HEADER], Value::from(1));
            assert!(task.emitted_at.timestamp() > 0);
            assert_eq!(task.payload.platform(), task.platform);
        }
        assert_eq!(
            tasks[0].payload,
            TaskPayload::TikTokResearchKeyword(TikTokResearchKeywordPayload {
                keyword: "phone".into(),
                limit: 10,
                ..Default::default()
            })
        );
        assert_eq!(dispatcher.publisher().tasks, tasks);
    }

    #[tokio::test]
    async fn test_dry_run_scenario() {
        let mut dispatcher = Dispatcher::new(all_platforms(), RecordingPublisher::default());
        let request = CrawlRequest::new("j2", "dry_run_keyword")
            .with_platform("youtube")
            .with_payload(json!({
                "keywords": ["phone", "tablet"],
                "limit_per_keyword": 100,
                "include_comments": false,
                "max_comments": 1000,
                "include_channel": true
            }));

        let tasks = dispatcher.dispatch(request).await.unwrap();

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].platform, Platform::YouTube);
        assert_eq!(tasks[0].task_type, TaskType::DryRunKeyword);
        assert_eq!(
            tasks[0].payload,
            TaskPayload::YouTubeResearchAndCrawl(YouTubeResearchAndCrawlPayload {
                keywords: vec!["phone".into(), "tablet".into()],
                limit_per_keyword: registry::DRY_RUN_LIMIT_PER_KEYWORD,
                include_comments: true,
                include_channel: true,
                max_comments: registry::DRY_RUN_MAX_COMMENTS,
                ..Default::default()
            })
        );
    }

    #[tokio::test]
    async fn test_dry_run_caps_on_every_platform() {
        let mut dispatcher = Dispatcher::new(all_platforms(), RecordingPublisher::default());
        let request = CrawlRequest::new("j3", "dry_run_keyword")
            .with_payload(json!({ "keywords": ["x"] }));

        let tasks = dispatcher.dispatch(request).await.unwrap();

        assert_eq!(tasks.len(), 2);
        for task in &tasks {
            let payload = task.payload.to_value();
            assert_eq!(payload["limit_per_keyword"], 3);
            assert_eq!(payload["max_comments"], 5);
            assert_eq!(payload["include_comments"], true);
        }
    }

    #[tokio::test]
    async fn test_empty_task_type_publishes_nothing() {
        let mut dispatcher = Dispatcher::new(all_platforms(), RecordingPublisher::default());
        let request = CrawlRequest::new("j4", "").with_payload(json!({ "keyword": "x" }));

        let err = dispatcher.dispatch(request).await.unwrap_err();

        assert!(matches!(err, DispatchError::InvalidInput { .. }));
        assert_eq!(dispatcher.publisher().attempts, 0);
    }

    #[tokio::test]
    async fn test_unknown_platform_is_unknown_route() {
        let mut dispatcher = Dispatcher::new(all_platforms(), RecordingPublisher::default());
        let request = CrawlRequest::new("j5", "research_keyword")
            .with_platform("vimeo")
            .with_payload(json!({ "keyword": "x" }));

        let err = dispatcher.dispatch(request).await.unwrap_err();

        assert!(matches!(err, DispatchError::UnknownRoute { .. }));
        assert_eq!(dispatcher.publisher().attempts, 0);
    }

    #[tokio::test]
    async fn test_unknown_task_type_is_unknown_route() {
        let mut dispatcher = Dispatcher::new(all_platforms(), RecordingPublisher::default());
        let request = CrawlRequest::new("j6", "scrape_profiles")
            .with_payload(json!({ "keyword": "x" }));

        let err = dispatcher.dispatch(request).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownRoute { .. }));
    }

    #[tokio::test]
    async fn test_mapping_failure_is_all_or_nothing() {
        let mut dispatcher = Dispatcher::new(all_platforms(), RecordingPublisher::default());
        // `max_comments` has the wrong type for both platforms
        let request = CrawlRequest::new("j7", "crawl_links").with_payload(json!({
            "video_urls": ["u1"],
            "max_comments": "lots"
        }));

        let err = dispatcher.dispatch(request).await.unwrap_err();

        assert!(matches!(err, DispatchError::InvalidInput { .. }));
        assert_eq!(dispatcher.publisher().attempts, 0);
        assert!(dispatcher.publisher().tasks.is_empty());
    }

    #[tokio::test]
    async fn test_missing_payload_is_invalid_input() {
        let mut dispatcher = Dispatcher::new(all_platforms(), RecordingPublisher::default());
        let err = dispatcher
            .dispatch(CrawlRequest::new("j8", "crawl_links"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_publish_failure_aborts_remaining_platforms() {
        let publisher = RecordingPublisher::failing_on(Platform::TikTok, true);
        let mut dispatcher = Dispatcher::new(all_platforms(), publisher);
        let request = CrawlRequest::new("j9", "research_keyword")
            .with_payload(json!({ "keyword": "phone" }));

        let err = dispatcher.dispatch(request).await.unwrap_err();

        match &err {
            DispatchError::Publish { platform, source } => {
                assert_eq!(platform, "tiktok");
                assert!(source.is_transient());
            }
            other => panic!("expected publish error, got {other:?}"),
        }
        // tiktok sorts first, so youtube is never attempted
        assert_eq!(dispatcher.publisher().attempts, 1);
        assert!(dispatcher.publisher().tasks.is_empty());
    }

    #[tokio::test]
    async fn test_partial_publish_keeps_earlier_tasks() {
        let publisher = RecordingPublisher::failing_on(Platform::YouTube, false);
        let mut dispatcher = Dispatcher::new(all_platforms(), publisher);
        let request = CrawlRequest::new("j10", "research_keyword")
            .with_payload(json!({ "keyword": "phone" }));

        let err = dispatcher.dispatch(request).await.unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(dispatcher.publisher().tasks.len(), 1);
        assert_eq!(dispatcher.publisher().tasks[0].platform, Platform::TikTok);
    }

    #[tokio::test]
    async fn test_attempt_defaults_and_explicit_values() {
        let mut dispatcher = Dispatcher::new(all_platforms(), RecordingPublisher::default());

        let mut request = CrawlRequest::new("j11", "crawl_links")
            .with_platform("tiktok")
            .with_payload(json!({ "video_urls": ["u1"] }));
        request.attempt = 0;
        request.max_attempts = -5;
        let tasks = dispatcher.dispatch(request).await.unwrap();
        assert_eq!((tasks[0].attempt, tasks[0].max_attempts), (1, 3));

        let emitted = Utc.with_ymd_and_hms(2025, 2, 3, 4, 5, 6).unwrap();
        let mut request = CrawlRequest::new("j12", "crawl_links")
            .with_platform("tiktok")
            .with_payload(json!({ "video_urls": ["u1"] }));
        request.attempt = 2;
        request.max_attempts = 6;
        request.time_range = Some(30);
        request.emitted_at = Some(emitted);
        let tasks = dispatcher.dispatch(request).await.unwrap();
        assert_eq!((tasks[0].attempt, tasks[0].max_attempts), (2, 6));
        assert_eq!(tasks[0].time_range, Some(30));
        assert_eq!(tasks[0].emitted_at, emitted);
    }

    #[tokio::test]
    async fn test_fan_out_follows_configured_platforms() {
        let mut dispatcher = Dispatcher::new(
            options_for(&[Platform::YouTube]),
            RecordingPublisher::default(),
        );
        let request = CrawlRequest::new("j13", "research_keyword")
            .with_payload(json!({ "keyword": "phone" }));

        let tasks = dispatcher.dispatch(request).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].platform, Platform::YouTube);

        let explicit = CrawlRequest::new("j14", "research_keyword")
            .with_platform("tiktok")
            .with_payload(json!({ "keyword": "phone" }));
        let err = dispatcher.dispatch(explicit).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownRoute { .. }));
    }

    fn sample_payload(platform: Platform, task_type: TaskType) -> TaskPayload {
        let keywords = vec!["phone".to_string(), "tablet".to_string()];
        let urls = vec!["https://example.com/v/1".to_string()];
        let dry_run = task_type == TaskType::DryRunKeyword;
        let (limit_per_keyword, max_comments) = if dry_run { (3, 5) } else { (20, 50) };

        match (platform, task_type) {
            (Platform::YouTube, TaskType::ResearchKeyword) => {
                TaskPayload::YouTubeResearchKeyword(YouTubeResearchKeywordPayload {
                    keyword: "phone".into(),
                    limit: 10,
                    sort_by: "date".into(),
                    time_range: 7,
                })
            }
            (Platform::YouTube, TaskType::CrawlLinks) => {
                TaskPayload::YouTubeCrawlLinks(YouTubeCrawlLinksPayload {
                    video_urls: urls,
                    include_channel: true,
                    include_comments: true,
                    max_comments,
                    download_media: true,
                    media_type: "video".into(),
                    time_range: 3,
                })
            }
            (Platform::YouTube, _) => {
                TaskPayload::YouTubeResearchAndCrawl(YouTubeResearchAndCrawlPayload {
                    keywords,
                    limit_per_keyword,
                    include_comments: true,
                    include_channel: true,
                    max_comments,
                    download_media: false,
                    time_range: 14,
                })
            }
            (Platform::TikTok, TaskType::ResearchKeyword) => {
                TaskPayload::TikTokResearchKeyword(TikTokResearchKeywordPayload {
                    keyword: "phone".into(),
                    limit: 10,
                    sort_by: "likes".into(),
                    time_range: 7,
                })
            }
            (Platform::TikTok, TaskType::CrawlLinks) => {
                TaskPayload::TikTokCrawlLinks(TikTokCrawlLinksPayload {
                    video_urls: urls,
                    include_comments: true,
                    include_creator: true,
                    max_comments,
                    download_media: true,
                    media_type: "video".into(),
                    media_save_dir: "/data/media".into(),
                    time_range: 3,
                })
            }
            (Platform::TikTok, _) => {
                TaskPayload::TikTokResearchAndCrawl(TikTokResearchAndCrawlPayload {
                    keywords,
                    limit_per_keyword,
                    sort_by: "views".into(),
                    include_comments: true,
                    include_creator: true,
                    max_comments,
                    download_media: true,
                    media_type: "image".into(),
                    media_save_dir: "/data/media".into(),
                    time_range: 14,
                })
            }
        }
    }

    /// typed -> untyped -> mapper gives back the same typed payload
    #[test]
    fn test_round_trip_every_registered_pair() {
        for entry in SCHEMA_REGISTRY {
            let original = sample_payload(entry.platform, entry.task_type);
            let Value::Object(bag) = original.to_value() else {
                panic!("payload for {}/{} is not an object", entry.platform, entry.task_type);
            };

            let (task_type, mapped) =
                map_payload(entry.platform, entry.task_type.as_str(), Some(&bag)).unwrap();

            assert_eq!(task_type, entry.task_type);
            assert_eq!(
                mapped, original,
                "round trip failed for {}/{}",
                entry.platform, entry.task_type
            );
        }
    }

    /// Delivery body + routing key -> dispatch -> ack decision
    #[tokio::test]
    async fn test_delivery_to_ack_decision() {
        let ack = AckConfig {
            policy: AckPolicy::RequeueTransient,
            max_redeliveries: 2,
            requeue_delay_ms: 0,
        };
        let body = br#"{"job_id":"j15","payload":{"video_urls":["u1"]}}"#;
        let request = decode_request(body, "crawler.youtube.crawl_links", true).unwrap();

        let mut ok = Dispatcher::new(all_platforms(), RecordingPublisher::default());
        let result = ok.dispatch(request.clone()).await;
        assert_eq!(result.as_ref().map(Vec::len).ok(), Some(1));
        assert_eq!(decide(result.as_ref().err(), &ack, 0), AckDecision::Ack);

        let mut down = Dispatcher::new(
            all_platforms(),
            RecordingPublisher::failing_on(Platform::YouTube, true),
        );
        let result = down.dispatch(request).await;
        assert_eq!(decide(result.as_ref().err(), &ack, 0), AckDecision::Requeue);
        assert_eq!(decide(result.as_ref().err(), &ack, 2), AckDecision::Ack);
    }

    #[tokio::test]
    async fn test_shared_options_across_dispatchers() {
        let options = all_platforms();
        let mut a = Dispatcher::new(Arc::clone(&options), RecordingPublisher::default());
        let mut b = Dispatcher::new(Arc::clone(&options), RecordingPublisher::default());
        let request = CrawlRequest::new("j16", "research_keyword")
            .with_payload(json!({ "keyword": "phone" }));

        let first = a.dispatch(request.clone()).await.unwrap();
        let second = b.dispatch(request).await.unwrap();
        let keys = |tasks: &[contracts::CollectorTask]| {
            tasks.iter().map(|t| t.routing_key.clone()).collect::<Vec<_>>()
        };
        assert_eq!(keys(&first), keys(&second));
        assert_eq!(Arc::strong_count(&options), 3);
    }
}
