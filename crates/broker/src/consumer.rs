//! IngressConsumer - ingress queue -> dispatcher -> ack/nack

use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Consumer};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use contracts::{AckConfig, IngressConfig, TaskPublisher};
use dispatcher::Dispatcher;
use observability::RunningStats;

use crate::delivery::{
    AckDecision, RedeliveryTracker, decide, decode_request, redelivery_count, retry_key,
};
use crate::error::BrokerError;

/// Totals reported when the consumer stops
#[derive(Debug, Clone, Default)]
pub struct ConsumerStats {
    pub deliveries: u64,
    pub undecodable: u64,
    pub dispatched: u64,
    pub failed: u64,
    pub requeued: u64,
    pub latency: RunningStats,
}

/// Per-delivery logic, independent of the AMQP channel
///
/// `process` returns only once every publish for the delivery has completed,
/// so the caller can acknowledge right after it.
pub struct DeliveryHandler<P> {
    dispatcher: Dispatcher<P>,
    ingress: IngressConfig,
    ack: AckConfig,
    tracker: RedeliveryTracker,
    stats: ConsumerStats,
}

impl<P: TaskPublisher> DeliveryHandler<P> {
    pub fn new(dispatcher: Dispatcher<P>, ingress: IngressConfig, ack: AckConfig) -> Self {
        Self {
            dispatcher,
            ingress,
            ack,
            tracker: RedeliveryTracker::new(),
            stats: ConsumerStats::default(),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<P> {
        &self.dispatcher
    }

    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    pub fn ack_config(&self) -> &AckConfig {
        &self.ack
    }

    /// Decode, dispatch and decide the acknowledgement of one delivery
    pub async fn process(
        &mut self,
        body: &[u8],
        routing_key: &str,
        headers: Option<&FieldTable>,
        redelivered: bool,
    ) -> AckDecision {
        self.stats.deliveries += 1;

        let backfill = self.ingress.backfill_from_routing_key;
        let request = match decode_request(body, routing_key, backfill) {
            Ok(request) => request,
            Err(e) => {
                self.stats.undecodable += 1;
                observability::record_request_undecodable();
                warn!(routing_key = %routing_key, error = %e, "Dropping undecodable delivery");
                return AckDecision::Ack;
            }
        };

        observability::record_request_received();
        let job_id = request.job_id.clone();
        let result = self.dispatcher.dispatch(request).await;
        observability::record_dispatch_outcome(&result);

        let key = retry_key(routing_key, body);
        let redeliveries = self
            .tracker
            .redeliveries(key, redelivery_count(headers, redelivered));
        let decision = decide(result.as_ref().err(), &self.ack, redeliveries);
        self.tracker.record(key, decision);

        match &result {
            Ok(tasks) => {
                self.stats.dispatched += 1;
                info!(job_id = %job_id, tasks = tasks.len(), "Request dispatched");
            }
            Err(e) if e.is_transient() => {
                self.stats.failed += 1;
                error!(
                    job_id = %job_id,
                    kind = e.kind(),
                    error = %e,
                    redeliveries,
                    decision = decision.as_str(),
                    "Dispatch failed"
                );
            }
            Err(e) => {
                self.stats.failed += 1;
                warn!(
                    job_id = %job_id,
                    kind = e.kind(),
                    error = %e,
                    "Dropping request"
                );
            }
        }

        if decision == AckDecision::Requeue {
            self.stats.requeued += 1;
        }
        observability::record_ack_decision(decision.as_str());
        decision
    }

    fn record_latency(&mut self, elapsed_ms: f64) {
        self.stats.latency.push(elapsed_ms);
        observability::record_dispatch_latency_ms(elapsed_ms);
    }

    /// Close the publisher and hand back the totals
    pub async fn finish(mut self) -> ConsumerStats {
        if let Err(e) = self.dispatcher.close().await {
            warn!(error = %e, "Publisher close failed");
        }
        self.stats
    }
}

/// Single-task consumer of the ingress queue
///
/// Deliveries are handled one at a time and acknowledged only after every
/// publish for them has completed.
pub struct IngressConsumer<P> {
    channel: Channel,
    consumer: Consumer,
    queue: String,
    handler: DeliveryHandler<P>,
}

impl<P: TaskPublisher> IngressConsumer<P> {
    /// Apply prefetch and start consuming the ingress queue
    #[instrument(
        name = "ingress_consumer_start",
        skip(channel, dispatcher, ingress, ack),
        fields(queue = %ingress.queue)
    )]
    pub async fn start(
        channel: Channel,
        prefetch: u16,
        dispatcher: Dispatcher<P>,
        ingress: IngressConfig,
        ack: AckConfig,
    ) -> Result<Self, BrokerError> {
        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|source| BrokerError::Channel { source })?;

        let consumer = channel
            .basic_consume(
                &ingress.queue,
                &ingress.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::consume(&ingress.queue, e))?;

        info!(
            prefetch,
            consumer_tag = %ingress.consumer_tag,
            ack_policy = ?ack.policy,
            max_redeliveries = ack.max_redeliveries,
            "Ingress consumer started"
        );

        Ok(Self {
            channel,
            consumer,
            queue: ingress.queue.clone(),
            handler: DeliveryHandler::new(dispatcher, ingress, ack),
        })
    }

    /// Consume until cancelled or the stream ends
    ///
    /// Cancellation is only observed between deliveries; a delivery that is
    /// being dispatched always runs to its ack.
    #[instrument(name = "ingress_consumer_run", skip_all, fields(queue = %self.queue))]
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<ConsumerStats, BrokerError> {
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping consumer");
                    break;
                }
                next = self.consumer.next() => next,
            };

            let Some(delivery) = next else {
                warn!("Consumer stream ended");
                break;
            };
            let delivery = delivery.map_err(|e| BrokerError::consume(&self.queue, e))?;
            self.handle(delivery).await?;
        }

        let stats = self.handler.finish().await;
        if self.channel.status().connected() {
            if let Err(e) = self.channel.close(200, "shutdown").await {
                warn!(error = %e, "Consumer channel close failed");
            }
        }

        info!(
            deliveries = stats.deliveries,
            dispatched = stats.dispatched,
            failed = stats.failed,
            undecodable = stats.undecodable,
            requeued = stats.requeued,
            latency = %stats.latency.summary(),
            "Ingress consumer stopped"
        );
        Ok(stats)
    }

    async fn handle(&mut self, delivery: Delivery) -> Result<(), BrokerError> {
        let started = Instant::now();
        let decision = self
            .handler
            .process(
                &delivery.data,
                delivery.routing_key.as_str(),
                delivery.properties.headers().as_ref(),
                delivery.redelivered,
            )
            .await;

        match decision {
            AckDecision::Ack => delivery.ack(BasicAckOptions::default()).await,
            AckDecision::Requeue => {
                let delay = self.handler.ack_config().requeue_delay_ms;
                if delay > 0 {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                delivery
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..BasicNackOptions::default()
                    })
                    .await
            }
        }
        .map_err(|source| BrokerError::Ack { source })?;

        self.handler
            .record_latency(started.elapsed().as_secs_f64() * 1000.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        AckPolicy, CollectorTask, DispatchOptions, Platform, PublishError, default_routing_key,
    };
    use std::collections::BTreeMap;
    use std::sync::Arc;

    /// Records tasks; fails every publish with a transient error when `down`
    #[derive(Default)]
    struct RecordingPublisher {
        tasks: Vec<CollectorTask>,
        down: bool,
        closed: bool,
    }

    impl TaskPublisher for RecordingPublisher {
        fn name(&self) -> &str {
            "recording"
        }

        async fn publish(&mut self, task: &CollectorTask) -> Result<(), PublishError> {
            if self.down {
                return Err(PublishError::transient("recording", "channel closed"));
            }
            self.tasks.push(task.clone());
            Ok(())
        }

        async fn close(&mut self) -> Result<(), PublishError> {
            self.closed = true;
            Ok(())
        }
    }

    fn handler(publisher: RecordingPublisher) -> DeliveryHandler<RecordingPublisher> {
        let queues: BTreeMap<_, _> = Platform::ALL
            .into_iter()
            .map(|p| (p, default_routing_key(p)))
            .collect();
        let options = Arc::new(DispatchOptions::new(3, 1, queues).unwrap());
        let ack = AckConfig {
            policy: AckPolicy::RequeueTransient,
            max_redeliveries: 3,
            requeue_delay_ms: 0,
        };
        DeliveryHandler::new(
            Dispatcher::new(options, publisher),
            IngressConfig::default(),
            ack,
        )
    }

    const FAN_OUT: &[u8] =
        br#"{"job_id":"j1","task_type":"research_keyword","payload":{"keyword":"phone"}}"#;

    #[tokio::test]
    async fn test_undecodable_body_is_acked() {
        let mut handler = handler(RecordingPublisher::default());
        let decision = handler
            .process(b"not json", "crawler.youtube.crawl_links", None, false)
            .await;

        assert_eq!(decision, AckDecision::Ack);
        assert_eq!(handler.stats().deliveries, 1);
        assert_eq!(handler.stats().undecodable, 1);
        assert_eq!(handler.dispatcher().snapshot().requests, 0);
    }

    #[tokio::test]
    async fn test_ack_follows_every_publish() {
        let mut handler = handler(RecordingPublisher::default());
        let decision = handler.process(FAN_OUT, "crawler.any", None, false).await;

        assert_eq!(decision, AckDecision::Ack);
        let published: Vec<_> = handler
            .dispatcher()
            .publisher()
            .tasks
            .iter()
            .map(|t| t.routing_key.as_str())
            .collect();
        assert_eq!(published, vec!["crawler.tiktok.queue", "crawler.youtube.queue"]);
        assert_eq!(handler.stats().dispatched, 1);
        assert_eq!(handler.stats().requeued, 0);
    }

    #[tokio::test]
    async fn test_terminal_failure_is_acked() {
        let mut handler = handler(RecordingPublisher::default());
        let body = br#"{"job_id":"j2","task_type":"research_keyword","platform":"vimeo"}"#;
        let decision = handler.process(body, "crawler.any", None, false).await;

        assert_eq!(decision, AckDecision::Ack);
        assert_eq!(handler.stats().failed, 1);
        assert_eq!(handler.stats().requeued, 0);
    }

    #[tokio::test]
    async fn test_transient_failure_requeued_then_dropped() {
        let mut handler = handler(RecordingPublisher {
            down: true,
            ..Default::default()
        });

        let mut decisions = Vec::new();
        for attempt in 0..10 {
            let decision = handler
                .process(FAN_OUT, "crawler.any", None, attempt > 0)
                .await;
            decisions.push(decision);
            if decision == AckDecision::Ack {
                break;
            }
        }

        assert_eq!(
            decisions,
            vec![
                AckDecision::Requeue,
                AckDecision::Requeue,
                AckDecision::Requeue,
                AckDecision::Ack
            ]
        );
        assert_eq!(handler.stats().requeued, 3);
        assert_eq!(handler.stats().failed, 4);
        assert_eq!(handler.stats().deliveries, 4);
    }

    #[tokio::test]
    async fn test_finish_returns_totals() {
        let mut handler = handler(RecordingPublisher::default());
        handler.process(FAN_OUT, "crawler.any", None, false).await;
        assert!(!handler.dispatcher().publisher().closed);

        let stats = handler.finish().await;
        assert_eq!(stats.deliveries, 1);
        assert_eq!(stats.dispatched, 1);
    }
}
