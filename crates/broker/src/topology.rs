//! Exchange / queue declaration
//!
//! All declarations are durable and idempotent; running them against an
//! existing topology with the same settings is a no-op on the broker.

use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{Channel, ExchangeKind};
use tracing::{info, instrument};

use contracts::{BrokerConfig, DispatchOptions, QueueType};

use crate::error::BrokerError;

/// Durable exchange, idempotent
pub async fn declare_exchange(
    channel: &Channel,
    name: &str,
    kind: ExchangeKind,
) -> Result<(), BrokerError> {
    channel
        .exchange_declare(
            name,
            kind,
            ExchangeDeclareOptions {
                durable: true,
                ..ExchangeDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| BrokerError::topology(format!("exchange '{name}'"), e))
}

/// `x-queue-type` declare argument
pub const QUEUE_TYPE_ARGUMENT: &str = "x-queue-type";

/// Declare arguments for a queue of the given type
pub fn queue_arguments(queue_type: QueueType) -> FieldTable {
    let mut arguments = FieldTable::default();
    arguments.insert(
        ShortString::from(QUEUE_TYPE_ARGUMENT),
        AMQPValue::LongString(LongString::from(queue_type.as_str())),
    );
    arguments
}

/// Durable queue bound to `exchange` with `binding_key`
pub async fn declare_bound_queue(
    channel: &Channel,
    queue: &str,
    exchange: &str,
    binding_key: &str,
    arguments: FieldTable,
) -> Result<(), BrokerError> {
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            arguments,
        )
        .await
        .map_err(|e| BrokerError::topology(format!("queue '{queue}'"), e))?;

    channel
        .queue_bind(
            queue,
            exchange,
            binding_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| {
            let what = format!("binding '{queue}' <- '{exchange}' ({binding_key})");
            BrokerError::topology(what, e)
        })
}

/// Declare the full topology
///
/// - ingress: topic exchange + durable queue (classic or quorum) bound with
///   the binding pattern
/// - egress: direct exchange, plus one queue per platform named after its
///   routing key when `declare_platform_queues` is set
#[instrument(name = "broker_declare_topology", skip_all)]
pub async fn declare_topology(
    channel: &Channel,
    broker: &BrokerConfig,
    dispatch: &DispatchOptions,
) -> Result<(), BrokerError> {
    let ingress = &broker.ingress;
    declare_exchange(channel, &ingress.exchange, ExchangeKind::Topic).await?;
    declare_bound_queue(
        channel,
        &ingress.queue,
        &ingress.exchange,
        &ingress.binding_key,
        queue_arguments(ingress.queue_type),
    )
    .await?;

    let egress = &broker.egress;
    declare_exchange(channel, &egress.exchange, ExchangeKind::Direct).await?;

    if broker.declare_platform_queues {
        for routing_key in dispatch.platform_queues().values() {
            declare_bound_queue(
                channel,
                routing_key,
                &egress.exchange,
                routing_key,
                FieldTable::default(),
            )
            .await?;
        }
    }

    info!(
        ingress_exchange = %ingress.exchange,
        ingress_queue = %ingress.queue,
        ingress_queue_type = ingress.queue_type.as_str(),
        egress_exchange = %egress.exchange,
        platform_queues = dispatch.platform_queues().len(),
        "Broker topology declared"
    );
    Ok(())
}
