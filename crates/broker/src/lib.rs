//! # Broker
//!
//! RabbitMQ (AMQP 0-9-1) adapter.
//!
//! - `AmqpPublisher`: confirm-mode `TaskPublisher` on the egress exchange
//! - `IngressConsumer`: ingress queue loop with policy-driven ack/nack
//! - `DeliveryHandler`: decode -> dispatch -> ack decision, without a channel
//! - `topology`: durable exchange/queue declaration
//! - `delivery`: body decoding, routing-key backfill and ack decisions

pub mod consumer;
pub mod delivery;
pub mod error;
pub mod publisher;
pub mod topology;

pub use consumer::{ConsumerStats, DeliveryHandler, IngressConsumer};
pub use delivery::{
    AckDecision, RedeliveryTracker, decide, decode_request, parse_routing_key, redelivery_count,
    retry_key,
};
pub use error::BrokerError;
pub use publisher::{AmqpPublisher, ConfirmOutcome};
pub use topology::{declare_topology, queue_arguments};

use lapin::{Connection, ConnectionProperties};
use tracing::{info, instrument};

/// Open an AMQP connection
#[instrument(name = "broker_connect", skip_all)]
pub async fn connect(url: &str, connection_name: &str) -> Result<Connection, BrokerError> {
    let properties =
        ConnectionProperties::default().with_connection_name(connection_name.to_string().into());
    let connection = Connection::connect(url, properties)
        .await
        .map_err(|source| BrokerError::Connect { source })?;
    info!(connection_name, "Connected to broker");
    Ok(connection)
}

/// Open a fresh channel on a connection
pub async fn open_channel(connection: &Connection) -> Result<lapin::Channel, BrokerError> {
    connection
        .create_channel()
        .await
        .map_err(|source| BrokerError::Channel { source })
}
