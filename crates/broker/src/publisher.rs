//! AmqpPublisher - publishes CollectorTasks to the egress exchange

use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Channel, Connection, ExchangeKind};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use contracts::{CollectorTask, PublishError, TaskPublisher};

use crate::error::BrokerError;
use crate::topology::declare_exchange;

/// Persistent delivery
const DELIVERY_MODE_PERSISTENT: u8 = 2;
const CONTENT_TYPE_JSON: &str = "application/json";

/// Publisher over a confirm-mode channel
///
/// Owns its channel and reopens it on the shared connection when the broker
/// closes it, so one channel error does not fail every later publish.
pub struct AmqpPublisher {
    name: String,
    connection: Arc<Connection>,
    channel: Channel,
    exchange: String,
}

impl AmqpPublisher {
    /// Open a confirm-mode channel and make sure the exchange exists
    pub async fn new(
        connection: Arc<Connection>,
        exchange: impl Into<String>,
    ) -> Result<Self, BrokerError> {
        let exchange = exchange.into();
        let channel = open_confirm_channel(&connection, &exchange).await?;

        Ok(Self {
            name: "amqp".to_string(),
            connection,
            channel,
            exchange,
        })
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    fn properties(task: &CollectorTask) -> BasicProperties {
        let timestamp = u64::try_from(task.emitted_at.timestamp()).unwrap_or(0);
        BasicProperties::default()
            .with_content_type(ShortString::from(CONTENT_TYPE_JSON))
            .with_delivery_mode(DELIVERY_MODE_PERSISTENT)
            .with_message_id(ShortString::from(task.message_id()))
            .with_timestamp(timestamp)
            .with_headers(to_field_table(&task.headers))
    }

    fn classify(&self, err: lapin::Error) -> PublishError {
        if is_transient(&err) {
            PublishError::transient(&self.name, err.to_string())
        } else {
            PublishError::permanent(&self.name, err.to_string())
        }
    }

    /// Reopen the channel if the broker closed it
    async fn ensure_channel(&mut self) -> Result<(), PublishError> {
        if self.channel.status().connected() {
            return Ok(());
        }
        if !self.connection.status().connected() {
            return Err(PublishError::transient(&self.name, "connection is closed"));
        }

        warn!(exchange = %self.exchange, "Publisher channel closed, reopening");
        self.channel = open_confirm_channel(&self.connection, &self.exchange)
            .await
            .map_err(|e| PublishError::transient(&self.name, format!("reopen channel: {e}")))?;
        Ok(())
    }
}

async fn open_confirm_channel(
    connection: &Connection,
    exchange: &str,
) -> Result<Channel, BrokerError> {
    let channel = connection
        .create_channel()
        .await
        .map_err(|source| BrokerError::Channel { source })?;
    channel
        .confirm_select(ConfirmSelectOptions::default())
        .await
        .map_err(|source| BrokerError::Channel { source })?;
    declare_exchange(&channel, exchange, ExchangeKind::Direct).await?;
    Ok(channel)
}

/// Broker verdict on one publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Delivered,
    /// Mandatory publish that matched no queue
    Returned { reply_code: u16, reply_text: String },
    Rejected,
}

impl ConfirmOutcome {
    pub fn from_confirmation(confirmation: &Confirmation) -> Self {
        match confirmation {
            Confirmation::Ack(Some(returned)) => Self::Returned {
                reply_code: returned.reply_code,
                reply_text: returned.reply_text.as_str().to_string(),
            },
            Confirmation::Ack(None) | Confirmation::NotRequested => Self::Delivered,
            Confirmation::Nack(_) => Self::Rejected,
        }
    }

    /// Unroutable and nacked messages are both permanent failures
    pub fn into_result(self, publisher: &str, routing_key: &str) -> Result<(), PublishError> {
        match self {
            Self::Delivered => Ok(()),
            Self::Returned {
                reply_code,
                reply_text,
            } => Err(PublishError::permanent(
                publisher,
                format!("unroutable '{routing_key}': {reply_code} {reply_text}"),
            )),
            Self::Rejected => Err(PublishError::permanent(
                publisher,
                "broker rejected the message (nack)",
            )),
        }
    }
}

/// Channel/connection loss is worth a redelivery; anything else is not
pub fn is_transient(err: &lapin::Error) -> bool {
    matches!(
        err,
        lapin::Error::InvalidChannelState(_)
            | lapin::Error::InvalidConnectionState(_)
            | lapin::Error::IOError(_)
            | lapin::Error::MissingHeartbeatError
    )
}

/// Task headers as an AMQP table
pub fn to_field_table(headers: &BTreeMap<String, Value>) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in headers {
        table.insert(ShortString::from(key.as_str()), to_amqp_value(value));
    }
    table
}

fn to_amqp_value(value: &Value) -> AMQPValue {
    match value {
        Value::Null => AMQPValue::Void,
        Value::Bool(b) => AMQPValue::Boolean(*b),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => AMQPValue::LongLongInt(i),
            (None, Some(f)) => AMQPValue::Double(f),
            (None, None) => AMQPValue::LongString(LongString::from(n.to_string())),
        },
        Value::String(s) => AMQPValue::LongString(LongString::from(s.as_str())),
        other => AMQPValue::LongString(LongString::from(other.to_string())),
    }
}

impl TaskPublisher for AmqpPublisher {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "amqp_publisher_publish",
        skip(self, task),
        fields(
            exchange = %self.exchange,
            routing_key = %task.routing_key,
            message_id = %task.message_id()
        )
    )]
    async fn publish(&mut self, task: &CollectorTask) -> Result<(), PublishError> {
        self.ensure_channel().await?;

        let body = task
            .to_json()
            .map_err(|e| PublishError::permanent(&self.name, format!("serialize task: {e}")))?;

        let confirm = self
            .channel
            .basic_publish(
                &self.exchange,
                &task.routing_key,
                BasicPublishOptions {
                    mandatory: true,
                    ..BasicPublishOptions::default()
                },
                &body,
                Self::properties(task),
            )
            .await
            .map_err(|e| self.classify(e))?;

        let confirmation = confirm.await.map_err(|e| self.classify(e))?;
        ConfirmOutcome::from_confirmation(&confirmation)
            .into_result(&self.name, &task.routing_key)?;
        debug!(bytes = body.len(), "Task confirmed by broker");
        Ok(())
    }

    #[instrument(name = "amqp_publisher_close", skip(self))]
    async fn close(&mut self) -> Result<(), PublishError> {
        if self.channel.status().connected() {
            self.channel
                .close(200, "shutdown")
                .await
                .map_err(|e| self.classify(e))?;
        }
        info!(exchange = %self.exchange, "AmqpPublisher closed");
        Ok(())
    }
}
