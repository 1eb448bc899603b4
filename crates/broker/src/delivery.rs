//! Delivery decoding and acknowledgement decisions
//!
//! Kept free of channel handles so that every rule here is unit-testable.

use lapin::types::{AMQPValue, FieldTable, ShortString};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use contracts::{AckConfig, AckPolicy, CrawlRequest, DispatchError, Platform, TaskType};

/// Quorum queues count redeliveries in this header
pub const DELIVERY_COUNT_HEADER: &str = "x-delivery-count";

const ROUTING_KEY_PREFIX: &str = "crawler";

/// Upper bound on messages the tracker remembers at once
const MAX_TRACKED_MESSAGES: usize = 10_000;

/// What to do with a processed delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    Ack,
    /// Nack with requeue
    Requeue,
}

impl AckDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Requeue => "requeue",
        }
    }
}

/// Split `crawler.<platform>.<task_type>` into its two segments
pub fn parse_routing_key(routing_key: &str) -> Option<(&str, &str)> {
    let mut parts = routing_key.split('.');
    let (prefix, platform, task_type) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || prefix != ROUTING_KEY_PREFIX {
        return None;
    }
    if platform.is_empty() || task_type.is_empty() {
        return None;
    }
    Some((platform, task_type))
}

/// Deserialize a delivery body
///
/// With `backfill`, an empty `platform` or `task_type` is taken from the
/// routing key when the segment names a known value. Fields present in the
/// body always win.
pub fn decode_request(
    body: &[u8],
    routing_key: &str,
    backfill: bool,
) -> Result<CrawlRequest, serde_json::Error> {
    let mut request: CrawlRequest = serde_json::from_slice(body)?;
    if !backfill {
        return Ok(request);
    }

    if let Some((platform, task_type)) = parse_routing_key(routing_key) {
        if request.platform.is_empty() && platform.parse::<Platform>().is_ok() {
            request.platform = platform.to_string();
        }
        if request.task_type.is_empty() && task_type.parse::<TaskType>().is_ok() {
            request.task_type = task_type.to_string();
        }
    }
    Ok(request)
}

/// Number of times this message was delivered before
///
/// Uses the quorum-queue counter when present, otherwise falls back to the
/// `redelivered` flag (which only says "at least once").
pub fn redelivery_count(headers: Option<&FieldTable>, redelivered: bool) -> u32 {
    let counted = headers
        .and_then(|h| h.inner().get(&ShortString::from(DELIVERY_COUNT_HEADER)))
        .and_then(amqp_to_u32);

    match counted {
        Some(count) => count,
        None if redelivered => 1,
        None => 0,
    }
}

fn amqp_to_u32(value: &AMQPValue) -> Option<u32> {
    let wide: i64 = match value {
        AMQPValue::ShortShortInt(v) => i64::from(*v),
        AMQPValue::ShortShortUInt(v) => i64::from(*v),
        AMQPValue::ShortInt(v) => i64::from(*v),
        AMQPValue::ShortUInt(v) => i64::from(*v),
        AMQPValue::LongInt(v) => i64::from(*v),
        AMQPValue::LongUInt(v) => i64::from(*v),
        AMQPValue::LongLongInt(v) => *v,
        _ => return None,
    };
    u32::try_from(wide).ok()
}

/// Identity of a message across redeliveries: routing key plus body
pub fn retry_key(routing_key: &str, body: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    routing_key.hash(&mut hasher);
    body.hash(&mut hasher);
    hasher.finish()
}

/// Requeues issued by this consumer, per message
///
/// Classic queues only set the `redelivered` flag, so the broker-side count
/// never passes 1. Counting our own requeues keeps `max_redeliveries`
/// reachable on any queue type.
#[derive(Debug, Default)]
pub struct RedeliveryTracker {
    requeues: HashMap<u64, u32>,
}

impl RedeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Larger of the broker's count and the requeues seen here
    pub fn redeliveries(&self, key: u64, broker_count: u32) -> u32 {
        self.requeues
            .get(&key)
            .copied()
            .unwrap_or(0)
            .max(broker_count)
    }

    /// Remember the decision taken for a message
    pub fn record(&mut self, key: u64, decision: AckDecision) {
        match decision {
            AckDecision::Ack => {
                self.requeues.remove(&key);
            }
            AckDecision::Requeue => {
                if self.requeues.len() >= MAX_TRACKED_MESSAGES
                    && !self.requeues.contains_key(&key)
                {
                    self.requeues.clear();
                }
                *self.requeues.entry(key).or_insert(0) += 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.requeues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requeues.is_empty()
    }
}

/// Decide how to acknowledge a dispatched delivery
///
/// Invalid input and unknown routes are never redelivered. A transient
/// publish failure is requeued under `requeue_transient` until the message
/// has been redelivered `max_redeliveries` times.
pub fn decide(
    outcome: Option<&DispatchError>,
    ack: &AckConfig,
    redeliveries: u32,
) -> AckDecision {
    let Some(err) = outcome else {
        return AckDecision::Ack;
    };

    match ack.policy {
        AckPolicy::Always => AckDecision::Ack,
        AckPolicy::RequeueTransient => {
            if err.is_transient() && redeliveries < ack.max_redeliveries {
                AckDecision::Requeue
            } else {
                AckDecision::Ack
            }
        }
    }
}
