//! Broker error types

use thiserror::Error;

/// Connection, topology and consume failures
///
/// Publish failures are not here: they surface as `PublishError` through
/// the dispatcher so the ack policy can classify them.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("failed to connect to broker: {source}")]
    Connect {
        #[source]
        source: lapin::Error,
    },

    #[error("failed to open channel: {source}")]
    Channel {
        #[source]
        source: lapin::Error,
    },

    /// Exchange/queue declaration or binding
    #[error("topology error ({what}): {source}")]
    Topology {
        what: String,
        #[source]
        source: lapin::Error,
    },

    #[error("consume error on '{queue}': {source}")]
    Consume {
        queue: String,
        #[source]
        source: lapin::Error,
    },

    /// Ack/nack could not be delivered; the channel is gone
    #[error("acknowledgement failed: {source}")]
    Ack {
        #[source]
        source: lapin::Error,
    },
}

impl BrokerError {
    pub fn topology(what: impl Into<String>, source: lapin::Error) -> Self {
        Self::Topology {
            what: what.into(),
            source,
        }
    }

    pub fn consume(queue: impl Into<String>, source: lapin::Error) -> Self {
        Self::Consume {
            queue: queue.into(),
            source,
        }
    }
}
