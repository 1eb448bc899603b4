//! TaskPublisher trait - dispatcher output interface
//!
//! Defines the abstract interface for task publishers. One implementation
//! per transport; the orchestrator only ever sees this trait.

use crate::{CollectorTask, PublishError};

/// Task output trait
///
/// Publishing takes `&mut self`: a publisher owns its broker channel and is
/// driven by exactly one consumer loop at a time.
#[trait_variant::make(TaskPublisher: Send)]
pub trait LocalTaskPublisher {
    /// Publisher name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Publish one task to its platform queue
    ///
    /// # Errors
    /// Returns a transient error when the channel is unavailable and a
    /// permanent one for serialization failures or broker rejection.
    async fn publish(&mut self, task: &CollectorTask) -> Result<(), PublishError>;

    /// Release channel/connection resources
    async fn close(&mut self) -> Result<(), PublishError>;
}
