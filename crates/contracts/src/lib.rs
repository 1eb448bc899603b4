//! # Contracts
//!
//! Frozen interface contracts, defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Data Model
//! - `CrawlRequest` arrives untyped; `CollectorTask` leaves strongly typed
//! - `(Platform, TaskType)` selects a payload shape from the schema registry
//! - `DispatchOptions` is built once and never mutated

mod app_config;
mod error;
mod options;
pub mod payload;
mod platform;
mod publisher;
pub mod registry;
mod request;
mod task;

pub use app_config::*;
pub use error::*;
pub use options::*;
pub use payload::TaskPayload;
pub use platform::*;
pub use publisher::{LocalTaskPublisher, TaskPublisher};
pub use request::*;
pub use task::*;
