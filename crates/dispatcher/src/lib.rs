//! # Dispatcher
//!
//! 任务分发模块。
//!
//! 负责：
//! - 规范化 `CrawlRequest` (attempt / max_attempts / emitted_at)
//! - 按平台路由，空平台时 fan-out 到所有已配置平台
//! - 将无类型 payload 映射为强类型 `TaskPayload`
//! - 组装 `CollectorTask` 并交给 `TaskPublisher`

pub mod builder;
pub mod dispatcher;
pub mod mapper;
pub mod metrics;
pub mod normalizer;
pub mod publishers;
pub mod router;

pub use contracts::{CollectorTask, CrawlRequest, DispatchError, TaskPublisher};
pub use dispatcher::Dispatcher;
pub use metrics::{DispatchMetrics, MetricsSnapshot};
pub use normalizer::{NormalizedRequest, normalize};
pub use publishers::LogPublisher;
pub use router::{Route, route};
