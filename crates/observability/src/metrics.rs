//! 分发指标收集模块
//!
//! 通过 `metrics` facade 记录请求、任务发布与确认决策；
//! 安装 Prometheus recorder 后即可在 `/metrics` 导出。

use contracts::{CollectorTask, DispatchError};
use metrics::{counter, histogram};

/// 记录一条入站投递
pub fn record_request_received() {
    counter!("crawl_dispatch_requests_total").increment(1);
}

/// 记录无法反序列化而被丢弃的投递
pub fn record_request_undecodable() {
    counter!("crawl_dispatch_requests_undecodable_total").increment(1);
}

/// 记录一次分发结果（按错误类别计数）
///
/// 已发布任务数由 dispatcher 逐条记录，部分发布失败时也不会漏计。
pub fn record_dispatch_outcome(result: &Result<Vec<CollectorTask>, DispatchError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(err) => err.kind(),
    };
    counter!("crawl_dispatch_outcomes_total", "outcome" => outcome).increment(1);
}

/// 记录单个任务发布，每次发布成功后由 dispatcher 调用
pub fn record_task_published(platform: &str) {
    counter!(
        "crawl_dispatch_tasks_published_total",
        "platform" => platform.to_string()
    )
    .increment(1);
}

/// 记录 ack / requeue 决策
pub fn record_ack_decision(decision: &'static str) {
    counter!("crawl_dispatch_ack_decisions_total", "decision" => decision).increment(1);
}

/// 记录单条投递的处理耗时
pub fn record_dispatch_latency_ms(latency_ms: f64) {
    histogram!("crawl_dispatch_latency_ms").record(latency_ms);
}

/// 统计摘要
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.2}ms, max={:.2}ms, mean={:.2}ms (n={})",
                self.min, self.max, self.mean, self.count
            )
        }
    }
}

/// 在线均值 / 极值统计 (用于退出时打印延迟摘要)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            return;
        }
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.mean += (value - self.mean) / self.count as f64;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.mean }
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary::from(self)
    }
}
