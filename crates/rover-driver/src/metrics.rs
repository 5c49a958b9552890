//! 任务运行指标
//!
//! 所有计数器都使用原子操作，可以在任何线程安全地读取，不会引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 任务实时指标
///
/// ```rust
/// use rover_driver::RunMetrics;
/// use std::sync::Arc;
/// use std::sync::atomic::Ordering;
///
/// let metrics = Arc::new(RunMetrics::default());
/// metrics.commands_sent.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(metrics.snapshot().commands_sent, 1);
/// ```
#[derive(Debug, Default)]
pub struct RunMetrics {
    /// 下发的电机命令数（不含重发）
    pub commands_sent: AtomicU64,
    /// 重发次数
    pub resends: AtomicU64,
    /// 非 AwaitingAck 阶段收到的确认（被忽略）
    pub acks_ignored: AtomicU64,
    /// 发出的检测查询数
    pub detection_queries: AtomicU64,
    /// 检测等待超时次数
    pub detection_timeouts: AtomicU64,
    /// 匹配成功数
    pub matches: AtomicU64,
    /// 明确未匹配数
    pub no_matches: AtomicU64,
    /// 过期或不对应的检测回复
    pub stale_replies: AtomicU64,
    /// 进入关联器的检测事件
    pub detections_observed: AtomicU64,
    /// 被过滤（低置信度、排除列表、黑名单）的检测事件
    pub detections_filtered: AtomicU64,
    /// 收到的行数（三条链路合计）
    pub lines_received: AtomicU64,
    /// 发送的行数（三条链路合计）
    pub lines_sent: AtomicU64,
    /// 无法解析的行
    pub malformed_lines: AtomicU64,
    /// 链路错误次数
    pub link_errors: AtomicU64,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取指标快照
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            resends: self.resends.load(Ordering::Relaxed),
            acks_ignored: self.acks_ignored.load(Ordering::Relaxed),
            detection_queries: self.detection_queries.load(Ordering::Relaxed),
            detection_timeouts: self.detection_timeouts.load(Ordering::Relaxed),
            matches: self.matches.load(Ordering::Relaxed),
            no_matches: self.no_matches.load(Ordering::Relaxed),
            stale_replies: self.stale_replies.load(Ordering::Relaxed),
            detections_observed: self.detections_observed.load(Ordering::Relaxed),
            detections_filtered: self.detections_filtered.load(Ordering::Relaxed),
            lines_received: self.lines_received.load(Ordering::Relaxed),
            lines_sent: self.lines_sent.load(Ordering::Relaxed),
            malformed_lines: self.malformed_lines.load(Ordering::Relaxed),
            link_errors: self.link_errors.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        for counter in [
            &self.commands_sent,
            &self.resends,
            &self.acks_ignored,
            &self.detection_queries,
            &self.detection_timeouts,
            &self.matches,
            &self.no_matches,
            &self.stale_replies,
            &self.detections_observed,
            &self.detections_filtered,
            &self.lines_received,
            &self.lines_sent,
            &self.malformed_lines,
            &self.link_errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    pub commands_sent: u64,
    pub resends: u64,
    pub acks_ignored: u64,
    pub detection_queries: u64,
    pub detection_timeouts: u64,
    pub matches: u64,
    pub no_matches: u64,
    pub stale_replies: u64,
    pub detections_observed: u64,
    pub detections_filtered: u64,
    pub lines_received: u64,
    pub lines_sent: u64,
    pub malformed_lines: u64,
    pub link_errors: u64,
}

impl MetricsSnapshot {
    /// 检测查询的命中率（百分比），无查询时为 0
    pub fn match_rate(&self) -> f64 {
        if self.detection_queries == 0 {
            return 0.0;
        }
        (self.matches as f64 / self.detection_queries as f64) * 100.0
    }
}
