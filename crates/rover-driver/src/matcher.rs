//! 本地匹配器
//!
//! 在本进程内应答检测查询：等待 `match_settle` 让视觉端的检测事件到达，
//! 然后在关联器上以查询时间为中心做窗口匹配，结果交回编排器。

use crate::correlator::Correlator;
use crate::orchestrator::{DetectionOutcome, MatchRequest, Orchestrator};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use rover_tools::{monotonic_nanos, nanos_since};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};

/// 等待期间检查运行标志的间隔
const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// 窗口匹配参数
#[derive(Debug, Clone)]
pub struct LocalMatcher {
    correlator: Arc<Correlator>,
    lead: Duration,
    lag: Duration,
    settle: Duration,
}

impl LocalMatcher {
    pub fn new(correlator: Arc<Correlator>, lead: Duration, lag: Duration, settle: Duration) -> Self {
        Self {
            correlator,
            lead,
            lag,
            settle,
        }
    }

    /// 立即对请求做窗口匹配
    pub fn resolve(&self, request: &MatchRequest) -> DetectionOutcome {
        match self
            .correlator
            .match_window(request.issued_at, self.lead, self.lag)
        {
            Some(m) => DetectionOutcome::Matched {
                label: m.label,
                confidence: m.confidence,
            },
            None => DetectionOutcome::NoMatch,
        }
    }

    /// 等到请求发出后 `settle` 时刻；返回 false 表示期间被要求退出
    fn settle(&self, request: &MatchRequest, keep_waiting: impl Fn() -> bool) -> bool {
        loop {
            if !keep_waiting() {
                return false;
            }
            let elapsed = nanos_since(request.issued_at);
            if elapsed >= self.settle {
                return true;
            }
            thread::sleep((self.settle - elapsed).min(SETTLE_POLL_INTERVAL));
        }
    }
}

/// 匹配线程主循环
///
/// # 参数
/// - `requests`: 编排器投递的检测查询
/// - `matcher`: 匹配参数
/// - `orchestrator`: 接收匹配结果
/// - `is_running`: 运行标志（用于生命周期联动）
pub fn matcher_loop(
    requests: Receiver<MatchRequest>,
    matcher: LocalMatcher,
    orchestrator: Arc<Orchestrator>,
    is_running: Arc<AtomicBool>,
) {
    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("Matcher thread: is_running flag is false, exiting");
            break;
        }

        let request = match requests.recv_timeout(Duration::from_millis(50)) {
            Ok(request) => request,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                trace!("Matcher thread: request channel disconnected");
                break;
            },
        };

        let settled = matcher.settle(&request, || {
            is_running.load(Ordering::Acquire) && !orchestrator.is_aborted()
        });
        if !settled {
            debug!(
                "Matcher thread: query for obstacle {} dropped",
                request.obstacle_id
            );
            continue;
        }

        let outcome = matcher.resolve(&request);
        debug!(
            "Matcher thread: obstacle {} -> {:?} ({} ns after query)",
            request.obstacle_id,
            outcome,
            monotonic_nanos().saturating_sub(request.issued_at)
        );
        orchestrator.on_detection_reply(request.obstacle_id, outcome);
    }

    trace!("Matcher thread: loop exited");
}
