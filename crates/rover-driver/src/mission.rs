//! Mission API 模块
//!
//! 提供对外的 `Mission` 结构体，封装链路线程与编排器的生命周期。

use crate::correlator::Correlator;
use crate::error::DriverError;
use crate::metrics::{MetricsSnapshot, RunMetrics};
use crate::orchestrator::{Orchestrator, RunReport, RunStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::Duration;
use tracing::{error, info};

/// 线程退出等待上限
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Extension trait for timeout-capable thread joins
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // 看门狗线程代为 join，超时后由 OS 在进程退出时回收
        spawn(move || {
            let _ = tx.send(self.join());
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 运行中的任务（对外 API）
///
/// Drop 时中止未结束的任务并回收所有链路线程。
pub struct Mission {
    orchestrator: Arc<Orchestrator>,
    correlator: Arc<Correlator>,
    metrics: Arc<RunMetrics>,
    is_running: Arc<AtomicBool>,
    threads: Vec<(&'static str, JoinHandle<()>)>,
}

impl Mission {
    pub(crate) fn new(
        orchestrator: Arc<Orchestrator>,
        correlator: Arc<Correlator>,
        metrics: Arc<RunMetrics>,
        is_running: Arc<AtomicBool>,
        threads: Vec<(&'static str, JoinHandle<()>)>,
    ) -> Self {
        Self {
            orchestrator,
            correlator,
            metrics,
            is_running,
            threads,
        }
    }

    /// 最新状态快照（无锁）
    pub fn status(&self) -> Arc<RunStatus> {
        self.orchestrator.status()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// 所有链路线程是否仍在运行（任一链路致命错误后为 false）
    pub fn is_healthy(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// 中止任务（例如操作员请求或目标已找到）
    pub fn abort(&self, reason: &str) {
        self.orchestrator.abort(reason);
    }

    /// 阻塞直到任务结束
    pub fn wait(&self, timeout: Duration) -> Result<RunReport, DriverError> {
        self.orchestrator.wait(timeout).ok_or(DriverError::Timeout)
    }

    /// 已结束时返回报告
    pub fn report(&self) -> Option<RunReport> {
        self.orchestrator.report()
    }

    /// 等待任务结束后回收所有线程
    ///
    /// 超时时任务被中止，返回 `DriverError::Timeout`。
    pub fn join(self, timeout: Duration) -> Result<RunReport, DriverError> {
        let report = self.wait(timeout);
        drop(self);
        report
    }
}

impl Drop for Mission {
    fn drop(&mut self) {
        if self.orchestrator.report().is_none() {
            self.orchestrator.abort("shutdown");
        }

        // Release: 之前的写入对看到 false 的线程可见
        self.is_running.store(false, Ordering::Release);

        for (name, handle) in self.threads.drain(..) {
            if handle.join_timeout(JOIN_TIMEOUT).is_err() {
                error!(
                    "{} thread panicked or failed to shut down within {:?}",
                    name, JOIN_TIMEOUT
                );
            }
        }
        info!("Mission pipeline stopped");
    }
}
