//! 跨线程信号
//!
//! - 检测完成：一次性信号（容量 1 的 crossbeam 通道）
//! - 任务中止：广播信号（丢弃唯一的 Sender，使所有 Receiver 立即就绪）

use crossbeam_channel::{Receiver, Sender, bounded, select};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// 等待循环的最长单次阻塞时间，保证每轮都检查中止标志
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// 一次性信号的发送端
///
/// 只会发送一次；第二次 `fire` 返回 false。
#[derive(Debug)]
pub struct OneShotSender<T> {
    tx: Option<Sender<T>>,
}

impl<T> OneShotSender<T> {
    pub fn fire(&mut self, value: T) -> bool {
        match self.tx.take() {
            Some(tx) => tx.try_send(value).is_ok(),
            None => false,
        }
    }
}

/// 创建一次性信号
pub fn oneshot<T>() -> (OneShotSender<T>, Receiver<T>) {
    let (tx, rx) = bounded(1);
    (OneShotSender { tx: Some(tx) }, rx)
}

/// 任务中止信号
#[derive(Debug)]
pub struct AbortSignal {
    aborted: AtomicBool,
    reason: Mutex<Option<String>>,
    trigger: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortSignal {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            aborted: AtomicBool::new(false),
            reason: Mutex::new(None),
            trigger: Mutex::new(Some(tx)),
            rx,
        }
    }

    /// 触发中止；仅第一次调用生效并返回 true
    pub fn trigger(&self, reason: impl Into<String>) -> bool {
        let mut trigger = self.trigger.lock();
        if trigger.is_none() {
            return false;
        }
        *self.reason.lock() = Some(reason.into());
        self.aborted.store(true, Ordering::Release);
        // 丢弃 Sender：所有等待方的 recv 立即返回 Disconnected
        trigger.take();
        true
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

/// 带截止时间与中止检查的等待结果
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome<T> {
    Ready(T),
    TimedOut,
    Aborted,
}

/// 等待一次性信号，直到截止时间或任务中止
///
/// 每轮循环都检查中止标志，不只在入口检查。
pub fn wait_until<T>(rx: &Receiver<T>, abort: &AbortSignal, deadline: Instant) -> WaitOutcome<T> {
    loop {
        if abort.is_aborted() {
            return WaitOutcome::Aborted;
        }
        let now = Instant::now();
        if now >= deadline {
            // 截止前刚好到达的结果仍然有效
            return match rx.try_recv() {
                Ok(value) => WaitOutcome::Ready(value),
                Err(_) => WaitOutcome::TimedOut,
            };
        }
        let slice = (deadline - now).min(WAIT_POLL_INTERVAL);

        select! {
            recv(rx) -> msg => match msg {
                Ok(value) => return WaitOutcome::Ready(value),
                // 发送端被丢弃而未发送：不会再有结果
                Err(_) => return WaitOutcome::TimedOut,
            },
            recv(abort.receiver()) -> _ => return WaitOutcome::Aborted,
            default(slice) => {},
        }
    }
}
