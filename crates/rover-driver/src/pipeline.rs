//! 链路 IO 线程主循环
//!
//! 每条链路一个 RX 线程、一个 TX 线程。RX 线程只做解析与分发，
//! 状态转换全部交给 [`Orchestrator`]；TX 线程排空对应的出站队列。
//!
//! 所有循环都遵循同样的生命周期约定：
//! - 每轮检查 `is_running`（Acquire）
//! - `LinkError::Timeout` 为空闲，继续循环
//! - 致命链路错误把 `is_running` 置为 false 并退出（Release）
//! - 无法解析的行只记录警告并计数

use crate::correlator::Correlator;
use crate::error::LinkError;
use crate::link::{LinkRx, LinkTx};
use crate::metrics::RunMetrics;
use crate::orchestrator::{DetectionOutcome, Orchestrator};
use crossbeam_channel::{Receiver, Sender, select};
use rover_planner::{CompilerConfig, RoutePlanner, plan_route};
use rover_protocol::{CompanionMessage, CompanionReport, MotorReply, Obstacle, VisionEvent};
use rover_tools::monotonic_nanos;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// TX 线程空闲时的最长阻塞时间
const TX_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// 检测等待线程空闲时的最长阻塞时间
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 通用接收循环：逐行交给 `handle`，返回时链路已关闭或收到退出信号
fn rx_lines(
    name: &str,
    rx: &mut impl LinkRx,
    is_running: &AtomicBool,
    metrics: &RunMetrics,
    mut handle: impl FnMut(&str),
) {
    loop {
        // Acquire: 看到 false 时也能看到其他线程在此之前的写入
        if !is_running.load(Ordering::Acquire) {
            trace!("{} RX thread: is_running flag is false, exiting", name);
            break;
        }

        let line = match rx.receive() {
            Ok(line) => line,
            Err(LinkError::Timeout) => continue,
            Err(e) => {
                metrics.link_errors.fetch_add(1, Ordering::Relaxed);
                if e.is_fatal() {
                    error!("{} RX thread: fatal link error: {}, setting is_running = false", name, e);
                    is_running.store(false, Ordering::Release);
                    break;
                }
                warn!("{} RX thread: link error: {}", name, e);
                continue;
            },
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        metrics.lines_received.fetch_add(1, Ordering::Relaxed);
        trace!("{} -> {}", name, line);
        handle(line);
    }

    trace!("{} RX thread: loop exited", name);
}

/// 电机链路 RX 线程
///
/// `ACK`/`OK` 推进状态机，`RESEND` 重发上一条命令。
/// 检测等待不在本线程执行，等待期间的重发请求会被立即处理。
pub fn motor_rx_loop(
    mut rx: impl LinkRx,
    orchestrator: Arc<Orchestrator>,
    is_running: Arc<AtomicBool>,
    metrics: Arc<RunMetrics>,
) {
    rx_lines("Motor", &mut rx, &is_running, &metrics, |line| {
        match MotorReply::parse(line) {
            Some(MotorReply::Ack) => orchestrator.on_ack(),
            Some(MotorReply::Resend) => {
                // 错误已由编排器记录，任务进入 Failed
                let _ = orchestrator.on_resend();
            },
            None => {
                metrics.malformed_lines.fetch_add(1, Ordering::Relaxed);
                warn!("Motor RX thread: unrecognized line {:?}", line);
            },
        }
    });
}

/// 视觉链路 RX 线程
///
/// 检测事件进入关联器；`OBJECT`/`NONE` 作为远端匹配结果交给编排器。
pub fn vision_rx_loop(
    mut rx: impl LinkRx,
    orchestrator: Arc<Orchestrator>,
    correlator: Arc<Correlator>,
    restamp: bool,
    is_running: Arc<AtomicBool>,
    metrics: Arc<RunMetrics>,
) {
    rx_lines("Vision", &mut rx, &is_running, &metrics, |line| {
        match VisionEvent::parse(line) {
            Ok(VisionEvent::Detection(mut detection)) => {
                if restamp {
                    detection.timestamp_ns = monotonic_nanos();
                }
                if correlator.ingest(&detection) {
                    metrics.detections_observed.fetch_add(1, Ordering::Relaxed);
                } else {
                    metrics.detections_filtered.fetch_add(1, Ordering::Relaxed);
                }
            },
            Ok(VisionEvent::Object {
                obstacle_id,
                confidence,
                label,
            }) => {
                orchestrator
                    .on_detection_reply(obstacle_id, DetectionOutcome::Matched { label, confidence });
            },
            Ok(VisionEvent::NoMatch { obstacle_id }) => {
                orchestrator.on_detection_reply(obstacle_id, DetectionOutcome::NoMatch);
            },
            Err(e) => {
                metrics.malformed_lines.fetch_add(1, Ordering::Relaxed);
                warn!("Vision RX thread: malformed line {:?}: {}", line, e);
            },
        }
    });
}

/// 检测等待线程
///
/// 依次执行编排器排队的检测等待；中止信号会打断正在进行的等待。
pub fn detection_wait_loop(orchestrator: Arc<Orchestrator>, is_running: Arc<AtomicBool>) {
    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("Detection thread: is_running flag is false, exiting");
            break;
        }
        orchestrator.run_pending_wait(WAIT_POLL_INTERVAL);
    }

    trace!("Detection thread: loop exited");
}

/// 伴侣 App 会话：收集障碍物，收到 BEGIN 后规划并启动任务
pub struct CompanionSession {
    obstacles: Vec<Obstacle>,
    planner: Box<dyn RoutePlanner>,
    compiler: CompilerConfig,
    orchestrator: Arc<Orchestrator>,
    reply: Sender<String>,
}

impl CompanionSession {
    pub fn new(
        planner: Box<dyn RoutePlanner>,
        compiler: CompilerConfig,
        orchestrator: Arc<Orchestrator>,
        reply: Sender<String>,
    ) -> Self {
        Self {
            obstacles: Vec::new(),
            planner,
            compiler,
            orchestrator,
            reply,
        }
    }

    /// 预置障碍物（配置文件或命令行提供）
    pub fn with_obstacles(mut self, obstacles: Vec<Obstacle>) -> Self {
        for obstacle in obstacles {
            self.upsert(obstacle);
        }
        self
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    /// 同 id 的障碍物覆盖旧值，保持首次出现的顺序
    fn upsert(&mut self, obstacle: Obstacle) {
        match self.obstacles.iter_mut().find(|o| o.id == obstacle.id) {
            Some(existing) => *existing = obstacle,
            None => self.obstacles.push(obstacle),
        }
    }

    pub fn handle(&mut self, message: CompanionMessage) {
        match message {
            CompanionMessage::Obstacle(obstacle) => {
                debug!(
                    "Obstacle {} at ({}, {}) facing {:?}",
                    obstacle.id, obstacle.x, obstacle.y, obstacle.facing
                );
                self.upsert(obstacle);
            },
            CompanionMessage::Clear => {
                info!("Cleared {} obstacles", self.obstacles.len());
                self.obstacles.clear();
            },
            CompanionMessage::Begin => self.begin(),
            CompanionMessage::Abort(reason) => self.orchestrator.abort(&reason),
        }
    }

    fn begin(&mut self) {
        let planned = match plan_route(self.planner.as_mut(), &self.obstacles, &self.compiler) {
            Ok(planned) => planned,
            Err(e) => {
                error!("Route planning failed: {}", e);
                self.send_status(format!("ERROR {}", e));
                return;
            },
        };
        self.send_status(format!(
            "PLANNED {} segments {} commands",
            planned.plan.len(),
            planned.plan.command_count()
        ));
        if let Err(e) = self.orchestrator.begin(planned.plan) {
            warn!("Ignoring BEGIN: {}", e);
            self.send_status(format!("ERROR {}", e));
        }
    }

    fn send_status(&self, text: String) {
        if self.reply.send(CompanionReport::Status(text).encode()).is_err() {
            warn!("Companion queue closed, status dropped");
        }
    }
}

/// 伴侣 App 链路 RX 线程
pub fn companion_rx_loop(
    mut rx: impl LinkRx,
    mut session: CompanionSession,
    is_running: Arc<AtomicBool>,
    metrics: Arc<RunMetrics>,
) {
    rx_lines("Companion", &mut rx, &is_running, &metrics, |line| {
        match CompanionMessage::parse(line) {
            Ok(message) => session.handle(message),
            Err(e) => {
                metrics.malformed_lines.fetch_add(1, Ordering::Relaxed);
                warn!("Companion RX thread: malformed line {:?}: {}", line, e);
            },
        }
    });
}

/// TX 线程主循环：排空出站队列
///
/// # 参数
/// - `name`: 链路名（日志）
/// - `tx`: 链路写端
/// - `queue`: 出站队列
/// - `is_running`: 运行标志（用于生命周期联动）
/// - `metrics`: 运行指标
pub fn tx_loop(
    name: &'static str,
    mut tx: impl LinkTx,
    queue: Receiver<String>,
    is_running: Arc<AtomicBool>,
    metrics: Arc<RunMetrics>,
) {
    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("{} TX thread: is_running flag is false, exiting", name);
            // 尽力发出已排队的消息（例如最终的 STITCH）
            for line in queue.try_iter() {
                if tx.send(&line).is_err() {
                    break;
                }
                metrics.lines_sent.fetch_add(1, Ordering::Relaxed);
            }
            break;
        }

        let line = select! {
            recv(queue) -> msg => match msg {
                Ok(line) => line,
                Err(_) => {
                    trace!("{} TX thread: queue disconnected", name);
                    break;
                },
            },
            default(TX_POLL_INTERVAL) => continue,
        };

        match tx.send(&line) {
            Ok(()) => {
                metrics.lines_sent.fetch_add(1, Ordering::Relaxed);
                trace!("{} <- {}", name, line);
            },
            Err(e) => {
                metrics.link_errors.fetch_add(1, Ordering::Relaxed);
                error!("{} TX thread: failed to send {:?}: {}", name, line, e);
                if e.is_fatal() {
                    error!("{} TX thread: fatal link error, setting is_running = false", name);
                    is_running.store(false, Ordering::Release);
                    break;
                }
            },
        }
    }

    trace!("{} TX thread: loop exited", name);
}
