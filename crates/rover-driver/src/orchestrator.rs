//! 分段编排器（状态机）
//!
//! ```text
//! Idle ──begin()──> AwaitingAck ──ack──> AwaitingAck ... ──分段结束──┐
//!                        ^                                          │
//!                        │            有检测触发                      │ 无检测触发
//!                        └── 下一分段 <── AwaitingDetection <─────────┤
//!                                                                   v
//!                                            全部分段结束 / 中止 ──> Complete
//! 重发次数耗尽 ──> Failed
//! ```
//!
//! 所有状态转换在同一把 `parking_lot::Mutex` 下完成；三个链路线程只负责
//! 把线上消息翻译为 `on_ack` / `on_resend` / `on_detection_reply` / `abort`。
//! 事件方法从不阻塞：进入 AwaitingDetection 时只把等待投递到队列，
//! 由检测等待线程（[`Orchestrator::run_pending_wait`]）在锁外执行
//! （一次性信号 + 超时 + 中止检查）。等待期间电机线程照常处理
//! `RESEND` 与确认。

use crate::correlator::Correlator;
use crate::error::OrchestratorError;
use crate::metrics::RunMetrics;
use crate::signal::{AbortSignal, OneShotSender, WaitOutcome, oneshot, wait_until};
use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use parking_lot::Mutex;
use rover_planner::{Segment, SegmentPlan};
use rover_protocol::{
    CompanionReport, LateralHint, MotorCommand, PrimitiveCommand, VisionRequest,
    encode_motor_command,
};
use rover_tools::{MissionProfile, MissionSettings, monotonic_nanos};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// 编排器配置
#[derive(Debug, Clone, PartialEq)]
pub struct MissionConfig {
    pub profile: MissionProfile,
    /// 分段是否携带检测触发；为 false 时从不进入 AwaitingDetection
    pub detection_triggers: bool,
    /// 等待检测结果的超时
    pub detection_timeout: Duration,
    /// 匹配窗口前沿
    pub match_lead: Duration,
    /// 匹配窗口后沿
    pub match_lag: Duration,
    /// 单条命令最多重发次数
    pub max_resend_attempts: u32,
    /// 电机速度（0-100）
    pub motor_speed: u8,
    /// 匹配成功后释放区间
    pub evict_on_match: bool,
    /// 在本进程内应答检测查询
    pub local_matching: bool,
    /// 本地匹配前的等待时间（必须短于 detection_timeout）
    pub match_settle: Duration,
    /// 用本地接收时间替换检测事件的时间戳
    pub restamp_detections: bool,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self::from_settings(&MissionSettings::default())
    }
}

impl MissionConfig {
    pub fn from_settings(settings: &MissionSettings) -> Self {
        Self {
            profile: settings.profile,
            detection_triggers: settings.detection_triggers,
            detection_timeout: settings.detection_timeout(),
            match_lead: settings.match_lead(),
            match_lag: settings.match_lag(),
            max_resend_attempts: settings.max_resend_attempts,
            motor_speed: settings.motor_speed,
            evict_on_match: settings.effective_evict_on_match(),
            local_matching: settings.local_matching,
            match_settle: settings.match_settle(),
            restamp_detections: settings.restamp_detections,
        }
    }

    /// 指定任务类型的默认配置
    pub fn for_profile(profile: MissionProfile) -> Self {
        Self {
            profile,
            evict_on_match: profile.evicts_on_match(),
            ..Self::default()
        }
    }
}

/// 编排器阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Phase {
    Idle,
    AwaitingAck,
    AwaitingDetection,
    Complete,
    Failed,
}

impl Phase {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Complete | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 检测查询（仅在一次关联查询期间存在）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchRequest {
    pub obstacle_id: u32,
    pub lateral_hint: Option<LateralHint>,
    /// 查询发出时的单调时间戳（ns）
    pub issued_at: u64,
}

/// 检测查询的结果
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionOutcome {
    Matched { label: String, confidence: f32 },
    NoMatch,
}

/// 障碍物与标签的匹配记录
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ObstacleMatch {
    pub obstacle_id: u32,
    pub label: String,
    pub confidence: f32,
}

/// 无锁读取的运行状态快照
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RunStatus {
    pub phase: Phase,
    pub segment_cursor: usize,
    /// 当前分段内已下发的命令数
    pub command_cursor: usize,
    pub segment_count: usize,
    pub pending_obstacle: Option<u32>,
    pub resend_attempts: u32,
    pub matches: Vec<ObstacleMatch>,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            segment_cursor: 0,
            command_cursor: 0,
            segment_count: 0,
            pending_obstacle: None,
            resend_attempts: 0,
            matches: Vec::new(),
        }
    }
}

/// 任务结束报告
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RunReport {
    pub phase: Phase,
    pub matches: Vec<ObstacleMatch>,
    /// 带检测触发的分段数
    pub expected: usize,
    pub abort_reason: Option<String>,
    #[serde(skip)]
    pub error: Option<OrchestratorError>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.phase == Phase::Complete
    }
}

/// 出站队列（由 tx 线程排空到各自链路）
#[derive(Debug, Clone)]
pub struct Outbound {
    motor: Sender<String>,
    vision: Sender<String>,
    companion: Sender<String>,
    matcher: Option<Sender<MatchRequest>>,
}

/// 出站队列的接收端
#[derive(Debug)]
pub struct OutboundQueues {
    pub motor: Receiver<String>,
    pub vision: Receiver<String>,
    pub companion: Receiver<String>,
}

impl Outbound {
    pub fn channels() -> (Outbound, OutboundQueues) {
        let (motor, motor_rx) = unbounded();
        let (vision, vision_rx) = unbounded();
        let (companion, companion_rx) = unbounded();
        (
            Outbound {
                motor,
                vision,
                companion,
                matcher: None,
            },
            OutboundQueues {
                motor: motor_rx,
                vision: vision_rx,
                companion: companion_rx,
            },
        )
    }

    /// 检测查询同时投递给本地匹配器
    pub fn with_matcher(mut self, matcher: Sender<MatchRequest>) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// 伴侣 App 出站队列（会话层回复 STATUS 使用）
    pub fn companion(&self) -> &Sender<String> {
        &self.companion
    }
}

/// 编排器独占的运行状态
struct RunState {
    phase: Phase,
    segments: Vec<Segment>,
    /// 按分段下标排列的障碍物 id
    obstacle_order: Vec<Option<u32>>,
    segment_cursor: usize,
    command_cursor: usize,
    pending_detection: Option<MatchRequest>,
    detection_signal: Option<OneShotSender<DetectionOutcome>>,
    last_sent: Option<MotorCommand>,
    resend_attempts: u32,
    matches: Vec<ObstacleMatch>,
    expected_matches: usize,
    error: Option<OrchestratorError>,
}

impl RunState {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            segments: Vec::new(),
            obstacle_order: Vec::new(),
            segment_cursor: 0,
            command_cursor: 0,
            pending_detection: None,
            detection_signal: None,
            last_sent: None,
            resend_attempts: 0,
            matches: Vec::new(),
            expected_matches: 0,
            error: None,
        }
    }
}

/// 排队等待执行的检测等待
struct DetectionWait {
    obstacle_id: u32,
    signal: Receiver<DetectionOutcome>,
    deadline: Instant,
}

/// 锁内转换完成后，调用方需要继续做的事
enum Step {
    /// 等待外部事件
    Yield,
    /// 在锁外等待检测结果
    AwaitDetection(DetectionWait),
}

/// 分段编排器
pub struct Orchestrator {
    config: MissionConfig,
    state: Mutex<RunState>,
    correlator: Arc<Correlator>,
    outbound: Outbound,
    metrics: Arc<RunMetrics>,
    status: ArcSwap<RunStatus>,
    abort: AbortSignal,
    finished: Mutex<Option<Sender<()>>>,
    finished_rx: Receiver<()>,
    waits: Sender<DetectionWait>,
    waits_rx: Receiver<DetectionWait>,
}

impl Orchestrator {
    pub fn new(
        config: MissionConfig,
        correlator: Arc<Correlator>,
        outbound: Outbound,
        metrics: Arc<RunMetrics>,
    ) -> Self {
        let (finished, finished_rx) = bounded(0);
        let (waits, waits_rx) = unbounded();
        Self {
            config,
            state: Mutex::new(RunState::new()),
            correlator,
            outbound,
            metrics,
            status: ArcSwap::from_pointee(RunStatus::default()),
            abort: AbortSignal::new(),
            finished: Mutex::new(Some(finished)),
            finished_rx,
            waits,
            waits_rx,
        }
    }

    pub fn config(&self) -> &MissionConfig {
        &self.config
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    pub fn metrics(&self) -> &Arc<RunMetrics> {
        &self.metrics
    }

    /// 最新状态快照（无锁）
    pub fn status(&self) -> Arc<RunStatus> {
        self.status.load_full()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    /// 加载分段计划并下发第一条命令
    pub fn begin(&self, plan: SegmentPlan) -> Result<(), OrchestratorError> {
        let step = {
            let mut st = self.state.lock();
            if st.phase != Phase::Idle {
                return Err(OrchestratorError::AlreadyStarted {
                    phase: st.phase.to_string(),
                });
            }

            self.correlator.reset();
            st.obstacle_order = if self.config.detection_triggers {
                plan.obstacle_order()
            } else {
                vec![None; plan.len()]
            };
            st.expected_matches = st.obstacle_order.iter().flatten().count();
            st.segments = plan.segments;
            st.segment_cursor = 0;
            st.command_cursor = 0;
            info!(
                "Mission started: {} segments, {} detection triggers ({:?})",
                st.segments.len(),
                st.expected_matches,
                self.config.profile
            );

            let step = self.pump(&mut st);
            self.publish(&st);
            step
        };
        self.schedule(step);
        Ok(())
    }

    /// 电机确认
    pub fn on_ack(&self) {
        let step = {
            let mut st = self.state.lock();
            if st.phase != Phase::AwaitingAck {
                self.metrics.acks_ignored.fetch_add(1, Ordering::Relaxed);
                debug!("Ignoring motor ack in phase {}", st.phase);
                return;
            }
            trace!(
                "Motor ack for command {:?}",
                st.last_sent.map(|c| c.seq)
            );
            let step = self.pump(&mut st);
            self.publish(&st);
            step
        };
        self.schedule(step);
    }

    /// 电机请求重发：原样重发最近一条命令
    ///
    /// AwaitingDetection 期间重发的是刚结束分段的最后一条命令。
    pub fn on_resend(&self) -> Result<(), OrchestratorError> {
        let mut st = self.state.lock();
        if !matches!(st.phase, Phase::AwaitingAck | Phase::AwaitingDetection) {
            debug!("Ignoring resend request in phase {}", st.phase);
            return Ok(());
        }
        let Some(command) = st.last_sent else {
            return Ok(());
        };

        if st.resend_attempts >= self.config.max_resend_attempts {
            let err = OrchestratorError::ResendLimitExceeded {
                seq: command.seq,
                attempts: st.resend_attempts,
            };
            self.fail(&mut st, err.clone());
            self.publish(&st);
            return Err(err);
        }

        st.resend_attempts += 1;
        self.metrics.resends.fetch_add(1, Ordering::Relaxed);
        warn!(
            "Resending command {} (attempt {}/{})",
            command.seq, st.resend_attempts, self.config.max_resend_attempts
        );
        if let Err(e) = self.send_motor(command) {
            self.fail(&mut st, e.clone());
            self.publish(&st);
            return Err(e);
        }
        self.publish(&st);
        Ok(())
    }

    /// 检测回复（本地匹配器或视觉端）
    ///
    /// 返回 false 表示回复过期（障碍物不对应或不在 AwaitingDetection）。
    pub fn on_detection_reply(&self, obstacle_id: u32, outcome: DetectionOutcome) -> bool {
        let mut st = self.state.lock();
        let expected = st.phase == Phase::AwaitingDetection
            && st
                .pending_detection
                .is_some_and(|req| req.obstacle_id == obstacle_id);
        if !expected {
            self.metrics.stale_replies.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Ignoring stale detection reply for obstacle {} (phase {}, pending {:?})",
                obstacle_id,
                st.phase,
                st.pending_detection.map(|r| r.obstacle_id)
            );
            return false;
        }
        st.pending_detection = None;

        let outcome = match outcome {
            DetectionOutcome::Matched { label, .. } if self.correlator.is_blacklisted(&label) => {
                warn!(
                    "Label {} was already matched in this run, obstacle {} left unmatched",
                    label, obstacle_id
                );
                DetectionOutcome::NoMatch
            },
            other => other,
        };

        match &outcome {
            DetectionOutcome::Matched { label, confidence } => {
                self.correlator.consume(label, self.config.evict_on_match);
                st.matches.push(ObstacleMatch {
                    obstacle_id,
                    label: label.clone(),
                    confidence: *confidence,
                });
                self.metrics.matches.fetch_add(1, Ordering::Relaxed);
                info!(
                    "Obstacle {} matched label {} ({:.2})",
                    obstacle_id, label, confidence
                );
                self.send_companion(CompanionReport::Target {
                    obstacle_id,
                    label: label.clone(),
                });
            },
            DetectionOutcome::NoMatch => {
                self.metrics.no_matches.fetch_add(1, Ordering::Relaxed);
                info!("Obstacle {}: no matching label", obstacle_id);
            },
        }

        if let Some(mut signal) = st.detection_signal.take() {
            signal.fire(outcome);
        }
        self.publish(&st);
        true
    }

    /// 中止任务：打断检测等待，直接进入最终汇总
    pub fn abort(&self, reason: &str) {
        if !self.abort.trigger(reason) {
            return;
        }
        warn!("Mission aborted: {}", reason);

        let mut st = self.state.lock();
        match st.phase {
            Phase::Idle => {
                self.complete(&mut st);
            },
            Phase::AwaitingAck => {
                self.send_stop(&st);
                self.complete(&mut st);
            },
            // 等待线程被中止信号唤醒后发现已结束，直接退出
            Phase::AwaitingDetection => {
                if let Some(request) = st.pending_detection {
                    info!(
                        "Detection wait for obstacle {} interrupted by abort",
                        request.obstacle_id
                    );
                }
                self.complete(&mut st);
            },
            Phase::Complete | Phase::Failed => {},
        }
        self.publish(&st);
    }

    /// 阻塞直到任务结束或超时
    pub fn wait(&self, timeout: Duration) -> Option<RunReport> {
        if let Some(report) = self.report() {
            return Some(report);
        }
        // finished Sender 被丢弃时立即返回
        let _ = self.finished_rx.recv_timeout(timeout);
        self.report()
    }

    /// 已结束时返回报告
    pub fn report(&self) -> Option<RunReport> {
        let st = self.state.lock();
        st.phase.is_terminal().then(|| RunReport {
            phase: st.phase,
            matches: st.matches.clone(),
            expected: st.expected_matches,
            abort_reason: self.abort.reason(),
            error: st.error.clone(),
        })
    }

    /// 推进到下一个需要等待的点
    fn pump(&self, st: &mut RunState) -> Step {
        loop {
            if self.abort.is_aborted() {
                return self.complete(st);
            }
            let Some(segment) = st.segments.get(st.segment_cursor) else {
                return self.complete(st);
            };
            let next = segment.commands.get(st.command_cursor).copied();
            let lateral_hint = segment.trigger.and_then(|t| t.lateral_hint);

            if let Some(command) = next {
                st.command_cursor += 1;
                st.resend_attempts = 0;
                if let Err(e) = self.send_motor(command) {
                    return self.fail(st, e);
                }
                st.last_sent = Some(command);
                st.phase = Phase::AwaitingAck;
                self.metrics.commands_sent.fetch_add(1, Ordering::Relaxed);
                return Step::Yield;
            }

            // 分段结束
            if let Some(obstacle_id) = st.obstacle_order.get(st.segment_cursor).copied().flatten() {
                return self.request_detection(st, obstacle_id, lateral_hint);
            }
            debug!(
                "Segment {} finished without detection trigger",
                st.segment_cursor
            );
            st.segment_cursor += 1;
            st.command_cursor = 0;
        }
    }

    fn request_detection(
        &self,
        st: &mut RunState,
        obstacle_id: u32,
        lateral_hint: Option<LateralHint>,
    ) -> Step {
        let request = MatchRequest {
            obstacle_id,
            lateral_hint,
            issued_at: monotonic_nanos(),
        };
        let (signal_tx, signal_rx) = oneshot();
        st.pending_detection = Some(request);
        st.detection_signal = Some(signal_tx);
        st.phase = Phase::AwaitingDetection;
        self.metrics.detection_queries.fetch_add(1, Ordering::Relaxed);

        info!(
            "Segment {} finished, querying obstacle {}",
            st.segment_cursor, obstacle_id
        );
        self.send_vision(VisionRequest::Detect {
            obstacle_id,
            lateral_hint,
        });
        if let Some(matcher) = &self.outbound.matcher
            && matcher.send(request).is_err()
        {
            warn!("Local matcher is not running, obstacle {} will time out", obstacle_id);
        }

        Step::AwaitDetection(DetectionWait {
            obstacle_id,
            signal: signal_rx,
            deadline: Instant::now() + self.config.detection_timeout,
        })
    }

    /// 把检测等待交给等待线程
    fn schedule(&self, step: Step) {
        if let Step::AwaitDetection(wait) = step
            && self.waits.send(wait).is_err()
        {
            // 接收端由 self 持有，不会断开
            error!("Detection wait queue closed");
        }
    }

    /// 执行一个排队的检测等待
    ///
    /// 最多阻塞 `poll` 等待新的检测等待出现；取到后在锁外等到回复、
    /// 超时或中止，再推进状态机（连续的空分段触发会在本次调用内依次等待）。
    /// 返回 false 表示 `poll` 内没有等待。
    pub fn run_pending_wait(&self, poll: Duration) -> bool {
        let Ok(mut wait) = self.waits_rx.recv_timeout(poll) else {
            return false;
        };
        loop {
            let outcome = wait_until(&wait.signal, &self.abort, wait.deadline);
            match self.resolve_detection(wait.obstacle_id, outcome) {
                Step::AwaitDetection(next) => wait = next,
                Step::Yield => return true,
            }
        }
    }

    fn resolve_detection(&self, obstacle_id: u32, outcome: WaitOutcome<DetectionOutcome>) -> Step {
        let mut st = self.state.lock();
        if st.phase != Phase::AwaitingDetection {
            return Step::Yield;
        }
        st.detection_signal = None;

        // pending 仍在说明没有收到回复
        if st.pending_detection.take().is_some() {
            match outcome {
                WaitOutcome::TimedOut => {
                    self.metrics.detection_timeouts.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Detection for obstacle {} timed out after {:?}, treating as no match",
                        obstacle_id, self.config.detection_timeout
                    );
                },
                WaitOutcome::Aborted => {
                    info!("Detection wait for obstacle {} interrupted by abort", obstacle_id);
                },
                WaitOutcome::Ready(_) => {},
            }
        }

        st.segment_cursor += 1;
        st.command_cursor = 0;
        let step = self.pump(&mut st);
        self.publish(&st);
        step
    }

    /// 最终汇总（只执行一次）
    fn complete(&self, st: &mut RunState) -> Step {
        if st.phase.is_terminal() {
            return Step::Yield;
        }
        st.phase = Phase::Complete;
        st.pending_detection = None;
        st.detection_signal = None;

        let matched = st.matches.len();
        self.send_vision(VisionRequest::Assemble {
            expected: st.expected_matches,
            matched,
        });
        self.send_companion(CompanionReport::Status(format!(
            "COMPLETE {}/{}",
            matched, st.expected_matches
        )));
        info!(
            "Mission complete: {}/{} obstacles matched",
            matched, st.expected_matches
        );
        self.notify_finished();
        Step::Yield
    }

    fn fail(&self, st: &mut RunState, err: OrchestratorError) -> Step {
        if st.phase.is_terminal() {
            return Step::Yield;
        }
        error!("Mission failed: {}", err);
        self.send_stop(st);
        st.phase = Phase::Failed;
        st.pending_detection = None;
        st.detection_signal = None;
        st.error = Some(err);
        self.send_companion(CompanionReport::Status("FAILED".to_string()));
        self.notify_finished();
        Step::Yield
    }

    fn notify_finished(&self) {
        // 丢弃 Sender：唤醒所有 wait()
        self.finished.lock().take();
    }

    fn send_stop(&self, st: &RunState) {
        let seq = st.last_sent.map_or(1, |c| c.seq + 1);
        if let Err(e) = self.send_motor(MotorCommand::new(seq, PrimitiveCommand::Stop)) {
            warn!("Failed to queue stop command: {}", e);
        }
    }

    fn send_motor(&self, command: MotorCommand) -> Result<(), OrchestratorError> {
        let line = encode_motor_command(&command, self.config.motor_speed)?;
        trace!("Motor <- {}", line);
        if self.outbound.motor.send(line).is_err() {
            warn!("Motor queue closed, command {} dropped", command.seq);
        }
        Ok(())
    }

    fn send_vision(&self, request: VisionRequest) {
        let line = request.encode();
        trace!("Vision <- {}", line);
        if self.outbound.vision.send(line).is_err() {
            warn!("Vision queue closed, request dropped");
        }
    }

    fn send_companion(&self, report: CompanionReport) {
        let line = report.encode();
        trace!("Companion <- {}", line);
        if self.outbound.companion.send(line).is_err() {
            warn!("Companion queue closed, report dropped");
        }
    }

    fn publish(&self, st: &RunState) {
        self.status.store(Arc::new(RunStatus {
            phase: st.phase,
            segment_cursor: st.segment_cursor,
            command_cursor: st.command_cursor,
            segment_count: st.segments.len(),
            pending_obstacle: st.pending_detection.map(|r| r.obstacle_id),
            resend_attempts: st.resend_attempts,
            matches: st.matches.clone(),
        }));
    }
}
