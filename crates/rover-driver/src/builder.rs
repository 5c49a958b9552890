//! Builder 模式实现
//!
//! 提供链式构造 `Mission` 实例的便捷方式。

use crate::correlator::{Correlator, DetectionFilter};
use crate::error::DriverError;
use crate::link::{Link, LinkRx, LinkTx};
use crate::matcher::{LocalMatcher, matcher_loop};
use crate::metrics::RunMetrics;
use crate::mission::Mission;
use crate::orchestrator::{MissionConfig, Orchestrator, Outbound};
use crate::pipeline::{
    CompanionSession, companion_rx_loop, detection_wait_loop, motor_rx_loop, tx_loop,
    vision_rx_loop,
};
use crossbeam_channel::unbounded;
use rover_planner::{CompilerConfig, RoutePlanner};
use rover_protocol::Obstacle;
use rover_tools::MissionFile;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::info;

type BoxedRx = Box<dyn LinkRx + Send>;
type BoxedTx = Box<dyn LinkTx + Send>;

/// Mission Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use rover_driver::{ChannelLink, MissionBuilder, StaticRoute};
///
/// let (motor, _motor_peer) = ChannelLink::pair();
/// let (vision, _vision_peer) = ChannelLink::pair();
/// let (companion, _companion_peer) = ChannelLink::pair();
///
/// let mission = MissionBuilder::new()
///     .planner(StaticRoute::new(Vec::new()))
///     .motor_link(motor)
///     .vision_link(vision)
///     .companion_link(companion)
///     .build()
///     .unwrap();
/// println!("{:?}", mission.status().phase);
/// ```
pub struct MissionBuilder {
    config: MissionConfig,
    filter: DetectionFilter,
    compiler: CompilerConfig,
    planner: Option<Box<dyn RoutePlanner>>,
    obstacles: Vec<Obstacle>,
    motor: Option<Result<(BoxedRx, BoxedTx), DriverError>>,
    vision: Option<Result<(BoxedRx, BoxedTx), DriverError>>,
    companion: Option<Result<(BoxedRx, BoxedTx), DriverError>>,
}

impl Default for MissionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MissionBuilder {
    pub fn new() -> Self {
        Self {
            config: MissionConfig::default(),
            filter: DetectionFilter::default(),
            compiler: CompilerConfig::default(),
            planner: None,
            obstacles: Vec::new(),
            motor: None,
            vision: None,
            companion: None,
        }
    }

    /// 从配置文件加载编排器、编译器与过滤器参数
    pub fn from_file(file: &MissionFile) -> Self {
        Self::new()
            .config(MissionConfig::from_settings(&file.mission))
            .compiler(file.compiler.clone())
            .detection_filter(DetectionFilter::from_settings(&file.detection))
    }

    pub fn config(mut self, config: MissionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn detection_filter(mut self, filter: DetectionFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn compiler(mut self, compiler: CompilerConfig) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn planner(mut self, planner: impl RoutePlanner + 'static) -> Self {
        self.planner = Some(Box::new(planner));
        self
    }

    /// 预置障碍物（伴侣 App 之后发送的同 id 障碍物会覆盖）
    pub fn obstacles(mut self, obstacles: Vec<Obstacle>) -> Self {
        self.obstacles = obstacles;
        self
    }

    pub fn motor_link(mut self, link: impl Link) -> Self {
        self.motor = Some(split_boxed(link));
        self
    }

    pub fn vision_link(mut self, link: impl Link) -> Self {
        self.vision = Some(split_boxed(link));
        self
    }

    pub fn companion_link(mut self, link: impl Link) -> Self {
        self.companion = Some(split_boxed(link));
        self
    }

    /// 构建并启动所有链路线程
    pub fn build(self) -> Result<Mission, DriverError> {
        validate(&self.config)?;
        self.compiler
            .validate()
            .map_err(|e| DriverError::InvalidConfig(e.to_string()))?;

        let planner = self
            .planner
            .ok_or_else(|| DriverError::InvalidConfig("route planner not set".to_string()))?;
        let (motor_rx, motor_tx) = self.motor.ok_or(DriverError::MissingLink("motor"))??;
        let (vision_rx, vision_tx) = self.vision.ok_or(DriverError::MissingLink("vision"))??;
        let (companion_rx, companion_tx) =
            self.companion.ok_or(DriverError::MissingLink("companion"))??;

        let metrics = Arc::new(RunMetrics::new());
        let correlator = Arc::new(Correlator::new(self.filter));
        let (outbound, queues) = Outbound::channels();
        let (match_tx, match_rx) = unbounded();
        let outbound = if self.config.local_matching {
            outbound.with_matcher(match_tx)
        } else {
            outbound
        };
        let reply = outbound.companion().clone();

        let orchestrator = Arc::new(Orchestrator::new(
            self.config.clone(),
            correlator.clone(),
            outbound,
            metrics.clone(),
        ));
        let session = CompanionSession::new(planner, self.compiler, orchestrator.clone(), reply)
            .with_obstacles(self.obstacles);

        let is_running = Arc::new(AtomicBool::new(true));
        let mut threads: Vec<(&'static str, JoinHandle<()>)> = Vec::new();
        let mut spawn = |name: &'static str, f: Box<dyn FnOnce() + Send>| -> Result<(), DriverError> {
            match thread::Builder::new().name(name.to_string()).spawn(f) {
                Ok(handle) => {
                    threads.push((name, handle));
                    Ok(())
                },
                Err(source) => Err(DriverError::Spawn { name, source }),
            }
        };

        let result = (|| -> Result<(), DriverError> {
            {
                let (orch, run) = (orchestrator.clone(), is_running.clone());
                spawn("rover-detection", Box::new(move || detection_wait_loop(orch, run)))?;
            }
            {
                let (orch, run, m) = (orchestrator.clone(), is_running.clone(), metrics.clone());
                spawn("rover-motor-rx", Box::new(move || motor_rx_loop(motor_rx, orch, run, m)))?;
            }
            {
                let (run, m) = (is_running.clone(), metrics.clone());
                let queue = queues.motor;
                spawn("rover-motor-tx", Box::new(move || tx_loop("Motor", motor_tx, queue, run, m)))?;
            }
            {
                let (orch, corr, run, m) = (
                    orchestrator.clone(),
                    correlator.clone(),
                    is_running.clone(),
                    metrics.clone(),
                );
                let restamp = self.config.restamp_detections;
                spawn(
                    "rover-vision-rx",
                    Box::new(move || vision_rx_loop(vision_rx, orch, corr, restamp, run, m)),
                )?;
            }
            {
                let (run, m) = (is_running.clone(), metrics.clone());
                let queue = queues.vision;
                spawn("rover-vision-tx", Box::new(move || tx_loop("Vision", vision_tx, queue, run, m)))?;
            }
            {
                let (run, m) = (is_running.clone(), metrics.clone());
                spawn(
                    "rover-companion-rx",
                    Box::new(move || companion_rx_loop(companion_rx, session, run, m)),
                )?;
            }
            {
                let (run, m) = (is_running.clone(), metrics.clone());
                let queue = queues.companion;
                spawn(
                    "rover-companion-tx",
                    Box::new(move || tx_loop("Companion", companion_tx, queue, run, m)),
                )?;
            }
            if self.config.local_matching {
                let matcher = LocalMatcher::new(
                    correlator.clone(),
                    self.config.match_lead,
                    self.config.match_lag,
                    self.config.match_settle,
                );
                let (orch, run) = (orchestrator.clone(), is_running.clone());
                spawn(
                    "rover-matcher",
                    Box::new(move || matcher_loop(match_rx, matcher, orch, run)),
                )?;
            }
            Ok(())
        })();

        if let Err(e) = result {
            // 已启动的线程通过运行标志退出
            is_running.store(false, Ordering::Release);
            return Err(e);
        }

        info!(
            "Mission pipeline started ({:?}, local matching: {})",
            self.config.profile, self.config.local_matching
        );
        Ok(Mission::new(orchestrator, correlator, metrics, is_running, threads))
    }
}

fn split_boxed(link: impl Link) -> Result<(BoxedRx, BoxedTx), DriverError> {
    let (rx, tx) = link.split()?;
    Ok((Box::new(rx), Box::new(tx)))
}

fn validate(config: &MissionConfig) -> Result<(), DriverError> {
    if config.motor_speed > 100 {
        return Err(DriverError::InvalidConfig(format!(
            "motor speed {} exceeds 100",
            config.motor_speed
        )));
    }
    if config.detection_timeout.is_zero() {
        return Err(DriverError::InvalidConfig(
            "detection timeout must be positive".to_string(),
        ));
    }
    if config.local_matching && config.match_settle >= config.detection_timeout {
        return Err(DriverError::InvalidConfig(format!(
            "match settle {:?} must be shorter than detection timeout {:?}",
            config.match_settle, config.detection_timeout
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::ChannelLink;
    use rover_planner::StaticRoute;
    use std::time::Duration;

    fn links() -> (ChannelLink, ChannelLink, ChannelLink) {
        (ChannelLink::pair().0, ChannelLink::pair().0, ChannelLink::pair().0)
    }

    #[test]
    fn test_missing_link_is_reported() {
        let (motor, vision, _) = links();
        let result = MissionBuilder::new()
            .planner(StaticRoute::default())
            .motor_link(motor)
            .vision_link(vision)
            .build();
        assert!(matches!(result, Err(DriverError::MissingLink("companion"))));
    }

    #[test]
    fn test_missing_planner_is_invalid() {
        let (motor, vision, companion) = links();
        let result = MissionBuilder::new()
            .motor_link(motor)
            .vision_link(vision)
            .companion_link(companion)
            .build();
        assert!(matches!(result, Err(DriverError::InvalidConfig(_))));
    }

    #[test]
    fn test_settle_must_be_shorter_than_timeout() {
        let mut config = MissionConfig {
            detection_timeout: Duration::from_millis(100),
            match_settle: Duration::from_millis(100),
            ..MissionConfig::default()
        };
        assert!(validate(&config).is_err());

        config.local_matching = false;
        assert!(validate(&config).is_ok());

        config.motor_speed = 101;
        assert!(validate(&config).is_err());
    }
}
