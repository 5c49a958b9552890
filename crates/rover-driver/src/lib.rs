//! 驱动层模块
//!
//! 把编译好的分段计划交给三条外部链路执行：
//! - 电机链路：逐条下发命令，收到确认后推进，按需重发
//! - 视觉链路：接收检测事件，分段结束时发出检测查询
//! - 伴侣 App：接收障碍物与开始/中止指令，回报匹配结果
//!
//! # 线程模型
//!
//! 每条链路一个 RX 线程和一个 TX 线程，外加可选的本地匹配线程。
//! 状态机由 [`Orchestrator`] 独占（Mutex 保护），状态快照通过 ArcSwap 无锁读取。
//!
//! ```text
//! motor-rx ──ACK/RESEND──┐
//! vision-rx ──DET──> Correlator <── matcher
//!           ──OBJECT/NONE──┐           │
//! companion-rx ──BEGIN/ABORT──> Orchestrator ──> Outbound ──> *-tx
//! ```

mod builder;
pub mod correlator;
mod error;
pub mod link;
pub mod matcher;
pub mod metrics;
mod mission;
pub mod orchestrator;
pub mod pipeline;
pub mod signal;

pub use builder::MissionBuilder;
pub use correlator::{Correlator, DetectionFilter, LabelInterval, LabelMatch};
pub use error::{DriverError, LinkError, OrchestratorError};
pub use link::{ChannelLink, ChannelRx, ChannelTx, Link, LinkRx, LinkTx};
pub use matcher::LocalMatcher;
pub use metrics::{MetricsSnapshot, RunMetrics};
pub use mission::Mission;
pub use orchestrator::{
    DetectionOutcome, MatchRequest, MissionConfig, ObstacleMatch, Orchestrator, Outbound,
    OutboundQueues, Phase, RunReport, RunStatus,
};
pub use signal::{AbortSignal, WaitOutcome};

pub use rover_planner::{RoutePlanner, StaticRoute};
pub use rover_tools::MissionProfile;
