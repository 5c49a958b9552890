//! 驱动层错误类型定义

use rover_planner::PlanError;
use rover_protocol::ProtocolError;
use thiserror::Error;

/// 链路错误
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// 接收超时（空闲，正常情况）
    #[error("Read timeout")]
    Timeout,

    /// 对端已关闭
    #[error("Link disconnected")]
    Disconnected,

    /// 链路不可用（如 split 失败）
    #[error("Link unavailable: {0}")]
    Unavailable(String),
}

impl LinkError {
    /// 是否为致命错误（应结束对应的 IO 线程）
    pub fn is_fatal(&self) -> bool {
        matches!(self, LinkError::Disconnected | LinkError::Unavailable(_))
    }
}

/// 编排器错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    /// 重发次数耗尽（致命，任务中止）
    #[error("Command {seq} was resent {attempts} times without acknowledgement")]
    ResendLimitExceeded { seq: u32, attempts: u32 },

    /// 任务已启动或已结束
    #[error("Mission already started (phase: {phase})")]
    AlreadyStarted { phase: String },

    /// 命令编码失败
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// 构建时缺少链路
    #[error("Missing {0} link")]
    MissingLink(&'static str),

    /// 配置无效
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// 线程启动失败
    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },

    /// 等待超时
    #[error("Operation timeout")]
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_error_fatality() {
        assert!(!LinkError::Timeout.is_fatal());
        assert!(LinkError::Disconnected.is_fatal());
        assert!(LinkError::Unavailable("split".to_string()).is_fatal());
        let io = LinkError::from(std::io::Error::other("reset"));
        assert!(!io.is_fatal());
    }

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::from(OrchestratorError::ResendLimitExceeded {
            seq: 4,
            attempts: 3,
        });
        assert_eq!(
            err.to_string(),
            "Orchestrator error: Command 4 was resent 3 times without acknowledgement"
        );

        assert_eq!(DriverError::MissingLink("motor").to_string(), "Missing motor link");
        assert_eq!(DriverError::Timeout.to_string(), "Operation timeout");

        let err = DriverError::from(LinkError::Disconnected);
        assert!(err.to_string().contains("Link disconnected"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: OrchestratorError = ProtocolError::NotMotorBound.into();
        assert!(matches!(err, OrchestratorError::Protocol(_)));
    }
}
