//! 编译层错误类型定义

use rover_protocol::Heading;
use thiserror::Error;

/// 命令编译错误
///
/// 全部属于契约违反：位姿序列与编译规则不一致时中止编译，
/// 不会输出可能错误的命令。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// 位姿数量不足（至少需要 2 个）
    #[error("At least 2 states are required, got {count}")]
    TooFewStates { count: usize },

    /// 航向不变时的位移不是单位前进/后退
    #[error(
        "Unexpected straight movement at state {index}: heading {heading}, expected {expected:?} or its opposite, got ({dx}, {dy})"
    )]
    InvalidStraightMove {
        index: usize,
        heading: Heading,
        expected: (i32, i32),
        dx: i32,
        dy: i32,
    },

    /// 航向变化不是 ±45° / ±90° / 180°
    #[error("Unexpected heading change at state {index}: {from} -> {to} ({steps} steps)")]
    InvalidHeadingChange {
        index: usize,
        from: Heading,
        to: Heading,
        steps: u8,
    },

    /// 拍摄目标不在障碍物集合中
    #[error("State {index} requests a snapshot of unknown obstacle {obstacle_id}")]
    UnknownObstacle { index: usize, obstacle_id: u32 },

    /// 编译配置无效
    #[error("Invalid compiler config: {0}")]
    InvalidConfig(String),
}

/// 外部路径规划器错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Route planner failed: {message}")]
pub struct PlannerError {
    pub message: String,
}

impl PlannerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// 规划 + 编译的组合错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error(transparent)]
    Compile(#[from] CompileError),
}
