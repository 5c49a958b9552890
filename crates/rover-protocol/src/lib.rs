//! # Rover Protocol
//!
//! 任务数据模型与三条链路的行协议定义（无 IO 依赖）
//!
//! ## 模块
//!
//! - `geometry`: 航向、位姿、障碍物
//! - `command`: 原语命令（Move / Turn / Snapshot / Stop）
//! - `motor`: 电机控制器链路编解码
//! - `vision`: 视觉链路编解码
//! - `companion`: 伴侣 App 链路编解码
//!
//! ## 线格式
//!
//! 所有链路都使用 ASCII 行协议，一行一条消息。
//! 编码只发生在传输边界，上层始终使用强类型的消息枚举。

pub mod command;
pub mod companion;
pub mod geometry;
pub mod motor;
pub mod vision;

mod fields;

// 重新导出常用类型
pub use command::*;
pub use companion::*;
pub use geometry::*;
pub use motor::*;
pub use vision::*;

use thiserror::Error;

/// 协议层错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// 空消息
    #[error("Empty message")]
    Empty,

    /// 未知消息标签
    #[error("Unknown message tag: {tag}")]
    UnknownTag { tag: String },

    /// 缺少字段
    #[error("Missing field `{field}` in {message} message")]
    MissingField {
        message: &'static str,
        field: &'static str,
    },

    /// 字段值无效
    #[error("Invalid value for `{field}`: {value:?}")]
    InvalidValue { field: &'static str, value: String },

    /// 无效的航向编码（有效范围 0-7）
    #[error("Invalid heading code: {code}")]
    InvalidHeading { code: u8 },

    /// Snapshot 不会下发到电机链路
    #[error("Snapshot commands are not motor-bound")]
    NotMotorBound,
}
