//! # Rover Tools - 共享配置与工具
//!
//! **依赖原则**: 只依赖 `rover-planner`，避免依赖 `rover-driver`
//!
//! ## 包含模块
//!
//! - `config` - 任务配置文件（TOML）
//! - `timestamp` - 单调时钟时间戳

pub mod config;
pub mod timestamp;

pub use config::{DetectionSettings, MissionFile, MissionProfile, MissionSettings};
pub use timestamp::{monotonic_nanos, nanos_since};
