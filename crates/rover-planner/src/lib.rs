//! # Rover Planner
//!
//! 把路径规划器输出的位姿序列编译为电机原语命令（纯函数，无共享状态）。
//!
//! ## 流程
//!
//! ```text
//! RoutePlanner ──> [OrientedState] ──compile()──> CompiledRoute
//!                                                    │
//!                                               SegmentPlan::from_route()
//!                                                    │
//!                                          [Segment] + obstacle_order
//! ```
//!
//! ## 模块
//!
//! - `compiler`: 位姿序列 -> 命令序列（含行程压缩与耗时估算）
//! - `segment`: 按拍摄点切分为分段，分配电机命令序号
//! - `replay`: 航位推算，用于验证编译结果
//! - `planner`: 外部路径规划器的抽象

pub mod compiler;
mod error;
pub mod planner;
pub mod replay;
pub mod segment;

pub use compiler::{CompiledRoute, CompilerConfig, compile, estimate_duration};
pub use error::{CompileError, PlanError, PlannerError};
pub use planner::{PlannedRoute, RoutePlanner, StaticRoute, plan_route};
pub use replay::{Pose, dead_reckon};
pub use segment::{Segment, SegmentPlan, SnapshotTrigger, segment};
