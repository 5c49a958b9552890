//! 分段
//!
//! 以 Snapshot 为边界切分编译结果。每个 Snapshot 关闭当前分段，
//! 并把障碍物 id 记录为该分段的检测触发；尾部命令（以 Stop 结尾）
//! 组成最后一个分段。电机命令序号在这里分配（从 1 开始）。

use crate::compiler::CompiledRoute;
use rover_protocol::{LateralHint, MotorCommand, PrimitiveCommand};

/// 分段结束时的检测触发
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SnapshotTrigger {
    pub obstacle_id: u32,
    pub lateral_hint: Option<LateralHint>,
}

/// 单个分段
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Segment {
    /// 按执行顺序排列的电机命令
    pub commands: Vec<MotorCommand>,
    /// 分段结束后需要检测的障碍物
    pub trigger: Option<SnapshotTrigger>,
    /// 估算耗时（秒）
    pub estimated_secs: f64,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn obstacle_id(&self) -> Option<u32> {
        self.trigger.map(|t| t.obstacle_id)
    }
}

/// 分段计划
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentPlan {
    pub segments: Vec<Segment>,
}

impl SegmentPlan {
    /// 从编译结果构建分段计划
    pub fn from_route(route: &CompiledRoute) -> Self {
        let mut segments = Vec::new();
        let mut current = Segment::default();
        let mut seq: u32 = 0;

        for (command, secs) in route.iter() {
            match *command {
                PrimitiveCommand::Snapshot {
                    obstacle_id,
                    lateral_hint,
                } => {
                    current.trigger = Some(SnapshotTrigger {
                        obstacle_id,
                        lateral_hint,
                    });
                    segments.push(std::mem::take(&mut current));
                },
                cmd => {
                    seq += 1;
                    current.commands.push(MotorCommand::new(seq, cmd));
                    current.estimated_secs += secs;
                },
            }
        }

        if !current.is_empty() || segments.is_empty() {
            segments.push(current);
        }

        Self { segments }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    /// 按分段下标排列的障碍物 id（`None` 表示该分段无检测）
    pub fn obstacle_order(&self) -> Vec<Option<u32>> {
        self.segments.iter().map(Segment::obstacle_id).collect()
    }

    /// 检测触发数量（汇总请求中的期望匹配数）
    pub fn trigger_count(&self) -> usize {
        self.segments.iter().filter(|s| s.trigger.is_some()).count()
    }

    /// 电机命令总数
    pub fn command_count(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }

    pub fn total_secs(&self) -> f64 {
        self.segments.iter().map(|s| s.estimated_secs).sum()
    }
}

/// 切分编译结果
pub fn segment(route: &CompiledRoute) -> SegmentPlan {
    SegmentPlan::from_route(route)
}
