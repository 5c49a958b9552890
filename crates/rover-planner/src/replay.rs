//! 航位推算
//!
//! 在网格上重放命令序列，得到最终位姿。转向采用"原地转向后迈一格"模型：
//! 先旋转航向，再沿新航向移动一格（后退转向则反向移动一格）。
//! 180° 按两次 90° 处理。

use crate::compiler::CompilerConfig;
use rover_protocol::{Heading, MoveSense, OrientedState, PrimitiveCommand, TurnAngle};

/// 网格位姿
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pose {
    pub x: i32,
    pub y: i32,
    pub heading: Heading,
}

impl Pose {
    pub fn new(x: i32, y: i32, heading: Heading) -> Self {
        Self { x, y, heading }
    }

    fn step(&mut self, sense: MoveSense, cells: i32) {
        let (ux, uy) = self.heading.unit();
        let sign = match sense {
            MoveSense::Forward => 1,
            MoveSense::Backward => -1,
        };
        self.x += ux * sign * cells;
        self.y += uy * sign * cells;
    }
}

impl From<&OrientedState> for Pose {
    fn from(state: &OrientedState) -> Self {
        Self::new(state.x, state.y, state.heading)
    }
}

impl From<OrientedState> for Pose {
    fn from(state: OrientedState) -> Self {
        Self::from(&state)
    }
}

/// 从 `start` 开始重放命令，返回最终位姿
///
/// Snapshot 与 Stop 不改变位姿。
pub fn dead_reckon(start: Pose, commands: &[PrimitiveCommand], config: &CompilerConfig) -> Pose {
    let unit = config.unit_distance.max(1) as i32;
    let mut pose = start;

    for command in commands {
        match *command {
            PrimitiveCommand::Move { sense, distance } => {
                pose.step(sense, distance as i32 / unit);
            },
            PrimitiveCommand::Turn { angle, sense, .. } => {
                let (chunks, per_chunk) = match angle {
                    TurnAngle::Deg180 => (2, TurnAngle::Deg90.steps()),
                    other => (1, other.steps()),
                };
                let direction = command.heading_steps().signum();
                for _ in 0..chunks {
                    pose.heading = pose.heading.rotate(direction * per_chunk);
                    pose.step(sense, 1);
                }
            },
            PrimitiveCommand::Snapshot { .. } | PrimitiveCommand::Stop => {},
        }
    }

    pose
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_protocol::TurnSide;

    #[test]
    fn test_straight_moves() {
        let config = CompilerConfig::default();
        let pose = dead_reckon(
            Pose::new(0, 0, Heading::North),
            &[PrimitiveCommand::forward(50), PrimitiveCommand::backward(20)],
            &config,
        );
        assert_eq!(pose, Pose::new(0, 3, Heading::North));
    }

    #[test]
    fn test_pivot_and_step_turns() {
        let config = CompilerConfig::default();
        let right45 = PrimitiveCommand::turn(TurnSide::Right, TurnAngle::Deg45, MoveSense::Forward);
        let pose = dead_reckon(Pose::new(0, 1, Heading::North), &[right45], &config);
        assert_eq!(pose, Pose::new(1, 2, Heading::NorthEast));

        // 后退左转：顺时针旋转，反向移动
        let rev_left = PrimitiveCommand::turn(TurnSide::Left, TurnAngle::Deg90, MoveSense::Backward);
        let pose = dead_reckon(Pose::new(2, 2, Heading::North), &[rev_left], &config);
        assert_eq!(pose, Pose::new(1, 2, Heading::East));
    }

    #[test]
    fn test_half_turn_equals_two_quarter_turns() {
        let config = CompilerConfig::default();
        let start = Pose::new(5, 5, Heading::North);
        let half = PrimitiveCommand::turn(TurnSide::Right, TurnAngle::Deg180, MoveSense::Forward);
        let quarter = PrimitiveCommand::turn(TurnSide::Right, TurnAngle::Deg90, MoveSense::Forward);
        assert_eq!(
            dead_reckon(start, &[half], &config),
            dead_reckon(start, &[quarter, quarter], &config)
        );
        assert_eq!(
            dead_reckon(start, &[half], &config),
            Pose::new(6, 4, Heading::South)
        );
    }
}
