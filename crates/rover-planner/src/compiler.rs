//! 命令编译器
//!
//! 输入：有序位姿序列（长度 >= 2）+ 障碍物集合
//! 输出：有序原语命令 + 平行的耗时估算（秒）
//!
//! # 转换规则
//!
//! 对每对相邻位姿 `(prev, curr)` 计算位移 `(dx, dy)` 与航向差
//! `diff = (curr.heading - prev.heading) mod 8`：
//!
//! | diff | 命令 |
//! |------|------|
//! | 0 | 直线 Move，位移必须等于单位向量或其反向 |
//! | 1 / 7 | 45° Turn |
//! | 2 / 6 | 90° Turn |
//! | 4 | 两条同向 90° Turn |
//! | 3 / 5 | 契约违反 |
//!
//! 转向的前进/后退由位移在新航向单位向量上的投影符号决定；
//! 顺时针（diff 1/2）前进为右转、后退为左转，逆时针相反。

use crate::error::CompileError;
use rover_protocol::{
    Heading, LateralHint, MoveSense, Obstacle, OrientedState, PrimitiveCommand, TurnAngle,
    TurnSide,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

/// 编译配置
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CompilerConfig {
    /// 每格对应的距离单位
    pub unit_distance: u32,
    /// 单条 Move 命令的最大距离（行程压缩上限）
    pub max_move_distance: u32,
    /// 每个距离单位的耗时（秒）
    pub seconds_per_unit: f64,
    /// 45° 转向耗时（秒）
    pub turn_45_secs: f64,
    /// 90° 转向耗时（秒），180° 按两倍计算
    pub turn_90_secs: f64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            unit_distance: 10,
            max_move_distance: 180,
            seconds_per_unit: 0.3, // 每格 3 秒
            turn_45_secs: 4.0,
            turn_90_secs: 8.0,
        }
    }
}

impl CompilerConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<(), CompileError> {
        if self.unit_distance == 0 {
            return Err(CompileError::InvalidConfig(
                "unit_distance must be positive".to_string(),
            ));
        }
        if self.max_move_distance < self.unit_distance {
            return Err(CompileError::InvalidConfig(format!(
                "max_move_distance ({}) must be >= unit_distance ({})",
                self.max_move_distance, self.unit_distance
            )));
        }
        let secs = [
            ("seconds_per_unit", self.seconds_per_unit),
            ("turn_45_secs", self.turn_45_secs),
            ("turn_90_secs", self.turn_90_secs),
        ];
        for (name, value) in secs {
            if !value.is_finite() || value < 0.0 {
                return Err(CompileError::InvalidConfig(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// 编译结果
///
/// `commands` 与 `durations` 等长，下标一一对应。
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompiledRoute {
    pub commands: Vec<PrimitiveCommand>,
    pub durations: Vec<f64>,
}

impl CompiledRoute {
    /// 估算总耗时（秒）
    pub fn total_duration(&self) -> f64 {
        self.durations.iter().sum()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// 命令与耗时的配对迭代器
    pub fn iter(&self) -> impl Iterator<Item = (&PrimitiveCommand, f64)> {
        self.commands.iter().zip(self.durations.iter().copied())
    }

    /// 拍摄命令数量
    pub fn snapshot_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, PrimitiveCommand::Snapshot { .. }))
            .count()
    }
}

/// 编译位姿序列
pub fn compile(
    states: &[OrientedState],
    obstacles: &[Obstacle],
    config: &CompilerConfig,
) -> Result<CompiledRoute, CompileError> {
    config.validate()?;
    if states.len() < 2 {
        return Err(CompileError::TooFewStates {
            count: states.len(),
        });
    }

    let obstacles: HashMap<u32, &Obstacle> = obstacles.iter().map(|ob| (ob.id, ob)).collect();
    let mut commands = Vec::with_capacity(states.len() + 1);

    for (offset, pair) in states.windows(2).enumerate() {
        let index = offset + 1;
        let (prev, curr) = (&pair[0], &pair[1]);
        emit_transition(index, prev, curr, config, &mut commands)?;

        if let Some(obstacle_id) = curr.snapshot_obstacle_id {
            let obstacle = obstacles
                .get(&obstacle_id)
                .ok_or(CompileError::UnknownObstacle { index, obstacle_id })?;
            commands.push(PrimitiveCommand::Snapshot {
                obstacle_id,
                lateral_hint: lateral_hint(obstacle, curr),
            });
        }
    }
    commands.push(PrimitiveCommand::Stop);

    let commands = compress_moves(commands, config.max_move_distance);
    let durations = commands
        .iter()
        .map(|cmd| estimate_duration(cmd, config))
        .collect();

    let route = CompiledRoute {
        commands,
        durations,
    };
    debug!(
        "Compiled {} states into {} commands ({} snapshots, ~{:.1}s)",
        states.len(),
        route.len(),
        route.snapshot_count(),
        route.total_duration()
    );
    Ok(route)
}

/// 单个位姿转换
fn emit_transition(
    index: usize,
    prev: &OrientedState,
    curr: &OrientedState,
    config: &CompilerConfig,
    out: &mut Vec<PrimitiveCommand>,
) -> Result<(), CompileError> {
    let dx = curr.x - prev.x;
    let dy = curr.y - prev.y;
    let diff = prev.heading.delta(curr.heading);

    match diff {
        0 => {
            let expected = curr.heading.unit();
            let sense = if (dx, dy) == expected {
                MoveSense::Forward
            } else if (dx, dy) == (-expected.0, -expected.1) {
                MoveSense::Backward
            } else {
                return Err(CompileError::InvalidStraightMove {
                    index,
                    heading: curr.heading,
                    expected,
                    dx,
                    dy,
                });
            };
            out.push(PrimitiveCommand::Move {
                sense,
                distance: config.unit_distance,
            });
        },
        1 | 2 | 6 | 7 => {
            let angle = if diff == 1 || diff == 7 {
                TurnAngle::Deg45
            } else {
                TurnAngle::Deg90
            };
            let sense = turn_sense(curr.heading, dx, dy);
            let clockwise = diff <= 2;
            let side = match (clockwise, sense) {
                (true, MoveSense::Forward) | (false, MoveSense::Backward) => TurnSide::Right,
                (true, MoveSense::Backward) | (false, MoveSense::Forward) => TurnSide::Left,
            };
            out.push(PrimitiveCommand::turn(side, angle, sense));
        },
        4 => {
            // 没有原生 180° 原语：两次同向 90°
            for _ in 0..2 {
                out.push(PrimitiveCommand::turn(
                    TurnSide::Right,
                    TurnAngle::Deg90,
                    MoveSense::Forward,
                ));
            }
        },
        steps => {
            return Err(CompileError::InvalidHeadingChange {
                index,
                from: prev.heading,
                to: curr.heading,
                steps,
            });
        },
    }
    Ok(())
}

/// 位移在新航向上的投影为正则为前进
fn turn_sense(new_heading: Heading, dx: i32, dy: i32) -> MoveSense {
    let (ex, ey) = new_heading.unit();
    if ex * dx > 0 || ey * dy > 0 {
        MoveSense::Forward
    } else {
        MoveSense::Backward
    }
}

/// 拍摄横向提示
///
/// 仅在障碍物朝向与机器人航向正对（四个正交方向对）时给出：
///
/// | 障碍物朝向 | 机器人航向 | 比较轴 | 障碍物坐标更大时 |
/// |-----------|-----------|-------|----------------|
/// | W | E | y | Left |
/// | E | W | y | Right |
/// | N | S | x | Left |
/// | S | N | x | Right |
fn lateral_hint(obstacle: &Obstacle, robot: &OrientedState) -> Option<LateralHint> {
    let facing = obstacle.facing?;
    let (ob_val, robot_val, left_when_greater) = match (facing, robot.heading) {
        (Heading::West, Heading::East) => (obstacle.y, robot.y, true),
        (Heading::East, Heading::West) => (obstacle.y, robot.y, false),
        (Heading::North, Heading::South) => (obstacle.x, robot.x, true),
        (Heading::South, Heading::North) => (obstacle.x, robot.x, false),
        _ => return None,
    };

    Some(match ob_val.cmp(&robot_val) {
        Ordering::Equal => LateralHint::Center,
        Ordering::Greater if left_when_greater => LateralHint::Left,
        Ordering::Greater => LateralHint::Right,
        Ordering::Less if left_when_greater => LateralHint::Right,
        Ordering::Less => LateralHint::Left,
    })
}

/// 行程压缩：合并连续的同向 Move，单条不超过 `cap`
fn compress_moves(commands: Vec<PrimitiveCommand>, cap: u32) -> Vec<PrimitiveCommand> {
    let mut compressed: Vec<PrimitiveCommand> = Vec::with_capacity(commands.len());

    for cmd in commands {
        if let PrimitiveCommand::Move { sense, distance } = cmd {
            if let Some(PrimitiveCommand::Move {
                sense: last_sense,
                distance: last_distance,
            }) = compressed.last_mut()
            {
                if *last_sense == sense && *last_distance + distance <= cap {
                    *last_distance += distance;
                    continue;
                }
            }
        }
        compressed.push(cmd);
    }

    compressed
}

/// 单条命令耗时估算（秒）
pub fn estimate_duration(command: &PrimitiveCommand, config: &CompilerConfig) -> f64 {
    match command {
        PrimitiveCommand::Move { distance, .. } => *distance as f64 * config.seconds_per_unit,
        PrimitiveCommand::Turn { angle, .. } => match angle {
            TurnAngle::Deg45 => config.turn_45_secs,
            TurnAngle::Deg90 => config.turn_90_secs,
            TurnAngle::Deg180 => config.turn_90_secs * 2.0,
        },
        PrimitiveCommand::Snapshot { .. } | PrimitiveCommand::Stop => 0.0,
    }
}
