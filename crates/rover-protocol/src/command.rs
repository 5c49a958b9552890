//! 原语命令定义
//!
//! 命令序列的顺序即执行顺序。线格式编码见 [`motor`](crate::motor)。

/// 前进 / 后退
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MoveSense {
    Forward,
    Backward,
}

/// 转向侧
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TurnSide {
    Left,
    Right,
}

/// 转向角度
///
/// 编译器不会生成 `Deg180`（掉头拆成两条 90° 命令），
/// 但解码器接受它，以兼容手工下发的命令。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TurnAngle {
    Deg45,
    Deg90,
    Deg180,
}

impl TurnAngle {
    /// 角度（度）
    pub fn degrees(self) -> u32 {
        match self {
            TurnAngle::Deg45 => 45,
            TurnAngle::Deg90 => 90,
            TurnAngle::Deg180 => 180,
        }
    }

    /// 45° 步数
    pub fn steps(self) -> i32 {
        (self.degrees() / 45) as i32
    }

    pub fn from_degrees(degrees: u32) -> Option<TurnAngle> {
        match degrees {
            45 => Some(TurnAngle::Deg45),
            90 => Some(TurnAngle::Deg90),
            180 => Some(TurnAngle::Deg180),
            _ => None,
        }
    }
}

/// 拍摄时障碍物相对机器人的横向位置提示
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LateralHint {
    Left,
    Center,
    Right,
}

impl LateralHint {
    /// 单字母线格式（`L` / `C` / `R`）
    pub fn code(self) -> &'static str {
        match self {
            LateralHint::Left => "L",
            LateralHint::Center => "C",
            LateralHint::Right => "R",
        }
    }

    pub fn from_code(code: &str) -> Option<LateralHint> {
        match code {
            "L" => Some(LateralHint::Left),
            "C" => Some(LateralHint::Center),
            "R" => Some(LateralHint::Right),
            _ => None,
        }
    }
}

/// 原语命令
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum PrimitiveCommand {
    /// 直线移动
    Move { sense: MoveSense, distance: u32 },
    /// 原地（或带步进的）转向
    Turn {
        side: TurnSide,
        angle: TurnAngle,
        sense: MoveSense,
    },
    /// 拍摄障碍物（分段边界，不下发到电机）
    Snapshot {
        obstacle_id: u32,
        lateral_hint: Option<LateralHint>,
    },
    /// 终止
    Stop,
}

impl PrimitiveCommand {
    pub fn forward(distance: u32) -> Self {
        PrimitiveCommand::Move {
            sense: MoveSense::Forward,
            distance,
        }
    }

    pub fn backward(distance: u32) -> Self {
        PrimitiveCommand::Move {
            sense: MoveSense::Backward,
            distance,
        }
    }

    pub fn turn(side: TurnSide, angle: TurnAngle, sense: MoveSense) -> Self {
        PrimitiveCommand::Turn { side, angle, sense }
    }

    /// 是否需要下发到电机链路
    #[inline]
    pub fn is_motor_bound(&self) -> bool {
        !matches!(self, PrimitiveCommand::Snapshot { .. })
    }

    /// 该命令造成的航向变化（45° 步，正数顺时针）
    ///
    /// 前进右转与后退左转都使车身顺时针旋转。
    pub fn heading_steps(&self) -> i32 {
        match *self {
            PrimitiveCommand::Turn { side, angle, sense } => {
                let clockwise = matches!(
                    (side, sense),
                    (TurnSide::Right, MoveSense::Forward) | (TurnSide::Left, MoveSense::Backward)
                );
                if clockwise { angle.steps() } else { -angle.steps() }
            },
            _ => 0,
        }
    }
}

impl std::fmt::Display for PrimitiveCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrimitiveCommand::Move { sense, distance } => write!(f, "Move({sense:?}, {distance})"),
            PrimitiveCommand::Turn { side, angle, sense } => {
                write!(f, "Turn({side:?}, {}, {sense:?})", angle.degrees())
            },
            PrimitiveCommand::Snapshot {
                obstacle_id,
                lateral_hint: Some(hint),
            } => write!(f, "Snapshot({obstacle_id}, {hint:?})"),
            PrimitiveCommand::Snapshot {
                obstacle_id,
                lateral_hint: None,
            } => write!(f, "Snapshot({obstacle_id})"),
            PrimitiveCommand::Stop => f.write_str("Stop"),
        }
    }
}

/// 带序号的电机命令
///
/// 序号在一条编译后的路径内从 1 开始连续编号，仅覆盖电机命令。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotorCommand {
    pub seq: u32,
    pub command: PrimitiveCommand,
}

impl MotorCommand {
    pub fn new(seq: u32, command: PrimitiveCommand) -> Self {
        Self { seq, command }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_steps() {
        use MoveSense::*;
        use TurnSide::*;
        let cases = [
            (Right, TurnAngle::Deg45, Forward, 1),
            (Left, TurnAngle::Deg45, Backward, 1),
            (Left, TurnAngle::Deg90, Forward, -2),
            (Right, TurnAngle::Deg90, Backward, -2),
            (Right, TurnAngle::Deg180, Forward, 4),
        ];
        for (side, angle, sense, expected) in cases {
            assert_eq!(
                PrimitiveCommand::turn(side, angle, sense).heading_steps(),
                expected
            );
        }
        assert_eq!(PrimitiveCommand::forward(30).heading_steps(), 0);
    }

    #[test]
    fn test_motor_bound() {
        assert!(PrimitiveCommand::Stop.is_motor_bound());
        assert!(PrimitiveCommand::backward(10).is_motor_bound());
        assert!(
            !PrimitiveCommand::Snapshot {
                obstacle_id: 1,
                lateral_hint: None
            }
            .is_motor_bound()
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(PrimitiveCommand::forward(20).to_string(), "Move(Forward, 20)");
        assert_eq!(
            PrimitiveCommand::Snapshot {
                obstacle_id: 4,
                lateral_hint: Some(LateralHint::Left)
            }
            .to_string(),
            "Snapshot(4, Left)"
        );
    }
}
