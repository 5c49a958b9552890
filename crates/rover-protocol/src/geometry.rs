//! 网格几何类型
//!
//! 航向使用 8 方向罗盘编码（顺时针，每步 45°）：
//!
//! ```text
//!   NW(7)  N(0)  NE(1)
//!   W(6)    +    E(2)
//!   SW(5)  S(4)  SE(3)
//! ```
//!
//! 坐标系：x 向东增长，y 向北增长。

use crate::ProtocolError;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 8 方向航向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
#[repr(u8)]
pub enum Heading {
    North = 0,
    NorthEast = 1,
    East = 2,
    SouthEast = 3,
    South = 4,
    SouthWest = 5,
    West = 6,
    NorthWest = 7,
}

impl Heading {
    /// 全部航向（按编码顺序）
    pub const ALL: [Heading; 8] = [
        Heading::North,
        Heading::NorthEast,
        Heading::East,
        Heading::SouthEast,
        Heading::South,
        Heading::SouthWest,
        Heading::West,
        Heading::NorthWest,
    ];

    /// 从数值编码转换
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        Heading::try_from(code).map_err(|_| ProtocolError::InvalidHeading { code })
    }

    /// 数值编码（0-7）
    #[inline]
    pub fn code(self) -> u8 {
        self.into()
    }

    /// 沿该航向前进一格的位移 `(dx, dy)`
    pub fn unit(self) -> (i32, i32) {
        match self {
            Heading::North => (0, 1),
            Heading::NorthEast => (1, 1),
            Heading::East => (1, 0),
            Heading::SouthEast => (1, -1),
            Heading::South => (0, -1),
            Heading::SouthWest => (-1, -1),
            Heading::West => (-1, 0),
            Heading::NorthWest => (-1, 1),
        }
    }

    /// 到目标航向的顺时针步数：`(to - self) mod 8`
    #[inline]
    pub fn delta(self, to: Heading) -> u8 {
        (to.code() + 8 - self.code()) % 8
    }

    /// 旋转若干个 45° 步（正数顺时针）
    pub fn rotate(self, steps: i32) -> Heading {
        let code = (self.code() as i32 + steps).rem_euclid(8) as u8;
        // rem_euclid(8) 的结果一定在 0..8 之内
        Heading::ALL[code as usize]
    }

    /// 反方向
    #[inline]
    pub fn opposite(self) -> Heading {
        self.rotate(4)
    }

    /// 是否为正交方向（N/E/S/W）
    #[inline]
    pub fn is_cardinal(self) -> bool {
        self.code() % 2 == 0
    }

    /// 伴侣 App 使用的名称
    pub fn name(self) -> &'static str {
        match self {
            Heading::North => "NORTH",
            Heading::NorthEast => "NORTHEAST",
            Heading::East => "EAST",
            Heading::SouthEast => "SOUTHEAST",
            Heading::South => "SOUTH",
            Heading::SouthWest => "SOUTHWEST",
            Heading::West => "WEST",
            Heading::NorthWest => "NORTHWEST",
        }
    }

    /// 从名称解析（大小写不敏感）
    pub fn from_name(name: &str) -> Option<Heading> {
        let upper = name.trim().to_ascii_uppercase();
        Heading::ALL.into_iter().find(|h| h.name() == upper)
    }
}

impl std::fmt::Display for Heading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 路径规划器输出的带朝向位姿
///
/// 不可变；由命令编译器按顺序消费一次。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrientedState {
    pub x: i32,
    pub y: i32,
    pub heading: Heading,
    /// 到达该位姿后需要拍摄的障碍物 ID
    #[cfg_attr(feature = "serde", serde(default))]
    pub snapshot_obstacle_id: Option<u32>,
}

impl OrientedState {
    pub fn new(x: i32, y: i32, heading: Heading) -> Self {
        Self {
            x,
            y,
            heading,
            snapshot_obstacle_id: None,
        }
    }

    /// 附加拍摄目标
    pub fn with_snapshot(mut self, obstacle_id: u32) -> Self {
        self.snapshot_obstacle_id = Some(obstacle_id);
        self
    }
}

/// 任务中的障碍物
///
/// `facing == None` 表示该障碍物没有图像面（伴侣 App 的 `SKIP`）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Obstacle {
    pub id: u32,
    pub x: i32,
    pub y: i32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub facing: Option<Heading>,
}

impl Obstacle {
    pub fn new(id: u32, x: i32, y: i32, facing: Heading) -> Self {
        Self {
            id,
            x,
            y,
            facing: Some(facing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_codes() {
        for (i, h) in Heading::ALL.iter().enumerate() {
            assert_eq!(h.code() as usize, i);
            assert_eq!(Heading::from_code(i as u8).unwrap(), *h);
        }
        assert_eq!(
            Heading::from_code(8),
            Err(ProtocolError::InvalidHeading { code: 8 })
        );
    }

    #[test]
    fn test_heading_delta_and_rotate() {
        assert_eq!(Heading::North.delta(Heading::East), 2);
        assert_eq!(Heading::East.delta(Heading::North), 6);
        assert_eq!(Heading::West.delta(Heading::NorthWest), 1);
        assert_eq!(Heading::NorthWest.delta(Heading::North), 1);
        assert_eq!(Heading::North.rotate(-1), Heading::NorthWest);
        assert_eq!(Heading::SouthWest.rotate(4), Heading::NorthEast);
        assert_eq!(Heading::South.opposite(), Heading::North);
    }

    #[test]
    fn test_unit_vectors_are_opposite() {
        for h in Heading::ALL {
            let (dx, dy) = h.unit();
            let (ox, oy) = h.opposite().unit();
            assert_eq!((dx, dy), (-ox, -oy));
        }
    }

    #[test]
    fn test_heading_names() {
        assert_eq!(Heading::from_name("north"), Some(Heading::North));
        assert_eq!(Heading::from_name(" WEST "), Some(Heading::West));
        assert_eq!(Heading::from_name("SKIP"), None);
        assert_eq!(Heading::SouthEast.to_string(), "SOUTHEAST");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_state_json_shape() {
        let json = r#"{"x":1,"y":2,"heading":"NORTH_EAST","snapshot_obstacle_id":3}"#;
        let state: OrientedState = serde_json::from_str(json).unwrap();
        assert_eq!(state, OrientedState::new(1, 2, Heading::NorthEast).with_snapshot(3));

        let obstacle: Obstacle = serde_json::from_str(r#"{"id":1,"x":5,"y":6}"#).unwrap();
        assert_eq!(obstacle.facing, None);
    }
}
