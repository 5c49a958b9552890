//! 伴侣 App 链路
//!
//! 上行（App -> 机器人）：
//! - `OBSTACLE,{id},{x*10},{y*10},{NORTH|EAST|SOUTH|WEST|SKIP}`
//! - `CLEAR` 清空障碍物
//! - `BEGIN` 开始任务
//! - `ABORT` / `FOUND` 终止任务（例如目标已找到）
//!
//! 下行（机器人 -> App）：
//! - `TARGET,{obstacle_id},{label}`
//! - `STATUS,{text}`

use crate::ProtocolError;
use crate::fields::{Fields, split_tag};
use crate::geometry::{Heading, Obstacle};

/// App 坐标与网格坐标的比例
pub const COMPANION_COORD_SCALE: i32 = 10;

/// App 上行消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompanionMessage {
    Obstacle(Obstacle),
    Clear,
    Begin,
    /// 终止任务，携带原因
    Abort(String),
}

impl CompanionMessage {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let (tag, rest) = split_tag(line)?;
        match tag {
            "OBSTACLE" => {
                let mut fields = Fields::new("OBSTACLE", rest);
                let id = fields.next_parse("id")?;
                let x: i32 = fields.next_parse("x")?;
                let y: i32 = fields.next_parse("y")?;
                let facing_raw = fields.next_str("facing")?;
                let facing = if facing_raw.eq_ignore_ascii_case("SKIP") {
                    None
                } else {
                    Some(Heading::from_name(facing_raw).ok_or_else(|| {
                        ProtocolError::InvalidValue {
                            field: "facing",
                            value: facing_raw.to_string(),
                        }
                    })?)
                };
                Ok(CompanionMessage::Obstacle(Obstacle {
                    id,
                    x: x / COMPANION_COORD_SCALE,
                    y: y / COMPANION_COORD_SCALE,
                    facing,
                }))
            },
            "CLEAR" => Ok(CompanionMessage::Clear),
            "BEGIN" => Ok(CompanionMessage::Begin),
            "ABORT" | "FOUND" => {
                let reason = if rest.trim().is_empty() {
                    tag.to_ascii_lowercase()
                } else {
                    rest.trim().to_string()
                };
                Ok(CompanionMessage::Abort(reason))
            },
            other => Err(ProtocolError::UnknownTag {
                tag: other.to_string(),
            }),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            CompanionMessage::Obstacle(ob) => format!(
                "OBSTACLE,{},{},{},{}",
                ob.id,
                ob.x * COMPANION_COORD_SCALE,
                ob.y * COMPANION_COORD_SCALE,
                ob.facing.map(Heading::name).unwrap_or("SKIP")
            ),
            CompanionMessage::Clear => "CLEAR".to_string(),
            CompanionMessage::Begin => "BEGIN".to_string(),
            CompanionMessage::Abort(reason) => format!("ABORT,{}", reason),
        }
    }
}

/// 发往 App 的报告
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompanionReport {
    /// 障碍物与识别标签的匹配结果
    Target { obstacle_id: u32, label: String },
    /// 状态文本
    Status(String),
}

impl CompanionReport {
    pub fn encode(&self) -> String {
        match self {
            CompanionReport::Target { obstacle_id, label } => {
                format!("TARGET,{},{}", obstacle_id, label)
            },
            CompanionReport::Status(text) => format!("STATUS,{}", text),
        }
    }

    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let (tag, rest) = split_tag(line)?;
        match tag {
            "TARGET" => {
                let mut fields = Fields::new("TARGET", rest);
                let obstacle_id = fields.next_parse("obstacle_id")?;
                let label = fields.next_str("label")?.to_string();
                Ok(CompanionReport::Target { obstacle_id, label })
            },
            "STATUS" => Ok(CompanionReport::Status(rest.trim().to_string())),
            other => Err(ProtocolError::UnknownTag {
                tag: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_obstacle_scales_coordinates() {
        let msg = CompanionMessage::parse("OBSTACLE,3,150,40,WEST\n").unwrap();
        assert_eq!(
            msg,
            CompanionMessage::Obstacle(Obstacle::new(3, 15, 4, Heading::West))
        );
        assert_eq!(msg.encode(), "OBSTACLE,3,150,40,WEST");
    }

    #[test]
    fn test_parse_skip_facing() {
        match CompanionMessage::parse("OBSTACLE,1,10,10,SKIP").unwrap() {
            CompanionMessage::Obstacle(ob) => assert_eq!(ob.facing, None),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_control_messages() {
        assert_eq!(CompanionMessage::parse("BEGIN").unwrap(), CompanionMessage::Begin);
        assert_eq!(CompanionMessage::parse("CLEAR").unwrap(), CompanionMessage::Clear);
        assert_eq!(
            CompanionMessage::parse("FOUND").unwrap(),
            CompanionMessage::Abort("found".to_string())
        );
        assert_eq!(
            CompanionMessage::parse("ABORT,operator stop").unwrap(),
            CompanionMessage::Abort("operator stop".to_string())
        );
        assert!(matches!(
            CompanionMessage::parse("OBSTACLE,1,10,10,UP"),
            Err(ProtocolError::InvalidValue { field: "facing", .. })
        ));
        assert!(matches!(
            CompanionMessage::parse("HELLO"),
            Err(ProtocolError::UnknownTag { .. })
        ));
    }

    #[test]
    fn test_reports() {
        let report = CompanionReport::Target {
            obstacle_id: 2,
            label: "38".to_string(),
        };
        assert_eq!(report.encode(), "TARGET,2,38");
        assert_eq!(CompanionReport::parse("TARGET,2,38").unwrap(), report);
    }
}
