//! 视觉链路
//!
//! 下行：
//! - `DETECT,{obstacle_id}[,{L|C|R}]` 检测查询
//! - `STITCH,{expected},{matched}` 结果汇总请求
//!
//! 上行：
//! - `DET,{label},{confidence},{timestamp_ns}` 检测事件
//! - `OBJECT,{obstacle_id},{confidence},{label}` 远端匹配结果
//! - `NONE,{obstacle_id}` 远端未匹配

use crate::ProtocolError;
use crate::command::LateralHint;
use crate::fields::{Fields, split_tag};

/// 单条检测事件
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Detection {
    /// 类别标签（模型输出的类名）
    pub label: String,
    /// 置信度（0-1）
    pub confidence: f32,
    /// 单调时钟时间戳（纳秒）
    pub timestamp_ns: u64,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, timestamp_ns: u64) -> Self {
        Self {
            label: label.into(),
            confidence,
            timestamp_ns,
        }
    }
}

/// 发往视觉端的请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisionRequest {
    /// 查询刚经过的障碍物对应的标签
    Detect {
        obstacle_id: u32,
        lateral_hint: Option<LateralHint>,
    },
    /// 路径结束，请求汇总结果
    Assemble { expected: usize, matched: usize },
}

impl VisionRequest {
    pub fn encode(&self) -> String {
        match self {
            VisionRequest::Detect {
                obstacle_id,
                lateral_hint: Some(hint),
            } => format!("DETECT,{},{}", obstacle_id, hint.code()),
            VisionRequest::Detect {
                obstacle_id,
                lateral_hint: None,
            } => format!("DETECT,{}", obstacle_id),
            VisionRequest::Assemble { expected, matched } => {
                format!("STITCH,{},{}", expected, matched)
            },
        }
    }

    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let (tag, rest) = split_tag(line)?;
        match tag {
            "DETECT" => {
                let mut fields = Fields::new("DETECT", rest);
                let obstacle_id = fields.next_parse("obstacle_id")?;
                let lateral_hint = match fields.next_optional() {
                    Some(code) => Some(LateralHint::from_code(code).ok_or_else(|| {
                        ProtocolError::InvalidValue {
                            field: "lateral_hint",
                            value: code.to_string(),
                        }
                    })?),
                    None => None,
                };
                Ok(VisionRequest::Detect {
                    obstacle_id,
                    lateral_hint,
                })
            },
            "STITCH" => {
                let mut fields = Fields::new("STITCH", rest);
                let expected = fields.next_parse("expected")?;
                // 旧版只携带 expected
                let matched = match fields.next_optional() {
                    Some(raw) => raw.parse().map_err(|_| ProtocolError::InvalidValue {
                        field: "matched",
                        value: raw.to_string(),
                    })?,
                    None => 0,
                };
                Ok(VisionRequest::Assemble { expected, matched })
            },
            other => Err(ProtocolError::UnknownTag {
                tag: other.to_string(),
            }),
        }
    }
}

/// 视觉端上行消息
#[derive(Debug, Clone, PartialEq)]
pub enum VisionEvent {
    /// 原始检测事件
    Detection(Detection),
    /// 远端匹配成功
    Object {
        obstacle_id: u32,
        confidence: f32,
        label: String,
    },
    /// 远端未匹配
    NoMatch { obstacle_id: u32 },
}

impl VisionEvent {
    pub fn encode(&self) -> String {
        match self {
            VisionEvent::Detection(d) => {
                format!("DET,{},{},{}", d.label, d.confidence, d.timestamp_ns)
            },
            VisionEvent::Object {
                obstacle_id,
                confidence,
                label,
            } => format!("OBJECT,{},{},{}", obstacle_id, confidence, label),
            VisionEvent::NoMatch { obstacle_id } => format!("NONE,{}", obstacle_id),
        }
    }

    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let (tag, rest) = split_tag(line)?;
        match tag {
            "DET" => {
                let mut fields = Fields::new("DET", rest);
                let label = fields.next_str("label")?.to_string();
                let confidence = fields.next_parse("confidence")?;
                let timestamp_ns = fields.next_parse("timestamp_ns")?;
                Ok(VisionEvent::Detection(Detection {
                    label,
                    confidence,
                    timestamp_ns,
                }))
            },
            "OBJECT" => {
                let mut fields = Fields::new("OBJECT", rest);
                let obstacle_id = fields.next_parse("obstacle_id")?;
                let confidence = fields.next_parse("confidence")?;
                let label = fields.next_str("label")?.to_string();
                Ok(VisionEvent::Object {
                    obstacle_id,
                    confidence,
                    label,
                })
            },
            "NONE" => {
                let mut fields = Fields::new("NONE", rest);
                Ok(VisionEvent::NoMatch {
                    obstacle_id: fields.next_parse("obstacle_id")?,
                })
            },
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
    fn test_detect_request() {
        let req = VisionRequest::Detect {
            obstacle_id: 3,
            lateral_hint: Some(LateralHint::Right),
        };
        assert_eq!(req.encode(), "DETECT,3,R");
        assert_eq!(VisionRequest::parse("DETECT,3,R\n").unwrap(), req);
        assert_eq!(
            VisionRequest::parse("DETECT,5").unwrap(),
            VisionRequest::Detect {
                obstacle_id: 5,
                lateral_hint: None
            }
        );
    }

    #[test]
    fn test_stitch_request_legacy_form() {
        assert_eq!(
            VisionRequest::parse("STITCH,5").unwrap(),
            VisionRequest::Assemble {
                expected: 5,
                matched: 0
            }
        );
        assert_eq!(
            VisionRequest::Assemble {
                expected: 5,
                matched: 4
            }
            .encode(),
            "STITCH,5,4"
        );
    }

    #[test]
    fn test_vision_events() {
        match VisionEvent::parse("DET,38,0.91,1500").unwrap() {
            VisionEvent::Detection(d) => {
                assert_eq!(d.label, "38");
                assert!((d.confidence - 0.91).abs() < 1e-6);
                assert_eq!(d.timestamp_ns, 1500);
            },
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(
            VisionEvent::parse("NONE,2").unwrap(),
            VisionEvent::NoMatch { obstacle_id: 2 }
        );
        assert!(matches!(
            VisionEvent::parse("OBJECT,2,0.8").unwrap_err(),
            ProtocolError::MissingField { field: "label", .. }
        ));
        assert!(matches!(
            VisionEvent::parse("DET,11,high,3").unwrap_err(),
            ProtocolError::InvalidValue {
                field: "confidence",
                ..
            }
        ));
        assert_eq!(VisionEvent::parse("  ").unwrap_err(), ProtocolError::Empty);
    }
}
