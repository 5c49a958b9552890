//! 电机控制器链路
//!
//! 下行格式：`:{seq}/MOTOR/{ACTION}/{speed}/{param};`
//!
//! | ACTION | param |
//! |--------|-------|
//! | `FWD` / `REV` | 距离 |
//! | `TURNL` / `TURNR` / `REVTURNL` / `REVTURNR` | 角度（45/90/180） |
//! | `STOP` | 0（速度同样为 0） |
//!
//! 上行：包含 `RESEND` 的行为重发请求，包含 `OK` 或 `ACK` 的行为确认。

use crate::ProtocolError;
use crate::command::{MotorCommand, MoveSense, PrimitiveCommand, TurnAngle, TurnSide};

/// 默认电机速度（0-100）
pub const DEFAULT_MOTOR_SPEED: u8 = 50;

/// 编码电机命令
pub fn encode_motor_command(cmd: &MotorCommand, speed: u8) -> Result<String, ProtocolError> {
    let (action, speed, param) = match cmd.command {
        PrimitiveCommand::Move { sense, distance } => {
            let action = match sense {
                MoveSense::Forward => "FWD",
                MoveSense::Backward => "REV",
            };
            (action, speed, distance)
        },
        PrimitiveCommand::Turn { side, angle, sense } => {
            let action = match (sense, side) {
                (MoveSense::Forward, TurnSide::Left) => "TURNL",
                (MoveSense::Forward, TurnSide::Right) => "TURNR",
                (MoveSense::Backward, TurnSide::Left) => "REVTURNL",
                (MoveSense::Backward, TurnSide::Right) => "REVTURNR",
            };
            (action, speed, angle.degrees())
        },
        PrimitiveCommand::Stop => ("STOP", 0, 0),
        PrimitiveCommand::Snapshot { .. } => return Err(ProtocolError::NotMotorBound),
    };
    Ok(format!(":{}/MOTOR/{}/{}/{};", cmd.seq, action, speed, param))
}

/// 解码后的电机命令（控制器侧视角）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedMotorCommand {
    pub command: MotorCommand,
    pub speed: u8,
}

/// 解码电机命令（用于模拟控制器与测试）
pub fn decode_motor_command(line: &str) -> Result<DecodedMotorCommand, ProtocolError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ProtocolError::Empty);
    }
    let body = line
        .strip_prefix(':')
        .and_then(|s| s.strip_suffix(';'))
        .ok_or_else(|| ProtocolError::InvalidValue {
            field: "frame",
            value: line.to_string(),
        })?;

    let mut parts = body.split('/');
    let mut next = |field: &'static str| {
        parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or(ProtocolError::MissingField {
                message: "MOTOR",
                field,
            })
    };

    let seq_raw = next("seq")?;
    let tag = next("tag")?;
    let action = next("action")?;
    let speed_raw = next("speed")?;
    let param_raw = next("param")?;

    if tag != "MOTOR" {
        return Err(ProtocolError::UnknownTag {
            tag: tag.to_string(),
        });
    }

    let seq: u32 = parse_field("seq", seq_raw)?;
    let speed: u8 = parse_field("speed", speed_raw)?;
    let param: u32 = parse_field("param", param_raw)?;

    let turn = |side, sense| {
        TurnAngle::from_degrees(param)
            .map(|angle| PrimitiveCommand::turn(side, angle, sense))
            .ok_or(ProtocolError::InvalidValue {
                field: "angle",
                value: param.to_string(),
            })
    };

    let command = match action {
        "FWD" => PrimitiveCommand::forward(param),
        "REV" => PrimitiveCommand::backward(param),
        "TURNL" => turn(TurnSide::Left, MoveSense::Forward)?,
        "TURNR" => turn(TurnSide::Right, MoveSense::Forward)?,
        "REVTURNL" => turn(TurnSide::Left, MoveSense::Backward)?,
        "REVTURNR" => turn(TurnSide::Right, MoveSense::Backward)?,
        "STOP" => PrimitiveCommand::Stop,
        other => {
            return Err(ProtocolError::InvalidValue {
                field: "action",
                value: other.to_string(),
            });
        },
    };

    Ok(DecodedMotorCommand {
        command: MotorCommand::new(seq, command),
        speed,
    })
}

fn parse_field<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T, ProtocolError> {
    raw.parse().map_err(|_| ProtocolError::InvalidValue {
        field,
        value: raw.to_string(),
    })
}

/// 控制器上行信号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorReply {
    /// 上一条命令执行完成
    Ack,
    /// 控制器要求重发上一条命令
    Resend,
}

impl MotorReply {
    /// 解析控制器上行行（无关内容返回 `None`）
    ///
    /// `RESEND` 优先于 `OK`/`ACK` 判定。
    pub fn parse(line: &str) -> Option<MotorReply> {
        if line.contains("RESEND") {
            Some(MotorReply::Resend)
        } else if line.contains("OK") || line.contains("ACK") {
            Some(MotorReply::Ack)
        } else {
            None
        }
    }

    pub fn encode(self) -> &'static str {
        match self {
            MotorReply::Ack => "ACK",
            MotorReply::Resend => "RESEND",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_motor_commands() {
        let cases = [
            (PrimitiveCommand::forward(30), ":1/MOTOR/FWD/50/30;"),
            (PrimitiveCommand::backward(10), ":1/MOTOR/REV/50/10;"),
            (
                PrimitiveCommand::turn(TurnSide::Right, TurnAngle::Deg45, MoveSense::Forward),
                ":1/MOTOR/TURNR/50/45;",
            ),
            (
                PrimitiveCommand::turn(TurnSide::Left, TurnAngle::Deg90, MoveSense::Backward),
                ":1/MOTOR/REVTURNL/50/90;",
            ),
            (PrimitiveCommand::Stop, ":1/MOTOR/STOP/0/0;"),
        ];
        for (command, expected) in cases {
            let encoded = encode_motor_command(&MotorCommand::new(1, command), 50).unwrap();
            assert_eq!(encoded, expected);
        }
    }

    #[test]
    fn test_snapshot_not_encodable() {
        let snap = PrimitiveCommand::Snapshot {
            obstacle_id: 2,
            lateral_hint: None,
        };
        assert_eq!(
            encode_motor_command(&MotorCommand::new(3, snap), 50),
            Err(ProtocolError::NotMotorBound)
        );
    }

    #[test]
    fn test_decode_motor_command() {
        let decoded = decode_motor_command(":7/MOTOR/REVTURNR/40/45;\n").unwrap();
        assert_eq!(decoded.speed, 40);
        assert_eq!(decoded.command.seq, 7);
        assert_eq!(
            decoded.command.command,
            PrimitiveCommand::turn(TurnSide::Right, TurnAngle::Deg45, MoveSense::Backward)
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(decode_motor_command(""), Err(ProtocolError::Empty));
        assert!(matches!(
            decode_motor_command(":1/MOTOR/TURNL/50/30;"),
            Err(ProtocolError::InvalidValue { field: "angle", .. })
        ));
        assert!(matches!(
            decode_motor_command(":1/SERVO/FWD/50/30;"),
            Err(ProtocolError::UnknownTag { .. })
        ));
        assert!(matches!(
            decode_motor_command("FW10"),
            Err(ProtocolError::InvalidValue { field: "frame", .. })
        ));
        assert!(matches!(
            decode_motor_command(":1/MOTOR/FWD;"),
            Err(ProtocolError::MissingField { field: "speed", .. })
        ));
    }

    #[test]
    fn test_motor_reply_parse() {
        assert_eq!(MotorReply::parse("ACK\n"), Some(MotorReply::Ack));
        assert_eq!(MotorReply::parse("OK"), Some(MotorReply::Ack));
        assert_eq!(MotorReply::parse("RESEND"), Some(MotorReply::Resend));
        assert_eq!(MotorReply::parse("done"), None);
    }
}
