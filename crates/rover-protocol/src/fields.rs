//! 逗号分隔字段读取工具

use crate::ProtocolError;
use std::str::FromStr;

/// 按顺序读取一条消息中的字段
pub(crate) struct Fields<'a> {
    message: &'static str,
    parts: std::str::Split<'a, char>,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(message: &'static str, rest: &'a str) -> Self {
        Self {
            message,
            parts: rest.split(','),
        }
    }

    pub(crate) fn next_str(&mut self, field: &'static str) -> Result<&'a str, ProtocolError> {
        match self.parts.next().map(str::trim) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ProtocolError::MissingField {
                message: self.message,
                field,
            }),
        }
    }

    pub(crate) fn next_parse<T: FromStr>(&mut self, field: &'static str) -> Result<T, ProtocolError> {
        let raw = self.next_str(field)?;
        raw.parse().map_err(|_| ProtocolError::InvalidValue {
            field,
            value: raw.to_string(),
        })
    }

    /// 可选的尾部字段
    pub(crate) fn next_optional(&mut self) -> Option<&'a str> {
        self.parts.next().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// 拆分消息标签和剩余部分（`TAG,rest`）
pub(crate) fn split_tag(line: &str) -> Result<(&str, &str), ProtocolError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ProtocolError::Empty);
    }
    Ok(match line.split_once(',') {
        Some((tag, rest)) => (tag.trim(), rest),
        None => (line, ""),
    })
}
