//! 链路抽象
//!
//! 三条外部链路（电机、视觉、伴侣 App）都是按行收发的文本链路。
//! 具体传输（串口、TCP、蓝牙）不在本 crate 内实现；`ChannelLink`
//! 是基于 crossbeam 通道的内存实现，用于测试和模拟器。

use crate::error::LinkError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::time::Duration;

/// 默认接收超时（空闲时返回 `LinkError::Timeout`，用于检查运行标志）
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(50);

/// 只读端
pub trait LinkRx {
    /// 接收一行（不含换行符）
    fn receive(&mut self) -> Result<String, LinkError>;
}

/// 只写端
pub trait LinkTx {
    /// 发送一行
    fn send(&mut self, line: &str) -> Result<(), LinkError>;
}

/// 可分离为读写两端的链路
pub trait Link {
    type Rx: LinkRx + Send + 'static;
    type Tx: LinkTx + Send + 'static;

    fn split(self) -> Result<(Self::Rx, Self::Tx), LinkError>;
}

impl<T: LinkRx + ?Sized> LinkRx for Box<T> {
    fn receive(&mut self) -> Result<String, LinkError> {
        (**self).receive()
    }
}

impl<T: LinkTx + ?Sized> LinkTx for Box<T> {
    fn send(&mut self, line: &str) -> Result<(), LinkError> {
        (**self).send(line)
    }
}

/// 内存链路
pub struct ChannelLink {
    rx: ChannelRx,
    tx: ChannelTx,
}

impl ChannelLink {
    /// 创建一对互联的链路端点
    pub fn pair() -> (ChannelLink, ChannelLink) {
        Self::pair_with_timeout(DEFAULT_RECEIVE_TIMEOUT)
    }

    pub fn pair_with_timeout(timeout: Duration) -> (ChannelLink, ChannelLink) {
        let (a_tx, b_rx) = unbounded();
        let (b_tx, a_rx) = unbounded();
        let a = ChannelLink {
            rx: ChannelRx { rx: a_rx, timeout },
            tx: ChannelTx { tx: a_tx },
        };
        let b = ChannelLink {
            rx: ChannelRx { rx: b_rx, timeout },
            tx: ChannelTx { tx: b_tx },
        };
        (a, b)
    }
}

impl LinkRx for ChannelLink {
    fn receive(&mut self) -> Result<String, LinkError> {
        self.rx.receive()
    }
}

impl LinkTx for ChannelLink {
    fn send(&mut self, line: &str) -> Result<(), LinkError> {
        self.tx.send(line)
    }
}

impl Link for ChannelLink {
    type Rx = ChannelRx;
    type Tx = ChannelTx;

    fn split(self) -> Result<(ChannelRx, ChannelTx), LinkError> {
        Ok((self.rx, self.tx))
    }
}

/// 内存链路读端
pub struct ChannelRx {
    rx: Receiver<String>,
    timeout: Duration,
}

impl LinkRx for ChannelRx {
    fn receive(&mut self) -> Result<String, LinkError> {
        match self.rx.recv_timeout(self.timeout) {
            Ok(line) => Ok(line),
            Err(RecvTimeoutError::Timeout) => Err(LinkError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(LinkError::Disconnected),
        }
    }
}

/// 内存链路写端
#[derive(Clone)]
pub struct ChannelTx {
    tx: Sender<String>,
}

impl LinkTx for ChannelTx {
    fn send(&mut self, line: &str) -> Result<(), LinkError> {
        self.tx
            .send(line.to_string())
            .map_err(|_| LinkError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_round_trip() {
        let (mut a, mut b) = ChannelLink::pair();
        a.send(":1/MOTOR/FWD/50/10;").unwrap();
        assert_eq!(b.receive().unwrap(), ":1/MOTOR/FWD/50/10;");
        b.send("OK").unwrap();
        assert_eq!(a.receive().unwrap(), "OK");
    }

    #[test]
    fn test_timeout_and_disconnect() {
        let (a, b) = ChannelLink::pair_with_timeout(Duration::from_millis(5));
        let (mut rx, _tx) = a.split().unwrap();
        assert!(matches!(rx.receive(), Err(LinkError::Timeout)));

        drop(b);
        assert!(matches!(rx.receive(), Err(LinkError::Disconnected)));
    }

    #[test]
    fn test_boxed_halves() {
        let (a, mut b) = ChannelLink::pair();
        let (rx, tx) = a.split().unwrap();
        let mut rx: Box<dyn LinkRx + Send> = Box::new(rx);
        let mut tx: Box<dyn LinkTx + Send> = Box::new(tx);
        tx.send("DETECT,1").unwrap();
        assert_eq!(b.receive().unwrap(), "DETECT,1");
        b.send("NONE,1").unwrap();
        assert_eq!(rx.receive().unwrap(), "NONE,1");
    }
}
