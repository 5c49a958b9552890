//! # 时间戳处理
//!
//! 所有检测事件与匹配查询共用同一个单调时钟：以进程内首次访问为锚点，
//! 不受系统时间调整（NTP、手动修改）影响，可直接存入 `AtomicU64`。

use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// 单调时钟锚点，首次访问时设置，之后不变
static APP_START: OnceLock<Instant> = OnceLock::new();

/// 自锚点以来的纳秒数
pub fn monotonic_nanos() -> u64 {
    let start = APP_START.get_or_init(Instant::now);
    start.elapsed().as_nanos() as u64
}

/// 距离某个单调时间戳已过去的时长
pub fn nanos_since(timestamp_ns: u64) -> Duration {
    Duration::from_nanos(monotonic_nanos().saturating_sub(timestamp_ns))
}
