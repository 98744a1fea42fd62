//! 线路复位握手参数
//!
//! 握手流程（在通道锁内完成一次尝试）：
//!
//! 1. RTS/DTR 拉低
//! 2. 清空收发缓冲区，并读空残留数据（有上限）
//! 3. RTS/DTR 拉高
//! 4. 发送 `K7-MYO5` / `K7-MYO6`
//! 5. 读取应答前缀并校验 `K7-MYO Ver`，再以短超时收走版本号余下部分
//!
//! 失败后等待固定间隔重试，总次数见 [`HandshakeConfig::attempts`]。

use myo_protocol::{
    DRAIN_CHUNK_SIZE, DRAIN_MAX_BYTES, DRAIN_TIMEOUT, HANDSHAKE_ATTEMPTS, HANDSHAKE_RESPONSE_TIMEOUT,
    HANDSHAKE_RETRY_DELAY,
};
use std::time::Duration;

/// 残留数据清空策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainPolicy {
    /// 单次读取块大小
    pub chunk_size: usize,
    /// 字节上限
    pub max_bytes: usize,
    /// 时间上限
    pub timeout: Duration,
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self {
            chunk_size: DRAIN_CHUNK_SIZE,
            max_bytes: DRAIN_MAX_BYTES,
            timeout: DRAIN_TIMEOUT,
        }
    }
}

/// 握手参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// 总尝试次数
    pub attempts: u32,
    /// 两次尝试之间的等待
    pub retry_delay: Duration,
    /// 等待应答的超时
    pub response_timeout: Duration,
    pub drain: DrainPolicy,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            attempts: HANDSHAKE_ATTEMPTS,
            retry_delay: HANDSHAKE_RETRY_DELAY,
            response_timeout: HANDSHAKE_RESPONSE_TIMEOUT,
            drain: DrainPolicy::default(),
        }
    }
}

impl HandshakeConfig {
    /// 测试用：不等待重试间隔
    pub fn without_delay(mut self) -> Self {
        self.retry_delay = Duration::ZERO;
        self
    }
}
