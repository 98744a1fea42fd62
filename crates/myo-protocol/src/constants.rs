//! 协议常量定义

use std::time::Duration;

/// 高速波特率（默认）
pub const BAUD_RATE_FAST: u32 = 230_400;
/// 低速波特率（旧固件）
pub const BAUD_RATE_SLOW: u32 = 115_200;
/// 默认波特率
pub const DEFAULT_BAUD_RATE: u32 = BAUD_RATE_FAST;

/// 串口默认读写超时
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// 单次读取的最大字节数（采样缓冲区上限）
pub const MAX_BUFFER_SIZE: usize = 32_000;
/// 默认采样缓冲区大小
pub const DEFAULT_BUFFER_SIZE: usize = 1600;
/// 握手应答最大长度
pub const MAX_COMMAND_LENGTH: usize = 32;

/// 清空残留数据时的单次读取块大小
pub const DRAIN_CHUNK_SIZE: usize = 320;
/// 清空残留数据的字节上限
pub const DRAIN_MAX_BYTES: usize = 2000;
/// 清空残留数据的时间上限
pub const DRAIN_TIMEOUT: Duration = Duration::from_millis(80);

/// 默认 EMG 配置字节（无陷波后缀时发送）
pub const DEFAULT_EMG_CONFIG: u8 = b'r';

/// 模式执行失败后的最大尝试次数
pub const MAX_MODE_RETRIES: u32 = 5;
