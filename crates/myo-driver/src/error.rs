//! 驱动层错误类型定义

use crate::config::ConfigError;
use myo_serial::SerialError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 未知命令字符串
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// 模式不存在或当前上下文不允许
    #[error("Invalid mode: {0}")]
    InvalidMode(String),

    /// 设备未连接，且模式不支持无设备数据
    #[error("Device disconnected")]
    DeviceDisconnected,

    /// 握手尝试耗尽
    #[error("Handshake failed")]
    HandshakeFailed,

    /// 超时前没有收到数据
    #[error("Timeout occurred")]
    Timeout,

    #[error("Write operation failed: {0}")]
    WriteFailed(String),

    #[error("Read operation failed: {0}")]
    ReadFailed(String),

    /// 重同步没有找到任何合法块
    #[error("Frame synchronization lost")]
    SyncLost,

    /// 调用方缓冲区不足
    #[error("Buffer overflow: {required} bytes required, {available} available")]
    BufferOverflow { required: usize, available: usize },

    /// 期望的设备应答字节没有到达
    #[error("No data received")]
    NoData,

    /// 模式缺少所需行为
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// 模式尚未完成握手
    #[error("Mode not ready: {0}")]
    NotReady(String),

    /// 串口设备错误（设备消失等不可恢复错误保留原始信息）
    #[error("Serial device error: {0}")]
    Serial(SerialError),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// 后台线程错误
    #[error("IO thread error: {0}")]
    IoThread(String),
}

impl DriverError {
    /// 是否由模式管理器自动重试
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::ReadFailed(_) | Self::WriteFailed(_) | Self::SyncLost | Self::NoData => {
                true
            },
            Self::Serial(e) => !e.is_fatal(),
            _ => false,
        }
    }

    /// 设备是否已经消失（串口应关闭）
    pub fn is_device_lost(&self) -> bool {
        matches!(self, Self::Serial(e) if e.is_fatal())
    }

    /// 把写入路径上的串口错误映射为驱动错误
    pub fn from_write(err: SerialError) -> Self {
        match err {
            SerialError::Io(_) | SerialError::Device(_) if !err.is_fatal() => {
                Self::WriteFailed(err.to_string())
            },
            other => other.into(),
        }
    }

    /// 把读取路径上的串口错误映射为驱动错误
    pub fn from_read(err: SerialError) -> Self {
        match err {
            SerialError::Io(_) | SerialError::Device(_) if !err.is_fatal() => {
                Self::ReadFailed(err.to_string())
            },
            other => other.into(),
        }
    }
}

impl From<SerialError> for DriverError {
    fn from(err: SerialError) -> Self {
        match err {
            SerialError::Timeout => Self::Timeout,
            SerialError::NotOpen => Self::DeviceDisconnected,
            SerialError::HandshakeFailed { .. } => Self::HandshakeFailed,
            other => Self::Serial(other),
        }
    }
}

impl From<myo_protocol::ProtocolError> for DriverError {
    fn from(err: myo_protocol::ProtocolError) -> Self {
        match err {
            myo_protocol::ProtocolError::InvalidCommand(cmd) => Self::InvalidCommand(cmd),
            other => Self::InvalidMode(other.to_string()),
        }
    }
}
