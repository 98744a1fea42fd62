//! # Myo Serial Link Layer
//!
//! 串口硬件抽象层：统一的 [`SerialLink`] 接口、基于 `serialport` 的原生实现、
//! 线路复位握手以及工频配置的持久化。
//!
//! 上层只通过 [`SerialChannel`] 访问串口，所有 I/O 经由同一把锁串行化。

use std::time::Duration;
use thiserror::Error;

pub mod channel;
pub mod frequency;
pub mod handshake;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod native;

pub use channel::{ChannelConfig, ChannelGuard, SerialChannel};
pub use frequency::FrequencyStore;
pub use handshake::{DrainPolicy, HandshakeConfig};
pub use native::{NativeSerialLink, PortInfo, list_ports};

/// 串口层统一错误类型
#[derive(Error, Debug)]
pub enum SerialError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] SerialDeviceError),
    #[error("Read timeout")]
    Timeout,
    #[error("Port not open")]
    NotOpen,
    #[error("Handshake failed after {attempts} attempts")]
    HandshakeFailed { attempts: u32 },
}

impl SerialError {
    /// 是否为不可恢复错误（设备已消失或无权限），上层应关闭串口
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Device(e) => e.is_fatal(),
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::NotFound
                    | std::io::ErrorKind::PermissionDenied
            ),
            _ => false,
        }
    }
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialDeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    AccessDenied,
    UnsupportedConfig,
    InvalidResponse,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct SerialDeviceError {
    pub kind: SerialDeviceErrorKind,
    pub message: String,
}

impl SerialDeviceError {
    pub fn new(kind: SerialDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            SerialDeviceErrorKind::NoDevice
                | SerialDeviceErrorKind::AccessDenied
                | SerialDeviceErrorKind::NotFound
        )
    }
}

impl From<String> for SerialDeviceError {
    fn from(message: String) -> Self {
        Self::new(SerialDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for SerialDeviceError {
    fn from(message: &str) -> Self {
        Self::new(SerialDeviceErrorKind::Unknown, message)
    }
}

/// 串口控制线
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlLine {
    Rts,
    Dtr,
}

/// 调制解调器状态线
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModemStatus {
    pub cts: bool,
    pub dsr: bool,
    pub ring: bool,
    pub carrier_detect: bool,
}

impl ModemStatus {
    /// 按位打包：bit0 CTS, bit1 DSR, bit2 RI, bit3 CD
    pub fn bits(&self) -> u8 {
        u8::from(self.cts)
            | (u8::from(self.dsr) << 1)
            | (u8::from(self.ring) << 2)
            | (u8::from(self.carrier_detect) << 3)
    }
}

/// 串口链路抽象
///
/// 原生串口与测试用的脚本化链路都实现此 trait。
pub trait SerialLink: Send {
    /// 写入全部字节
    fn write(&mut self, data: &[u8]) -> Result<(), SerialError>;

    /// 读取最多 `buf.len()` 字节，直到缓冲区满或超时
    ///
    /// 超时前一个字节都没有收到时返回 [`SerialError::Timeout`]。
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, SerialError>;

    /// 设置控制线电平
    fn set_control_line(&mut self, line: ControlLine, level: bool) -> Result<(), SerialError>;

    /// 丢弃收发缓冲区中的数据
    fn purge(&mut self) -> Result<(), SerialError>;

    /// 接收缓冲区中可立即读取的字节数
    fn bytes_available(&mut self) -> Result<usize, SerialError> {
        Ok(0)
    }

    fn modem_status(&mut self) -> Result<ModemStatus, SerialError> {
        Ok(ModemStatus::default())
    }

    fn flush(&mut self) -> Result<(), SerialError> {
        Ok(())
    }

    /// 非阻塞读取：没有数据时返回 `Ok(0)`
    fn try_read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        match self.read(buf, Duration::ZERO) {
            Ok(n) => Ok(n),
            Err(SerialError::Timeout) => Ok(0),
            Err(e) => Err(e),
        }
    }
}
