//! # Myo Protocol
//!
//! K7 肌电/下颌追踪仪串口协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `constants`: 波特率、超时、缓冲区大小等协议常量
//! - `command`: 命令解析与模式注册表
//! - `handshake`: 线路复位握手（工频 50/60 Hz）
//! - `sync`: 通道标签校验与帧重同步
//! - `tilt`: 倾角通道解码与角度计算
//! - `version`: EMG 固件版本解码
//! - `patterns`: 无设备（disconnected）模式下的合成数据
//!
//! ## 数据格式
//!
//! 设备以 16 位字为单位发送采样，每个字的高字节高 4 位为通道标签（tag），
//! 其余 12 位为采样值。串口流经常在字节层面错位，需通过标签模式重新对齐。

pub mod command;
pub mod constants;
pub mod handshake;
pub mod patterns;
pub mod sync;
pub mod tilt;
pub mod version;

// 重新导出常用类型
pub use command::*;
pub use constants::*;
pub use handshake::*;
pub use patterns::fill_pattern;
pub use sync::{BlockLayout, ChannelKind, SyncResult, resync};
pub use tilt::{TiltAngles, decode_tilt, mean_tilt_angles};
pub use version::decode_emg_version;

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// 未知命令字符串
    #[error("Invalid command: {0:?}")]
    InvalidCommand(String),

    /// 数据长度不符合预期
    #[error("Invalid data length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// 字段取值非法
    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: String, value: u32 },
}

/// 读取 16 位大端字（高字节在前）
///
/// 倾角通道按此字节序编码。
pub fn bytes_to_u16_be(bytes: [u8; 2]) -> u16 {
    u16::from_be_bytes(bytes)
}

/// 读取 16 位大端有符号字
pub fn bytes_to_i16_be(bytes: [u8; 2]) -> i16 {
    i16::from_be_bytes(bytes)
}

/// 提取字节的高 4 位（通道标签）
#[inline]
pub fn tag_nibble(byte: u8) -> u8 {
    byte >> 4
}
