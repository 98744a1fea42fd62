//! 线路复位握手
//!
//! 握手时主机发送 `K7-MYO5`（50 Hz 工频）或 `K7-MYO6`（60 Hz 工频），
//! 设备应答以 `K7-MYO Ver` 开头的版本串（例如 `K7-MYO Ver 2.0\r`）。

use crate::ProtocolError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// 50 Hz 握手魔数
pub const HANDSHAKE_50HZ: &[u8] = b"K7-MYO5";
/// 60 Hz 握手魔数
pub const HANDSHAKE_60HZ: &[u8] = b"K7-MYO6";
/// 设备应答前缀
pub const HANDSHAKE_RESPONSE_PREFIX: &[u8] = b"K7-MYO Ver";

/// 等待握手应答的超时
pub const HANDSHAKE_RESPONSE_TIMEOUT: Duration = Duration::from_millis(1000);
/// 前缀匹配后读取版本号余下部分的超时
pub const HANDSHAKE_TAIL_TIMEOUT: Duration = Duration::from_millis(20);
/// 握手总尝试次数
pub const HANDSHAKE_ATTEMPTS: u32 = 10;
/// 两次握手尝试之间的等待
pub const HANDSHAKE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// 工频（决定设备的陷波配置）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LineFrequency {
    /// 50 Hz
    Hz50,
    /// 60 Hz（默认）
    #[default]
    Hz60,
}

impl LineFrequency {
    /// 握手时发送的魔数
    pub fn handshake_magic(self) -> &'static [u8] {
        match self {
            Self::Hz50 => HANDSHAKE_50HZ,
            Self::Hz60 => HANDSHAKE_60HZ,
        }
    }

    /// 频率数值（Hz）
    pub fn hz(self) -> u32 {
        match self {
            Self::Hz50 => 50,
            Self::Hz60 => 60,
        }
    }
}

impl TryFrom<u32> for LineFrequency {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            50 => Ok(Self::Hz50),
            60 => Ok(Self::Hz60),
            other => Err(ProtocolError::InvalidValue {
                field: "line_frequency".to_string(),
                value: other,
            }),
        }
    }
}

impl FromStr for LineFrequency {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u32 = s.trim().parse().map_err(|_| ProtocolError::InvalidValue {
            field: "line_frequency".to_string(),
            value: 0,
        })?;
        Self::try_from(value)
    }
}

impl fmt::Display for LineFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hz())
    }
}

/// 判断握手应答是否有效（以 `K7-MYO Ver` 开头）
pub fn is_handshake_response(response: &[u8]) -> bool {
    response.starts_with(HANDSHAKE_RESPONSE_PREFIX)
}
