//! 设备查询：设备字节、EMG 导联状态、EMG 固件版本 / 连接检查
//!
//! 查询类模式每次执行都重新做一次模式握手。

use super::{ModeBehavior, ModeSession, write_byte};
use crate::error::DriverError;
use myo_protocol::patterns::{DISCONNECTED_EQUIPMENT_BYTE, LEAD_STATUS_SENTINEL};
use myo_protocol::version::{DISCONNECTED_VERSION, NOT_CONNECTED, VERSION_RESPONSE_LEN};
use myo_protocol::decode_emg_version;
use std::time::{Duration, Instant};
use tracing::debug;

/// 查询应答的读取超时
const QUERY_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// 设备字节（模式 42 握手应答）
pub struct EquipmentByte;

impl ModeBehavior for EquipmentByte {
    fn execute(&mut self, session: &mut ModeSession, output: &mut [u8]) -> Result<usize, DriverError> {
        session.handshake()?;
        write_byte(session.device_byte(), output)
    }

    fn execute_disconnected(&self, output: &mut [u8]) -> Result<usize, DriverError> {
        write_byte(DISCONNECTED_EQUIPMENT_BYTE, output)
    }

    fn handshake_before_execute(&self) -> bool {
        false
    }
}

/// EMG 导联状态（模式 43 握手后的一个字节，读取失败时为 255）
pub struct LeadStatus;

impl ModeBehavior for LeadStatus {
    fn execute(&mut self, session: &mut ModeSession, output: &mut [u8]) -> Result<usize, DriverError> {
        session.handshake()?;

        let mut byte = [0u8; 1];
        let status = match session.read(&mut byte, QUERY_READ_TIMEOUT) {
            Ok(1) => byte[0],
            Err(e) if e.is_device_lost() => return Err(e),
            _ => {
                debug!("No EMG lead status byte, reporting {}", LEAD_STATUS_SENTINEL);
                LEAD_STATUS_SENTINEL
            },
        };
        write_byte(status, output)
    }

    fn execute_disconnected(&self, output: &mut [u8]) -> Result<usize, DriverError> {
        write_byte(LEAD_STATUS_SENTINEL, output)
    }

    fn handshake_before_execute(&self) -> bool {
        false
    }
}

/// EMG 固件版本（`emg-version`）与连接检查（`check-connection`）
pub struct VersionQuery {
    /// 无设备时返回的字符串
    disconnected: &'static str,
}

impl VersionQuery {
    pub fn version() -> Self {
        Self {
            disconnected: DISCONNECTED_VERSION,
        }
    }

    pub fn connection_check() -> Self {
        Self {
            disconnected: NOT_CONNECTED,
        }
    }

    fn read_response(session: &ModeSession) -> Result<[u8; VERSION_RESPONSE_LEN], DriverError> {
        let deadline = Instant::now() + QUERY_READ_TIMEOUT;
        let mut response = [0u8; VERSION_RESPONSE_LEN];
        let mut filled = 0;
        while filled < VERSION_RESPONSE_LEN {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match session.read(&mut response[filled..], remaining) {
                Ok(n) => filled += n,
                Err(DriverError::Timeout) => break,
                Err(e) => return Err(e),
            }
            if remaining.is_zero() {
                break;
            }
        }
        if filled < VERSION_RESPONSE_LEN {
            return Err(DriverError::NoData);
        }
        Ok(response)
    }
}

fn write_str(text: &str, output: &mut [u8]) -> Result<usize, DriverError> {
    let bytes = text.as_bytes();
    if bytes.len() > output.len() {
        return Err(DriverError::BufferOverflow {
            required: bytes.len(),
            available: output.len(),
        });
    }
    output[..bytes.len()].copy_from_slice(bytes);
    Ok(bytes.len())
}

impl ModeBehavior for VersionQuery {
    fn execute(&mut self, session: &mut ModeSession, output: &mut [u8]) -> Result<usize, DriverError> {
        session.handshake()?;
        let response = Self::read_response(session)?;
        let version = decode_emg_version(&response);
        debug!("EMG firmware version {}", version);
        write_str(&version, output)
    }

    fn execute_disconnected(&self, output: &mut [u8]) -> Result<usize, DriverError> {
        write_str(self.disconnected, output)
    }

    fn handshake_before_execute(&self) -> bool {
        false
    }
}
