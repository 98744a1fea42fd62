//! 驱动配置
//!
//! 可从 TOML 加载，所有字段都有默认值：
//!
//! ```toml
//! port_name = "/dev/ttyUSB0"
//! baud_rate = 230400
//! sample_buffer_size = 1600
//! frequency_file = "/var/lib/myo/freq_config"
//!
//! [handshake]
//! attempts = 10
//!
//! [stream]
//! interval_ms = 10
//! ```

use crate::angles::DEFAULT_ANGLE_QUEUE_CAPACITY;
use crate::manager::ManagerOptions;
use crate::stream::StreamConfig;
use myo_protocol::{
    BAUD_RATE_FAST, BAUD_RATE_SLOW, DEFAULT_BUFFER_SIZE, DEFAULT_READ_TIMEOUT, MAX_BUFFER_SIZE,
    MAX_MODE_RETRIES,
};
use myo_serial::{ChannelConfig, DrainPolicy, HandshakeConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// 握手参数（毫秒）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeSettings {
    pub attempts: u32,
    pub retry_delay_ms: u64,
    pub response_timeout_ms: u64,
}

impl Default for HandshakeSettings {
    fn default() -> Self {
        let defaults = HandshakeConfig::default();
        Self {
            attempts: defaults.attempts,
            retry_delay_ms: defaults.retry_delay.as_millis() as u64,
            response_timeout_ms: defaults.response_timeout.as_millis() as u64,
        }
    }
}

impl HandshakeSettings {
    pub fn to_handshake_config(&self) -> HandshakeConfig {
        HandshakeConfig {
            attempts: self.attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            response_timeout: Duration::from_millis(self.response_timeout_ms),
            drain: DrainPolicy::default(),
        }
    }
}

/// 驱动配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// 串口名（`None` 表示不打开串口）
    pub port_name: Option<String>,
    pub baud_rate: u32,
    /// 调用方默认采样缓冲区大小
    pub sample_buffer_size: usize,
    pub read_timeout_ms: u64,
    /// 工频配置文件
    pub frequency_file: Option<PathBuf>,
    /// 无设备运行
    pub disconnected: bool,
    /// 串口打不开或设备消失时改为无设备数据
    pub fallback_to_disconnected: bool,
    /// 每条命令最多执行次数
    pub max_mode_attempts: u32,
    pub angle_queue_capacity: usize,
    pub handshake: HandshakeSettings,
    pub stream: StreamConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            port_name: None,
            baud_rate: BAUD_RATE_FAST,
            sample_buffer_size: DEFAULT_BUFFER_SIZE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT.as_millis() as u64,
            frequency_file: None,
            disconnected: false,
            fallback_to_disconnected: true,
            max_mode_attempts: MAX_MODE_RETRIES,
            angle_queue_capacity: DEFAULT_ANGLE_QUEUE_CAPACITY,
            handshake: HandshakeSettings::default(),
            stream: StreamConfig::default(),
        }
    }
}

impl DriverConfig {
    /// 从 TOML 字符串解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 写入文件（自动创建父目录）
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// 校验取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate != BAUD_RATE_FAST && self.baud_rate != BAUD_RATE_SLOW {
            return Err(ConfigError::Invalid(format!(
                "baud_rate must be {} or {}, got {}",
                BAUD_RATE_FAST, BAUD_RATE_SLOW, self.baud_rate
            )));
        }
        if !(1..=MAX_BUFFER_SIZE).contains(&self.sample_buffer_size) {
            return Err(ConfigError::Invalid(format!(
                "sample_buffer_size must be within 1..={}, got {}",
                MAX_BUFFER_SIZE, self.sample_buffer_size
            )));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid("read_timeout_ms must be positive".to_string()));
        }
        if self.handshake.attempts == 0 {
            return Err(ConfigError::Invalid(
                "handshake.attempts must be at least 1".to_string(),
            ));
        }
        if self.max_mode_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_mode_attempts must be at least 1".to_string(),
            ));
        }
        if self.stream.chunk_size == 0 || self.stream.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "stream.chunk_size and stream.queue_capacity must be positive".to_string(),
            ));
        }
        if self.angle_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "angle_queue_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            baud_rate: self.baud_rate,
            read_timeout: self.read_timeout(),
            handshake: self.handshake.to_handshake_config(),
            frequency_file: self.frequency_file.clone(),
        }
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            max_attempts: self.max_mode_attempts,
            disconnected: self.disconnected,
            fallback_to_disconnected: self.fallback_to_disconnected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DriverConfig::default();
        config.validate().unwrap();
        assert_eq!(config.baud_rate, 230_400);
        assert_eq!(config.sample_buffer_size, 1600);
        assert_eq!(config.read_timeout(), Duration::from_millis(500));
        assert_eq!(config.handshake.attempts, 10);
        assert!(config.fallback_to_disconnected);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = DriverConfig::from_toml_str(
            r#"
            port_name = "/dev/ttyUSB0"
            baud_rate = 115200

            [stream]
            interval_ms = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.port_name.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.stream.interval_ms, 5);
        assert_eq!(config.stream.chunk_size, 1600);
        assert_eq!(config.sample_buffer_size, 1600);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let err = DriverConfig::from_toml_str("sample_buffer_size = 32001").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("sample_buffer_size"));

        assert!(DriverConfig::from_toml_str("sample_buffer_size = 0").is_err());
        assert!(DriverConfig::from_toml_str("baud_rate = 9600").is_err());
        assert!(DriverConfig::from_toml_str("[handshake]\nattempts = 0").is_err());
        assert!(DriverConfig::from_toml_str("sample_buffer_size = 32000").is_ok());
    }

    #[test]
    fn test_parse_error() {
        let err = DriverConfig::from_toml_str("baud_rate = \"fast\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("myo").join("config.toml");

        let config = DriverConfig {
            port_name: Some("COM3".to_string()),
            frequency_file: Some(dir.path().join("freq_config")),
            disconnected: true,
            ..DriverConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(DriverConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_channel_config() {
        let config = DriverConfig {
            handshake: HandshakeSettings {
                attempts: 3,
                retry_delay_ms: 0,
                response_timeout_ms: 250,
            },
            ..DriverConfig::default()
        };
        let channel = config.channel_config();
        assert_eq!(channel.handshake.attempts, 3);
        assert_eq!(channel.handshake.retry_delay, Duration::ZERO);
        assert_eq!(channel.handshake.response_timeout, Duration::from_millis(250));
        assert_eq!(channel.baud_rate, 230_400);
    }
}
