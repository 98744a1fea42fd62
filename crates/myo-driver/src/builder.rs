//! Builder 模式实现
//!
//! 提供链式构造 [`MyoDriver`] 实例的便捷方式。

use crate::config::DriverConfig;
use crate::driver::MyoDriver;
use crate::error::DriverError;
use crate::stream::StreamConfig;
use myo_serial::{SerialChannel, SerialLink};
use std::path::PathBuf;
use tracing::{info, warn};

/// 驱动 Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use myo_driver::DriverBuilder;
///
/// // 打开串口
/// let driver = DriverBuilder::new()
///     .port("/dev/ttyUSB0")
///     .frequency_file("/var/lib/myo/freq_config")
///     .build()
///     .unwrap();
///
/// // 无设备运行（返回合成数据）
/// let driver = DriverBuilder::new().disconnected(true).build().unwrap();
/// ```
#[derive(Default)]
pub struct DriverBuilder {
    config: DriverConfig,
    link: Option<Box<dyn SerialLink>>,
}

impl DriverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从配置开始构造
    pub fn from_config(config: DriverConfig) -> Self {
        Self { config, link: None }
    }

    /// 串口名（例如 `COM3`、`/dev/ttyUSB0`）
    pub fn port(mut self, port_name: impl Into<String>) -> Self {
        self.config.port_name = Some(port_name.into());
        self
    }

    /// 波特率（可选，默认 230400）
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.config.baud_rate = baud_rate;
        self
    }

    pub fn sample_buffer_size(mut self, size: usize) -> Self {
        self.config.sample_buffer_size = size;
        self
    }

    pub fn read_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.read_timeout_ms = timeout_ms;
        self
    }

    /// 工频配置文件路径
    pub fn frequency_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.frequency_file = Some(path.into());
        self
    }

    /// 无设备运行
    pub fn disconnected(mut self, disconnected: bool) -> Self {
        self.config.disconnected = disconnected;
        self
    }

    /// 串口打不开或设备消失时是否改为无设备数据（默认是）
    pub fn fallback_to_disconnected(mut self, fallback: bool) -> Self {
        self.config.fallback_to_disconnected = fallback;
        self
    }

    pub fn handshake_attempts(mut self, attempts: u32) -> Self {
        self.config.handshake.attempts = attempts;
        self
    }

    pub fn handshake_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.config.handshake.retry_delay_ms = delay_ms;
        self
    }

    pub fn max_mode_attempts(mut self, attempts: u32) -> Self {
        self.config.max_mode_attempts = attempts;
        self
    }

    pub fn stream_config(mut self, config: StreamConfig) -> Self {
        self.config.stream = config;
        self
    }

    pub fn angle_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.angle_queue_capacity = capacity;
        self
    }

    /// 使用自定义链路（例如测试用的脚本化链路），忽略串口名
    pub fn link(mut self, link: Box<dyn SerialLink>) -> Self {
        self.link = Some(link);
        self
    }

    /// 构建驱动
    ///
    /// 串口打开失败时：允许回退则以无设备方式运行，否则返回错误。
    pub fn build(self) -> Result<MyoDriver, DriverError> {
        let Self { config, link } = self;
        config.validate()?;

        let channel = SerialChannel::new(config.channel_config());
        if let Some(link) = link {
            channel.attach(link);
            info!("Driver using injected serial link");
        } else if !config.disconnected {
            match &config.port_name {
                Some(port_name) => {
                    if let Err(e) = channel.open(port_name) {
                        if !config.fallback_to_disconnected {
                            return Err(e.into());
                        }
                        warn!(
                            "Failed to open {}: {}; running without a device",
                            port_name, e
                        );
                    }
                },
                None => warn!("No serial port configured; running without a device"),
            }
        }

        Ok(MyoDriver::new(channel, config))
    }
}
