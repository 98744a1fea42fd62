//! 命令定义和实现

pub mod config;
pub mod exec;
pub mod ports;
pub mod stream;

pub use config::ConfigCommand;
pub use exec::ExecCommand;
pub use stream::StreamCommand;

use anyhow::{Context, Result};
use clap::Args;
use myo_sdk::{DriverBuilder, DriverConfig, MyoDriver};
use std::path::PathBuf;

/// 连接参数（覆盖配置文件）
#[derive(Args, Debug, Default, Clone)]
pub struct ConnectionArgs {
    /// 串口名（如 /dev/ttyUSB0、COM3）
    #[arg(short, long, global = true)]
    pub port: Option<String>,

    /// 波特率（230400 或 115200）
    #[arg(short, long, global = true)]
    pub baud_rate: Option<u32>,

    /// 无设备运行（返回合成数据）
    #[arg(short, long, global = true)]
    pub disconnected: bool,

    /// 配置文件路径（默认 <config_dir>/myo/config.toml）
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

impl ConnectionArgs {
    /// 合并配置文件与命令行参数
    pub fn resolve(&self) -> Result<DriverConfig> {
        let mut config = match &self.config {
            Some(path) => config::load_from(path)?,
            None => config::load()?,
        };
        if let Some(port) = &self.port {
            config.port_name = Some(port.clone());
        }
        if let Some(baud_rate) = self.baud_rate {
            config.baud_rate = baud_rate;
        }
        if self.disconnected {
            config.disconnected = true;
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    /// 构造驱动
    pub fn connect(&self) -> Result<MyoDriver> {
        let config = self.resolve()?;
        let port = config.port_name.clone();
        let driver = DriverBuilder::from_config(config).build().with_context(|| match port {
            Some(port) => format!("failed to open {}", port),
            None => "failed to create driver".to_string(),
        })?;
        Ok(driver)
    }
}
