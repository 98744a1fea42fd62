//! Myo SDK - K7 肌动图仪器 Rust SDK
//!
//! 通过串口驱动 K7 仪器：执行控制命令与采集模式、返回原始或解码后的数据，
//! 没有设备时返回合成数据。
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): 命令解析、模式注册表、块重同步、倾角解码
//! - **串口层** (`serial`): 串口抽象、线路复位握手、工频持久化
//! - **驱动层** (`driver`): 模式状态机、模式管理器、流式读取
//!
//! # 快速开始
//!
//! ```no_run
//! use myo_sdk::prelude::*;
//!
//! myo_sdk::init_logger();
//!
//! let driver = DriverBuilder::new().port("/dev/ttyUSB0").build()?;
//! let samples = driver.execute_to_vec("mode-42-raw-q")?;
//! println!("{} bytes", samples.len());
//! # Ok::<(), DriverError>(())
//! ```

pub mod logging;
pub mod prelude;

pub use myo_driver as driver;
pub use myo_protocol as protocol;
pub use myo_serial as serial;

// 常用类型
pub use logging::{LoggerError, init_logger, try_init_logger};
pub use myo_driver::{DriverBuilder, DriverConfig, DriverError, MyoDriver};
pub use myo_protocol::{Command, LineFrequency, ModeCommand, ModeKind, ProtocolError, parse_command};
pub use myo_serial::{SerialError, SerialLink, list_ports};
