//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use myo_sdk::prelude::*;
//! ```

pub use myo_driver::{
    AngleSample, DriverBuilder, DriverConfig, MyoDriver, StreamChunk, StreamConfig, StreamStats,
};
pub use myo_protocol::{LineFrequency, ModeCommand, ModeKind, TiltAngles};

// 错误类型
pub use myo_driver::{ConfigError, DriverError};
pub use myo_protocol::ProtocolError;
pub use myo_serial::SerialError;
