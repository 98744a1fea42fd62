//! 驱动层模块
//!
//! 本模块提供 K7 肌动图仪器的设备驱动功能，包括：
//! - 模式状态机（握手 → 就绪 → 执行，每种采集模式各自的预热与解码）
//! - 模式管理器（同一时刻一个活动模式，可重试错误自动重新握手）
//! - 无设备运行（合成数据），设备消失时自动回退
//! - 后台流式读取线程（有界队列，满时丢弃并计数）
//! - 倾角队列与对齐值（ArcSwap 无锁读取）
//!
//! # 使用场景
//!
//! 大多数用户应该通过 [`DriverBuilder`] 构造 [`MyoDriver`]，只调用
//! [`MyoDriver::execute`]。需要自行管理串口通道时可以直接使用 [`ModeManager`]。

pub mod alignment;
pub mod angles;
mod builder;
pub mod config;
mod driver;
mod error;
pub mod manager;
pub mod mode;
pub mod state;
pub mod stream;

pub use alignment::{AlignmentStore, AlignmentValues};
pub use angles::{AngleSample, AngleSink};
pub use builder::DriverBuilder;
pub use config::{ConfigError, DriverConfig, HandshakeSettings};
pub use driver::MyoDriver;
pub use error::DriverError;
pub use manager::{ManagerOptions, ModeManager};
pub use state::{AtomicModeState, ModeState};
pub use stream::{StreamChunk, StreamConfig, StreamHandle, StreamStats};
