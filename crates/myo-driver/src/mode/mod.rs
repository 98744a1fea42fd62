//! 采集模式
//!
//! 每个模式由两部分组成：
//!
//! - [`ModeSession`]：所有模式共享的记录（串口通道、命令、生命周期状态、
//!   模式握手结果）
//! - [`ModeBehavior`]：各模式自己的读取、解码与无设备数据
//!
//! [`ActiveMode`] 把两者组合起来，由 [`ModeManager`](crate::manager::ModeManager) 持有。
//!
//! ## 模式握手
//!
//! 进入一个需要握手的模式前：先做线路复位握手（使用持久化的工频，缺省 60 Hz），
//! 然后发送模式号字节和 EMG 配置字节，设备回一个字节（设备字节）。

mod cms;
mod query;
mod sampled;
mod sweep;
mod warmup;

pub use cms::{Mode0, Mode0Align, Mode0Raw, crosstalk, decode_cms_block};
pub use query::{EquipmentByte, LeadStatus, VersionQuery};
pub use sampled::SampledMode;
pub use sweep::{Mode44Raw, Sweep};
pub use warmup::{WarmUp, WarmUpOutcome};

use crate::alignment::AlignmentStore;
use crate::angles::AngleSink;
use crate::error::DriverError;
use crate::state::{AtomicModeState, ModeState};
use myo_protocol::{LineFrequency, ModeCommand, ModeDescriptor, ModeKind, ModeNumber};
use myo_serial::{SerialChannel, SerialError};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, warn};

/// 稳态读取块大小
pub const SAMPLE_READ_SIZE: usize = 1600;

/// 预热读取块大小
pub const WARMUP_READ_SIZE: usize = 320;

/// 预热字节预算
pub const WARMUP_BYTE_BUDGET: usize = 32_000;

/// 稳态读取超时（EMG 模式）
pub const EMG_READ_TIMEOUT: Duration = Duration::from_millis(60);

/// 稳态读取超时（其他模式）
pub const SAMPLE_READ_TIMEOUT: Duration = Duration::from_millis(80);

/// 模式之间共享的资源
#[derive(Clone)]
pub struct ModeContext {
    pub alignment: Arc<AlignmentStore>,
    pub angles: AngleSink,
}

/// 所有模式共享的会话记录
pub struct ModeSession {
    channel: Arc<SerialChannel>,
    command: ModeCommand,
    state: Arc<AtomicModeState>,
    handshake_established: bool,
    device_byte: u8,
    response_timeout: Duration,
}

impl ModeSession {
    pub fn new(
        channel: Arc<SerialChannel>,
        command: ModeCommand,
        state: Arc<AtomicModeState>,
    ) -> Self {
        state.set(ModeState::Uninitialized, Ordering::Release);
        let response_timeout = channel.read_timeout();
        Self {
            channel,
            command,
            state,
            handshake_established: false,
            device_byte: 0,
            response_timeout,
        }
    }

    pub fn command(&self) -> ModeCommand {
        self.command
    }

    pub fn descriptor(&self) -> &'static ModeDescriptor {
        self.command.descriptor()
    }

    pub fn mode_number(&self) -> ModeNumber {
        self.command.kind.mode_number()
    }

    pub fn emg_config(&self) -> u8 {
        self.command.emg_config()
    }

    /// 最近一次模式握手时设备返回的字节
    pub fn device_byte(&self) -> u8 {
        self.device_byte
    }

    pub fn is_handshake_established(&self) -> bool {
        self.handshake_established
    }

    pub fn state(&self) -> ModeState {
        self.state.get(Ordering::Acquire)
    }

    fn set_state(&self, state: ModeState) {
        self.state.set(state, Ordering::Release);
    }

    /// 标记握手失效（例如线路被手动复位）
    pub fn invalidate_handshake(&mut self) {
        self.handshake_established = false;
        self.set_state(ModeState::Uninitialized);
    }

    /// 模式握手
    pub fn handshake(&mut self) -> Result<(), DriverError> {
        self.set_state(ModeState::HandshakeInProgress);
        self.handshake_established = false;

        let frequency = self.channel.current_frequency().unwrap_or_default();
        match self.exchange_mode_bytes(frequency) {
            Ok(byte) => {
                self.device_byte = byte;
                self.handshake_established = true;
                self.set_state(ModeState::Ready);
                debug!(
                    "Mode {} handshake complete, device byte {:#04x}",
                    self.command, byte
                );
                Ok(())
            },
            Err(e) => {
                self.set_state(ModeState::Uninitialized);
                warn!("Mode {} handshake failed: {}", self.command, e);
                Err(e)
            },
        }
    }

    /// 线路复位、写模式号与 EMG 配置、读设备字节，全程持有通道锁
    fn exchange_mode_bytes(&self, frequency: LineFrequency) -> Result<u8, DriverError> {
        let mode_number = u8::from(self.mode_number());
        let emg_config = self.emg_config();
        let timeout = self.response_timeout;

        self.channel.reset_hardware_then(frequency, |guard| -> Result<u8, DriverError> {
            guard.write(&[mode_number]).map_err(DriverError::from_write)?;
            guard.write(&[emg_config]).map_err(DriverError::from_write)?;

            let mut byte = [0u8; 1];
            match guard.read(&mut byte, timeout) {
                Ok(1) => Ok(byte[0]),
                Ok(_) | Err(SerialError::Timeout) => Err(DriverError::NoData),
                Err(e) => Err(DriverError::from_read(e)),
            }
        })
    }

    /// 读取最多 `buf.len()` 字节
    pub fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, DriverError> {
        self.channel.read(buf, timeout).map_err(DriverError::from_read)
    }

    /// 读取最多 `len` 字节到新缓冲区
    pub fn read_vec(&self, len: usize, timeout: Duration) -> Result<Vec<u8>, DriverError> {
        let mut buf = vec![0u8; len];
        let n = self.read(&mut buf, timeout)?;
        buf.truncate(n);
        Ok(buf)
    }

    pub fn flush(&self) -> Result<(), DriverError> {
        self.channel.flush().map_err(DriverError::from_write)
    }
}

/// 模式行为
pub trait ModeBehavior: Send {
    /// 稳态读取，成功时返回写入 `output` 的字节数
    fn execute(&mut self, session: &mut ModeSession, output: &mut [u8])
    -> Result<usize, DriverError>;

    /// 无设备数据，不做任何 I/O
    fn execute_disconnected(&self, output: &mut [u8]) -> Result<usize, DriverError>;

    /// 是否由 [`ActiveMode`] 在执行前完成模式握手
    ///
    /// 设备查询类模式在 `execute` 内部每次都重新握手。
    fn handshake_before_execute(&self) -> bool {
        true
    }

    /// 模式被替换前调用
    fn stop(&mut self) {}
}

/// 当前活动模式
pub struct ActiveMode {
    session: ModeSession,
    behavior: Box<dyn ModeBehavior>,
}

impl ActiveMode {
    pub fn new(
        command: ModeCommand,
        channel: Arc<SerialChannel>,
        context: &ModeContext,
        state: Arc<AtomicModeState>,
    ) -> Self {
        Self {
            session: ModeSession::new(channel, command, state),
            behavior: create_behavior(command.kind, context),
        }
    }

    pub fn command(&self) -> ModeCommand {
        self.session.command()
    }

    /// 模式标识：变体 + EMG 配置字节
    pub fn identity(&self) -> (ModeKind, u8) {
        self.session.command().identity()
    }

    pub fn device_byte(&self) -> u8 {
        self.session.device_byte()
    }

    pub fn session(&self) -> &ModeSession {
        &self.session
    }

    /// 执行一次读取
    pub fn execute(&mut self, disconnected: bool, output: &mut [u8]) -> Result<usize, DriverError> {
        if disconnected {
            return self.execute_disconnected(output);
        }

        if self.behavior.handshake_before_execute() && self.session.descriptor().requires_handshake {
            if !self.session.is_handshake_established() {
                self.session.handshake()?;
            }
            if !self.session.is_handshake_established() {
                return Err(DriverError::NotReady(self.session.command().to_string()));
            }
        }

        self.session.set_state(ModeState::Executing);
        let result = self.behavior.execute(&mut self.session, output);
        if self.session.state() == ModeState::Executing {
            self.session.set_state(ModeState::Ready);
        }
        result
    }

    /// 无设备数据
    pub fn execute_disconnected(&self, output: &mut [u8]) -> Result<usize, DriverError> {
        if !self.session.descriptor().supports_disconnected {
            return Err(DriverError::DeviceDisconnected);
        }
        self.behavior.execute_disconnected(output)
    }

    /// 重试前重新做模式握手
    pub fn rehandshake(&mut self) -> Result<(), DriverError> {
        self.session.handshake()
    }

    pub fn invalidate_handshake(&mut self) {
        self.session.invalidate_handshake();
    }

    pub fn stop(&mut self) {
        self.behavior.stop();
    }

    /// 停止并销毁
    pub fn destroy(mut self) {
        self.behavior.stop();
        self.session.set_state(ModeState::Destroyed);
        debug!("Mode {} destroyed", self.session.command());
    }
}

/// 按模式变体创建行为
pub fn create_behavior(kind: ModeKind, context: &ModeContext) -> Box<dyn ModeBehavior> {
    match kind {
        ModeKind::Zero => Box::new(Mode0::new(context.alignment.clone())),
        ModeKind::ZeroRaw => Box::new(Mode0Raw::new()),
        ModeKind::ZeroAlign => Box::new(Mode0Align::new(context.alignment.clone())),
        ModeKind::Emg42Raw => Box::new(SampledMode::mode_42()),
        ModeKind::Emg43Raw | ModeKind::Emg43Emg => Box::new(SampledMode::mode_43()),
        ModeKind::Mode51Raw => Box::new(SampledMode::mode_51()),
        ModeKind::Mode52Raw => Box::new(SampledMode::mode_52()),
        ModeKind::Mode53Raw => Box::new(SampledMode::mode_53()),
        ModeKind::Mode56Raw => Box::new(SampledMode::mode_56()),
        ModeKind::Mode44Raw | ModeKind::Mode44RawNoImage => {
            Box::new(Mode44Raw::new(Sweep::new(kind, context.angles.clone())))
        },
        ModeKind::Mode44Sweep | ModeKind::Mode57Raw | ModeKind::Mode57RawNoImage => {
            Box::new(Sweep::new(kind, context.angles.clone()))
        },
        ModeKind::EquipmentByte => Box::new(EquipmentByte),
        ModeKind::EmgLeadStatus => Box::new(LeadStatus),
        ModeKind::EmgVersion => Box::new(VersionQuery::version()),
        ModeKind::CheckConnection => Box::new(VersionQuery::connection_check()),
    }
}

/// 复制到调用方缓冲区（超出部分截断）
pub(crate) fn copy_out(data: &[u8], output: &mut [u8]) -> usize {
    let n = data.len().min(output.len());
    output[..n].copy_from_slice(&data[..n]);
    n
}

/// 写入单个字节
pub(crate) fn write_byte(byte: u8, output: &mut [u8]) -> Result<usize, DriverError> {
    match output.first_mut() {
        Some(slot) => {
            *slot = byte;
            Ok(1)
        },
        None => Err(DriverError::BufferOverflow {
            required: 1,
            available: 0,
        }),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use myo_serial::mock::MockRead;

    #[test]
    fn test_mode_handshake_sends_mode_and_config() {
        let (channel, handle) = mock_channel();
        handle.respond_to(&[b'r'], [MockRead::Data(vec![0x2A])]);

        let mut session = session(channel, ModeKind::Emg42Raw);
        session.handshake().unwrap();

        assert!(session.is_handshake_established());
        assert_eq!(session.device_byte(), 0x2A);
        assert_eq!(session.state(), ModeState::Ready);

        let writes = handle.writes();
        assert_eq!(writes[0], b"K7-MYO6".to_vec());
        assert_eq!(&writes[1..], &[vec![42u8], vec![b'r']]);
    }

    #[test]
    fn test_mode_handshake_uses_persisted_frequency() {
        let (channel, handle) = mock_channel();
        channel.reset_hardware(LineFrequency::Hz50).unwrap();
        handle.clear_events();
        handle.respond_to(&[b'r'], [MockRead::Data(vec![1])]);

        let mut session = session(channel, ModeKind::Emg43Raw);
        session.handshake().unwrap();
        assert_eq!(handle.write_count(b"K7-MYO5"), 1);
        assert_eq!(handle.write_count(&[43]), 1);
    }

    #[test]
    fn test_mode_handshake_without_device_byte() {
        let (channel, _handle) = mock_channel();
        let mut session = session(channel, ModeKind::Emg42Raw);
        assert!(matches!(session.handshake(), Err(DriverError::NoData)));
        assert!(!session.is_handshake_established());
        assert_eq!(session.state(), ModeState::Uninitialized);
    }

    #[test]
    fn test_mode_handshake_is_atomic_against_concurrent_reader() {
        let (channel, handle) = mock_channel();
        handle.always_respond_to(&[b'r'], MockRead::Data(vec![0x2A]));

        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let reader = {
            let channel = channel.clone();
            let stop = stop.clone();
            std::thread::spawn(move || {
                let mut stolen = Vec::new();
                while !stop.load(Ordering::Acquire) {
                    stolen.extend(channel.read_available(64).unwrap());
                    std::thread::yield_now();
                }
                stolen
            })
        };

        let mut session = session(channel, ModeKind::Emg42Raw);
        for _ in 0..200 {
            session.handshake().unwrap();
            assert_eq!(session.device_byte(), 0x2A);
        }

        stop.store(true, Ordering::Release);
        let stolen = reader.join().unwrap();
        assert!(stolen.is_empty(), "reader observed {:?}", stolen);
        assert_eq!(handle.pending_reads(), 0);
    }

    #[test]
    fn test_active_mode_disconnected_path_does_no_io() {
        let (channel, handle) = mock_channel();
        let mode = ActiveMode::new(
            ModeCommand::new(ModeKind::Mode52Raw),
            channel,
            &context(),
            Arc::new(AtomicModeState::default()),
        );
        let mut out = [0u8; 12];
        assert_eq!(mode.execute_disconnected(&mut out).unwrap(), 12);
        assert_eq!(out, [0, 0, 0x30, 0, 0x40, 0, 0x50, 0, 0, 0, 0x30, 0]);
        assert!(handle.events().is_empty());
    }

    #[test]
    fn test_destroy_sets_state() {
        let (channel, _handle) = mock_channel();
        let state = Arc::new(AtomicModeState::default());
        let mode = ActiveMode::new(
            ModeCommand::new(ModeKind::Mode56Raw),
            channel,
            &context(),
            state.clone(),
        );
        assert_eq!(mode.identity(), (ModeKind::Mode56Raw, b'r'));
        mode.destroy();
        assert_eq!(state.get(Ordering::Acquire), ModeState::Destroyed);
    }

    #[test]
    fn test_write_byte_into_empty_buffer() {
        assert!(matches!(
            write_byte(7, &mut []),
            Err(DriverError::BufferOverflow { required: 1, .. })
        ));
        let mut out = [0u8; 2];
        assert_eq!(write_byte(7, &mut out).unwrap(), 1);
        assert_eq!(out[0], 7);
    }
}
