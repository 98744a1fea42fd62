//! 模式管理器
//!
//! 同一时刻最多只有一个活动模式。执行命令时：
//!
//! 1. 解析命令；控制命令（单个数字）直接操作串口线路
//! 2. 设备查询且活动模式握手有效：返回活动模式缓存的设备字节，不切换
//! 3. 模式标识（变体 + EMG 配置字节）不同则停止并销毁旧模式，创建新模式
//! 4. 执行，可重试错误最多尝试 [`MAX_MODE_RETRIES`] 次，每次重试前重新做模式握手
//!
//! 设备消失（不可恢复的串口错误）时关闭串口，改为返回无设备数据。

use crate::error::DriverError;
use crate::mode::{ActiveMode, ModeContext};
use crate::state::{AtomicModeState, ModeState};
use myo_protocol::{
    Command, ControlCommand, LineFrequency, MAX_MODE_RETRIES, ModeCommand, ModeKind, parse_command,
};
use myo_serial::{ControlLine, SerialChannel};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, error, info, warn};

/// 管理器选项
#[derive(Debug, Clone, Copy)]
pub struct ManagerOptions {
    /// 每条命令的最多执行次数
    pub max_attempts: u32,
    /// 不做任何串口 I/O，始终返回无设备数据
    pub disconnected: bool,
    /// 串口未打开或设备消失时返回无设备数据（否则报 `DeviceDisconnected`）
    pub fallback_to_disconnected: bool,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            max_attempts: MAX_MODE_RETRIES,
            disconnected: false,
            fallback_to_disconnected: true,
        }
    }
}

/// 模式管理器
pub struct ModeManager {
    channel: Arc<SerialChannel>,
    context: ModeContext,
    active: Option<ActiveMode>,
    state: Arc<AtomicModeState>,
    options: ManagerOptions,
    /// 已创建的模式数
    mode_switches: u64,
}

impl ModeManager {
    pub fn new(channel: Arc<SerialChannel>, context: ModeContext, options: ManagerOptions) -> Self {
        Self {
            channel,
            context,
            active: None,
            state: Arc::new(AtomicModeState::default()),
            options,
            mode_switches: 0,
        }
    }

    /// 执行命令字符串，返回写入 `output` 的字节数
    pub fn execute(&mut self, command: &str, output: &mut [u8]) -> Result<usize, DriverError> {
        let command = parse_command(command)?;
        self.execute_command(command, output)
    }

    /// 执行已解析的命令
    pub fn execute_command(&mut self, command: Command, output: &mut [u8]) -> Result<usize, DriverError> {
        match command {
            Command::Control(control) => self.execute_control(control, output),
            Command::Mode(mode) => self.execute_mode(mode, output),
        }
    }

    /// 是否以无设备方式运行
    pub fn is_disconnected(&self) -> bool {
        self.options.disconnected
            || (self.options.fallback_to_disconnected && !self.channel.is_connected())
    }

    pub fn set_disconnected(&mut self, disconnected: bool) {
        if self.options.disconnected != disconnected {
            info!(
                "Switching to {} operation",
                if disconnected { "disconnected" } else { "connected" }
            );
        }
        self.options.disconnected = disconnected;
    }

    fn execute_control(&mut self, control: ControlCommand, output: &mut [u8]) -> Result<usize, DriverError> {
        debug!("Control command {:?}", control);
        let disconnected = self.is_disconnected();

        match control {
            ControlCommand::EmgVersion => {
                return self.execute_mode(ModeCommand::new(ModeKind::EmgVersion), output);
            },
            ControlCommand::CheckConnection => {
                return self.execute_mode(ModeCommand::new(ModeKind::CheckConnection), output);
            },
            ControlCommand::DeviceStatuses => {
                let statuses = if disconnected {
                    [0, 0]
                } else {
                    self.channel.device_statuses()?
                };
                if output.len() < statuses.len() {
                    return Err(DriverError::BufferOverflow {
                        required: statuses.len(),
                        available: output.len(),
                    });
                }
                output[..statuses.len()].copy_from_slice(&statuses);
                return Ok(statuses.len());
            },
            _ => {},
        }

        if disconnected {
            return Ok(0);
        }

        match control {
            ControlCommand::RtsOn => self.channel.set_control_line(ControlLine::Rts, true)?,
            ControlCommand::RtsOff => self.channel.set_control_line(ControlLine::Rts, false)?,
            ControlCommand::DtrOn => self.channel.set_control_line(ControlLine::Dtr, true)?,
            ControlCommand::DtrOff => self.channel.set_control_line(ControlLine::Dtr, false)?,
            ControlCommand::ResetHardware60 | ControlCommand::ResetHardware50 => {
                let frequency = if control == ControlCommand::ResetHardware50 {
                    LineFrequency::Hz50
                } else {
                    LineFrequency::Hz60
                };
                // 线路复位后设备退出当前模式
                if let Some(active) = self.active.as_mut() {
                    active.invalidate_handshake();
                }
                self.channel.reset_hardware(frequency)?;
            },
            ControlCommand::DeviceStatuses
            | ControlCommand::EmgVersion
            | ControlCommand::CheckConnection => {},
        }
        Ok(0)
    }

    fn execute_mode(&mut self, command: ModeCommand, output: &mut [u8]) -> Result<usize, DriverError> {
        // 设备查询：直接返回活动模式握手时得到的设备字节（握手失效后不可用）
        if command.kind.is_device_query()
            && !self.is_disconnected()
            && let Some(active) = &self.active
            && active.session().is_handshake_established()
        {
            debug!(
                "Answering {} from active mode {} without switching",
                command,
                active.command()
            );
            return crate::mode::write_byte(active.device_byte(), output);
        }

        self.switch_to(command);
        self.execute_active(output)
    }

    /// 切换到 `command`（标识相同则不做任何事）
    fn switch_to(&mut self, command: ModeCommand) {
        if let Some(active) = &self.active
            && active.identity() == command.identity()
        {
            return;
        }

        if let Some(previous) = self.active.take() {
            info!("Switching mode {} -> {}", previous.command(), command);
            previous.destroy();
        } else {
            info!("Entering mode {}", command);
        }

        self.active = Some(ActiveMode::new(
            command,
            self.channel.clone(),
            &self.context,
            self.state.clone(),
        ));
        self.mode_switches += 1;
    }

    fn execute_active(&mut self, output: &mut [u8]) -> Result<usize, DriverError> {
        let disconnected = self.is_disconnected();
        let max_attempts = self.options.max_attempts.max(1);
        let Some(active) = self.active.as_mut() else {
            return Err(DriverError::InvalidMode("no active mode".to_string()));
        };

        if !disconnected && !self.channel.is_connected() {
            return Err(DriverError::DeviceDisconnected);
        }

        let mut attempt = 1;
        loop {
            match active.execute(disconnected, output) {
                Ok(n) => return Ok(n),
                Err(e) if e.is_device_lost() && self.options.fallback_to_disconnected => {
                    error!(
                        "Device lost during {}: {}; falling back to disconnected data",
                        active.command(),
                        e
                    );
                    self.channel.close();
                    return active.execute_disconnected(output);
                },
                Err(e) if !e.is_retryable() || attempt >= max_attempts => {
                    if e.is_retryable() {
                        warn!(
                            "Mode {} failed after {} attempts: {}",
                            active.command(),
                            attempt,
                            e
                        );
                    }
                    return Err(e);
                },
                Err(e) => {
                    warn!(
                        "Mode {} attempt {}/{} failed: {}; retrying",
                        active.command(),
                        attempt,
                        max_attempts,
                        e
                    );
                    if let Err(handshake_error) = active.rehandshake() {
                        error!("Re-handshake before retry failed: {}", handshake_error);
                    }
                    attempt += 1;
                },
            }
        }
    }

    /// 当前活动模式的命令
    pub fn active_command(&self) -> Option<ModeCommand> {
        self.active.as_ref().map(ActiveMode::command)
    }

    /// `command` 是否就是当前活动模式（解析失败视为否）
    pub fn is_mode_active(&self, command: &str) -> bool {
        match (parse_command(command), &self.active) {
            (Ok(Command::Mode(mode)), Some(active)) => active.identity() == mode.identity(),
            _ => false,
        }
    }

    /// 活动模式握手得到的设备字节
    pub fn equipment_byte(&self) -> Option<u8> {
        self.active
            .as_ref()
            .filter(|active| active.session().is_handshake_established())
            .map(ActiveMode::device_byte)
    }

    pub fn mode_state(&self) -> ModeState {
        self.state.get(Ordering::Acquire)
    }

    /// 已创建的模式数（相同模式重复执行不会增加）
    pub fn mode_switches(&self) -> u64 {
        self.mode_switches
    }

    pub fn channel(&self) -> &Arc<SerialChannel> {
        &self.channel
    }

    /// 销毁活动模式并关闭串口
    pub fn close(&mut self) {
        if let Some(active) = self.active.take() {
            active.destroy();
        }
        self.channel.close();
        info!("Mode manager closed");
    }
}

impl Drop for ModeManager {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::test_support::{context, mock_channel};
    use myo_protocol::patterns::MODE_42_PATTERN;
    use myo_serial::mock::{MockEvent, MockHandle, MockRead};
    use myo_serial::{ChannelConfig, SerialDeviceErrorKind};

    fn manager() -> (ModeManager, MockHandle) {
        let (channel, handle) = mock_channel();
        (
            ModeManager::new(channel, context(), ManagerOptions::default()),
            handle,
        )
    }

    fn disconnected_manager() -> ModeManager {
        let channel = Arc::new(SerialChannel::new(ChannelConfig::default()));
        ModeManager::new(
            channel,
            context(),
            ManagerOptions {
                disconnected: true,
                ..ManagerOptions::default()
            },
        )
    }

    /// 8 字节四通道块
    fn quad_stream() -> Vec<u8> {
        vec![0x00, 0x01, 0x30, 0x01, 0x40, 0x01, 0x50, 0x01]
    }

    #[test]
    fn test_unknown_command() {
        let (mut manager, _handle) = manager();
        let mut out = [0u8; 16];
        assert!(matches!(
            manager.execute("mode-99", &mut out),
            Err(DriverError::InvalidCommand(_))
        ));
        assert!(manager.active_command().is_none());
    }

    #[test]
    fn test_switching_is_idempotent() {
        let mut manager = disconnected_manager();
        let mut out = [0u8; 64];

        manager.execute("mode-42-raw", &mut out).unwrap();
        manager.execute("mode-42-raw", &mut out).unwrap();
        assert_eq!(manager.mode_switches(), 1);
        assert!(manager.is_mode_active("mode-42-raw"));

        // 不同的陷波配置是不同的模式
        manager.execute("mode-42-raw-q", &mut out).unwrap();
        assert_eq!(manager.mode_switches(), 2);
        assert!(!manager.is_mode_active("mode-42-raw"));
        assert!(manager.is_mode_active("mode-42-raw-q"));

        manager.execute("mode-52-raw", &mut out).unwrap();
        assert_eq!(manager.mode_switches(), 3);
        assert_eq!(manager.active_command().map(|c| c.kind), Some(ModeKind::Mode52Raw));
    }

    #[test]
    fn test_disconnected_mode_42_pattern() {
        let mut manager = disconnected_manager();
        let mut out = [0u8; 30];
        assert_eq!(manager.execute("mode-42-raw", &mut out).unwrap(), 30);
        assert_eq!(&out[..24], &MODE_42_PATTERN);
        assert_eq!(&out[24..], &MODE_42_PATTERN[..6]);
    }

    #[test]
    fn test_disconnected_controls_do_no_io() {
        let (mut manager, handle) = manager();
        manager.set_disconnected(true);
        let mut out = [0xAAu8; 4];

        assert_eq!(manager.execute("1", &mut out).unwrap(), 0);
        assert_eq!(manager.execute("5", &mut out).unwrap(), 0);
        assert_eq!(manager.execute("7", &mut out).unwrap(), 2);
        assert_eq!(&out[..2], &[0, 0]);
        assert!(handle.events().is_empty());

        let mut out = [0u8; 16];
        let n = manager.execute("8", &mut out).unwrap();
        assert_eq!(&out[..n], b"1.2");
        let n = manager.execute("9", &mut out).unwrap();
        assert_eq!(&out[..n], b"not-connected");
    }

    #[test]
    fn test_control_lines() {
        let (mut manager, handle) = manager();
        let mut out = [0u8; 4];
        manager.execute("1", &mut out).unwrap();
        manager.execute("4", &mut out).unwrap();
        assert_eq!(
            handle.events(),
            vec![
                MockEvent::Line(ControlLine::Rts, true),
                MockEvent::Line(ControlLine::Dtr, false),
            ]
        );
    }

    #[test]
    fn test_reset_50hz() {
        let (mut manager, handle) = manager();
        let mut out = [0u8; 4];
        assert_eq!(manager.execute("6", &mut out).unwrap(), 0);
        assert_eq!(handle.write_count(b"K7-MYO5"), 1);
        assert_eq!(manager.channel().current_frequency(), Some(LineFrequency::Hz50));
    }

    #[test]
    fn test_device_statuses() {
        let (mut manager, handle) = manager();
        handle.set_modem_status(myo_serial::ModemStatus {
            dsr: true,
            ..Default::default()
        });
        let mut out = [0u8; 2];
        assert_eq!(manager.execute("7", &mut out).unwrap(), 2);
        assert_eq!(out, [0b10, 0b01]);

        let mut tiny = [0u8; 1];
        assert!(matches!(
            manager.execute("7", &mut tiny),
            Err(DriverError::BufferOverflow { required: 2, .. })
        ));
    }

    #[test]
    fn test_mode_52_handshake_then_read() {
        let (mut manager, handle) = manager();
        handle.respond_to(&[b'r'], [MockRead::Data(vec![0x07])]);
        handle.set_stream(quad_stream());

        let mut out = vec![0u8; 1600];
        assert_eq!(manager.execute("mode-52-raw", &mut out).unwrap(), 1600);
        assert_eq!(&out[..8], &quad_stream()[..]);
        assert_eq!(manager.equipment_byte(), Some(0x07));
        assert_eq!(manager.mode_state(), ModeState::Ready);

        // 再次执行不重新握手
        manager.execute("mode-52-raw", &mut out).unwrap();
        assert_eq!(handle.write_count(&[52]), 1);
    }

    #[test]
    fn test_device_query_uses_cached_byte() {
        let (mut manager, handle) = manager();
        handle.respond_to(&[b'r'], [MockRead::Data(vec![0x21])]);
        handle.set_stream(quad_stream());

        let mut out = vec![0u8; 1600];
        manager.execute("mode-52-raw", &mut out).unwrap();
        let writes_before = handle.writes().len();

        assert_eq!(manager.execute("get-equipment-byte", &mut out).unwrap(), 1);
        assert_eq!(out[0], 0x21);
        assert_eq!(handle.writes().len(), writes_before);
        assert!(manager.is_mode_active("mode-52-raw"));
        assert_eq!(manager.mode_switches(), 1);
    }

    #[test]
    fn test_device_query_after_line_reset_handshakes_again() {
        let (mut manager, handle) = manager();
        handle.respond_to(
            &[b'r'],
            [MockRead::Data(vec![0x21]), MockRead::Data(vec![0x33])],
        );
        handle.set_stream(quad_stream());

        let mut out = vec![0u8; 1600];
        manager.execute("mode-52-raw", &mut out).unwrap();
        manager.execute("5", &mut out).unwrap();
        assert_eq!(manager.equipment_byte(), None);

        assert_eq!(manager.execute("get-equipment-byte", &mut out).unwrap(), 1);
        assert_eq!(out[0], 0x33);
        assert_eq!(handle.write_count(&[42]), 1);
        assert!(!manager.is_mode_active("mode-52-raw"));
    }

    #[test]
    fn test_retry_rehandshakes() {
        let (mut manager, handle) = manager();
        handle.always_respond_to(&[b'r'], MockRead::Data(vec![0x01]));
        handle.set_stream(quad_stream());

        let mut out = vec![0u8; 64];
        manager.execute("mode-52-raw", &mut out).unwrap();
        assert_eq!(handle.write_count(&[52]), 1);

        // 一次读到垃圾数据（SyncLost），重新握手后恢复
        handle.push_read(vec![0xEE; 64]);
        assert_eq!(manager.execute("mode-52-raw", &mut out).unwrap(), 64);
        assert_eq!(&out[..8], &quad_stream()[..]);
        assert_eq!(handle.write_count(&[52]), 2);
    }

    #[test]
    fn test_retries_are_bounded() {
        let (mut manager, handle) = manager();
        handle.always_respond_to(&[b'r'], MockRead::Data(vec![0x01]));
        // 没有数据流：每次读取都超时

        let mut out = vec![0u8; 64];
        assert!(matches!(
            manager.execute("mode-52-raw", &mut out),
            Err(DriverError::Timeout)
        ));
        // 首次握手 + 4 次重试前握手
        assert_eq!(handle.write_count(&[52]), 5);
    }

    #[test]
    fn test_handshake_failure_is_not_retried() {
        let (channel, handle) = {
            let channel = SerialChannel::new(ChannelConfig {
                handshake: myo_serial::HandshakeConfig {
                    attempts: 2,
                    ..myo_serial::HandshakeConfig::default().without_delay()
                },
                ..ChannelConfig::default()
            });
            let (link, handle) = myo_serial::mock::MockLink::new();
            channel.attach(Box::new(link));
            (Arc::new(channel), handle)
        };
        let mut manager = ModeManager::new(channel, context(), ManagerOptions::default());

        let mut out = vec![0u8; 64];
        assert!(matches!(
            manager.execute("mode-52-raw", &mut out),
            Err(DriverError::HandshakeFailed)
        ));
        assert_eq!(handle.write_count(b"K7-MYO6"), 2);
    }

    #[test]
    fn test_device_lost_falls_back() {
        let (mut manager, handle) = manager();
        // 设备在模式握手应答前消失
        handle.respond_to(&[b'r'], [MockRead::Fail(SerialDeviceErrorKind::NoDevice)]);

        let mut out = [0u8; 8];
        let n = manager.execute("mode-52-raw", &mut out).unwrap();
        assert_eq!(n, 8);
        assert_eq!(out, [0x00, 0x00, 0x30, 0x00, 0x40, 0x00, 0x50, 0x00]);
        assert!(!manager.channel().is_connected());
        assert!(manager.is_disconnected());
    }

    #[test]
    fn test_closed_channel_without_fallback() {
        let channel = Arc::new(SerialChannel::new(ChannelConfig::default()));
        let mut manager = ModeManager::new(
            channel,
            context(),
            ManagerOptions {
                fallback_to_disconnected: false,
                ..ManagerOptions::default()
            },
        );
        let mut out = [0u8; 8];
        assert!(matches!(
            manager.execute("mode-52-raw", &mut out),
            Err(DriverError::DeviceDisconnected)
        ));
    }

    #[test]
    fn test_close_destroys_mode() {
        let mut manager = disconnected_manager();
        let mut out = [0u8; 8];
        manager.execute("mode-56-raw", &mut out).unwrap();
        manager.close();
        assert!(manager.active_command().is_none());
        assert_eq!(manager.mode_state(), ModeState::Destroyed);
        assert!(!manager.channel().is_connected());
    }
}
