//! 串口通道
//!
//! [`SerialChannel`] 在整个驱动生命周期内只创建一次，跨模式切换存活。
//! 所有 I/O 经由同一把 `parking_lot::Mutex` 串行化；需要原子完成的组合操作
//! （握手、清空残留数据）通过 [`SerialChannel::lock`] 拿到 [`ChannelGuard`] 后一次完成。

use crate::frequency::FrequencyStore;
use crate::handshake::{DrainPolicy, HandshakeConfig};
use crate::native::NativeSerialLink;
use crate::{ControlLine, SerialDeviceError, SerialDeviceErrorKind, SerialError, SerialLink};
use myo_protocol::{
    DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT, HANDSHAKE_RESPONSE_PREFIX, HANDSHAKE_TAIL_TIMEOUT,
    LineFrequency, MAX_COMMAND_LENGTH, is_handshake_response,
};
use parking_lot::{Mutex, MutexGuard};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// 通道配置
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub baud_rate: u32,
    /// 默认读取超时
    pub read_timeout: Duration,
    pub handshake: HandshakeConfig,
    /// 工频配置文件（`None` 表示不落盘）
    pub frequency_file: Option<PathBuf>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            handshake: HandshakeConfig::default(),
            frequency_file: None,
        }
    }
}

struct ChannelInner {
    link: Option<Box<dyn SerialLink>>,
    handshake_established: bool,
    /// 最近一次握手成功的工频
    frequency: Option<LineFrequency>,
}

/// 串口通道（跨线程共享，通常包在 `Arc` 中）
pub struct SerialChannel {
    inner: Mutex<ChannelInner>,
    connected: AtomicBool,
    config: ChannelConfig,
    frequency_store: FrequencyStore,
}

impl SerialChannel {
    /// 创建未打开的通道
    pub fn new(config: ChannelConfig) -> Self {
        let frequency_store = match &config.frequency_file {
            Some(path) => FrequencyStore::new(path),
            None => FrequencyStore::in_memory(),
        };
        Self {
            inner: Mutex::new(ChannelInner {
                link: None,
                handshake_established: false,
                frequency: None,
            }),
            connected: AtomicBool::new(false),
            config,
            frequency_store,
        }
    }

    /// 打开原生串口
    pub fn open(&self, port_name: &str) -> Result<(), SerialError> {
        let link = NativeSerialLink::open(port_name, self.config.baud_rate)?;
        self.attach(Box::new(link));
        info!("Serial channel opened on {}", port_name);
        Ok(())
    }

    /// 接入任意链路实现（例如测试用的脚本化链路）
    pub fn attach(&self, link: Box<dyn SerialLink>) {
        let mut inner = self.inner.lock();
        inner.link = Some(link);
        inner.handshake_established = false;
        self.connected.store(true, Ordering::Release);
    }

    /// 关闭串口并复位握手状态
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.link.take().is_some() {
            debug!("Serial channel closed");
        }
        inner.handshake_established = false;
        self.connected.store(false, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_handshake_established(&self) -> bool {
        self.inner.lock().handshake_established
    }

    pub fn baud_rate(&self) -> u32 {
        self.config.baud_rate
    }

    pub fn read_timeout(&self) -> Duration {
        self.config.read_timeout
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// 获取通道锁，在锁内执行组合操作
    pub fn lock(&self) -> ChannelGuard<'_> {
        ChannelGuard {
            inner: self.inner.lock(),
        }
    }

    pub fn write(&self, data: &[u8]) -> Result<(), SerialError> {
        self.lock().write(data)
    }

    pub fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, SerialError> {
        self.lock().read(buf, timeout)
    }

    /// 读取接收缓冲区中已有的数据（最多 `max` 字节），不等待
    pub fn read_available(&self, max: usize) -> Result<Vec<u8>, SerialError> {
        let mut guard = self.lock();
        let available = guard.link()?.bytes_available()?.min(max);
        if available == 0 {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; available];
        let n = guard.link()?.try_read(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    pub fn purge(&self) -> Result<(), SerialError> {
        self.lock().purge()
    }

    pub fn flush(&self) -> Result<(), SerialError> {
        self.lock().flush()
    }

    /// 清空残留数据，返回丢弃的字节数
    pub fn drain(&self) -> Result<usize, SerialError> {
        self.lock().drain(&self.config.handshake.drain)
    }

    pub fn set_control_line(&self, line: ControlLine, level: bool) -> Result<(), SerialError> {
        self.lock().set_control_line(line, level)
    }

    /// 线路状态：`[调制解调器状态位, 通道标志]`
    ///
    /// 通道标志 bit0 = 已连接，bit1 = 已握手。
    pub fn device_statuses(&self) -> Result<[u8; 2], SerialError> {
        let mut guard = self.lock();
        let modem = guard.link()?.modem_status()?;
        let flags = u8::from(self.is_connected()) | (u8::from(guard.inner.handshake_established) << 1);
        Ok([modem.bits(), flags])
    }

    /// 线路复位握手（带重试）
    ///
    /// 成功后设置握手标志并持久化工频；全部尝试失败返回 [`SerialError::HandshakeFailed`]。
    pub fn reset_hardware(&self, frequency: LineFrequency) -> Result<(), SerialError> {
        self.reset_hardware_then(frequency, |_| Ok(()))
    }

    /// 线路复位握手，成功后在同一把锁内继续执行 `then`
    ///
    /// 模式握手需要在复位之后立即写入模式号并读取设备字节，
    /// 中间不能被其他线程（例如流式读取线程）插入读写。
    /// 重试间隔期间不持有锁。
    pub fn reset_hardware_then<T, E>(
        &self,
        frequency: LineFrequency,
        then: impl FnOnce(&mut ChannelGuard<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<SerialError>,
    {
        let config = self.config.handshake;
        let attempts = config.attempts.max(1);

        for attempt in 1..=attempts {
            let mut guard = self.lock();
            let result = guard.line_handshake(frequency, &config);
            guard.inner.handshake_established = result.is_ok();

            match result {
                Ok(()) => {
                    guard.inner.frequency = Some(frequency);
                    info!(
                        "Handshake established at {} Hz (attempt {}/{})",
                        frequency, attempt, attempts
                    );
                    let value = then(&mut guard);
                    drop(guard);

                    if let Err(e) = self.frequency_store.store(frequency) {
                        warn!("Failed to persist line frequency: {}", e);
                    }
                    return value;
                },
                Err(e @ SerialError::NotOpen) => return Err(e.into()),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    debug!("Handshake attempt {}/{} failed: {}", attempt, attempts, e);
                },
            }
            drop(guard);

            if attempt < attempts && !config.retry_delay.is_zero() {
                spin_sleep::sleep(config.retry_delay);
            }
        }

        warn!("Handshake failed after {} attempts", attempts);
        Err(SerialError::HandshakeFailed { attempts }.into())
    }

    /// 当前工频：优先读取配置文件，其次是本次运行中最近一次握手的工频
    pub fn current_frequency(&self) -> Option<LineFrequency> {
        self.frequency_store
            .load()
            .or_else(|| self.inner.lock().frequency)
    }

    pub fn frequency_store(&self) -> &FrequencyStore {
        &self.frequency_store
    }
}

/// 持有通道锁期间的操作句柄
pub struct ChannelGuard<'a> {
    inner: MutexGuard<'a, ChannelInner>,
}

impl ChannelGuard<'_> {
    fn link(&mut self) -> Result<&mut Box<dyn SerialLink>, SerialError> {
        self.inner.link.as_mut().ok_or(SerialError::NotOpen)
    }

    pub fn write(&mut self, data: &[u8]) -> Result<(), SerialError> {
        trace!("TX {} bytes", data.len());
        self.link()?.write(data)
    }

    pub fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, SerialError> {
        self.link()?.read(buf, timeout)
    }

    pub fn purge(&mut self) -> Result<(), SerialError> {
        self.link()?.purge()
    }

    pub fn flush(&mut self) -> Result<(), SerialError> {
        self.link()?.flush()
    }

    pub fn set_control_line(&mut self, line: ControlLine, level: bool) -> Result<(), SerialError> {
        self.link()?.set_control_line(line, level)
    }

    /// 同时设置 RTS 和 DTR
    pub fn set_lines(&mut self, level: bool) -> Result<(), SerialError> {
        self.set_control_line(ControlLine::Rts, level)?;
        self.set_control_line(ControlLine::Dtr, level)
    }

    pub fn is_handshake_established(&self) -> bool {
        self.inner.handshake_established
    }

    /// 读空残留数据：直到一次读取超时、达到字节上限或时间上限
    pub fn drain(&mut self, policy: &DrainPolicy) -> Result<usize, SerialError> {
        let start = Instant::now();
        let mut chunk = vec![0u8; policy.chunk_size.max(1)];
        let mut total = 0;

        while total < policy.max_bytes {
            let remaining = policy.timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }
            let want = chunk.len().min(policy.max_bytes - total);
            match self.read(&mut chunk[..want], remaining) {
                Ok(n) => total += n,
                Err(SerialError::Timeout) => break,
                Err(e) => return Err(e),
            }
        }

        if total > 0 {
            trace!("Drained {} residual bytes", total);
        }
        Ok(total)
    }

    /// 单次线路复位握手尝试
    fn line_handshake(
        &mut self,
        frequency: LineFrequency,
        config: &HandshakeConfig,
    ) -> Result<(), SerialError> {
        self.set_lines(false)?;
        self.purge()?;
        self.drain(&config.drain)?;
        self.set_lines(true)?;

        self.write(frequency.handshake_magic())?;

        // 只等前缀，版本号余下部分用短超时收走
        let mut response = [0u8; MAX_COMMAND_LENGTH];
        let prefix_len = HANDSHAKE_RESPONSE_PREFIX.len();
        let n = self.read(&mut response[..prefix_len], config.response_timeout)?;
        if is_handshake_response(&response[..n]) {
            self.read_response_tail(&mut response[n..])?;
            Ok(())
        } else {
            Err(SerialDeviceError::new(
                SerialDeviceErrorKind::InvalidResponse,
                format!(
                    "unexpected handshake response {:?}",
                    String::from_utf8_lossy(&response[..n])
                ),
            )
            .into())
        }
    }
}

impl ChannelGuard<'_> {
    /// 收走应答中前缀之后的版本号，遇到 `\r` 或超时为止
    fn read_response_tail(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..], HANDSHAKE_TAIL_TIMEOUT) {
                Ok(n) => {
                    filled += n;
                    if buf[..filled].contains(&b'\r') {
                        break;
                    }
                },
                Err(SerialError::Timeout) => break,
                Err(e) => return Err(e),
            }
        }
        trace!("Handshake response tail: {} bytes", filled);
        Ok(filled)
    }
}
