//! 驱动对外接口
//!
//! [`MyoDriver`] 持有串口通道、模式管理器、对齐值与倾角队列，
//! 并管理可选的后台流式读取线程。所有方法都可以从多个线程调用。

use crate::alignment::{AlignmentStore, AlignmentValues};
use crate::angles::{AngleSample, AngleSink};
use crate::config::DriverConfig;
use crate::error::DriverError;
use crate::manager::ModeManager;
use crate::mode::ModeContext;
use crate::state::ModeState;
use crate::stream::{StreamChunk, StreamHandle, StreamStats};
use crossbeam_channel::Receiver;
use myo_protocol::{LineFrequency, ModeCommand, TiltAngles};
use myo_serial::SerialChannel;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

/// 肌动图仪器驱动
pub struct MyoDriver {
    channel: Arc<SerialChannel>,
    manager: Mutex<ModeManager>,
    alignment: Arc<AlignmentStore>,
    angles: AngleSink,
    angle_rx: Receiver<AngleSample>,
    stream: Mutex<Option<StreamHandle>>,
    config: DriverConfig,
}

impl MyoDriver {
    /// 由 [`DriverBuilder`](crate::DriverBuilder) 调用
    pub(crate) fn new(channel: SerialChannel, config: DriverConfig) -> Self {
        let channel = Arc::new(channel);
        let alignment = Arc::new(AlignmentStore::default());
        let (angles, angle_rx) = AngleSink::new(config.angle_queue_capacity);
        let context = ModeContext {
            alignment: alignment.clone(),
            angles: angles.clone(),
        };
        let manager = ModeManager::new(channel.clone(), context, config.manager_options());

        info!(
            "Driver ready ({})",
            if config.disconnected || !channel.is_connected() {
                "no device"
            } else {
                "device connected"
            }
        );

        Self {
            channel,
            manager: Mutex::new(manager),
            alignment,
            angles,
            angle_rx,
            stream: Mutex::new(None),
            config,
        }
    }

    /// 执行命令，返回写入 `output` 的字节数
    ///
    /// 命令可以是控制数字（`"1"`..`"9"`）或模式名（如 `"mode-42-raw-q"`）。
    pub fn execute(&self, command: &str, output: &mut [u8]) -> Result<usize, DriverError> {
        self.manager.lock().execute(command, output)
    }

    /// 用配置的采样缓冲区大小执行命令
    pub fn execute_to_vec(&self, command: &str) -> Result<Vec<u8>, DriverError> {
        let mut output = vec![0u8; self.config.sample_buffer_size];
        let n = self.execute(command, &mut output)?;
        output.truncate(n);
        Ok(output)
    }

    /// 复位并重新握手，同时持久化工频
    pub fn reset_hardware(&self, frequency: LineFrequency) -> Result<(), DriverError> {
        let command = match frequency {
            LineFrequency::Hz60 => "5",
            LineFrequency::Hz50 => "6",
        };
        let mut output = [0u8; 0];
        self.execute(command, &mut output).map(|_| ())
    }

    pub fn current_frequency(&self) -> Option<LineFrequency> {
        self.channel.current_frequency()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub fn is_disconnected(&self) -> bool {
        self.manager.lock().is_disconnected()
    }

    /// 切换无设备运行（不关闭串口）
    pub fn set_disconnected(&self, disconnected: bool) {
        self.manager.lock().set_disconnected(disconnected);
    }

    pub fn is_mode_active(&self, command: &str) -> bool {
        self.manager.lock().is_mode_active(command)
    }

    pub fn active_mode(&self) -> Option<ModeCommand> {
        self.manager.lock().active_command()
    }

    pub fn mode_state(&self) -> ModeState {
        self.manager.lock().mode_state()
    }

    pub fn equipment_byte(&self) -> Option<u8> {
        self.manager.lock().equipment_byte()
    }

    pub fn alignment(&self) -> AlignmentValues {
        self.alignment.load()
    }

    /// 设置对齐偏移（对齐值本身由 `mode-0-align` 测得）
    pub fn set_alignment_offset(&self, offset: [i32; crate::alignment::CHANNEL_COUNT]) {
        self.alignment.set_offset(offset);
    }

    pub fn reset_alignment(&self) {
        self.alignment.reset();
    }

    /// 最近一次发布的倾角
    pub fn last_angles(&self) -> Option<TiltAngles> {
        self.angles.latest()
    }

    /// 倾角队列接收端（可克隆）
    pub fn angle_receiver(&self) -> Receiver<AngleSample> {
        self.angle_rx.clone()
    }

    /// 因队列满而丢弃的倾角样本数
    pub fn dropped_angles(&self) -> u64 {
        self.angles.dropped()
    }

    /// 启动后台流式读取，返回数据接收端
    ///
    /// 已在运行时返回同一个队列的接收端。
    pub fn start_streaming(&self) -> Result<Receiver<StreamChunk>, DriverError> {
        let mut stream = self.stream.lock();
        if let Some(handle) = stream.as_ref()
            && handle.is_running()
        {
            return Ok(handle.receiver().clone());
        }
        if self.is_disconnected() {
            return Err(DriverError::NotReady(
                "streaming requires a connected device".to_string(),
            ));
        }
        let handle = StreamHandle::spawn(self.channel.clone(), self.config.stream.clone())?;
        let rx = handle.receiver().clone();
        *stream = Some(handle);
        Ok(rx)
    }

    /// 停止后台流式读取（未运行时返回 `None`）
    pub fn stop_streaming(&self) -> Option<StreamStats> {
        self.stream.lock().take().map(StreamHandle::stop)
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.lock().as_ref().is_some_and(StreamHandle::is_running)
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// 停止流式读取，销毁活动模式并关闭串口
    pub fn close(&self) {
        if let Some(stats) = self.stop_streaming()
            && stats.dropped > 0
        {
            warn!("{} stream chunks were dropped", stats.dropped);
        }
        self.manager.lock().close();
    }
}

impl Drop for MyoDriver {
    fn drop(&mut self) {
        self.close();
    }
}
