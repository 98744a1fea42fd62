//! 后台流式读取
//!
//! 专用线程循环：锁定通道 → 读取接收缓冲区中已有的数据 → 推入有界队列
//! （队列满时丢弃并计数）→ 释放锁 → 等待固定间隔。
//!
//! 停止信号是一个 crossbeam 关闭通道：间隔等待本身就是对它的 `select!`，
//! 所以停止请求能立即生效。线程退出（包括 panic）时释放它持有的 `done` 发送端，
//! 停止方最多等待 2 秒；超时则放弃 join，线程被分离。

use crate::error::DriverError;
use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded, select};
use myo_protocol::DEFAULT_BUFFER_SIZE;
use myo_serial::{SerialChannel, SerialError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// join 超时
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 流式读取配置
///
/// # Example
///
/// ```
/// use myo_driver::StreamConfig;
///
/// let config = StreamConfig {
///     interval_ms: 5,
///     ..StreamConfig::default()
/// };
/// assert_eq!(config.chunk_size, 1600);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// 每次最多读取的字节数
    pub chunk_size: usize,
    /// 两次读取之间的间隔（毫秒）
    pub interval_ms: u64,
    /// 队列容量（块）
    pub queue_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_BUFFER_SIZE,
            interval_ms: 10,
            queue_capacity: 1024,
        }
    }
}

impl StreamConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// 一次读取得到的数据块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    pub data: Bytes,
    /// 序号（丢弃的块也占用序号）
    pub sequence: u64,
    /// 相对于流开始时刻的微秒数
    pub elapsed_us: u64,
}

#[derive(Default)]
struct StreamCounters {
    chunks: AtomicU64,
    bytes: AtomicU64,
    dropped: AtomicU64,
}

/// 流式读取统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamStats {
    /// 已入队的块数
    pub chunks: u64,
    pub bytes: u64,
    /// 因队列满而丢弃的块数
    pub dropped: u64,
}

/// 运行中的流式读取线程
///
/// 丢弃句柄即停止线程。
pub struct StreamHandle {
    rx: Receiver<StreamChunk>,
    shutdown: Option<Sender<()>>,
    /// 线程退出时断开
    done: Receiver<()>,
    thread: Option<JoinHandle<()>>,
    counters: Arc<StreamCounters>,
}

impl StreamHandle {
    /// 启动流式读取线程
    pub fn spawn(channel: Arc<SerialChannel>, config: StreamConfig) -> Result<Self, DriverError> {
        let (tx, rx) = bounded(config.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(0);
        let counters = Arc::new(StreamCounters::default());

        let worker_counters = counters.clone();
        let thread = std::thread::Builder::new()
            .name("myo-stream".to_string())
            .spawn(move || {
                let _done = done_tx;
                stream_loop(&channel, &tx, &shutdown_rx, &config, &worker_counters);
            })
            .map_err(|e| DriverError::IoThread(e.to_string()))?;

        info!("Streaming started");
        Ok(Self {
            rx,
            shutdown: Some(shutdown_tx),
            done: done_rx,
            thread: Some(thread),
            counters,
        })
    }

    /// 数据接收端（可克隆）
    pub fn receiver(&self) -> &Receiver<StreamChunk> {
        &self.rx
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            chunks: self.counters.chunks.load(Ordering::Relaxed),
            bytes: self.counters.bytes.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|thread| !thread.is_finished())
    }

    /// 停止并等待线程退出
    pub fn stop(mut self) -> StreamStats {
        self.shutdown_and_join();
        self.stats()
    }

    fn shutdown_and_join(&mut self) {
        // 关闭通道断开即为停止信号
        drop(self.shutdown.take());
        let Some(thread) = self.thread.take() else {
            return;
        };

        match self.done.recv_timeout(JOIN_TIMEOUT) {
            Err(RecvTimeoutError::Timeout) => {
                error!("Stream thread did not exit within {:?}, detaching", JOIN_TIMEOUT);
            },
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if thread.join().is_err() {
                    error!("Stream thread panicked");
                }
            },
        }

        let stats = self.stats();
        info!(
            "Streaming stopped: {} chunks, {} bytes, {} dropped",
            stats.chunks, stats.bytes, stats.dropped
        );
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

fn stream_loop(
    channel: &SerialChannel,
    tx: &Sender<StreamChunk>,
    shutdown: &Receiver<()>,
    config: &StreamConfig,
    counters: &StreamCounters,
) {
    let start = Instant::now();
    let interval = config.interval();
    let mut sequence = 0u64;
    let mut closed_logged = false;

    loop {
        match channel.read_available(config.chunk_size.max(1)) {
            Ok(data) if !data.is_empty() => {
                closed_logged = false;
                let len = data.len() as u64;
                let chunk = StreamChunk {
                    data: Bytes::from(data),
                    sequence,
                    elapsed_us: start.elapsed().as_micros() as u64,
                };
                sequence += 1;
                match tx.try_send(chunk) {
                    Ok(()) => {
                        counters.chunks.fetch_add(1, Ordering::Relaxed);
                        counters.bytes.fetch_add(len, Ordering::Relaxed);
                    },
                    Err(TrySendError::Full(_)) => {
                        let dropped = counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        if dropped.is_power_of_two() {
                            warn!("Stream queue full, {} chunks dropped so far", dropped);
                        }
                    },
                    Err(TrySendError::Disconnected(_)) => {
                        trace!("Stream receiver dropped, stopping");
                        break;
                    },
                }
            },
            Ok(_) => {},
            Err(SerialError::NotOpen) => {
                if !closed_logged {
                    debug!("Stream waiting for serial channel to open");
                    closed_logged = true;
                }
            },
            Err(e) if e.is_fatal() => {
                error!("Stream stopped on serial error: {}", e);
                break;
            },
            Err(e) => warn!("Stream read failed: {}", e),
        }

        select! {
            recv(shutdown) -> _ => {
                trace!("Stream shutdown requested");
                break;
            },
            default(interval) => {},
        }
    }
}
