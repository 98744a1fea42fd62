//! 倾角发布队列
//!
//! 扫频模式（`mode-57-raw`、`mode-44-raw`、`mode-44-sweep`）每次读取后计算
//! 前后/侧向平均倾角，经有界通道发布给消费者（例如 CLI 的实时显示）。
//!
//! - **有界队列**：队列满时丢弃新样本并计数，读取线程永不阻塞
//! - **最新值**：除了队列，还保存最近一次的角度，随时可查询
//!
//! ```rust
//! use myo_driver::angles::AngleSink;
//! use myo_protocol::TiltAngles;
//!
//! let (sink, rx) = AngleSink::new(16);
//! sink.publish(TiltAngles { front: 1.5, side: -0.5 }, 3);
//!
//! let sample = rx.try_recv().unwrap();
//! assert_eq!(sample.block_count, 3);
//! assert_eq!(sink.latest().map(|a| a.front), Some(1.5));
//! ```

use arc_swap::ArcSwapOption;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use myo_protocol::TiltAngles;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// 默认队列容量
pub const DEFAULT_ANGLE_QUEUE_CAPACITY: usize = 256;

/// 一次发布的倾角
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleSample {
    pub angles: TiltAngles,
    /// 参与平均的块数
    pub block_count: usize,
    /// 发布序号（从 0 开始，丢弃的样本也占用序号）
    pub sequence: u64,
    /// 相对于发布端创建时刻的微秒数
    pub elapsed_us: u64,
}

/// 倾角发布端（可克隆，所有克隆共享计数器）
#[derive(Clone)]
pub struct AngleSink {
    tx: Sender<AngleSample>,
    latest: Arc<ArcSwapOption<TiltAngles>>,
    published: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    epoch: Instant,
}

impl AngleSink {
    /// 创建发布端及其接收端
    #[must_use]
    pub fn new(capacity: usize) -> (Self, Receiver<AngleSample>) {
        let (tx, rx) = bounded(capacity.max(1));
        let sink = Self {
            tx,
            latest: Arc::new(ArcSwapOption::empty()),
            published: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            epoch: Instant::now(),
        };
        (sink, rx)
    }

    /// 发布一组倾角（非阻塞）
    pub fn publish(&self, angles: TiltAngles, block_count: usize) {
        self.latest.store(Some(Arc::new(angles)));
        let sample = AngleSample {
            angles,
            block_count,
            sequence: self.published.fetch_add(1, Ordering::Relaxed),
            elapsed_us: self.epoch.elapsed().as_micros() as u64,
        };
        match self.tx.try_send(sample) {
            Ok(()) => {},
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            },
            // 没有消费者时只保留最新值
            Err(TrySendError::Disconnected(_)) => {},
        }
    }

    /// 最近一次发布的倾角
    pub fn latest(&self) -> Option<TiltAngles> {
        self.latest.load_full().map(|angles| *angles)
    }

    /// 发布总数
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// 因队列满而丢弃的样本数
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
