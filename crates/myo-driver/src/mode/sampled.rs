//! 采样类模式：预热 → 读取 → 重同步
//!
//! 模式 42、43、51、52、53、56 只在块布局、预热判稳方式、读取方式和
//! 无设备数据上不同，用同一个数据驱动的实现。

use super::warmup::WarmUp;
use super::{
    EMG_READ_TIMEOUT, ModeBehavior, ModeSession, SAMPLE_READ_SIZE, SAMPLE_READ_TIMEOUT,
    WARMUP_BYTE_BUDGET, WARMUP_READ_SIZE, copy_out,
};
use crate::error::DriverError;
use myo_protocol::patterns::{
    MODE_42_PATTERN, MODE_43_PATTERN, MODE_51_PATTERN, MODE_52_PATTERN, MODE_53_PATTERN,
    MODE_56_PATTERN,
};
use myo_protocol::{BlockLayout, fill_pattern};
use std::time::{Duration, Instant};

/// 预热稳定读取次数阈值
const STABLE_THRESHOLD: usize = 50;

/// 模式 43 预热丢弃的字节数
const MODE_43_WARMUP_BYTES: usize = 16_000;

/// 模式 43 单次采集上限
const MODE_43_COLLECT_BYTES: usize = 1700;

/// 模式 42 预热：相邻块 CMS 字节的最大差值（不含）
const CMS_STEADY_DELTA: u8 = 2;

/// CMS 前缀长度
const CMS_PREFIX: usize = 8;

/// 预热判稳方式
#[derive(Debug, Clone, Copy)]
enum Stability {
    /// 只按预算丢弃
    Never,
    /// 每次成功读取都算稳定
    Always,
    /// 能找到同步块即稳定
    Synced(BlockLayout),
    /// 存在相邻两块 CMS 前缀逐字节差值都小于阈值
    SteadyCms(BlockLayout),
}

impl Stability {
    fn check(&self, data: &[u8]) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::Synced(layout) => layout.resync(data).found,
            Self::SteadyCms(layout) => {
                let synced = layout.resync(data);
                let blocks: Vec<&[u8]> = synced.blocks(layout.block_size).collect();
                blocks.windows(2).any(|pair| {
                    pair[0][..CMS_PREFIX]
                        .iter()
                        .zip(&pair[1][..CMS_PREFIX])
                        .all(|(a, b)| a.abs_diff(*b) < CMS_STEADY_DELTA)
                })
            },
        }
    }
}

/// 稳态读取方式
#[derive(Debug, Clone, Copy)]
enum Acquire {
    /// 单次读取
    Single { size: usize, timeout: Duration },
    /// 在时间窗口内分块累积，直到字节上限
    Window {
        max_bytes: usize,
        chunk: usize,
        window: Duration,
    },
}

/// 采样类模式
pub struct SampledMode {
    /// 重同步布局（`None` 表示原样输出）
    layout: Option<BlockLayout>,
    warm_up: Option<(WarmUp, Stability)>,
    acquire: Acquire,
    pattern: &'static [u8],
    warmed: bool,
}

impl SampledMode {
    fn new(layout: Option<BlockLayout>, acquire: Acquire, pattern: &'static [u8]) -> Self {
        Self {
            layout,
            warm_up: None,
            acquire,
            pattern,
            warmed: false,
        }
    }

    fn with_warm_up(mut self, warm_up: WarmUp, stability: Stability) -> Self {
        self.warm_up = Some((warm_up, stability));
        self
    }

    fn stable_warm_up(timeout: Duration) -> WarmUp {
        WarmUp::until_stable(STABLE_THRESHOLD, WARMUP_BYTE_BUDGET, WARMUP_READ_SIZE, timeout)
    }

    /// EMG 原始数据（CMS + 8 路 EMG，24 字节块）
    pub fn mode_42() -> Self {
        Self::new(
            Some(BlockLayout::CMS_EMG),
            Acquire::Single {
                size: SAMPLE_READ_SIZE,
                timeout: EMG_READ_TIMEOUT,
            },
            &MODE_42_PATTERN,
        )
        .with_warm_up(
            Self::stable_warm_up(EMG_READ_TIMEOUT),
            Stability::SteadyCms(BlockLayout::CMS_EMG),
        )
    }

    /// EMG（16 字节块），固定时间窗口采集
    pub fn mode_43() -> Self {
        Self::new(
            Some(BlockLayout::EMG),
            Acquire::Window {
                max_bytes: MODE_43_COLLECT_BYTES,
                chunk: WARMUP_READ_SIZE,
                window: EMG_READ_TIMEOUT,
            },
            &MODE_43_PATTERN,
        )
        .with_warm_up(
            WarmUp::discard(MODE_43_WARMUP_BYTES, SAMPLE_READ_SIZE, EMG_READ_TIMEOUT),
            Stability::Never,
        )
    }

    /// CMS + 8 通道（24 字节块）
    pub fn mode_51() -> Self {
        Self::new(
            Some(BlockLayout::CMS_EIGHT),
            Acquire::Single {
                size: SAMPLE_READ_SIZE,
                timeout: SAMPLE_READ_TIMEOUT,
            },
            &MODE_51_PATTERN,
        )
        .with_warm_up(
            Self::stable_warm_up(SAMPLE_READ_TIMEOUT),
            Stability::Synced(BlockLayout::CMS_EIGHT),
        )
    }

    /// 四通道（8 字节块），无预热
    pub fn mode_52() -> Self {
        Self::new(
            Some(BlockLayout::QUAD),
            Acquire::Single {
                size: SAMPLE_READ_SIZE,
                timeout: SAMPLE_READ_TIMEOUT,
            },
            &MODE_52_PATTERN,
        )
    }

    /// ESG（4 字节块）
    pub fn mode_53() -> Self {
        Self::new(
            Some(BlockLayout::ESG),
            Acquire::Single {
                size: SAMPLE_READ_SIZE,
                timeout: SAMPLE_READ_TIMEOUT,
            },
            &MODE_53_PATTERN,
        )
        .with_warm_up(
            Self::stable_warm_up(SAMPLE_READ_TIMEOUT),
            Stability::Synced(BlockLayout::ESG),
        )
    }

    /// 未打标签的原始数据，不做重同步
    pub fn mode_56() -> Self {
        Self::new(
            None,
            Acquire::Single {
                size: SAMPLE_READ_SIZE,
                timeout: SAMPLE_READ_TIMEOUT,
            },
            &MODE_56_PATTERN,
        )
        .with_warm_up(Self::stable_warm_up(SAMPLE_READ_TIMEOUT), Stability::Always)
    }

    fn acquire(&self, session: &ModeSession) -> Result<Vec<u8>, DriverError> {
        match self.acquire {
            Acquire::Single { size, timeout } => session.read_vec(size, timeout),
            Acquire::Window {
                max_bytes,
                chunk,
                window,
            } => {
                let deadline = Instant::now() + window;
                let mut data = Vec::with_capacity(max_bytes);
                let mut buf = vec![0u8; chunk.max(1)];
                while data.len() < max_bytes {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() && !data.is_empty() {
                        break;
                    }
                    let want = buf.len().min(max_bytes - data.len());
                    match session.read(&mut buf[..want], remaining) {
                        Ok(n) => data.extend_from_slice(&buf[..n]),
                        Err(DriverError::Timeout) => break,
                        Err(e) => return Err(e),
                    }
                }
                if data.is_empty() {
                    return Err(DriverError::Timeout);
                }
                Ok(data)
            },
        }
    }
}

impl ModeBehavior for SampledMode {
    fn execute(&mut self, session: &mut ModeSession, output: &mut [u8]) -> Result<usize, DriverError> {
        if !self.warmed {
            if let Some((warm_up, stability)) = &self.warm_up {
                warm_up.run(session, |data| stability.check(data))?;
            }
            self.warmed = true;
        }

        let data = self.acquire(session)?;
        match &self.layout {
            Some(layout) => {
                let synced = layout.resync(&data);
                if !synced.found {
                    return Err(DriverError::SyncLost);
                }
                Ok(copy_out(&synced.bytes, output))
            },
            None => Ok(copy_out(&data, output)),
        }
    }

    fn execute_disconnected(&self, output: &mut [u8]) -> Result<usize, DriverError> {
        Ok(fill_pattern(self.pattern, output, None))
    }

    fn stop(&mut self) {
        self.warmed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use myo_protocol::{ChannelKind, ModeKind};

    fn block(channel: ChannelKind, seed: u8) -> Vec<u8> {
        channel
            .expected_tags()
            .iter()
            .flat_map(|&tag| [(tag << 4) | (seed & 0x0F), seed])
            .collect()
    }

    fn cms_emg_block(seed: u8) -> Vec<u8> {
        let mut data = block(ChannelKind::Cms, seed);
        data.extend(block(ChannelKind::Emg, seed));
        data
    }

    #[test]
    fn test_mode_42_disconnected_pattern() {
        let mode = SampledMode::mode_42();

        let mut out = [0u8; 30];
        assert_eq!(mode.execute_disconnected(&mut out).unwrap(), 30);
        assert_eq!(&out[..24], &MODE_42_PATTERN);
        assert_eq!(&out[24..], &MODE_42_PATTERN[..6]);
        assert_eq!(&out[..4], &[7, 154, 23, 141]);

        let mut out = [0u8; 10];
        assert_eq!(mode.execute_disconnected(&mut out).unwrap(), 10);
        assert_eq!(&out[..], &MODE_42_PATTERN[..10]);
    }

    #[test]
    fn test_disconnected_patterns() {
        let mut out = [0u8; 8];
        SampledMode::mode_53().execute_disconnected(&mut out).unwrap();
        assert_eq!(out, [0x40, 0, 0x50, 0, 0x40, 0, 0x50, 0]);

        let mut out = [0u8; 10];
        SampledMode::mode_56().execute_disconnected(&mut out).unwrap();
        assert_eq!(out, MODE_56_PATTERN);

        let mut out = [0u8; 16];
        SampledMode::mode_43().execute_disconnected(&mut out).unwrap();
        assert_eq!(out, MODE_43_PATTERN);
    }

    #[test]
    fn test_steady_cms_stability() {
        let layout = BlockLayout::CMS_EMG;
        let steady: Vec<u8> = [cms_emg_block(1), cms_emg_block(1)].concat();
        assert!(Stability::SteadyCms(layout).check(&steady));

        // CMS 字节相差 3
        let moving: Vec<u8> = [cms_emg_block(1), cms_emg_block(4)].concat();
        assert!(!Stability::SteadyCms(layout).check(&moving));
        // 只有一块
        assert!(!Stability::SteadyCms(layout).check(&cms_emg_block(1)));
    }

    #[test]
    fn test_mode_42_warm_up_then_read() {
        let (channel, handle) = mock_channel();
        handle.set_stream(cms_emg_block(5));

        let mut session = session(channel, ModeKind::Emg42Raw);
        let mut mode = SampledMode::mode_42();
        let mut out = vec![0u8; 1600];
        let n = mode.execute(&mut session, &mut out).unwrap();

        // 1600 字节中有 66 个完整 24 字节块
        assert_eq!(n, 66 * 24);
        assert_eq!(&out[..24], &cms_emg_block(5)[..]);
        assert!(mode.warmed);
    }

    #[test]
    fn test_mode_52_sync_lost() {
        let (channel, handle) = mock_channel();
        handle.push_read(vec![0xEE; 64]);
        let mut session = session(channel, ModeKind::Mode52Raw);
        let mut out = [0u8; 64];
        assert!(matches!(
            SampledMode::mode_52().execute(&mut session, &mut out),
            Err(DriverError::SyncLost)
        ));
    }

    #[test]
    fn test_mode_52_reads_quad_blocks() {
        let (channel, handle) = mock_channel();
        let mut data = vec![0xEE];
        data.extend(block(ChannelKind::Quad, 2));
        data.extend(block(ChannelKind::Quad, 3));
        handle.push_read(data);

        let mut session = session(channel, ModeKind::Mode52Raw);
        let mut out = [0u8; 64];
        assert_eq!(SampledMode::mode_52().execute(&mut session, &mut out).unwrap(), 16);
        assert_eq!(&out[..8], &block(ChannelKind::Quad, 2)[..]);
    }

    #[test]
    fn test_mode_43_window_collects_chunks() {
        let (channel, handle) = mock_channel();
        let mut session = session(channel, ModeKind::Emg43Raw);
        let mut mode = SampledMode::mode_43();
        mode.warmed = true;

        handle.push_read(block(ChannelKind::Emg, 1));
        handle.push_read(block(ChannelKind::Emg, 2));
        handle.push_timeout();

        let mut out = [0u8; 64];
        assert_eq!(mode.execute(&mut session, &mut out).unwrap(), 32);
        assert_eq!(&out[16..32], &block(ChannelKind::Emg, 2)[..]);
    }

    #[test]
    fn test_mode_43_without_data_times_out() {
        let (channel, _handle) = mock_channel();
        let mut session = session(channel, ModeKind::Emg43Raw);
        let mut mode = SampledMode::mode_43();
        mode.warmed = true;

        let mut out = [0u8; 64];
        assert!(matches!(
            mode.execute(&mut session, &mut out),
            Err(DriverError::Timeout)
        ));
    }

    #[test]
    fn test_mode_56_passes_raw_bytes() {
        let (channel, handle) = mock_channel();
        let mut session = session(channel, ModeKind::Mode56Raw);
        let mut mode = SampledMode::mode_56();
        mode.warmed = true;
        handle.push_read(vec![1, 2, 3, 4, 5]);

        let mut out = [0u8; 3];
        assert_eq!(mode.execute(&mut session, &mut out).unwrap(), 3);
        assert_eq!(out, [1, 2, 3]);
    }
}
