//! 下颌追踪（CMS）模式：`mode-0`、`mode-0-raw`、`mode-0-align`
//!
//! CMS 块为 8 字节、4 个通道，每个通道两个字节：
//! 低字节低 4 位为采样值高 4 位，高字节为低 8 位（低字节高 4 位是通道标签）。

use super::warmup::WarmUp;
use super::{ModeBehavior, ModeSession, SAMPLE_READ_SIZE, SAMPLE_READ_TIMEOUT, WARMUP_BYTE_BUDGET, copy_out};
use crate::alignment::{AlignmentStore, AlignmentValues, CHANNEL_COUNT, DEFAULT_ALIGN};
use crate::error::DriverError;
use myo_protocol::patterns::{MODE_0_MAX_REPEATS, MODE_0_PATTERN};
use myo_protocol::{BlockLayout, fill_pattern};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// CMS 块大小
const BLOCK_SIZE: usize = 8;

/// 一个解码样本（4 个小端 i16）
const SAMPLE_BYTES: usize = CHANNEL_COUNT * 2;

/// 侧向通道下标（需要扣除串扰）
const LATERAL_CHANNEL: usize = 2;

/// 校准模式每次读取的字节数
const MODE_0_READ_SIZE: usize = 160;

/// 原始模式同步失败后补读的字节数
const RAW_RETRY_READ_SIZE: usize = 320;

/// 相邻样本的变化阈值（不超过则丢弃）
const CHANGE_THRESHOLD: i32 = 2;

/// 方差判稳：每个字节位置最多取多少个样本
const VARIANCE_SAMPLES: usize = 20;

const VARIANCE_LIMIT: f64 = 3.0;

/// 原始模式预热：稳定读取次数阈值
const RAW_STABLE_THRESHOLD: usize = 25;

const RAW_WARMUP_PAUSE: Duration = Duration::from_millis(10);

/// 12 位采样值
fn scale_value(low: u8, high: u8) -> i32 {
    (i32::from(low & 0x0F) << 8) | i32::from(high)
}

/// 侧向通道串扰项
///
/// 由同一块中通道 0、1 的计算值得出。对齐值为默认值且两通道为 0 时串扰为 0。
pub fn crosstalk(channel0: i16, channel1: i16, values: &AlignmentValues) -> i32 {
    let term0 = DEFAULT_ALIGN - values.align[0] - i32::from(channel0) - values.offset[0];
    let term1 = DEFAULT_ALIGN - values.align[1] - i32::from(channel1) - values.offset[1];
    (term0.abs() + term1.abs()) >> 13
}

/// 解码一个 CMS 块为 4 个有符号通道值
pub fn decode_cms_block(block: &[u8], values: &AlignmentValues) -> [i16; CHANNEL_COUNT] {
    let mut channels = [0i16; CHANNEL_COUNT];
    for i in 0..CHANNEL_COUNT {
        let mut computed = scale_value(block[i * 2], block[i * 2 + 1]) - values.align[i] - values.offset[i];
        if i == LATERAL_CHANNEL {
            computed -= crosstalk(channels[0], channels[1], values);
        }
        // 16 位截断
        channels[i] = computed as i16;
    }
    channels
}

fn disconnected_fill(output: &mut [u8]) -> Result<usize, DriverError> {
    Ok(fill_pattern(&MODE_0_PATTERN, output, Some(MODE_0_MAX_REPEATS)))
}

/// 每个字节位置上的最大方差小于阈值视为稳定
fn is_variance_stable(data: &[u8]) -> bool {
    if data.len() < BLOCK_SIZE {
        return false;
    }
    let synced = BlockLayout::CMS.resync(data);
    if !synced.found {
        return false;
    }

    let max_variance = (0..BLOCK_SIZE)
        .map(|pos| {
            let samples: Vec<f64> = synced
                .bytes
                .iter()
                .skip(pos)
                .step_by(BLOCK_SIZE)
                .take(VARIANCE_SAMPLES)
                .map(|b| f64::from(*b))
                .collect();
            variance(&samples)
        })
        .fold(0.0, f64::max);
    max_variance < VARIANCE_LIMIT
}

fn variance(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

/// 校准模式：输出对齐后的通道值（小端 i16），只保留有明显变化的样本
pub struct Mode0 {
    alignment: Arc<AlignmentStore>,
    previous: Option<[i16; CHANNEL_COUNT]>,
}

impl Mode0 {
    pub fn new(alignment: Arc<AlignmentStore>) -> Self {
        Self {
            alignment,
            previous: None,
        }
    }

    fn is_significant(&self, channels: &[i16; CHANNEL_COUNT]) -> bool {
        match &self.previous {
            None => true,
            Some(previous) => channels
                .iter()
                .zip(previous)
                .any(|(a, b)| (i32::from(*a) - i32::from(*b)).abs() > CHANGE_THRESHOLD),
        }
    }
}

impl ModeBehavior for Mode0 {
    fn execute(&mut self, session: &mut ModeSession, output: &mut [u8]) -> Result<usize, DriverError> {
        let data = session.read_vec(MODE_0_READ_SIZE, SAMPLE_READ_TIMEOUT)?;
        let synced = BlockLayout::CMS.resync(&data);
        if !synced.found {
            return Err(DriverError::SyncLost);
        }

        let values = self.alignment.load();
        let mut written = 0;
        for block in synced.blocks(BLOCK_SIZE) {
            let channels = decode_cms_block(block, &values);
            if !self.is_significant(&channels) {
                continue;
            }
            // 只输出完整样本
            if written + SAMPLE_BYTES > output.len() {
                break;
            }
            self.previous = Some(channels);
            for (i, channel) in channels.iter().enumerate() {
                let at = written + i * 2;
                output[at..at + 2].copy_from_slice(&channel.to_le_bytes());
            }
            written += SAMPLE_BYTES;
        }

        session.flush()?;
        Ok(written)
    }

    fn execute_disconnected(&self, output: &mut [u8]) -> Result<usize, DriverError> {
        disconnected_fill(output)
    }

    fn stop(&mut self) {
        self.previous = None;
    }
}

/// 原始模式：输出重同步后的 CMS 块
#[derive(Default)]
pub struct Mode0Raw {
    warmed: bool,
}

impl Mode0Raw {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModeBehavior for Mode0Raw {
    fn execute(&mut self, session: &mut ModeSession, output: &mut [u8]) -> Result<usize, DriverError> {
        if !self.warmed {
            WarmUp::until_stable(
                RAW_STABLE_THRESHOLD,
                WARMUP_BYTE_BUDGET,
                SAMPLE_READ_SIZE,
                SAMPLE_READ_TIMEOUT,
            )
            .with_pause(RAW_WARMUP_PAUSE)
            .run(session, is_variance_stable)?;
            self.warmed = true;
        }

        let data = session.read_vec(SAMPLE_READ_SIZE, SAMPLE_READ_TIMEOUT)?;
        let mut synced = BlockLayout::CMS.resync(&data);
        if !synced.found || synced.length() < MODE_0_READ_SIZE {
            debug!("Mode 0 raw: short sync ({} bytes), reading again", synced.length());
            let data = session.read_vec(RAW_RETRY_READ_SIZE, SAMPLE_READ_TIMEOUT)?;
            synced = BlockLayout::CMS.resync(&data);
        }
        if !synced.found {
            return Err(DriverError::SyncLost);
        }
        Ok(copy_out(&synced.bytes, output))
    }

    fn execute_disconnected(&self, output: &mut [u8]) -> Result<usize, DriverError> {
        disconnected_fill(output)
    }

    fn stop(&mut self) {
        self.warmed = false;
    }
}

/// 对齐模式：以本次读取的各通道均值作为新的零点
pub struct Mode0Align {
    alignment: Arc<AlignmentStore>,
}

impl Mode0Align {
    pub fn new(alignment: Arc<AlignmentStore>) -> Self {
        Self { alignment }
    }
}

impl ModeBehavior for Mode0Align {
    fn execute(&mut self, session: &mut ModeSession, output: &mut [u8]) -> Result<usize, DriverError> {
        let data = session.read_vec(SAMPLE_READ_SIZE, SAMPLE_READ_TIMEOUT)?;
        let synced = BlockLayout::CMS.resync(&data);
        if !synced.found {
            return Err(DriverError::SyncLost);
        }

        let mut sums = [0i64; CHANNEL_COUNT];
        let mut count = 0i64;
        for block in synced.blocks(BLOCK_SIZE) {
            for (i, sum) in sums.iter_mut().enumerate() {
                *sum += i64::from(scale_value(block[i * 2], block[i * 2 + 1]));
            }
            count += 1;
        }
        if count == 0 {
            return Err(DriverError::SyncLost);
        }

        let align = sums.map(|sum| (sum / count) as i32);
        self.alignment.set_align(align);
        info!("Channel alignment updated: {:?}", align);

        let mut encoded = [0u8; CHANNEL_COUNT * 2];
        for (i, value) in align.iter().enumerate() {
            encoded[i * 2..i * 2 + 2].copy_from_slice(&(*value as i16).to_le_bytes());
        }
        Ok(copy_out(&encoded, output))
    }

    fn execute_disconnected(&self, output: &mut [u8]) -> Result<usize, DriverError> {
        disconnected_fill(output)
    }
}
