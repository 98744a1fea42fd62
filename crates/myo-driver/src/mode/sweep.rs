//! 扫频模式：`mode-57-raw`、`mode-57-raw-no-image`、`mode-44-sweep`、`mode-44-raw`
//!
//! 数据为 16 字节块：CMS（偏移 0）+ 倾角（偏移 8）。每次读取后计算平均倾角，
//! 出图变体把角度发布到 [`AngleSink`]。

use super::warmup::WarmUp;
use super::{ModeBehavior, ModeSession, SAMPLE_READ_SIZE, SAMPLE_READ_TIMEOUT};
use crate::angles::AngleSink;
use crate::error::DriverError;
use myo_protocol::patterns::SWEEP_PATTERN;
use myo_protocol::{BlockLayout, ModeKind, fill_pattern, mean_tilt_angles};
use tracing::{debug, trace};

/// 预热读取次数
const WARMUP_READS: usize = 5;

/// `mode-44-raw` 中每个块 CMS 前缀的重复次数
const CMS_REPEAT: usize = 5;

const CMS_PREFIX: usize = 8;

/// 扫频读取
pub struct Sweep {
    kind: ModeKind,
    angles: AngleSink,
    warmed: bool,
}

impl Sweep {
    pub fn new(kind: ModeKind, angles: AngleSink) -> Self {
        Self {
            kind,
            angles,
            warmed: false,
        }
    }

    /// 是否发布角度
    pub fn publishes_angles(&self) -> bool {
        self.kind.publishes_angles()
    }

    /// 预热（首次）+ 读取 + 重同步 + 角度计算，返回同步后的数据
    pub fn acquire(&mut self, session: &ModeSession) -> Result<Vec<u8>, DriverError> {
        if !self.warmed {
            WarmUp::reads(WARMUP_READS, SAMPLE_READ_SIZE, SAMPLE_READ_TIMEOUT).run(session, |_| false)?;
            self.warmed = true;
        }

        let data = session.read_vec(SAMPLE_READ_SIZE, SAMPLE_READ_TIMEOUT)?;
        let layout = BlockLayout::CMS_TILT;
        let synced = layout.resync(&data);
        if !synced.found {
            return Err(DriverError::SyncLost);
        }

        if let Some(angles) = mean_tilt_angles(&synced.bytes) {
            let blocks = synced.length() / layout.block_size;
            trace!(
                "Sweep angles over {} blocks: front {:.2}, side {:.2}",
                blocks, angles.front, angles.side
            );
            if self.publishes_angles() {
                self.angles.publish(angles, blocks);
            }
        }
        Ok(synced.bytes)
    }
}

impl ModeBehavior for Sweep {
    fn execute(&mut self, session: &mut ModeSession, output: &mut [u8]) -> Result<usize, DriverError> {
        let synced = self.acquire(session)?;
        Ok(super::copy_out(&synced, output))
    }

    fn execute_disconnected(&self, output: &mut [u8]) -> Result<usize, DriverError> {
        Ok(fill_pattern(&SWEEP_PATTERN, output, None))
    }

    fn stop(&mut self) {
        if self.warmed {
            debug!("Sweep {} stopped", self.kind.name());
        }
        self.warmed = false;
    }
}

/// `mode-44-raw`：扫频数据中每个块的 CMS 前缀重复 5 次输出
pub struct Mode44Raw {
    sweep: Sweep,
}

impl Mode44Raw {
    pub fn new(sweep: Sweep) -> Self {
        Self { sweep }
    }
}

/// 把每个 16 字节块的前 8 字节重复写入 `output`，直到写满
fn expand_cms(synced: &[u8], output: &mut [u8]) -> usize {
    let block_size = BlockLayout::CMS_TILT.block_size;
    let mut written = 0;
    'blocks: for block in synced.chunks_exact(block_size) {
        for _ in 0..CMS_REPEAT {
            if written + CMS_PREFIX > output.len() {
                break 'blocks;
            }
            output[written..written + CMS_PREFIX].copy_from_slice(&block[..CMS_PREFIX]);
            written += CMS_PREFIX;
        }
    }
    written
}

impl ModeBehavior for Mode44Raw {
    fn execute(&mut self, session: &mut ModeSession, output: &mut [u8]) -> Result<usize, DriverError> {
        let synced = self.sweep.acquire(session)?;
        Ok(expand_cms(&synced, output))
    }

    fn execute_disconnected(&self, output: &mut [u8]) -> Result<usize, DriverError> {
        self.sweep.execute_disconnected(output)
    }

    fn stop(&mut self) {
        self.sweep.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    /// CMS 块 + 倾角块（前向 / 侧向都为 0 的水平姿态）
    fn sweep_block(seed: u8) -> Vec<u8> {
        let mut block = vec![
            seed & 0x0F,
            seed,
            0x10,
            seed,
            0x20,
            seed,
            0x30,
            seed,
        ];
        // 倾角：c0 = 0, c1 = 0x2000 (tag 2), c2 = 0, c3 = 0x7000
        block.extend([0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x70, 0x00]);
        block
    }

    fn sweep_stream(blocks: usize) -> Vec<u8> {
        (0..blocks).flat_map(|i| sweep_block(i as u8)).collect()
    }

    #[test]
    fn test_sweep_publishes_angles() {
        let (channel, handle) = mock_channel();
        let (sink, rx) = AngleSink::new(8);
        let mut sweep = Sweep::new(ModeKind::Mode57Raw, sink.clone());
        let mut session = session(channel, ModeKind::Mode57Raw);

        handle.set_stream(sweep_stream(4));
        let mut out = vec![0u8; 1600];
        let n = sweep.execute(&mut session, &mut out).unwrap();
        assert_eq!(n, 1600);

        let sample = rx.try_recv().unwrap();
        assert_eq!(sample.block_count, 100);
        assert!(sink.latest().is_some());
        // 预热 5 次 + 1 次读取
        assert!(sweep.warmed);
    }

    #[test]
    fn test_no_image_variant_does_not_publish() {
        let (channel, handle) = mock_channel();
        let (sink, rx) = AngleSink::new(8);
        let mut sweep = Sweep::new(ModeKind::Mode57RawNoImage, sink);
        sweep.warmed = true;
        let mut session = session(channel, ModeKind::Mode57RawNoImage);

        handle.push_read(sweep_stream(2));
        let mut out = vec![0u8; 64];
        assert_eq!(sweep.execute(&mut session, &mut out).unwrap(), 32);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_sweep_sync_lost() {
        let (channel, handle) = mock_channel();
        let (sink, _rx) = AngleSink::new(8);
        let mut sweep = Sweep::new(ModeKind::Mode44Sweep, sink);
        sweep.warmed = true;
        let mut session = session(channel, ModeKind::Mode44Sweep);

        handle.push_read(vec![0xAB; 100]);
        let mut out = vec![0u8; 64];
        assert!(matches!(
            sweep.execute(&mut session, &mut out),
            Err(DriverError::SyncLost)
        ));
    }

    #[test]
    fn test_mode_44_raw_expands_cms_prefix() {
        let synced = sweep_stream(2);
        let mut out = vec![0u8; 120];
        assert_eq!(expand_cms(&synced, &mut out), 80);
        for i in 0..5 {
            assert_eq!(&out[i * 8..i * 8 + 8], &synced[..8]);
            assert_eq!(&out[40 + i * 8..48 + i * 8], &synced[16..24]);
        }

        // 输出缓冲区不足时截断到整块前缀
        let mut small = vec![0u8; 20];
        assert_eq!(expand_cms(&synced, &mut small), 16);
    }

    #[test]
    fn test_mode_44_raw_execute() {
        let (channel, handle) = mock_channel();
        let (sink, rx) = AngleSink::new(8);
        let mut sweep = Sweep::new(ModeKind::Mode44Raw, sink);
        sweep.warmed = true;
        let mut mode = Mode44Raw::new(sweep);
        let mut session = session(channel, ModeKind::Mode44Raw);

        handle.push_read(sweep_stream(3));
        let mut out = vec![0u8; 1600];
        assert_eq!(mode.execute(&mut session, &mut out).unwrap(), 3 * 5 * 8);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_sweep_disconnected_pattern() {
        let (sink, _rx) = AngleSink::new(1);
        let mode = Mode44Raw::new(Sweep::new(ModeKind::Mode44Raw, sink));
        let mut out = [0u8; 20];
        assert_eq!(mode.execute_disconnected(&mut out).unwrap(), 20);
        assert_eq!(&out[..16], &SWEEP_PATTERN);
        assert_eq!(&out[16..], &SWEEP_PATTERN[..4]);
    }
}
