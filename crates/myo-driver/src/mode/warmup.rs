//! 模式预热
//!
//! 进入模式后设备输出需要一段时间稳定。预热循环反复读取并丢弃数据，
//! 直到稳定读取次数超过阈值，或者丢弃的字节数用完预算。
//! 读取失败同样按一次完整读取计入预算，保证循环有界。

use super::ModeSession;
use crate::error::DriverError;
use std::time::Duration;
use tracing::debug;

/// 预热参数
#[derive(Debug, Clone, Copy)]
pub struct WarmUp {
    pub read_size: usize,
    /// 丢弃字节预算
    pub byte_budget: usize,
    /// 稳定读取次数超过该值即结束（`None` 表示只按预算结束）
    pub stable_threshold: Option<usize>,
    /// 最多读取次数
    pub max_reads: Option<usize>,
    pub read_timeout: Duration,
    /// 每次读取前的等待
    pub pause: Option<Duration>,
}

/// 预热结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmUpOutcome {
    pub bytes_discarded: usize,
    pub reads: usize,
    pub stable_reads: usize,
    /// 是否因稳定而提前结束
    pub converged: bool,
}

impl WarmUp {
    /// 按字节预算丢弃数据
    pub fn discard(byte_budget: usize, read_size: usize, read_timeout: Duration) -> Self {
        Self {
            read_size,
            byte_budget,
            stable_threshold: None,
            max_reads: None,
            read_timeout,
            pause: None,
        }
    }

    /// 固定次数读取
    pub fn reads(count: usize, read_size: usize, read_timeout: Duration) -> Self {
        Self {
            read_size,
            byte_budget: count.saturating_mul(read_size),
            stable_threshold: None,
            max_reads: Some(count),
            read_timeout,
            pause: None,
        }
    }

    /// 稳定读取次数超过 `threshold` 时结束
    pub fn until_stable(
        threshold: usize,
        byte_budget: usize,
        read_size: usize,
        read_timeout: Duration,
    ) -> Self {
        Self {
            read_size,
            byte_budget,
            stable_threshold: Some(threshold),
            max_reads: None,
            read_timeout,
            pause: None,
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = Some(pause);
        self
    }

    /// 执行预热
    ///
    /// 可重试的读取错误计入预算后继续；其他错误直接返回。
    pub fn run(
        &self,
        session: &ModeSession,
        mut is_stable: impl FnMut(&[u8]) -> bool,
    ) -> Result<WarmUpOutcome, DriverError> {
        let read_size = self.read_size.max(1);
        let mut buf = vec![0u8; read_size];
        let mut outcome = WarmUpOutcome {
            bytes_discarded: 0,
            reads: 0,
            stable_reads: 0,
            converged: false,
        };

        while outcome.bytes_discarded < self.byte_budget {
            if self.max_reads.is_some_and(|max| outcome.reads >= max) {
                break;
            }
            if let Some(pause) = self.pause {
                spin_sleep::sleep(pause);
            }

            outcome.reads += 1;
            match session.read(&mut buf, self.read_timeout) {
                Ok(n) => {
                    outcome.bytes_discarded += n;
                    if is_stable(&buf[..n]) {
                        outcome.stable_reads += 1;
                        if self
                            .stable_threshold
                            .is_some_and(|threshold| outcome.stable_reads > threshold)
                        {
                            outcome.converged = true;
                            break;
                        }
                    }
                },
                Err(e) if e.is_retryable() => {
                    outcome.bytes_discarded += read_size;
                },
                Err(e) => return Err(e),
            }
        }

        debug!(
            "Mode {} warm-up: {} reads, {} bytes discarded, {} stable{}",
            session.command(),
            outcome.reads,
            outcome.bytes_discarded,
            outcome.stable_reads,
            if outcome.converged { " (converged)" } else { "" }
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use myo_protocol::ModeKind;

    const FAST: Duration = Duration::ZERO;

    #[test]
    fn test_discard_stops_at_budget() {
        let (channel, handle) = mock_channel();
        handle.set_stream(vec![0u8; 16]);
        let session = session(channel, ModeKind::Emg43Raw);

        let outcome = WarmUp::discard(1000, 320, FAST).run(&session, |_| false).unwrap();
        assert_eq!(outcome.reads, 4);
        assert_eq!(outcome.bytes_discarded, 1280);
        assert!(!outcome.converged);
    }

    #[test]
    fn test_converges_after_threshold() {
        let (channel, handle) = mock_channel();
        handle.set_stream(vec![0u8; 16]);
        let session = session(channel, ModeKind::Mode56Raw);

        let outcome = WarmUp::until_stable(50, 32_000, 320, FAST)
            .run(&session, |_| true)
            .unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.reads, 51);
    }

    #[test]
    fn test_failed_reads_are_charged() {
        // 没有任何数据：每次读取超时，仍然按预算结束
        let (channel, _handle) = mock_channel();
        let session = session(channel, ModeKind::Mode51Raw);

        let outcome = WarmUp::until_stable(50, 3200, 320, FAST)
            .run(&session, |_| true)
            .unwrap();
        assert_eq!(outcome.reads, 10);
        assert_eq!(outcome.stable_reads, 0);
    }

    #[test]
    fn test_fixed_read_count() {
        let (channel, handle) = mock_channel();
        handle.set_stream(vec![1u8; 8]);
        let session = session(channel, ModeKind::Mode57Raw);

        let outcome = WarmUp::reads(5, 1600, FAST).run(&session, |_| false).unwrap();
        assert_eq!(outcome.reads, 5);
        assert_eq!(outcome.bytes_discarded, 8000);
    }

    #[test]
    fn test_fatal_error_aborts() {
        let (channel, handle) = mock_channel();
        handle.push_failure(myo_serial::SerialDeviceErrorKind::NoDevice);
        let session = session(channel, ModeKind::Mode56Raw);

        let err = WarmUp::discard(32_000, 320, FAST)
            .run(&session, |_| false)
            .unwrap_err();
        assert!(err.is_device_lost());
    }
}
