//! 模式生命周期状态
//!
//! 状态转换：
//!
//! ```text
//! Uninitialized -> HandshakeInProgress -> Ready -> Executing -> Ready
//!        ^                  |
//!        +---- (失败) ------+
//! 任意状态 -> Destroyed
//! ```
//!
//! 状态以原子量保存，管理器之外的线程（例如 CLI 状态查询）可以无锁读取。

use std::sync::atomic::{AtomicU8, Ordering};

/// 模式生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ModeState {
    #[default]
    Uninitialized = 0,
    HandshakeInProgress = 1,
    Ready = 2,
    Executing = 3,
    /// 模式已被替换或管理器已关闭
    Destroyed = 4,
}

impl ModeState {
    /// 从 u8 转换，无效值视为 `Uninitialized`
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::HandshakeInProgress,
            2 => Self::Ready,
            3 => Self::Executing,
            4 => Self::Destroyed,
            _ => Self::Uninitialized,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_ready(self) -> bool {
        matches!(self, Self::Ready | Self::Executing)
    }
}

/// 原子版本，用于线程间共享
///
/// # 示例
///
/// ```rust,no_run
/// use myo_driver::state::{AtomicModeState, ModeState};
/// use std::sync::atomic::Ordering;
///
/// let state = AtomicModeState::new(ModeState::Uninitialized);
/// state.set(ModeState::Ready, Ordering::Release);
/// assert!(state.get(Ordering::Acquire).is_ready());
/// ```
#[derive(Debug, Default)]
pub struct AtomicModeState {
    inner: AtomicU8,
}

impl AtomicModeState {
    pub fn new(state: ModeState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self, ordering: Ordering) -> ModeState {
        ModeState::from_u8(self.inner.load(ordering))
    }

    pub fn set(&self, state: ModeState, ordering: Ordering) {
        self.inner.store(state.as_u8(), ordering);
    }

    /// 比较并交换
    ///
    /// 成功返回 `Ok(旧状态)`，失败返回 `Err(当前状态)`。
    pub fn compare_exchange(
        &self,
        current: ModeState,
        new: ModeState,
        success: Ordering,
        failure: Ordering,
    ) -> Result<ModeState, ModeState> {
        self.inner
            .compare_exchange(current.as_u8(), new.as_u8(), success, failure)
            .map(ModeState::from_u8)
            .map_err(ModeState::from_u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_state_conversion() {
        for state in [
            ModeState::Uninitialized,
            ModeState::HandshakeInProgress,
            ModeState::Ready,
            ModeState::Executing,
            ModeState::Destroyed,
        ] {
            assert_eq!(ModeState::from_u8(state.as_u8()), state);
        }
        assert_eq!(ModeState::from_u8(99), ModeState::Uninitialized);
    }

    #[test]
    fn test_is_ready() {
        assert!(ModeState::Ready.is_ready());
        assert!(ModeState::Executing.is_ready());
        assert!(!ModeState::HandshakeInProgress.is_ready());
        assert!(!ModeState::Destroyed.is_ready());
    }

    #[test]
    fn test_atomic_compare_exchange() {
        let state = AtomicModeState::new(ModeState::Ready);

        let result = state.compare_exchange(
            ModeState::Ready,
            ModeState::Executing,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        assert_eq!(result, Ok(ModeState::Ready));
        assert_eq!(state.get(Ordering::Acquire), ModeState::Executing);

        let result = state.compare_exchange(
            ModeState::Ready,
            ModeState::Destroyed,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        assert_eq!(result, Err(ModeState::Executing));
    }
}
