//! 通道零点对齐值
//!
//! 对齐模式（`mode-0-align`）计算出的各通道均值写入 [`AlignmentStore`]，
//! 校准模式（`mode-0`）每次读取时加载一份快照。两者可能位于不同线程，
//! 使用 `ArcSwap` 做无锁发布。

use arc_swap::ArcSwap;
use std::sync::Arc;

/// 通道数
pub const CHANNEL_COUNT: usize = 4;

/// 未对齐时的默认零点（12 位量程中点）
pub const DEFAULT_ALIGN: i32 = 2048;

/// 对齐与偏移值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentValues {
    pub align: [i32; CHANNEL_COUNT],
    pub offset: [i32; CHANNEL_COUNT],
}

impl Default for AlignmentValues {
    fn default() -> Self {
        Self {
            align: [DEFAULT_ALIGN; CHANNEL_COUNT],
            offset: [0; CHANNEL_COUNT],
        }
    }
}

/// 线程间共享的对齐值
#[derive(Debug)]
pub struct AlignmentStore {
    values: ArcSwap<AlignmentValues>,
}

impl Default for AlignmentStore {
    fn default() -> Self {
        Self::new(AlignmentValues::default())
    }
}

impl AlignmentStore {
    pub fn new(values: AlignmentValues) -> Self {
        Self {
            values: ArcSwap::from_pointee(values),
        }
    }

    /// 当前快照
    pub fn load(&self) -> AlignmentValues {
        **self.values.load()
    }

    /// 替换对齐值（保留偏移）
    pub fn set_align(&self, align: [i32; CHANNEL_COUNT]) {
        self.values.rcu(|current| {
            Arc::new(AlignmentValues {
                align,
                offset: current.offset,
            })
        });
    }

    pub fn set_offset(&self, offset: [i32; CHANNEL_COUNT]) {
        self.values.rcu(|current| {
            Arc::new(AlignmentValues {
                align: current.align,
                offset,
            })
        });
    }

    pub fn reset(&self) {
        self.values.store(Arc::new(AlignmentValues::default()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let store = AlignmentStore::default();
        let values = store.load();
        assert_eq!(values.align, [2048; 4]);
        assert_eq!(values.offset, [0; 4]);
    }

    #[test]
    fn test_set_align_keeps_offset() {
        let store = AlignmentStore::default();
        store.set_offset([1, 2, 3, 4]);
        store.set_align([100, 200, 300, 400]);
        let values = store.load();
        assert_eq!(values.align, [100, 200, 300, 400]);
        assert_eq!(values.offset, [1, 2, 3, 4]);

        store.reset();
        assert_eq!(store.load(), AlignmentValues::default());
    }

    #[test]
    fn test_concurrent_publish() {
        let store = Arc::new(AlignmentStore::default());
        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..100 {
                    store.set_align([i; 4]);
                }
            })
        };
        for _ in 0..100 {
            let values = store.load();
            // 四个通道总是来自同一次发布
            assert!(values.align.iter().all(|v| *v == values.align[0]));
        }
        writer.join().unwrap();
        assert_eq!(store.load().align, [99; 4]);
    }
}
