//! 通道标签校验与帧重同步
//!
//! 每种通道的采样块由若干 16 位字组成，第 `i` 个字的高字节高 4 位是固定的标签。
//! 串口流可能从任意字节开始，[`resync`] 逐字节滑动寻找第一个标签匹配的位置，
//! 然后按块长度前进，直到第一个不匹配的块为止。
//!
//! | 通道 | 块长度 | 标签（字 0..n 的高 4 位） |
//! |------|--------|---------------------------|
//! | CMS | 8 | 0,1,2,3 |
//! | EMG | 16 | 8..15 |
//! | 8 通道 | 16 | 0..7 |
//! | 倾角 | 8 | 0,2,0,7 |
//! | ESG | 4 | 4,5 |
//! | 模式 52 四通道 | 8 | 0,3,4,5 |

use crate::tag_nibble;

/// 通道类型（决定标签模式与块长度）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// 下颌追踪 CMS 通道
    Cms,
    /// 8 路 EMG 通道
    Emg,
    /// 8 通道（模式 51）
    EightChannel,
    /// 倾角通道
    Tilt,
    /// ESG 通道
    Esg,
    /// 模式 52 的四通道块
    Quad,
}

impl ChannelKind {
    /// 各字的期望标签
    pub fn expected_tags(self) -> &'static [u8] {
        match self {
            Self::Cms => &[0, 1, 2, 3],
            Self::Emg => &[8, 9, 10, 11, 12, 13, 14, 15],
            Self::EightChannel => &[0, 1, 2, 3, 4, 5, 6, 7],
            Self::Tilt => &[0, 2, 0, 7],
            Self::Esg => &[4, 5],
            Self::Quad => &[0, 3, 4, 5],
        }
    }

    /// 块长度（字节）
    pub const fn block_size(self) -> usize {
        match self {
            Self::Cms | Self::Tilt | Self::Quad => 8,
            Self::Emg | Self::EightChannel => 16,
            Self::Esg => 4,
        }
    }

    /// 校验 `data` 开头是否为该通道的一个完整块
    ///
    /// 长度不足一个块时返回 false。
    pub fn validate(self, data: &[u8]) -> bool {
        data.len() >= self.block_size()
            && self
                .expected_tags()
                .iter()
                .enumerate()
                .all(|(i, &tag)| tag_nibble(data[2 * i]) == tag)
    }
}

/// 重同步块布局
///
/// 一个块由主通道（偏移 `primary_offset`）和可选的副通道（偏移 `secondary.1`）组成。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    pub block_size: usize,
    pub primary: ChannelKind,
    pub primary_offset: usize,
    pub secondary: Option<(ChannelKind, usize)>,
}

impl BlockLayout {
    /// 单通道布局
    pub const fn single(channel: ChannelKind) -> Self {
        Self {
            block_size: channel.block_size(),
            primary: channel,
            primary_offset: 0,
            secondary: None,
        }
    }

    /// 主通道在偏移 0，副通道紧随其后
    pub const fn paired(primary: ChannelKind, secondary: ChannelKind) -> Self {
        let offset = primary.block_size();
        Self {
            block_size: offset + secondary.block_size(),
            primary,
            primary_offset: 0,
            secondary: Some((secondary, offset)),
        }
    }

    pub const CMS: Self = Self::single(ChannelKind::Cms);
    pub const EMG: Self = Self::single(ChannelKind::Emg);
    pub const ESG: Self = Self::single(ChannelKind::Esg);
    pub const QUAD: Self = Self::single(ChannelKind::Quad);
    /// CMS + EMG（模式 42，24 字节）
    pub const CMS_EMG: Self = Self::paired(ChannelKind::Cms, ChannelKind::Emg);
    /// CMS + 8 通道（模式 51，24 字节）
    pub const CMS_EIGHT: Self = Self::paired(ChannelKind::Cms, ChannelKind::EightChannel);
    /// CMS + 倾角（扫描模式，16 字节）
    pub const CMS_TILT: Self = Self::paired(ChannelKind::Cms, ChannelKind::Tilt);

    /// `data[pos..]` 处是否为一个合法块
    pub fn matches_at(&self, data: &[u8], pos: usize) -> bool {
        if pos + self.block_size > data.len() {
            return false;
        }
        let block = &data[pos..pos + self.block_size];
        let primary_ok = self.primary.validate(&block[self.primary_offset..]);
        match self.secondary {
            Some((channel, offset)) => primary_ok && channel.validate(&block[offset..]),
            None => primary_ok,
        }
    }

    /// 对 `data` 做重同步，见 [`resync`]
    pub fn resync(&self, data: &[u8]) -> SyncResult {
        resync(data, self)
    }
}

/// 重同步结果（调用方独占，单次使用）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncResult {
    /// 对齐后的块数据（块长度的整数倍）
    pub bytes: Vec<u8>,
    /// 是否至少找到一个合法块
    pub found: bool,
}

impl SyncResult {
    /// 对齐后的字节数
    pub fn length(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// 按块迭代
    pub fn blocks(&self, block_size: usize) -> std::slice::ChunksExact<'_, u8> {
        self.bytes.chunks_exact(block_size.max(1))
    }
}

/// 从错位的字节流中恢复块对齐
///
/// 逐字节滑动：当前位置校验通过则复制整块并前进一个块长度；
/// 已经找到过合法块后遇到第一个不合法块即停止；块必须完整位于 `data` 内。
///
/// # Example
///
/// ```
/// use myo_protocol::{BlockLayout, resync};
///
/// // 一个错位字节 + 两个 CMS 块
/// let data = [0xFF, 0x00, 0x00, 0x10, 0x00, 0x20, 0x00, 0x30, 0x00,
///             0x01, 0x00, 0x11, 0x00, 0x21, 0x00, 0x31, 0x00];
/// let result = resync(&data, &BlockLayout::CMS);
/// assert!(result.found);
/// assert_eq!(result.length(), 16);
/// assert_eq!(&result.bytes[..], &data[1..]);
/// ```
pub fn resync(data: &[u8], layout: &BlockLayout) -> SyncResult {
    let block_size = layout.block_size;
    let mut result = SyncResult {
        bytes: Vec::with_capacity(data.len()),
        found: false,
    };
    if block_size == 0 {
        return result;
    }

    let mut i = 0;
    while i + block_size <= data.len() {
        if layout.matches_at(data, i) {
            result.bytes.extend_from_slice(&data[i..i + block_size]);
            result.found = true;
            i += block_size;
        } else if result.found {
            break;
        } else {
            i += 1;
        }
    }

    result
}
