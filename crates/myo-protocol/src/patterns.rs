//! 无设备（disconnected）模式的合成数据
//!
//! 没有物理设备时，各模式返回固定的、标签合法的重复字节模式，
//! 上层可以在没有硬件的情况下走通完整的数据链路。

/// 模式 0 系列（CMS 块）
pub const MODE_0_PATTERN: [u8; 8] = [0x00, 0x00, 0x10, 0x00, 0x20, 0x00, 0x30, 0x00];
/// 模式 0 的最大重复次数
pub const MODE_0_MAX_REPEATS: usize = 400;

/// 模式 42（CMS + EMG，24 字节）
pub const MODE_42_PATTERN: [u8; 24] = [
    7, 154, 23, 141, 40, 109, 55, 212, 136, 1, 152, 1, 168, 1, 184, 1, 200, 1, 216, 1, 232, 1,
    248, 1,
];

/// 模式 43（EMG，16 字节）
pub const MODE_43_PATTERN: [u8; 16] = [
    0x80, 0x01, 0x90, 0x01, 0xA0, 0x01, 0xB0, 0x01, 0xC0, 0x01, 0xD0, 0x01, 0xE0, 0x01, 0xF0,
    0x01,
];

/// 扫描模式（CMS + 倾角，16 字节）
pub const SWEEP_PATTERN: [u8; 16] = [
    0x00, 0x00, 0x10, 0x00, 0x20, 0x00, 0x30, 0x00, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x70,
    0x00,
];

/// 模式 51（CMS + 8 通道，24 字节）
pub const MODE_51_PATTERN: [u8; 24] = [
    0x00, 0x00, 0x10, 0x00, 0x20, 0x00, 0x30, 0x00, 0x00, 0x00, 0x10, 0x00, 0x20, 0x00, 0x30,
    0x00, 0x40, 0x00, 0x50, 0x00, 0x60, 0x00, 0x70, 0x00,
];

/// 模式 52（四通道块）
pub const MODE_52_PATTERN: [u8; 8] = [0x00, 0x00, 0x30, 0x00, 0x40, 0x00, 0x50, 0x00];

/// 模式 53（ESG 块）
pub const MODE_53_PATTERN: [u8; 4] = [0x40, 0x00, 0x50, 0x00];

/// 模式 56（未打标签的原始数据）
pub const MODE_56_PATTERN: [u8; 10] = [7, 204, 23, 69, 55, 192, 72, 12, 88, 9];

/// 设备字节（无设备时）
pub const DISCONNECTED_EQUIPMENT_BYTE: u8 = 132;
/// EMG 导联状态（无设备时，也是读取失败时的哨兵值）
pub const LEAD_STATUS_SENTINEL: u8 = 255;

/// 用 `pattern` 重复填充 `output`
///
/// 最后一次重复按 `output` 容量截断；`max_repeats` 限制总重复次数。
/// 返回写入的字节数。
///
/// ```
/// use myo_protocol::fill_pattern;
///
/// let mut out = [0u8; 5];
/// assert_eq!(fill_pattern(&[1, 2], &mut out, None), 5);
/// assert_eq!(out, [1, 2, 1, 2, 1]);
/// ```
pub fn fill_pattern(pattern: &[u8], output: &mut [u8], max_repeats: Option<usize>) -> usize {
    if pattern.is_empty() {
        return 0;
    }
    let limit = match max_repeats {
        Some(repeats) => output.len().min(repeats.saturating_mul(pattern.len())),
        None => output.len(),
    };
    for (dst, src) in output[..limit].iter_mut().zip(pattern.iter().cycle()) {
        *dst = *src;
    }
    limit
}
