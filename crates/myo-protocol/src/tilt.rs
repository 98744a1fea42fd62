//! 倾角通道解码
//!
//! 倾角块 4 个 16 位字按大端编码，前 3 个为有符号（二补码）加速度分量，
//! 第 4 个为无符号参考值。角度由三个分量的比值反正切得到。

use crate::sync::{BlockLayout, ChannelKind};
use crate::{bytes_to_i16_be, bytes_to_u16_be};

/// 弧度转角度系数
pub const RAD_TO_DEG: f64 = 57.2958;

/// 前倾/侧倾角（度）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TiltAngles {
    pub front: f64,
    pub side: f64,
}

/// 解码一个 8 字节倾角块
///
/// 返回 4 个通道值；块长度不足时返回 `None`。
pub fn decode_tilt(block: &[u8]) -> Option<[i32; 4]> {
    if block.len() < ChannelKind::Tilt.block_size() {
        return None;
    }
    let word = |k: usize| [block[2 * k], block[2 * k + 1]];
    Some([
        i32::from(bytes_to_i16_be(word(0))),
        i32::from(bytes_to_i16_be(word(1))),
        i32::from(bytes_to_i16_be(word(2))),
        i32::from(bytes_to_u16_be(word(3))),
    ])
}

/// `atan(reference / sqrt(a1² + a2²))`，单位度；分母为 0 时返回 0
pub fn axis_angle(reference: f64, a1: f64, a2: f64) -> f64 {
    let root = (a1 * a1 + a2 * a2).sqrt();
    if root == 0.0 {
        return 0.0;
    }
    (reference / root).atan() * RAD_TO_DEG
}

impl TiltAngles {
    /// 由倾角通道值计算前倾/侧倾角
    pub fn from_channels(channels: [i32; 4]) -> Self {
        let [c0, c1, c2, _] = channels.map(f64::from);

        let mut front = axis_angle(c1, c0, c2);
        if c1 < 0.0 {
            front = -front;
        }

        let mut side = axis_angle(c2, c0, c1);
        if c2 >= 0.0 {
            side = -side;
        }

        Self { front, side }
    }
}

/// 对重同步后的 CMS+倾角数据（16 字节块）求平均角度
///
/// 没有完整块时返回 `None`。
pub fn mean_tilt_angles(synced: &[u8]) -> Option<TiltAngles> {
    let layout = BlockLayout::CMS_TILT;
    let tilt_offset = layout.secondary.map(|(_, offset)| offset).unwrap_or(0);

    let mut sum = TiltAngles::default();
    let mut count = 0usize;
    for block in synced.chunks_exact(layout.block_size) {
        if let Some(channels) = decode_tilt(&block[tilt_offset..]) {
            let angles = TiltAngles::from_channels(channels);
            sum.front += angles.front;
            sum.side += angles.side;
            count += 1;
        }
    }

    (count > 0).then(|| TiltAngles {
        front: sum.front / count as f64,
        side: sum.side / count as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_decode_tilt_twos_complement() {
        // 前三个字有符号，第四个无符号
        let block = [0xFF, 0xFE, 0x20, 0x10, 0x00, 0x05, 0x70, 0x01];
        let channels = decode_tilt(&block).unwrap();
        assert_eq!(channels, [-2, 0x2010, 5, 0x7001]);

        let block = [0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0xF0, 0x00];
        assert_eq!(decode_tilt(&block).unwrap()[3], 0xF000);

        assert!(decode_tilt(&block[..6]).is_none());
    }

    #[test]
    fn test_axis_angle() {
        assert_eq!(axis_angle(10.0, 0.0, 0.0), 0.0);
        assert!(approx(axis_angle(1.0, 1.0, 0.0), 45.0));
        assert!(approx(axis_angle(-1.0, 0.0, 1.0), -45.0));
    }

    #[test]
    fn test_angle_sign_rules() {
        // c1 < 0：前倾角取反
        let angles = TiltAngles::from_channels([100, -100, 0, 0]);
        assert!(approx(angles.front, 45.0));

        // c1 > 0
        let angles = TiltAngles::from_channels([100, 100, 0, 0]);
        assert!(approx(angles.front, 45.0));

        // c2 >= 0：侧倾角取反
        let angles = TiltAngles::from_channels([100, 0, 100, 0]);
        assert!(approx(angles.side, -45.0));

        let angles = TiltAngles::from_channels([100, 0, -100, 0]);
        assert!(approx(angles.side, 45.0));
    }

    #[test]
    fn test_mean_tilt_angles() {
        let cms = [0x00, 0x00, 0x10, 0x00, 0x20, 0x00, 0x30, 0x00];
        // c0 = 0x0064 (100), c1 = 0x2064 (8292)
        let tilt_a = [0x00, 0x64, 0x20, 0x64, 0x00, 0x00, 0x70, 0x00];
        let tilt_b = [0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x70, 0x00];

        let mut data = Vec::new();
        data.extend(cms);
        data.extend(tilt_a);
        data.extend(cms);
        data.extend(tilt_b);

        let a = TiltAngles::from_channels(decode_tilt(&tilt_a).unwrap());
        let mean = mean_tilt_angles(&data).unwrap();
        // 块 b 的 c0、c2 为 0，两个角度都为 0
        assert!(approx(mean.front, a.front / 2.0));
        assert!(approx(mean.side, a.side / 2.0));

        assert!(mean_tilt_angles(&data[..10]).is_none());
    }
}
