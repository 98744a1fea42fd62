//! EMG 固件版本解码

/// 版本应答长度
pub const VERSION_RESPONSE_LEN: usize = 4;

/// 无设备时的版本字符串
pub const DISCONNECTED_VERSION: &str = "1.2";

/// 无设备时连接检查的应答
pub const NOT_CONNECTED: &str = "not-connected";

/// 解码版本应答
///
/// 第 3、4 字节是 ASCII 数字（减 48 得到主/次版本号）；两者都为 0 时返回 `"0.0"`。
///
/// ```
/// use myo_protocol::decode_emg_version;
///
/// assert_eq!(decode_emg_version(&[0, 0, b'1', b'2']), "1.2");
/// assert_eq!(decode_emg_version(&[9, 9, 0, 0]), "0.0");
/// ```
pub fn decode_emg_version(response: &[u8; VERSION_RESPONSE_LEN]) -> String {
    let (major, minor) = (response[2], response[3]);
    if major == 0 && minor == 0 {
        return "0.0".to_string();
    }
    format!("{}.{}", i32::from(major) - 48, i32::from(minor) - 48)
}
