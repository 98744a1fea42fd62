//! 命令解析与模式注册表
//!
//! 调用方发送 ASCII 命令字符串，解析结果是二选一的 [`Command`]：
//!
//! - 单个数字 `1`–`9`：串口线路控制命令（[`ControlCommand`]）
//! - `mode-*` 等字符串：模式命令（[`ModeCommand`]），引用静态注册表中的 [`ModeDescriptor`]
//!
//! 多个命令字符串可以指向同一个描述符（陷波变体、设备查询），
//! 它们之间只有握手时发送的 EMG 配置字节不同。

use crate::ProtocolError;
use crate::constants::{DEFAULT_BUFFER_SIZE, DEFAULT_EMG_CONFIG};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;
use std::str::FromStr;

/// 设备模式编号（握手时作为单字节发送）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ModeNumber {
    Zero = 0,
    Mode42 = 42,
    Mode43 = 43,
    Mode44 = 44,
    Mode51 = 51,
    Mode52 = 52,
    Mode53 = 53,
    Mode56 = 56,
    Mode57 = 57,
    /// EMG 固件版本查询 / 连接检查
    EmgVersion = 118,
}

impl ModeNumber {
    fn registry_index(self) -> usize {
        match self {
            Self::Zero => 0,
            Self::Mode42 => 1,
            Self::Mode43 => 2,
            Self::Mode44 => 3,
            Self::Mode51 => 4,
            Self::Mode52 => 5,
            Self::Mode53 => 6,
            Self::Mode56 => 7,
            Self::Mode57 => 8,
            Self::EmgVersion => 9,
        }
    }
}

/// 模式描述符（静态注册表条目，运行期不可变）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeDescriptor {
    /// 模式编号
    pub mode_number: ModeNumber,
    /// 默认 EMG 配置字节
    pub emg_config: u8,
    /// 是否需要模式握手
    pub requires_handshake: bool,
    /// 是否支持无设备（disconnected）模式
    pub supports_disconnected: bool,
    /// 默认读取字节数
    pub default_byte_count: usize,
}

impl ModeDescriptor {
    const fn new(mode_number: ModeNumber, default_byte_count: usize) -> Self {
        Self {
            mode_number,
            emg_config: DEFAULT_EMG_CONFIG,
            requires_handshake: true,
            supports_disconnected: true,
            default_byte_count,
        }
    }

    /// 按模式编号查找描述符
    pub fn lookup(mode_number: ModeNumber) -> &'static ModeDescriptor {
        &MODE_REGISTRY[mode_number.registry_index()]
    }
}

/// 模式注册表
pub static MODE_REGISTRY: [ModeDescriptor; 10] = [
    ModeDescriptor::new(ModeNumber::Zero, DEFAULT_BUFFER_SIZE),
    ModeDescriptor::new(ModeNumber::Mode42, DEFAULT_BUFFER_SIZE),
    ModeDescriptor::new(ModeNumber::Mode43, DEFAULT_BUFFER_SIZE),
    ModeDescriptor::new(ModeNumber::Mode44, DEFAULT_BUFFER_SIZE),
    ModeDescriptor::new(ModeNumber::Mode51, DEFAULT_BUFFER_SIZE),
    ModeDescriptor::new(ModeNumber::Mode52, DEFAULT_BUFFER_SIZE),
    ModeDescriptor::new(ModeNumber::Mode53, DEFAULT_BUFFER_SIZE),
    ModeDescriptor::new(ModeNumber::Mode56, DEFAULT_BUFFER_SIZE),
    ModeDescriptor::new(ModeNumber::Mode57, DEFAULT_BUFFER_SIZE),
    ModeDescriptor::new(ModeNumber::EmgVersion, 4),
];

/// 设备应答码（设备字节的语义）
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum DeviceResponse {
    Success = 0x00,
    Error = 0x01,
    Timeout = 0x02,
    Disconnected = 0x03,
}

/// 陷波滤波器选择（命令后缀字母，原样作为 EMG 配置字节发送）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum NotchFilter {
    P = b'p',
    Q = b'q',
    R = b'r',
    S = b's',
    T = b't',
    U = b'u',
    V = b'v',
    W = b'w',
}

impl NotchFilter {
    /// 握手时发送的配置字节
    pub fn config_byte(self) -> u8 {
        self.into()
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix.as_bytes() {
            [letter] => Self::try_from(*letter).ok(),
            _ => None,
        }
    }
}

/// 串口线路控制命令（单个数字字符）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ControlCommand {
    /// 拉高 RTS
    RtsOn = b'1',
    /// 拉低 RTS
    RtsOff = b'2',
    /// 拉高 DTR
    DtrOn = b'3',
    /// 拉低 DTR
    DtrOff = b'4',
    /// 复位硬件（60 Hz 握手）
    ResetHardware60 = b'5',
    /// 复位硬件（50 Hz 握手）
    ResetHardware50 = b'6',
    /// 查询线路状态
    DeviceStatuses = b'7',
    /// 查询 EMG 固件版本
    EmgVersion = b'8',
    /// 检查设备连接
    CheckConnection = b'9',
}

impl ControlCommand {
    /// 命令对应的数字字符
    pub fn digit(self) -> char {
        char::from(u8::from(self))
    }
}

/// 模式命令变体
///
/// 同一模式编号下可能有多个变体（例如 `mode-0` / `mode-0-raw` / `mode-0-align`），
/// 它们的读取与解码行为不同。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeKind {
    Zero,
    ZeroRaw,
    ZeroAlign,
    Emg42Raw,
    Emg43Raw,
    Emg43Emg,
    Mode44Raw,
    Mode44RawNoImage,
    Mode44Sweep,
    Mode51Raw,
    Mode52Raw,
    Mode53Raw,
    Mode56Raw,
    Mode57Raw,
    Mode57RawNoImage,
    EmgVersion,
    CheckConnection,
    /// 查询设备字节（解析为模式 42）
    EquipmentByte,
    /// 查询 EMG 导联状态（解析为模式 43）
    EmgLeadStatus,
}

/// 不带陷波后缀的命令名
const MODE_NAMES: &[(&str, ModeKind)] = &[
    ("mode-0", ModeKind::Zero),
    ("mode-0-raw", ModeKind::ZeroRaw),
    ("mode-0-align", ModeKind::ZeroAlign),
    ("mode-42-raw", ModeKind::Emg42Raw),
    ("mode-43-raw", ModeKind::Emg43Raw),
    ("mode-43-emg", ModeKind::Emg43Emg),
    ("mode-44-raw", ModeKind::Mode44Raw),
    ("mode-44-raw-no-image", ModeKind::Mode44RawNoImage),
    ("mode-44-sweep", ModeKind::Mode44Sweep),
    ("mode-51-raw", ModeKind::Mode51Raw),
    ("mode-52-raw", ModeKind::Mode52Raw),
    ("mode-53-raw", ModeKind::Mode53Raw),
    ("mode-56-raw", ModeKind::Mode56Raw),
    ("mode-57-raw", ModeKind::Mode57Raw),
    ("mode-57-raw-no-image", ModeKind::Mode57RawNoImage),
    ("emg-version", ModeKind::EmgVersion),
    ("check-connection", ModeKind::CheckConnection),
    ("get-equipment-byte", ModeKind::EquipmentByte),
    ("get-emg-lead-status", ModeKind::EmgLeadStatus),
];

impl ModeKind {
    /// 设备模式编号
    pub fn mode_number(self) -> ModeNumber {
        match self {
            Self::Zero | Self::ZeroRaw | Self::ZeroAlign => ModeNumber::Zero,
            Self::Emg42Raw | Self::EquipmentByte => ModeNumber::Mode42,
            Self::Emg43Raw | Self::Emg43Emg | Self::EmgLeadStatus => ModeNumber::Mode43,
            Self::Mode44Raw | Self::Mode44RawNoImage | Self::Mode44Sweep => ModeNumber::Mode44,
            Self::Mode51Raw => ModeNumber::Mode51,
            Self::Mode52Raw => ModeNumber::Mode52,
            Self::Mode53Raw => ModeNumber::Mode53,
            Self::Mode56Raw => ModeNumber::Mode56,
            Self::Mode57Raw | Self::Mode57RawNoImage => ModeNumber::Mode57,
            Self::EmgVersion | Self::CheckConnection => ModeNumber::EmgVersion,
        }
    }

    /// 规范命令名（不含陷波后缀）
    pub fn name(self) -> &'static str {
        MODE_NAMES
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }

    /// 是否为设备查询（存在活动模式时由管理器直接应答）
    pub fn is_device_query(self) -> bool {
        matches!(self, Self::EquipmentByte | Self::EmgLeadStatus)
    }

    /// 是否为倾角扫描类模式（切换时需要调用 stop）
    pub fn is_sweep(self) -> bool {
        matches!(
            self,
            Self::Mode44Raw
                | Self::Mode44RawNoImage
                | Self::Mode44Sweep
                | Self::Mode57Raw
                | Self::Mode57RawNoImage
        )
    }

    /// 是否输出倾角（图像/曲线显示开启的变体）
    pub fn publishes_angles(self) -> bool {
        matches!(self, Self::Mode44Raw | Self::Mode44Sweep | Self::Mode57Raw)
    }

    /// 是否接受陷波后缀
    fn accepts_notch(self) -> bool {
        matches!(self, Self::Emg42Raw | Self::Emg43Raw)
    }
}

/// 模式命令（描述符引用 + 变体 + EMG 配置字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModeCommand {
    pub kind: ModeKind,
    pub notch: Option<NotchFilter>,
}

impl ModeCommand {
    pub fn new(kind: ModeKind) -> Self {
        Self { kind, notch: None }
    }

    pub fn with_notch(kind: ModeKind, notch: NotchFilter) -> Self {
        Self {
            kind,
            notch: Some(notch),
        }
    }

    /// 注册表中的描述符
    pub fn descriptor(&self) -> &'static ModeDescriptor {
        ModeDescriptor::lookup(self.kind.mode_number())
    }

    /// 握手时发送的 EMG 配置字节
    pub fn emg_config(&self) -> u8 {
        self.notch
            .map(NotchFilter::config_byte)
            .unwrap_or(self.descriptor().emg_config)
    }

    /// 模式身份：变体 + 配置字节相同即视为同一模式
    pub fn identity(&self) -> (ModeKind, u8) {
        (self.kind, self.emg_config())
    }
}

impl fmt::Display for ModeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.notch {
            Some(notch) => write!(f, "{}-{}", self.kind.name(), char::from(notch.config_byte())),
            None => f.write_str(self.kind.name()),
        }
    }
}

/// 解析后的命令：线路控制或模式命令，二者必居其一
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Control(ControlCommand),
    Mode(ModeCommand),
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_command(s)
    }
}

/// 解析命令字符串（纯函数，大小写敏感）
///
/// # 错误
///
/// 未知字符串返回 [`ProtocolError::InvalidCommand`]。
///
/// # Example
///
/// ```
/// use myo_protocol::{Command, ControlCommand, ModeKind, parse_command};
///
/// assert_eq!(parse_command("1").unwrap(), Command::Control(ControlCommand::RtsOn));
///
/// match parse_command("mode-42-raw-q").unwrap() {
///     Command::Mode(cmd) => {
///         assert_eq!(cmd.kind, ModeKind::Emg42Raw);
///         assert_eq!(cmd.emg_config(), b'q');
///     },
///     _ => unreachable!(),
/// }
/// ```
pub fn parse_command(s: &str) -> Result<Command, ProtocolError> {
    let invalid = || ProtocolError::InvalidCommand(s.to_string());

    if let [digit] = s.as_bytes()
        && digit.is_ascii_digit()
    {
        return ControlCommand::try_from(*digit).map(Command::Control).map_err(|_| invalid());
    }

    if let Some((_, kind)) = MODE_NAMES.iter().find(|(name, _)| *name == s) {
        return Ok(Command::Mode(ModeCommand::new(*kind)));
    }

    // 陷波变体：mode-42-raw-<p..w> / mode-43-raw-<p..w>
    let (base, suffix) = s.rsplit_once('-').ok_or_else(invalid)?;
    let kind = MODE_NAMES
        .iter()
        .find(|(name, kind)| *name == base && kind.accepts_notch())
        .map(|(_, kind)| *kind)
        .ok_or_else(invalid)?;
    let notch = NotchFilter::from_suffix(suffix).ok_or_else(invalid)?;
    Ok(Command::Mode(ModeCommand::with_notch(kind, notch)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(s: &str) -> ModeCommand {
        match parse_command(s) {
            Ok(Command::Mode(cmd)) => cmd,
            other => panic!("Expected mode command for {s}, got {other:?}"),
        }
    }

    #[test]
    fn test_registry_consistency() {
        for descriptor in MODE_REGISTRY.iter() {
            assert_eq!(ModeDescriptor::lookup(descriptor.mode_number), descriptor);
            assert_eq!(descriptor.emg_config, b'r');
            assert!(descriptor.requires_handshake);
            assert!(descriptor.supports_disconnected);
        }
        assert_eq!(ModeDescriptor::lookup(ModeNumber::EmgVersion).default_byte_count, 4);
        assert_eq!(ModeDescriptor::lookup(ModeNumber::Mode42).default_byte_count, 1600);
    }

    #[test]
    fn test_control_commands() {
        let expected = [
            ('1', ControlCommand::RtsOn),
            ('2', ControlCommand::RtsOff),
            ('3', ControlCommand::DtrOn),
            ('4', ControlCommand::DtrOff),
            ('5', ControlCommand::ResetHardware60),
            ('6', ControlCommand::ResetHardware50),
            ('7', ControlCommand::DeviceStatuses),
            ('8', ControlCommand::EmgVersion),
            ('9', ControlCommand::CheckConnection),
        ];
        for (digit, cmd) in expected {
            assert_eq!(parse_command(&digit.to_string()), Ok(Command::Control(cmd)));
            assert_eq!(cmd.digit(), digit);
        }
    }

    #[test]
    fn test_invalid_control_commands() {
        assert!(parse_command("0").is_err());
        assert!(parse_command("12").is_err());
        assert!(parse_command("").is_err());
    }

    #[test]
    fn test_all_mode_names_parse() {
        for (name, kind) in MODE_NAMES {
            let cmd = mode(name);
            assert_eq!(cmd.kind, *kind);
            assert_eq!(cmd.notch, None);
            assert_eq!(cmd.emg_config(), b'r');
            assert_eq!(cmd.to_string(), *name);
        }
    }

    #[test]
    fn test_notch_variants() {
        for letter in ['p', 'q', 'r', 's', 't', 'u', 'v', 'w'] {
            let cmd = mode(&format!("mode-42-raw-{letter}"));
            assert_eq!(cmd.kind, ModeKind::Emg42Raw);
            assert_eq!(cmd.emg_config(), letter as u8);
            assert_eq!(cmd.descriptor().mode_number, ModeNumber::Mode42);

            let cmd = mode(&format!("mode-43-raw-{letter}"));
            assert_eq!(cmd.kind, ModeKind::Emg43Raw);
            assert_eq!(cmd.emg_config(), letter as u8);
            assert_eq!(cmd.to_string(), format!("mode-43-raw-{letter}"));
        }
    }

    #[test]
    fn test_invalid_notch_variants() {
        assert!(parse_command("mode-42-raw-x").is_err());
        assert!(parse_command("mode-42-raw-pq").is_err());
        assert!(parse_command("mode-51-raw-p").is_err());
        assert!(parse_command("mode-42-raw-").is_err());
    }

    #[test]
    fn test_unknown_and_case_sensitive() {
        assert_eq!(
            parse_command("MODE-0"),
            Err(ProtocolError::InvalidCommand("MODE-0".to_string()))
        );
        assert!(parse_command("mode-99").is_err());
        assert!(parse_command("mode-0 ").is_err());
    }

    #[test]
    fn test_device_queries_alias_descriptors() {
        let equipment = mode("get-equipment-byte");
        assert!(equipment.kind.is_device_query());
        assert_eq!(equipment.descriptor().mode_number, ModeNumber::Mode42);

        let lead = mode("get-emg-lead-status");
        assert!(lead.kind.is_device_query());
        assert_eq!(lead.descriptor().mode_number, ModeNumber::Mode43);
    }

    #[test]
    fn test_identity() {
        assert_eq!(mode("mode-42-raw").identity(), mode("mode-42-raw-r").identity());
        assert_ne!(mode("mode-42-raw").identity(), mode("mode-42-raw-q").identity());
        assert_ne!(mode("mode-0").identity(), mode("mode-0-raw").identity());
    }

    #[test]
    fn test_sweep_flags() {
        assert!(ModeKind::Mode57Raw.publishes_angles());
        assert!(!ModeKind::Mode57RawNoImage.publishes_angles());
        assert!(ModeKind::Mode44Sweep.publishes_angles());
        assert!(ModeKind::Mode44RawNoImage.is_sweep());
        assert!(!ModeKind::Emg42Raw.is_sweep());
    }

    #[test]
    fn test_device_response() {
        assert_eq!(DeviceResponse::try_from(0x03).ok(), Some(DeviceResponse::Disconnected));
        assert!(DeviceResponse::try_from(0x04).is_err());
        assert_eq!(u8::from(ModeNumber::EmgVersion), 118);
        assert_eq!(ModeNumber::try_from(57u8).ok(), Some(ModeNumber::Mode57));
    }
}
