//! 基于 `serialport` crate 的原生串口实现
//!
//! 端口参数固定为 8N1、无流控；打开后 RTS/DTR 均拉低，等待握手时再拉高。

use crate::{ControlLine, ModemStatus, SerialDeviceError, SerialDeviceErrorKind, SerialError, SerialLink};
use myo_protocol::DEFAULT_READ_TIMEOUT;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

impl From<serialport::Error> for SerialError {
    fn from(err: serialport::Error) -> Self {
        let kind = match err.kind() {
            serialport::ErrorKind::NoDevice => SerialDeviceErrorKind::NoDevice,
            serialport::ErrorKind::InvalidInput => SerialDeviceErrorKind::UnsupportedConfig,
            serialport::ErrorKind::Io(io::ErrorKind::NotFound) => SerialDeviceErrorKind::NotFound,
            serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) => {
                SerialDeviceErrorKind::AccessDenied
            },
            serialport::ErrorKind::Io(_) => SerialDeviceErrorKind::Backend,
            serialport::ErrorKind::Unknown => SerialDeviceErrorKind::Unknown,
        };
        SerialError::Device(SerialDeviceError::new(kind, err.description))
    }
}

/// 原生串口链路
pub struct NativeSerialLink {
    port: Box<dyn SerialPort>,
    name: String,
}

impl NativeSerialLink {
    /// 以 8N1 打开串口，并拉低 RTS/DTR
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, SerialError> {
        let mut port = serialport::new(port_name, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(DEFAULT_READ_TIMEOUT)
            .open()?;

        port.write_request_to_send(false)?;
        port.write_data_terminal_ready(false)?;

        debug!("Opened serial port {} at {} baud", port_name, baud_rate);
        Ok(Self {
            port,
            name: port_name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl SerialLink for NativeSerialLink {
    fn write(&mut self, data: &[u8]) -> Result<(), SerialError> {
        self.port.write_all(data)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, SerialError> {
        let deadline = Instant::now() + timeout;
        let mut filled = 0;

        while filled < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.port.set_timeout(remaining)?;
            match self.port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        trace!("Read {} of {} bytes from {}", filled, buf.len(), self.name);
        if filled == 0 {
            Err(SerialError::Timeout)
        } else {
            Ok(filled)
        }
    }

    fn set_control_line(&mut self, line: ControlLine, level: bool) -> Result<(), SerialError> {
        match line {
            ControlLine::Rts => self.port.write_request_to_send(level)?,
            ControlLine::Dtr => self.port.write_data_terminal_ready(level)?,
        }
        Ok(())
    }

    fn purge(&mut self) -> Result<(), SerialError> {
        self.port.clear(ClearBuffer::All)?;
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize, SerialError> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn modem_status(&mut self) -> Result<ModemStatus, SerialError> {
        Ok(ModemStatus {
            cts: self.port.read_clear_to_send()?,
            dsr: self.port.read_data_set_ready()?,
            ring: self.port.read_ring_indicator()?,
            carrier_detect: self.port.read_carrier_detect()?,
        })
    }

    fn flush(&mut self) -> Result<(), SerialError> {
        self.port.flush()?;
        Ok(())
    }

    fn try_read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        let available = self.bytes_available()?.min(buf.len());
        if available == 0 {
            return Ok(0);
        }
        match self.read(&mut buf[..available], DEFAULT_READ_TIMEOUT) {
            Ok(n) => Ok(n),
            Err(SerialError::Timeout) => Ok(0),
            Err(e) => Err(e),
        }
    }
}

/// 串口枚举信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    /// 端口类型描述（USB 设备附带 VID:PID 与产品名）
    pub description: String,
}

/// 列出系统中可用的串口
pub fn list_ports() -> Result<Vec<PortInfo>, SerialError> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|port| {
            let description = match port.port_type {
                SerialPortType::UsbPort(usb) => format!(
                    "USB {:04x}:{:04x} {}",
                    usb.vid,
                    usb.pid,
                    usb.product.unwrap_or_default()
                ),
                SerialPortType::PciPort => "PCI".to_string(),
                SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                _ => "Unknown".to_string(),
            };
            PortInfo {
                name: port.port_name,
                description: description.trim_end().to_string(),
            }
        })
        .collect())
}
