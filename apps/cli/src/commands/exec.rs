//! 执行命令
//!
//! 打开驱动，执行一条命令（可重复），按指定格式输出结果。

use super::ConnectionArgs;
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use myo_sdk::MyoDriver;
use serde::Serialize;
use std::io::Write;
use std::time::Duration;

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// 十六进制字符串
    Hex,
    /// 原始字节（写到标准输出）
    Raw,
    /// 每次执行一行 JSON
    Json,
    /// 小端 i16 序列
    I16,
}

/// 执行命令参数
#[derive(Args, Debug)]
pub struct ExecCommand {
    /// 控制数字（1-9）或模式名（如 mode-42-raw-q）
    pub command: String,

    /// 输出格式
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Hex)]
    pub format: OutputFormat,

    /// 执行次数
    #[arg(short = 'n', long, default_value_t = 1)]
    pub count: u32,

    /// 两次执行之间的间隔（毫秒）
    #[arg(long, default_value_t = 0)]
    pub interval_ms: u64,

    /// 输出缓冲区大小（覆盖配置）
    #[arg(long)]
    pub buffer_size: Option<usize>,
}

#[derive(Serialize)]
struct ExecRecord<'a> {
    command: &'a str,
    iteration: u32,
    bytes: usize,
    data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    angles: Option<myo_sdk::protocol::TiltAngles>,
}

impl ExecCommand {
    pub fn execute(&self, connection: &ConnectionArgs) -> Result<()> {
        let driver = connection.connect()?;
        let size = self.buffer_size.unwrap_or(driver.config().sample_buffer_size);
        let mut buffer = vec![0u8; size];
        let stdout = std::io::stdout();
        let mut out = stdout.lock();

        for iteration in 0..self.count.max(1) {
            if iteration > 0 && self.interval_ms > 0 {
                std::thread::sleep(Duration::from_millis(self.interval_ms));
            }
            let n = driver
                .execute(&self.command, &mut buffer)
                .with_context(|| format!("{} failed", self.command))?;
            self.write_output(&mut out, &driver, iteration, &buffer[..n])?;
        }
        out.flush()?;
        tracing::debug!("Executed {} x{}", self.command, self.count.max(1));
        Ok(())
    }

    fn write_output(
        &self,
        out: &mut impl Write,
        driver: &MyoDriver,
        iteration: u32,
        data: &[u8],
    ) -> Result<()> {
        match self.format {
            OutputFormat::Hex => writeln!(out, "{}", hex::encode(data))?,
            OutputFormat::Raw => out.write_all(data)?,
            OutputFormat::I16 => writeln!(out, "{}", format_i16(data))?,
            OutputFormat::Json => {
                let record = ExecRecord {
                    command: &self.command,
                    iteration,
                    bytes: data.len(),
                    data: hex::encode(data),
                    angles: driver.last_angles(),
                };
                writeln!(out, "{}", serde_json::to_string(&record)?)?;
            },
        }
        Ok(())
    }
}

/// 小端 i16，空格分隔（末尾的奇数字节忽略）
fn format_i16(data: &[u8]) -> String {
    data.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]).to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
