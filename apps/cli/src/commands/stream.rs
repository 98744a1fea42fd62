//! 流式读取命令
//!
//! 可选地先执行一条模式命令，然后启动后台读取线程，
//! 把数据块写入文件（或只统计），直到 Ctrl-C 或达到时长。

use super::ConnectionArgs;
use anyhow::{Context, Result};
use clap::Args;
use crossbeam_channel::RecvTimeoutError;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// 流式读取参数
#[derive(Args, Debug)]
pub struct StreamCommand {
    /// 开始前执行的模式命令（如 mode-56-raw）
    #[arg(short, long)]
    pub mode: Option<String>,

    /// 输出文件路径（原始字节）
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 读取时长（秒），0 表示直到 Ctrl-C
    #[arg(short = 't', long, default_value_t = 0)]
    pub duration: u64,
}

impl StreamCommand {
    pub fn execute(&self, connection: &ConnectionArgs) -> Result<()> {
        let driver = connection.connect()?;

        if let Some(mode) = &self.mode {
            driver
                .execute_to_vec(mode)
                .with_context(|| format!("{} failed", mode))?;
            println!("✅ Entered {}", mode);
        }

        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
            .context("failed to install Ctrl-C handler")?;

        let mut writer = match &self.output {
            Some(path) => Some(BufWriter::new(
                File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
            )),
            None => None,
        };

        let rx = driver.start_streaming()?;
        println!("⏳ Streaming, press Ctrl-C to stop...");

        let start = Instant::now();
        let limit = (self.duration > 0).then(|| Duration::from_secs(self.duration));
        let mut received = 0u64;

        while running.load(Ordering::SeqCst) {
            if limit.is_some_and(|limit| start.elapsed() >= limit) {
                break;
            }
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(chunk) => {
                    received += chunk.data.len() as u64;
                    if let Some(writer) = writer.as_mut() {
                        writer.write_all(&chunk.data)?;
                    }
                    print!("\rReceived {} bytes ({:.1}s)", received, start.elapsed().as_secs_f64());
                    std::io::stdout().flush().ok();
                },
                Err(RecvTimeoutError::Timeout) => {},
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::warn!("Stream worker exited");
                    break;
                },
            }
        }

        if let Some(mut writer) = writer {
            writer.flush()?;
        }
        if let Some(stats) = driver.stop_streaming() {
            println!(
                "\n✅ {} chunks, {} bytes, {} dropped",
                stats.chunks, stats.bytes, stats.dropped
            );
        }
        Ok(())
    }
}
