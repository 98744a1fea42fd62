//! # Myo CLI
//!
//! Command-line interface for K7 myography instruments.
//!
//! ```bash
//! # 配置默认串口
//! myo-cli config set --port /dev/ttyUSB0
//!
//! # 执行一次采集（内部：打开串口 -> 模式握手 -> 读取 -> 关闭）
//! myo-cli exec mode-42-raw-q --format hex
//!
//! # 无设备运行
//! myo-cli --disconnected exec mode-52-raw
//!
//! # 流式读取到文件，Ctrl-C 停止
//! myo-cli stream --output capture.bin
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{ConfigCommand, ConnectionArgs, ExecCommand, StreamCommand};

/// Myo CLI - 肌动图仪器命令行工具
#[derive(Parser, Debug)]
#[command(name = "myo-cli")]
#[command(about = "Command-line interface for K7 myography instruments", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 执行一条命令（控制数字或模式名）
    Exec {
        #[command(flatten)]
        args: ExecCommand,
    },

    /// 后台流式读取
    Stream {
        #[command(flatten)]
        args: StreamCommand,
    },

    /// 列出可用串口
    Ports,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Config(cmd) => cmd.execute(),
        Commands::Exec { args } => args.execute(&cli.connection),
        Commands::Stream { args } => args.execute(&cli.connection),
        Commands::Ports => commands::ports::execute(),
    }
}
