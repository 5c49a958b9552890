//! # Rover CLI
//!
//! Command-line interface for rover mission planning and simulation.
//!
//! ```bash
//! # 编译路径，查看命令列表与分段
//! rover-cli compile --route route.json
//!
//! # 用内存链路跑一次完整任务（Ctrl-C 中止）
//! rover-cli simulate --route route.json --miss-rate 0.2 --seed 7
//!
//! # 生成默认配置
//! rover-cli config init
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod route;

use commands::{CompileCommand, ConfigCommand, SimulateCommand};

/// Rover CLI - 任务规划与模拟工具
#[derive(Parser, Debug)]
#[command(name = "rover-cli")]
#[command(about = "Command-line interface for rover mission planning and simulation", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 编译路径为电机命令
    Compile {
        #[command(flatten)]
        args: CompileCommand,
    },

    /// 用内存链路模拟完整任务
    Simulate {
        #[command(flatten)]
        args: SimulateCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志（输出到 stderr，stdout 留给命令结果）
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rover_cli=info,rover_driver=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config(cmd) => cmd.execute(),
        Commands::Compile { args } => args.execute(),
        Commands::Simulate { args } => args.execute(),
    }
}
