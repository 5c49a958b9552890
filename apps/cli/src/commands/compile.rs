//! 编译命令
//!
//! 读取路径文件，输出编号的命令列表、耗时估算与分段计划。

use crate::route::{RouteFile, load_mission_file};
use anyhow::{Context, Result};
use clap::Args;
use rover_planner::{PlannedRoute, StaticRoute, plan_route};
use std::path::PathBuf;

/// 编译命令参数
#[derive(Args, Debug)]
pub struct CompileCommand {
    /// 路径文件（JSON：states + obstacles）
    #[arg(short, long)]
    pub route: PathBuf,

    /// 任务配置文件（TOML，默认使用内置参数）
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 以 JSON 输出
    #[arg(long)]
    pub json: bool,
}

impl CompileCommand {
    pub fn execute(&self) -> Result<()> {
        let route = RouteFile::load(&self.route)?;
        let file = load_mission_file(self.config.as_deref())?;

        let mut planner = StaticRoute::new(route.states);
        let planned = plan_route(&mut planner, &route.obstacles, &file.compiler)
            .context("Failed to compile route")?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&planned)?);
        } else {
            print_planned(&planned);
        }
        Ok(())
    }
}

fn print_planned(planned: &PlannedRoute) {
    println!("Commands ({}):", planned.route.len());
    for (i, (command, secs)) in planned.route.iter().enumerate() {
        println!("  {:>3}  {:<28} {:>6.1}s", i + 1, command.to_string(), secs);
    }
    println!("Total: {:.1}s", planned.route.total_duration());

    println!("Segments ({}):", planned.plan.len());
    for (i, segment) in planned.plan.segments.iter().enumerate() {
        let seqs = match (segment.commands.first(), segment.commands.last()) {
            (Some(first), Some(last)) => format!("seq {}-{}", first.seq, last.seq),
            _ => "empty".to_string(),
        };
        match segment.trigger {
            Some(trigger) => println!(
                "  #{:<3} {:<12} -> obstacle {}{}",
                i,
                seqs,
                trigger.obstacle_id,
                trigger
                    .lateral_hint
                    .map(|h| format!(" ({})", h.code()))
                    .unwrap_or_default()
            ),
            None => println!("  #{:<3} {}", i, seqs),
        }
    }
}
