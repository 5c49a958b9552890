//! 模拟命令
//!
//! 用内存链路跑一次完整任务：
//! - 电机端：每条命令模拟执行 `step_ms` 后确认
//! - 视觉端：在带拍摄点的分段的最后一条命令执行期间发出检测事件
//!   （按 `miss_rate` 随机漏检）；关闭本地匹配时由视觉端应答 DETECT
//! - 伴侣 App：发送 BEGIN，收集 TARGET / STATUS
//!
//! Ctrl-C 中止任务（与伴侣 App 的 ABORT 等价）。

use crate::route::{RouteFile, load_mission_file};
use anyhow::{Context, Result, bail};
use clap::Args;
use crossbeam_channel::{Receiver, unbounded};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rover_driver::{
    ChannelLink, ChannelTx, Link, LinkRx, LinkTx, MissionBuilder, Phase, RunReport,
};
use rover_planner::{SegmentPlan, StaticRoute, plan_route};
use rover_protocol::{Detection, Obstacle, VisionEvent, VisionRequest};
use rover_tools::monotonic_nanos;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// 每个拍摄点发出的检测事件数
const DETECTIONS_PER_SNAPSHOT: u32 = 3;

/// 模拟命令参数
#[derive(Args, Debug)]
pub struct SimulateCommand {
    /// 路径文件（JSON：states + obstacles）
    #[arg(short, long)]
    pub route: PathBuf,

    /// 任务配置文件（TOML，默认使用内置参数）
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 漏检概率（0-1）
    #[arg(long, default_value_t = 0.0)]
    pub miss_rate: f64,

    /// 随机种子（默认随机）
    #[arg(long)]
    pub seed: Option<u64>,

    /// 每条命令的模拟执行时间（ms）
    #[arg(long, default_value_t = 20)]
    pub step_ms: u64,

    /// 任务总超时（秒）
    #[arg(long, default_value_t = 120)]
    pub timeout_secs: u64,

    /// 以 JSON 输出
    #[arg(long)]
    pub json: bool,
}

impl SimulateCommand {
    pub fn execute(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.miss_rate) {
            bail!("--miss-rate must be within 0-1, got {}", self.miss_rate);
        }
        let route = RouteFile::load(&self.route)?;
        let file = load_mission_file(self.config.as_deref())?;

        // 预先编译一次，得到拍摄点对应的命令序号
        let mut planner = StaticRoute::new(route.states.clone());
        let planned = plan_route(&mut planner, &route.obstacles, &file.compiler)
            .context("Failed to compile route")?;
        let labels = synthetic_labels(&route.obstacles, &file.detection.excluded_labels);

        let seed = self.seed.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(seed);
        let missed: HashSet<u32> = planned
            .plan
            .segments
            .iter()
            .filter_map(|s| s.obstacle_id())
            .filter(|_| rng.gen_bool(self.miss_rate))
            .collect();
        info!("Simulation seed {}, {} obstacles will be missed", seed, missed.len());

        let sightings = sightings(&planned.plan, &labels, &missed);

        let (motor, motor_peer) = ChannelLink::pair();
        let (vision, vision_peer) = ChannelLink::pair();
        let (companion, companion_peer) = ChannelLink::pair();
        let (vision_peer_rx, vision_peer_tx) = vision_peer.split()?;
        let (companion_peer_rx, mut companion_peer_tx) = companion_peer.split()?;

        spawn_motor_peer(
            motor_peer,
            vision_peer_tx.clone(),
            sightings,
            Duration::from_millis(self.step_ms),
        )?;
        let remote_labels = if file.mission.local_matching {
            None
        } else {
            Some(
                labels
                    .iter()
                    .filter(|(id, _)| !missed.contains(id))
                    .map(|(id, label)| (*id, label.clone()))
                    .collect(),
            )
        };
        spawn_vision_peer(vision_peer_rx, vision_peer_tx, remote_labels)?;
        let companion_lines = collect_lines(companion_peer_rx)?;

        let mission = MissionBuilder::from_file(&file)
            .planner(StaticRoute::new(route.states))
            .obstacles(route.obstacles)
            .motor_link(motor)
            .vision_link(vision)
            .companion_link(companion)
            .build()?;

        let orchestrator = mission.orchestrator().clone();
        {
            let orchestrator = orchestrator.clone();
            ctrlc::set_handler(move || orchestrator.abort("interrupted"))
                .context("Failed to install Ctrl-C handler")?;
        }

        companion_peer_tx.send("BEGIN")?;
        let report = mission.join(Duration::from_secs(self.timeout_secs))?;
        let metrics = orchestrator.metrics().snapshot();
        // 链路关闭后收集线程退出
        let companion: Vec<String> = companion_lines.iter().collect();

        if self.json {
            let output = serde_json::json!({
                "seed": seed,
                "report": report,
                "metrics": metrics,
                "companion": companion,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print_report(&report, &companion);
            println!(
                "Metrics: {} commands, {} resends, {} queries, {} timeouts, {} stale replies, match rate {:.1}%",
                metrics.commands_sent,
                metrics.resends,
                metrics.detection_queries,
                metrics.detection_timeouts,
                metrics.stale_replies,
                metrics.match_rate()
            );
        }

        if report.phase == Phase::Failed {
            match report.error {
                Some(e) => bail!("Mission failed: {}", e),
                None => bail!("Mission failed"),
            }
        }
        Ok(())
    }
}

/// 为每个障碍物分配一个不在排除列表中的标签
fn synthetic_labels(obstacles: &[Obstacle], excluded: &[String]) -> HashMap<u32, String> {
    let mut next = 11u32;
    let mut labels = HashMap::new();
    for obstacle in obstacles {
        while excluded.contains(&next.to_string()) {
            next += 1;
        }
        labels.insert(obstacle.id, next.to_string());
        next += 1;
    }
    labels
}

/// 命令序号 -> 执行期间可见的标签
fn sightings(
    plan: &SegmentPlan,
    labels: &HashMap<u32, String>,
    missed: &HashSet<u32>,
) -> HashMap<u32, String> {
    plan.segments
        .iter()
        .filter_map(|segment| {
            let obstacle_id = segment.obstacle_id()?;
            let last = segment.commands.last()?;
            if missed.contains(&obstacle_id) {
                return None;
            }
            Some((last.seq, labels.get(&obstacle_id)?.clone()))
        })
        .collect()
}

fn spawn_motor_peer(
    peer: ChannelLink,
    mut vision: ChannelTx,
    sightings: HashMap<u32, String>,
    step: Duration,
) -> Result<()> {
    let (mut rx, mut tx) = peer.split()?;
    thread::Builder::new()
        .name("sim-motor".to_string())
        .spawn(move || {
            let pause = step / DETECTIONS_PER_SNAPSHOT;
            loop {
                let line = match rx.receive() {
                    Ok(line) => line,
                    Err(e) if e.is_fatal() => break,
                    Err(_) => continue,
                };
                let seq = line
                    .trim_start_matches(':')
                    .split('/')
                    .next()
                    .and_then(|s| s.parse::<u32>().ok());
                match seq.and_then(|seq| sightings.get(&seq)) {
                    Some(label) => {
                        for i in 0..DETECTIONS_PER_SNAPSHOT {
                            let confidence = 0.85 + 0.05 * i as f32;
                            let event = VisionEvent::Detection(Detection::new(
                                label.clone(),
                                confidence,
                                monotonic_nanos(),
                            ));
                            let _ = vision.send(&event.encode());
                            thread::sleep(pause);
                        }
                    },
                    None => thread::sleep(step),
                }
                debug!("sim motor: {} done", line);
                if tx.send("OK").is_err() {
                    break;
                }
            }
        })
        .context("Failed to spawn motor peer")?;
    Ok(())
}

fn spawn_vision_peer(
    mut rx: impl LinkRx + Send + 'static,
    mut tx: ChannelTx,
    remote_labels: Option<HashMap<u32, String>>,
) -> Result<()> {
    thread::Builder::new()
        .name("sim-vision".to_string())
        .spawn(move || {
            loop {
                let line = match rx.receive() {
                    Ok(line) => line,
                    Err(e) if e.is_fatal() => break,
                    Err(_) => continue,
                };
                debug!("sim vision: {}", line);
                let (Some(labels), Ok(VisionRequest::Detect { obstacle_id, .. })) =
                    (&remote_labels, VisionRequest::parse(&line))
                else {
                    continue;
                };
                let reply = match labels.get(&obstacle_id) {
                    Some(label) => VisionEvent::Object {
                        obstacle_id,
                        confidence: 0.9,
                        label: label.clone(),
                    },
                    None => VisionEvent::NoMatch { obstacle_id },
                };
                let _ = tx.send(&reply.encode());
            }
        })
        .context("Failed to spawn vision peer")?;
    Ok(())
}

fn print_report(report: &RunReport, companion: &[String]) {
    println!(
        "Mission {}: {}/{} obstacles matched",
        report.phase,
        report.matches.len(),
        report.expected
    );
    for m in &report.matches {
        println!("  obstacle {:>3} -> {} ({:.2})", m.obstacle_id, m.label, m.confidence);
    }
    if let Some(reason) = &report.abort_reason {
        println!("Aborted: {}", reason);
    }
    for line in companion.iter().filter(|l| l.starts_with("STATUS")) {
        println!("Companion: {}", line);
    }
}

/// 后台收集链路对端收到的所有行（对端关闭后结束）
fn collect_lines(mut rx: impl LinkRx + Send + 'static) -> Result<Receiver<String>> {
    let (tx, lines) = unbounded();
    thread::Builder::new()
        .name("sim-companion".to_string())
        .spawn(move || {
            loop {
                match rx.receive() {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    },
                    Err(e) if e.is_fatal() => break,
                    Err(_) => continue,
                }
            }
        })
        .context("Failed to spawn companion peer")?;
    Ok(lines)
}
