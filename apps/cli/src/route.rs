//! 路径文件与配置加载

use anyhow::{Context, Result, bail};
use rover_protocol::{Obstacle, OrientedState};
use rover_tools::MissionFile;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 路径文件（JSON）
///
/// ```json
/// {
///   "states": [{ "x": 0, "y": 0, "heading": "NORTH" },
///              { "x": 0, "y": 1, "heading": "NORTH", "snapshot_obstacle_id": 1 }],
///   "obstacles": [{ "id": 1, "x": 1, "y": 1, "facing": "WEST" }]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteFile {
    pub states: Vec<OrientedState>,
    #[serde(default)]
    pub obstacles: Vec<Obstacle>,
}

impl RouteFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read route file {}", path.display()))?;
        let route: RouteFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse route file {}", path.display()))?;
        if route.states.is_empty() {
            bail!("Route file {} has no states", path.display());
        }
        Ok(route)
    }
}

/// 加载任务配置；未指定时使用默认值
pub fn load_mission_file(path: Option<&Path>) -> Result<MissionFile> {
    match path {
        Some(path) => MissionFile::load(path),
        None => Ok(MissionFile::default()),
    }
}
