//! # 任务配置
//!
//! 单个 TOML 文件，三张表，所有字段都有默认值：
//!
//! ```toml
//! [compiler]
//! unit_distance = 10
//! max_move_distance = 180
//!
//! [mission]
//! profile = "full_route"
//! detection_timeout_ms = 2000
//!
//! [detection]
//! min_confidence = 0.7
//! excluded_labels = ["45"]
//! ```

use anyhow::{Context, Result, bail};
use rover_planner::CompilerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// 任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionProfile {
    /// 全路径：每个拍摄点都做一次匹配
    #[default]
    FullRoute,
    /// 单目标：匹配后释放区间
    SingleTarget,
}

impl MissionProfile {
    /// 该任务类型匹配成功后是否释放区间
    pub fn evicts_on_match(self) -> bool {
        matches!(self, MissionProfile::SingleTarget)
    }
}

/// 编排器参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionSettings {
    pub profile: MissionProfile,
    /// 分段是否携带检测触发
    pub detection_triggers: bool,
    /// 等待检测结果的超时（ms）
    pub detection_timeout_ms: u64,
    /// 匹配窗口前沿（ms）
    pub match_lead_ms: u64,
    /// 匹配窗口后沿（ms）
    pub match_lag_ms: u64,
    /// 单条命令最多重发次数
    pub max_resend_attempts: u32,
    /// 电机速度（0-100）
    pub motor_speed: u8,
    /// 匹配后是否释放区间（未设置时由 profile 决定）
    pub evict_on_match: Option<bool>,
    /// 是否在本进程内应答检测查询（否则等待视觉端的 OBJECT/NONE）
    pub local_matching: bool,
    /// 本地匹配前的等待时间（ms）
    pub match_settle_ms: u64,
    /// 用本地接收时间替换检测事件的时间戳
    pub restamp_detections: bool,
}

impl Default for MissionSettings {
    fn default() -> Self {
        Self {
            profile: MissionProfile::FullRoute,
            detection_triggers: true,
            detection_timeout_ms: 2000,
            match_lead_ms: 750,
            match_lag_ms: 1500,
            max_resend_attempts: 3,
            motor_speed: 50,
            evict_on_match: None,
            local_matching: true,
            match_settle_ms: 500,
            restamp_detections: true,
        }
    }
}

impl MissionSettings {
    pub fn detection_timeout(&self) -> Duration {
        Duration::from_millis(self.detection_timeout_ms)
    }

    pub fn match_lead(&self) -> Duration {
        Duration::from_millis(self.match_lead_ms)
    }

    pub fn match_lag(&self) -> Duration {
        Duration::from_millis(self.match_lag_ms)
    }

    pub fn match_settle(&self) -> Duration {
        Duration::from_millis(self.match_settle_ms)
    }

    /// 实际生效的释放策略
    pub fn effective_evict_on_match(&self) -> bool {
        self.evict_on_match
            .unwrap_or_else(|| self.profile.evicts_on_match())
    }
}

/// 检测事件过滤参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// 最低置信度（低于该值的检测被丢弃）
    pub min_confidence: f32,
    /// 静态排除的标签
    pub excluded_labels: Vec<String>,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            excluded_labels: vec!["45".to_string()],
        }
    }
}

/// 任务配置文件
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionFile {
    pub compiler: CompilerConfig,
    pub mission: MissionSettings,
    pub detection: DetectionSettings,
}

impl MissionFile {
    /// 从文件加载并校验
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let file = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(file)
    }

    /// 从 TOML 文本解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: MissionFile = toml::from_str(content).context("Failed to parse TOML")?;
        file.validate()?;
        Ok(file)
    }

    /// 保存到文件（自动创建父目录）
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, self.to_toml_string()?)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// 校验所有参数
    pub fn validate(&self) -> Result<()> {
        self.compiler.validate()?;

        let mission = &self.mission;
        if mission.motor_speed > 100 {
            bail!("mission.motor_speed must be 0-100, got {}", mission.motor_speed);
        }
        if mission.detection_timeout_ms == 0 {
            bail!("mission.detection_timeout_ms must be positive");
        }
        if mission.local_matching && mission.match_settle_ms >= mission.detection_timeout_ms {
            bail!(
                "mission.match_settle_ms ({}) must be shorter than mission.detection_timeout_ms ({})",
                mission.match_settle_ms,
                mission.detection_timeout_ms
            );
        }

        let confidence = self.detection.min_confidence;
        if !(0.0..=1.0).contains(&confidence) {
            bail!("detection.min_confidence must be within 0-1, got {}", confidence);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let file = MissionFile::default();
        assert_eq!(file.compiler.max_move_distance, 180);
        assert_eq!(file.mission.detection_timeout(), Duration::from_secs(2));
        assert_eq!(file.mission.match_lead(), Duration::from_millis(750));
        assert_eq!(file.detection.excluded_labels, vec!["45".to_string()]);
        assert!(!file.mission.effective_evict_on_match());
        file.validate().unwrap();
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let file = MissionFile::from_toml_str(
            r#"
            [mission]
            profile = "single_target"
            max_resend_attempts = 5

            [compiler]
            max_move_distance = 90
            "#,
        )
        .unwrap();
        assert_eq!(file.mission.profile, MissionProfile::SingleTarget);
        assert_eq!(file.mission.max_resend_attempts, 5);
        assert_eq!(file.mission.motor_speed, 50);
        assert!(file.mission.effective_evict_on_match());
        assert_eq!(file.compiler.max_move_distance, 90);
        assert_eq!(file.compiler.unit_distance, 10);
        assert!((file.detection.min_confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_explicit_evict_overrides_profile() {
        let file = MissionFile::from_toml_str("[mission]\nevict_on_match = true\n").unwrap();
        assert_eq!(file.mission.profile, MissionProfile::FullRoute);
        assert!(file.mission.effective_evict_on_match());
    }

    #[test]
    fn test_validation_errors() {
        let err = MissionFile::from_toml_str("[mission]\nmatch_settle_ms = 3000\n").unwrap_err();
        assert!(format!("{:#}", err).contains("match_settle_ms"));

        assert!(MissionFile::from_toml_str("[mission]\nmotor_speed = 120\n").is_err());
        assert!(MissionFile::from_toml_str("[detection]\nmin_confidence = 1.5\n").is_err());
        assert!(MissionFile::from_toml_str("[compiler]\nunit_distance = 0\n").is_err());
        assert!(MissionFile::from_toml_str("[mission]\nprofile = \"sprint\"\n").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mission.toml");

        let mut file = MissionFile::default();
        file.mission.profile = MissionProfile::SingleTarget;
        file.detection.excluded_labels.push("99".to_string());
        file.save(&path).unwrap();

        let loaded = MissionFile::load(&path).unwrap();
        assert_eq!(loaded, file);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = MissionFile::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
