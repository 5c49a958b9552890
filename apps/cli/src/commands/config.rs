//! 配置管理命令
//!
//! 打印默认配置、校验配置文件、生成配置文件。

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use rover_tools::MissionFile;
use std::path::PathBuf;

/// 默认配置文件路径
fn default_config_path() -> Result<PathBuf> {
    let mut path = dirs::config_dir().context("Cannot determine config directory")?;
    path.push("rover");
    path.push("mission.toml");
    Ok(path)
}

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 打印配置（默认值或指定文件）
    Show {
        /// 配置文件
        file: Option<PathBuf>,
    },

    /// 校验配置文件
    Check {
        /// 配置文件
        file: PathBuf,
    },

    /// 生成默认配置文件
    Init {
        /// 目标路径（默认 <config_dir>/rover/mission.toml）
        path: Option<PathBuf>,

        /// 覆盖已存在的文件
        #[arg(short, long)]
        force: bool,
    },
}

impl ConfigCommand {
    pub fn execute(self) -> Result<()> {
        match self {
            ConfigCommand::Show { file } => Self::show_(file),
            ConfigCommand::Check { file } => Self::check_(file),
            ConfigCommand::Init { path, force } => Self::init_(path, force),
        }
    }

    fn show_(file: Option<PathBuf>) -> Result<()> {
        let config = match file {
            Some(path) => MissionFile::load(&path)?,
            None => MissionFile::default(),
        };
        print!("{}", config.to_toml_string()?);
        Ok(())
    }

    fn check_(file: PathBuf) -> Result<()> {
        let config = MissionFile::load(&file)?;
        println!("✅ {} is valid", file.display());
        println!(
            "   profile: {:?}, detection timeout: {} ms, local matching: {}",
            config.mission.profile, config.mission.detection_timeout_ms, config.mission.local_matching
        );
        Ok(())
    }

    fn init_(path: Option<PathBuf>, force: bool) -> Result<()> {
        let path = match path {
            Some(path) => path,
            None => default_config_path()?,
        };
        if path.exists() && !force {
            bail!("{} already exists (use --force to overwrite)", path.display());
        }
        MissionFile::default().save(&path)?;
        println!("✅ Wrote default config to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_path_ends_with_mission_toml() {
        if let Ok(path) = default_config_path() {
            assert!(path.ends_with("rover/mission.toml"));
        }
    }
}
