use crate::validate::DEFAULT_FIX_PATTERN;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub fix_conflicts_pattern: String,
    pub auto_fix_conflicts: bool,
    pub allow_overwrites: bool,
    pub include_hidden: bool,
    pub recursive: bool,
    pub ignore_extension: bool,
    pub replace_limit: i64,
    pub pair_order: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fix_conflicts_pattern: DEFAULT_FIX_PATTERN.to_string(),
            auto_fix_conflicts: false,
            allow_overwrites: false,
            include_hidden: false,
            recursive: false,
            ignore_extension: true,
            replace_limit: 0,
            pair_order: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub config_path: PathBuf,
    pub backup_path: PathBuf,
}

pub fn app_paths() -> Result<AppPaths> {
    let proj = ProjectDirs::from("com", "batch-renamer", "batch-renamer")
        .context("could not determine the OS configuration directory")?;
    let config_dir = proj.config_dir().to_path_buf();
    Ok(AppPaths {
        config_path: config_dir.join("config.toml"),
        backup_path: config_dir.join("undo-last.json"),
        config_dir,
    })
}

pub fn load_config() -> Result<AppConfig> {
    load_config_from(&app_paths()?.config_path)
}

pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let config = toml::from_str::<AppConfig>(&raw)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    Ok(config)
}

pub fn save_config(config: &AppConfig) -> Result<()> {
    save_config_to(config, &app_paths()?.config_path)
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory: {}", dir.display()))?;
    }
    let body = toml::to_string_pretty(config).context("failed to serialize config")?;
    fs::write(path, body)
        .with_context(|| format!("failed to write config file: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let temp = tempdir().expect("tempdir");
        let config = load_config_from(&temp.path().join("config.toml")).expect("load");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.fix_conflicts_pattern, "(%d)");
    }

    #[test]
    fn partial_file_fills_defaults_and_round_trips() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("config.toml");
        fs::create_dir_all(path.parent().expect("parent")).expect("create dir");
        fs::write(&path, "auto_fix_conflicts = true\npair_order = [\"raf\", \"jpg\"]\n")
            .expect("write config");

        let mut config = load_config_from(&path).expect("load");
        assert!(config.auto_fix_conflicts);
        assert_eq!(config.pair_order, ["raf", "jpg"]);
        assert!(config.ignore_extension);

        config.replace_limit = -2;
        save_config_to(&config, &path).expect("save");
        assert_eq!(load_config_from(&path).expect("reload"), config);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "replace_limit = \"many\"").expect("write config");
        let err = load_config_from(&path).expect_err("must fail");
        assert!(err.to_string().contains("failed to parse config file"));
    }
}
