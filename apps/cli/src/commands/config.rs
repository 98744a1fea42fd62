//! 配置管理命令
//!
//! 默认连接参数保存在 `<config_dir>/myo/config.toml`，格式即 [`DriverConfig`]。

use anyhow::{Context, Result, anyhow, bail};
use clap::Subcommand;
use myo_sdk::DriverConfig;
use std::path::{Path, PathBuf};

/// 配置目录
fn config_dir() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow!("cannot determine config directory"))?;

    path.push("myo");
    Ok(path)
}

/// 配置文件路径
pub fn config_file() -> Result<PathBuf> {
    let mut path = config_dir()?;
    path.push("config.toml");
    Ok(path)
}

/// 从默认位置加载（文件不存在时返回默认配置）
pub fn load() -> Result<DriverConfig> {
    load_from(&config_file()?)
}

pub fn load_from(path: &Path) -> Result<DriverConfig> {
    if !path.exists() {
        return Ok(DriverConfig::default());
    }
    DriverConfig::load(path).with_context(|| format!("failed to load {}", path.display()))
}

fn save_to(config: &DriverConfig, path: &Path) -> Result<()> {
    config
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 设置配置项（port / baud_rate / buffer_size / frequency_file / disconnected）
    Set {
        /// 配置项名称
        key: String,

        /// 新值（port 与 frequency_file 可用 "none" 清除）
        value: String,
    },

    /// 获取配置项
    Get {
        /// 配置项名称
        #[arg(default_value = "all")]
        key: String,
    },

    /// 显示配置文件路径
    Path,
}

impl ConfigCommand {
    pub fn execute(self) -> Result<()> {
        let path = config_file()?;
        match self {
            ConfigCommand::Set { key, value } => {
                let mut config = load_from(&path)?;
                set(&mut config, &key, &value)?;
                save_to(&config, &path)?;
                println!("✅ {} = {}", key, value);
                Ok(())
            },

            ConfigCommand::Get { key } => {
                let config = load_from(&path)?;
                println!("{}", get(&config, &key)?);
                Ok(())
            },

            ConfigCommand::Path => {
                println!("{}", path.display());
                Ok(())
            },
        }
    }
}

fn set(config: &mut DriverConfig, key: &str, value: &str) -> Result<()> {
    let cleared = value.eq_ignore_ascii_case("none");
    match key {
        "port" => config.port_name = (!cleared).then(|| value.to_string()),
        "baud_rate" => {
            config.baud_rate = value
                .parse()
                .with_context(|| format!("invalid baud rate: {}", value))?;
        },
        "buffer_size" => {
            config.sample_buffer_size = value
                .parse()
                .with_context(|| format!("invalid buffer size: {}", value))?;
        },
        "frequency_file" => config.frequency_file = (!cleared).then(|| PathBuf::from(value)),
        "disconnected" => {
            config.disconnected = value
                .parse()
                .with_context(|| format!("expected true or false, got {}", value))?;
        },
        other => bail!("unknown config key: {}", other),
    }
    config.validate()?;
    Ok(())
}

fn get(config: &DriverConfig, key: &str) -> Result<String> {
    let unset = || "(unset)".to_string();
    Ok(match key {
        "port" => config.port_name.clone().unwrap_or_else(unset),
        "baud_rate" => config.baud_rate.to_string(),
        "buffer_size" => config.sample_buffer_size.to_string(),
        "frequency_file" => config
            .frequency_file
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(unset),
        "disconnected" => config.disconnected.to_string(),
        "all" => config.to_toml_string()?,
        other => bail!("unknown config key: {}", other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("myo").join("config.toml");

        let mut config = load_from(&path).unwrap();
        assert_eq!(config, DriverConfig::default());

        set(&mut config, "port", "COM4").unwrap();
        set(&mut config, "baud_rate", "115200").unwrap();
        set(&mut config, "disconnected", "true").unwrap();
        save_to(&config, &path).unwrap();

        let loaded = load_from(&path).unwrap();
        assert_eq!(get(&loaded, "port").unwrap(), "COM4");
        assert_eq!(get(&loaded, "baud_rate").unwrap(), "115200");
        assert_eq!(get(&loaded, "disconnected").unwrap(), "true");
        assert_eq!(get(&loaded, "frequency_file").unwrap(), "(unset)");
        assert!(get(&loaded, "all").unwrap().contains("COM4"));
        assert!(get(&loaded, "color").is_err());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = DriverConfig::default();
        assert!(set(&mut config, "buffer_size", "0").is_err());
        assert!(set(&mut config, "buffer_size", "many").is_err());
        assert!(set(&mut config, "baud_rate", "9600").is_err());
        assert!(set(&mut config, "color", "blue").is_err());
    }

    #[test]
    fn test_clear_port() {
        let mut config = DriverConfig::default();
        set(&mut config, "port", "COM4").unwrap();
        set(&mut config, "port", "none").unwrap();
        assert_eq!(config.port_name, None);
    }
}
