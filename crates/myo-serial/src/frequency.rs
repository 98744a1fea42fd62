//! 工频配置持久化
//!
//! 握手成功后把本次使用的工频（`50` / `60`）写入一个单行文本文件，
//! 之后的模式握手读取它决定发送哪个握手魔数。

use crate::SerialError;
use myo_protocol::LineFrequency;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// 工频配置文件
#[derive(Debug, Clone, Default)]
pub struct FrequencyStore {
    path: Option<PathBuf>,
}

impl FrequencyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// 不落盘（只在内存中记录）
    pub fn in_memory() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 读取持久化的工频；文件不存在或内容非法时返回 `None`
    pub fn load(&self) -> Option<LineFrequency> {
        let path = self.path.as_ref()?;
        let content = fs::read_to_string(path).ok()?;
        match content.parse() {
            Ok(freq) => Some(freq),
            Err(e) => {
                warn!("Ignoring invalid frequency file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// 写入工频
    pub fn store(&self, frequency: LineFrequency) -> Result<(), SerialError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, frequency.to_string())?;
        Ok(())
    }
}
