//! 配置层错误类型定义

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// 配置错误（均为 setup 阶段的致命错误）
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid TOML configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// 每机器人选项列表长度与 `robot_names` 不一致
    #[error("The provided {option} list must match the length of robot_names: expected {expected}, got {got}")]
    LengthMismatch {
        option: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Invalid value for {option}: {detail}")]
    InvalidValue { option: &'static str, detail: String },

    /// 字典中找不到机器人对应的键
    #[error("Could not find key {robot} in {option} dictionary")]
    MissingRobotKey { robot: String, option: &'static str },
}

impl ConfigError {
    pub(crate) fn invalid(option: &'static str, detail: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            option,
            detail: detail.into(),
        }
    }
}
