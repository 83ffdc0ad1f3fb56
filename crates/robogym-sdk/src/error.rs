//! 任务层错误类型定义

use robogym_articulation::ArticulationError;
use robogym_control::{ControlError, HomingError};
use robogym_sync::SyncError;
use robogym_tools::ConfigError;
use robogym_types::Device;
use thiserror::Error;

/// 任务层错误类型
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Homing error: {0}")]
    Homing(#[from] HomingError),

    #[error("Control error: {0}")]
    Control(#[from] ControlError),

    #[error("State synchronization error: {0}")]
    Sync(#[from] SyncError),

    #[error("Articulation error: {0}")]
    Articulation(#[from] ArticulationError),

    /// 机器人名称不在配置的 `robot_names` 中
    #[error("Unknown robot: {0}")]
    UnknownRobot(String),

    #[error("Robot already added: {0}")]
    RobotAlreadyAdded(String),

    #[error("Articulation of robot {0} is not initialized")]
    ArticulationNotInitialized(String),

    /// articulation 的副本数与 `num_envs` 不一致
    #[error("Robot {robot} has {actual} replicas, expected {expected} environments")]
    EnvCountMismatch {
        robot: String,
        expected: usize,
        actual: usize,
    },

    #[error("Robot {robot} lives on {actual}, task is configured for {expected}")]
    DeviceMismatch {
        robot: String,
        expected: Device,
        actual: Device,
    },
}

impl RuntimeError {
    /// 是否为致命错误（需要重新构建任务）
    ///
    /// 控制层的非致命错误（如非法状态转换）原样透传其判定。
    pub fn is_fatal(&self) -> bool {
        match self {
            RuntimeError::Control(e) => e.is_fatal(),
            RuntimeError::Articulation(e) => e.is_fatal(),
            _ => true,
        }
    }
}
