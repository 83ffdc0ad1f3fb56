//! # Robogym Tools - 任务配置与选项解析
//!
//! **依赖原则**: 只依赖 `robogym-types`，不依赖控制层或同步层
//!
//! ## 包含模块
//!
//! - `config` - TOML 任务配置（`TaskConfig`）、每机器人选项校验、迭代倍率回退
//! - `contact` - 接触传感器选项的默认值解析（`ContactSensorLayout`）

pub mod config;
pub mod contact;

mod error;

pub use config::{IterationFactors, RobotOptions, TaskConfig};
pub use contact::{ContactSensorConfig, ContactSensorLayout, DEFAULT_SENSOR_RADIUS};
pub use error::ConfigError;

/// 配置层 Result 别名
pub type Result<T> = std::result::Result<T, ConfigError>;
