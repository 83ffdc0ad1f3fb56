//! Robogym SDK - 并行仿真机器人的批量关节阻抗控制
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **类型层** (`types`): 批量缓冲区、关节索引映射、索引选择器、诊断接收器
//! - **仿真接口层** (`articulation`): `Articulation` trait（外部仿真器的批量关节/根状态接口）
//! - **控制层** (`control`): 一阶滤波器、homing 解析、阻抗控制器
//! - **同步层** (`sync`): 每周期根位姿/关节状态获取与 reset 感知的数值微分
//! - **配置层** (`tools`): TOML 任务配置、接触传感器选项
//! - **任务层** (`runtime`): 多种机器人的初始化与 reset 流程编排
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use robogym_sdk::prelude::*;
//! # fn demo(articulation: SharedArticulation, srdf: &str) -> Result<(), RuntimeError> {
//! robogym_sdk::logging::init_logging("robogym=info");
//!
//! let mut config = TaskConfig::with_robots(["centauro"]);
//! config.device = "cpu".into();
//! let mut runtime = TaskRuntime::new(config, tracing_sink())?;
//! runtime.add_robot("centauro", articulation, srdf)?;
//!
//! // 每个控制周期
//! runtime.refresh_states(false)?;
//! runtime.apply_cmds(false)?;
//! # Ok(())
//! # }
//! ```

pub mod logging;
pub mod prelude;
pub mod runtime;

mod error;

// --- 各层模块路径访问 ---
pub use robogym_articulation as articulation;
pub use robogym_control as control;
pub use robogym_sync as sync;
pub use robogym_tools as tools;
pub use robogym_types as types;

// 任务层（推荐入口）
pub use error::RuntimeError;
pub use runtime::{RobotHandle, TaskRuntime};

// 常用类型
pub use robogym_articulation::{Articulation, ArticulationError, SharedArticulation};
pub use robogym_control::{
    ControlError, ControllerPhase, FirstOrderFilter, HomingError, HomingResolver, ImpedanceConfig,
    ImpedanceController,
};
pub use robogym_sync::{StateSynchronizer, SyncError, VelocitySource};
pub use robogym_tools::{ConfigError, ContactSensorLayout, TaskConfig};
pub use robogym_types::{Batch, Device, DiagnosticSink, IndexSelector, SharedSink};

/// 任务层 Result 别名
pub type Result<T> = std::result::Result<T, RuntimeError>;
