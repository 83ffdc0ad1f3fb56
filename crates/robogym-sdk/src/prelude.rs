//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use robogym_sdk::prelude::*;
//! ```

// 任务层（推荐使用）
pub use crate::runtime::{RobotHandle, TaskRuntime};

// 控制层
pub use robogym_control::{
    ControllerPhase, FirstOrderFilter, HomingBuffer, HomingResolver, ImpedanceConfig,
    ImpedanceController,
};

// 同步层
pub use robogym_sync::{StateSynchronizer, VelocitySource};

// 配置
pub use robogym_tools::{ContactSensorLayout, TaskConfig};

// 类型与仿真接口（常用 Trait）
pub use robogym_articulation::{Articulation, SharedArticulation};
pub use robogym_types::{
    Batch, Device, Diagnostic, DiagnosticSink, JointIndexMap, SharedSink, SignalKind,
    tracing_sink,
};

// 错误类型
pub use crate::error::RuntimeError;
pub use robogym_articulation::ArticulationError;
pub use robogym_control::{ControlError, HomingError};
pub use robogym_sync::SyncError;
pub use robogym_tools::ConfigError;
