//! # Robogym Types
//!
//! 批量关节控制的基础数据类型（无仿真器依赖）
//!
//! ## 模块
//!
//! - `batch`: `[robot, joint]` 批量缓冲区与设备（`Device`）
//! - `joint_map`: 关节名称 ↔ 列索引的双射
//! - `selector`: 机器人/关节子集的校验与选择器
//! - `signal`: 信号类型枚举（替代字符串分发）
//! - `diagnostics`: 诊断事件与注入式诊断接收器
//!
//! ## 布局约定
//!
//! 所有批量数据均为二维缓冲区，行对应机器人实例，列对应关节。
//! 列顺序由 articulation 的关节顺序决定，在控制器生命周期内保持不变。

pub mod batch;
pub mod diagnostics;
pub mod joint_map;
pub mod selector;
pub mod signal;

mod error;

// 重新导出常用类型
pub use batch::{Batch, Device, DeviceKind};
pub use diagnostics::{
    Diagnostic, DiagnosticSink, MemorySink, Severity, SharedSink, TracingSink, tracing_sink,
};
pub use error::TypesError;
pub use joint_map::JointIndexMap;
pub use selector::{Axis, IndexSelector, IndexSet, IndexState, IndexViolation, Selector, SelectorCheck};
pub use signal::SignalKind;

/// 类型层 Result 别名
pub type Result<T> = std::result::Result<T, TypesError>;
