//! # Robogym Control
//!
//! 批量关节阻抗控制层：
//!
//! - `filter`: 一阶低通滤波器组（Tustin 离散化）
//! - `homing`: 从机器人描述文档（SRDF）解析 homing 关节配置
//! - `impedance`: 阻抗控制器（增益/参考/测量缓冲区、局部更新、力矩律与初始化状态机）
//!
//! # 每个控制周期的调用顺序
//!
//! 1. `update_state()` 写入测量值
//! 2. `set_gains()` / `set_refs()` 局部更新增益与参考
//! 3. `apply_cmds()` 计算并下发指令
//!
//! 控制器不加锁，调用方负责保证以上顺序。

pub mod filter;
pub mod homing;
pub mod impedance;

mod error;

pub use error::{ControlError, HomingError};
pub use filter::FirstOrderFilter;
pub use homing::{DEFAULT_HOMING_GROUP, HomingBuffer, HomingMap, HomingResolver};
pub use impedance::{
    ControllerPhase, GainUpdateReport, ImpedanceConfig, ImpedanceController, RefUpdateReport,
    StateUpdateReport, effort_law,
};

/// 控制层 Result 别名
pub type Result<T> = std::result::Result<T, ControlError>;
