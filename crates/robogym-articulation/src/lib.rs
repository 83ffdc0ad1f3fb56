//! # Robogym Articulation Layer
//!
//! 仿真后端的 articulation 抽象层，提供统一的批量关节/根状态读写接口。
//!
//! 所有读取接口返回拥有所有权的快照（`Batch`），写入接口接收借用的缓冲区。
//! 实现通过内部可变性（例如 `parking_lot::Mutex`）支持 `&self` 写入，
//! 以便多个组件通过 `Arc<dyn Articulation>` 共享同一个 articulation。
//!
//! # 缓冲区形状
//!
//! - 关节量：`[robot_count, joint_count]`
//! - 根位置 / 线速度 / 角速度：`[robot_count, 3]`
//! - 根姿态：`[robot_count, 4]`，四元数顺序为 `(w, x, y, z)`

use std::sync::Arc;

use robogym_types::{Batch, Device};
use thiserror::Error;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockArticulation, MockCommand};

/// Articulation 层统一错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArticulationError {
    #[error("Articulation is not initialized")]
    NotInitialized,

    #[error("Shape mismatch for {what}: expected {expected_rows}x{expected_cols}, got {rows}x{cols}")]
    ShapeMismatch {
        what: &'static str,
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Backend error: {0}")]
    Backend(String),
}

impl ArticulationError {
    /// 是否为致命错误（需要重新初始化 articulation）
    pub fn is_fatal(&self) -> bool {
        matches!(self, ArticulationError::NotInitialized)
    }
}

/// Articulation 层 Result 别名
pub type Result<T> = std::result::Result<T, ArticulationError>;

/// 批量 articulation 接口
///
/// 一个实现对应一种机器人（相同关节结构），包含 `robot_count` 个并行副本。
pub trait Articulation: Send + Sync {
    /// 仿真后端是否已完成初始化
    fn is_initialized(&self) -> bool;

    fn robot_count(&self) -> usize;

    fn joint_count(&self) -> usize;

    /// 关节名称（顺序即列顺序）
    fn joint_names(&self) -> Vec<String>;

    fn device(&self) -> Device;

    fn joint_positions(&self) -> Result<Batch>;

    fn joint_velocities(&self) -> Result<Batch>;

    /// 根位姿：`(位置 [n,3], 姿态 [n,4])`
    fn world_poses(&self) -> Result<(Batch, Batch)>;

    fn linear_velocities(&self) -> Result<Batch>;

    fn angular_velocities(&self) -> Result<Batch>;

    fn set_joint_position_targets(&self, targets: &Batch) -> Result<()>;

    fn set_joint_velocity_targets(&self, targets: &Batch) -> Result<()>;

    fn set_joint_efforts(&self, efforts: &Batch) -> Result<()>;

    /// 设置原生 PD 增益（`None` 表示保持不变）
    fn set_gains(&self, kps: Option<&Batch>, kds: Option<&Batch>) -> Result<()>;

    /// 设置根的默认位姿（reset 时使用）
    fn set_default_state(&self, positions: &Batch, orientations: &Batch) -> Result<()>;

    /// 设置关节的默认状态（reset 时使用）
    fn set_joints_default_state(
        &self,
        positions: &Batch,
        velocities: &Batch,
        efforts: &Batch,
    ) -> Result<()>;

    /// 求解器迭代次数 `(位置, 速度)`，每个副本一项
    fn solver_iteration_counts(&self) -> Result<(Vec<u32>, Vec<u32>)>;

    fn set_solver_iteration_counts(&self, position: &[u32], velocity: &[u32]) -> Result<()>;

    /// 设备同步屏障
    ///
    /// 在下发指令前调用，等待设备上所有挂起的计算完成。
    /// 默认实现为空操作（CPU 后端无需同步）。
    fn synchronize(&self) -> Result<()> {
        Ok(())
    }
}

/// 共享 articulation
pub type SharedArticulation = Arc<dyn Articulation>;
