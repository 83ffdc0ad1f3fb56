//! # Robogym Sync
//!
//! 每个控制周期获取（或数值微分得到）所有机器人副本的根位姿/速度与关节位置/速度。
//!
//! - `synchronizer`: `StateSynchronizer`，含 reset 感知的速度清零与默认位姿管理
//! - `kinematics`: 四元数角速度、同一环境内多机器人的圆周分布

pub mod kinematics;
pub mod synchronizer;

mod error;

pub use error::SyncError;
pub use kinematics::{circular_spawn_offsets, quat_to_omega};
pub use synchronizer::{StateSynchronizer, VelocitySource};

/// 同步层 Result 别名
pub type Result<T> = std::result::Result<T, SyncError>;
