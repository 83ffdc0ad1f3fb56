//! 同步层错误类型定义

use robogym_articulation::ArticulationError;
use thiserror::Error;

/// 同步层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Articulation is not initialized")]
    ArticulationNotInitialized,

    /// articulation 返回的缓冲区形状不符合预期
    #[error("Shape mismatch for {what}: expected {expected_rows}x{expected_cols}, got {rows}x{cols}")]
    ShapeMismatch {
        what: &'static str,
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },

    /// 微分步长必须为有限正数
    #[error("Invalid differentiation step: {0}")]
    InvalidDt(f64),

    /// 四元数范数为零或非有限值，无法归一化
    #[error("Degenerate orientation quaternion at row {row}")]
    DegenerateQuaternion { row: usize },

    #[error("Articulation error: {0}")]
    Articulation(ArticulationError),
}

impl From<ArticulationError> for SyncError {
    fn from(e: ArticulationError) -> Self {
        match e {
            ArticulationError::NotInitialized => SyncError::ArticulationNotInitialized,
            other => SyncError::Articulation(other),
        }
    }
}
