//! 类型层错误定义

use thiserror::Error;

/// 类型层错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypesError {
    /// 关节名称重复（名称 → 索引必须是双射）
    #[error("Duplicate joint name: {0}")]
    DuplicateJointName(String),

    /// 缓冲区形状不匹配
    #[error("Shape mismatch: expected {expected_rows}x{expected_cols}, got {rows}x{cols}")]
    ShapeMismatch {
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },

    /// 设备描述无法解析
    #[error("Invalid device '{0}': expected \"cpu\", \"cuda\" or \"cuda:<ordinal>\"")]
    InvalidDevice(String),
}
