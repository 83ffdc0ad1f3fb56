//! 控制层错误类型定义

use std::path::PathBuf;

use robogym_articulation::ArticulationError;
use robogym_types::TypesError;
use thiserror::Error;

use crate::impedance::ControllerPhase;

/// 控制层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControlError {
    /// Articulation 未初始化（构造或调用时）
    #[error("Articulation is not initialized")]
    ArticulationNotInitialized,

    /// 非法的状态机转换
    #[error("Invalid phase transition: {from} -> {to}")]
    InvalidTransition {
        from: ControllerPhase,
        to: ControllerPhase,
    },

    /// 滤波器参数非法（必须为有限正数）
    #[error("Invalid filter parameters: dt={dt}, bandwidth={bandwidth}")]
    InvalidFilterParams { dt: f64, bandwidth: f64 },

    /// 关节映射或缓冲区错误
    #[error("Types error: {0}")]
    Types(#[from] TypesError),

    /// Articulation 指令失败
    #[error("Articulation error: {0}")]
    Articulation(ArticulationError),
}

impl From<ArticulationError> for ControlError {
    fn from(e: ArticulationError) -> Self {
        match e {
            ArticulationError::NotInitialized => ControlError::ArticulationNotInitialized,
            other => ControlError::Articulation(other),
        }
    }
}

impl ControlError {
    /// 是否为致命错误（控制器无法继续使用）
    pub fn is_fatal(&self) -> bool {
        match self {
            ControlError::ArticulationNotInitialized
            | ControlError::InvalidFilterParams { .. }
            | ControlError::Types(_) => true,
            ControlError::InvalidTransition { .. } => false,
            ControlError::Articulation(e) => e.is_fatal(),
        }
    }
}

/// Homing 解析错误（均为初始化阶段的致命错误）
#[derive(Error, Debug)]
pub enum HomingError {
    #[error("Failed to read robot description {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("XML parse error: {0}")]
    XmlParse(String),

    #[error("Missing attribute '{attribute}' on <{element}>")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    #[error("Invalid value '{value}' for homing joint '{joint}'")]
    InvalidValue { joint: String, value: String },

    #[error("Articulation is not initialized")]
    ArticulationNotInitialized,

    #[error("Types error: {0}")]
    Types(#[from] TypesError),
}
