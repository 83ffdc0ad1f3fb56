//! 诊断事件与诊断接收器
//!
//! 每个组件在构造时注入一个 `Arc<dyn DiagnosticSink>`，用于报告可恢复的问题
//! （非法索引、形状/设备不匹配、未知 homing 关节等）。
//!
//! - `TracingSink`：默认实现，转发到 `tracing`
//! - `MemorySink`：测试用，按顺序缓存所有事件
//!
//! # 性能要求
//!
//! `report()` 在控制循环中被调用，实现不得阻塞过久。

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::batch::Device;
use crate::selector::{Axis, IndexViolation};
use crate::signal::SignalKind;

/// 诊断严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
}

/// 结构化诊断事件
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// 索引子集未通过校验
    InvalidIndices {
        axis: Axis,
        violations: Vec<IndexViolation>,
    },

    /// 信号数据与选择器形状或设备不匹配
    SignalMismatch {
        signal: SignalKind,
        expected_rows: usize,
        expected_cols: usize,
        expected_device: Device,
        rows: usize,
        cols: usize,
        device: Device,
    },

    /// 选择器非法，信号被拒绝写入
    SignalRejected { signal: SignalKind },

    /// 描述文档中的 homing 关节在 articulation 中不存在
    UnknownHomingJoint { group: String, joint: String },

    /// 描述文档中没有对应的 homing 组
    MissingHomingGroup { group: String },

    /// 配置项缺失或非法，已回退到默认值
    DefaultApplied {
        scope: String,
        option: String,
        detail: String,
    },

    /// 请求了滤波但控制器未配置滤波器
    FilterUnavailable,
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Diagnostic::FilterUnavailable => Severity::Info,
            _ => Severity::Warning,
        }
    }

    /// 简短的事件类别名（用作日志字段）
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::InvalidIndices { .. } => "invalid_indices",
            Diagnostic::SignalMismatch { .. } => "signal_mismatch",
            Diagnostic::SignalRejected { .. } => "signal_rejected",
            Diagnostic::UnknownHomingJoint { .. } => "unknown_homing_joint",
            Diagnostic::MissingHomingGroup { .. } => "missing_homing_group",
            Diagnostic::DefaultApplied { .. } => "default_applied",
            Diagnostic::FilterUnavailable => "filter_unavailable",
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::InvalidIndices { axis, violations } => {
                write!(f, "Invalid {} indices:", axis)?;
                for v in violations {
                    write!(f, " {};", v)?;
                }
                Ok(())
            },
            Diagnostic::SignalMismatch {
                signal,
                expected_rows,
                expected_cols,
                expected_device,
                rows,
                cols,
                device,
            } => write!(
                f,
                "Mismatch in provided {} data: expected {}x{} on {}, got {}x{} on {}",
                signal, expected_rows, expected_cols, expected_device, rows, cols, device
            ),
            Diagnostic::SignalRejected { signal } => {
                write!(f, "Rejected {} data: selector is invalid", signal)
            },
            Diagnostic::UnknownHomingJoint { group, joint } => write!(
                f,
                "Joint '{}' in homing group '{}' is not part of the articulation, skipping",
                joint, group
            ),
            Diagnostic::MissingHomingGroup { group } => write!(
                f,
                "No group_state named '{}' found, homing defaults to zero",
                group
            ),
            Diagnostic::DefaultApplied {
                scope,
                option,
                detail,
            } => write!(f, "[{}] option '{}' defaulted: {}", scope, option, detail),
            Diagnostic::FilterUnavailable => {
                write!(f, "Reference filtering requested but no filter is configured")
            },
        }
    }
}

/// 诊断接收器
///
/// 必须是 `Send + Sync`，以便通过 `Arc` 在多个组件之间共享。
pub trait DiagnosticSink: Send + Sync {
    /// 报告一个诊断事件
    ///
    /// - `component`: 发出事件的组件名（例如 `"impedance"`）
    fn report(&self, component: &'static str, diagnostic: Diagnostic);
}

/// 共享诊断接收器
pub type SharedSink = Arc<dyn DiagnosticSink>;

/// 默认接收器：转发到 `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, component: &'static str, diagnostic: Diagnostic) {
        match diagnostic.severity() {
            Severity::Warning => {
                warn!(component, kind = diagnostic.kind(), "{}", diagnostic)
            },
            Severity::Info => {
                info!(component, kind = diagnostic.kind(), "{}", diagnostic)
            },
        }
    }
}

/// 构造一个共享的 `TracingSink`
pub fn tracing_sink() -> SharedSink {
    Arc::new(TracingSink)
}

/// 内存接收器：按顺序缓存事件（测试用）
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<(&'static str, Diagnostic)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取出并清空所有已缓存事件
    pub fn take(&self) -> Vec<(&'static str, Diagnostic)> {
        std::mem::take(&mut *self.events.lock())
    }

    /// 当前缓存事件的快照
    pub fn events(&self) -> Vec<(&'static str, Diagnostic)> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, component: &'static str, diagnostic: Diagnostic) {
        self.events.lock().push((component, diagnostic));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.report("selector", Diagnostic::FilterUnavailable);
        sink.report(
            "homing",
            Diagnostic::MissingHomingGroup {
                group: "home".to_string(),
            },
        );

        assert_eq!(sink.len(), 2);
        let events = sink.take();
        assert_eq!(events[0].0, "selector");
        assert_eq!(events[1].1.kind(), "missing_homing_group");
        assert!(sink.is_empty());
    }

    #[test]
    fn test_sink_as_trait_object() {
        let memory = Arc::new(MemorySink::new());
        let shared: SharedSink = memory.clone();
        shared.report("test", Diagnostic::FilterUnavailable);
        assert_eq!(memory.len(), 1);

        // TracingSink 在没有订阅者时不应 panic
        tracing_sink().report("test", Diagnostic::FilterUnavailable);
    }

    #[test]
    fn test_signal_mismatch_display() {
        let d = Diagnostic::SignalMismatch {
            signal: SignalKind::PositionGain,
            expected_rows: 1,
            expected_cols: 2,
            expected_device: Device::Cpu,
            rows: 2,
            cols: 3,
            device: Device::Cuda(0),
        };
        let msg = d.to_string();
        assert!(msg.contains("pos_gains"));
        assert!(msg.contains("expected 1x2 on cpu"));
        assert!(msg.contains("got 2x3 on cuda:0"));
        assert_eq!(d.severity(), Severity::Warning);
    }

    #[test]
    fn test_severity() {
        assert_eq!(Diagnostic::FilterUnavailable.severity(), Severity::Info);
        assert_eq!(
            Diagnostic::UnknownHomingJoint {
                group: "home".into(),
                joint: "tail".into()
            }
            .severity(),
            Severity::Warning
        );
    }
}
