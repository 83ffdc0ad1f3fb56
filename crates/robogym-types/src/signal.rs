//! 信号类型

use std::fmt;

/// 控制器缓冲区所承载的信号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    PositionRef,
    VelocityRef,
    EffortRef,
    Position,
    Velocity,
    Effort,
    PositionGain,
    VelocityGain,
}

impl SignalKind {
    pub const ALL: [SignalKind; 8] = [
        SignalKind::PositionRef,
        SignalKind::VelocityRef,
        SignalKind::EffortRef,
        SignalKind::Position,
        SignalKind::Velocity,
        SignalKind::Effort,
        SignalKind::PositionGain,
        SignalKind::VelocityGain,
    ];

    /// 诊断输出中使用的名称
    pub fn name(&self) -> &'static str {
        match self {
            SignalKind::PositionRef => "pos_ref",
            SignalKind::VelocityRef => "vel_ref",
            SignalKind::EffortRef => "eff_ref",
            SignalKind::Position => "pos",
            SignalKind::Velocity => "vel",
            SignalKind::Effort => "eff",
            SignalKind::PositionGain => "pos_gains",
            SignalKind::VelocityGain => "vel_gains",
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            SignalKind::PositionRef | SignalKind::VelocityRef | SignalKind::EffortRef
        )
    }

    pub fn is_measurement(&self) -> bool {
        matches!(
            self,
            SignalKind::Position | SignalKind::Velocity | SignalKind::Effort
        )
    }

    pub fn is_gain(&self) -> bool {
        matches!(self, SignalKind::PositionGain | SignalKind::VelocityGain)
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
